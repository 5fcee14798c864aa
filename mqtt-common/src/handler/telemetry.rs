use crate::{
    error::HandlerError,
    publish::Publication,
    router::MessageHandler,
    topic::{self, match_identity, PropertyBag},
};
use async_trait::async_trait;
use edgeplane_routing_common::message::{
    Message, MessageSource, SYSTEM_PROPERTY_CONNECTION_DEVICE_ID,
    SYSTEM_PROPERTY_CONNECTION_MODULE_ID, SYSTEM_PROPERTY_OUTPUT_NAME,
};
use edgeplane_service_api::{
    auth::{AuthChain, AuthChainError},
    Identity,
};
use regex::Regex;
use std::sync::Arc;

/// Receives messages sent by clients.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn accept(&self, identity: &Identity, message: Message) -> Result<(), HandlerError>;
}

/// Knows the nesting of devices below this edge hub.
pub trait DeviceScope: Send + Sync {
    /// The auth chain of a device, if it is in scope.
    fn auth_chain(&self, device_id: &str) -> Option<String>;
}

/// Ingests telemetry and module output messages.
///
/// A client may publish on behalf of another one, if it is a device or an edge hub module, and
/// its device is part of the other one's auth chain.
pub struct TelemetryHandler {
    sink: Arc<dyn MessageSink>,
    scope: Arc<dyn DeviceScope>,
}

impl TelemetryHandler {
    pub fn new(sink: Arc<dyn MessageSink>, scope: Arc<dyn DeviceScope>) -> Self {
        Self { sink, scope }
    }

    fn authorize(&self, sender: &Identity, target: &Identity) -> Result<(), HandlerError> {
        if sender == target {
            return Ok(());
        }
        if sender.module_id().is_some() && !sender.is_edge_hub() {
            return Err(AuthChainError::ActorNotInChain(sender.to_string()).into());
        }

        let chain = self
            .scope
            .auth_chain(target.device_id())
            .unwrap_or_default()
            .parse::<AuthChain>()?;
        chain.authorize(sender.device_id(), &target.to_string())?;

        log::debug!("{sender} sends on behalf of {target}");
        Ok(())
    }

    fn message(identity: &Identity, output: bool, publication: &Publication, props: &str) -> Message {
        let bag = PropertyBag::decode(props);

        let source = match identity.module_id() {
            Some(module) => MessageSource::Module {
                module: module.to_string(),
                output: output
                    .then(|| bag.system_properties.get(SYSTEM_PROPERTY_OUTPUT_NAME).cloned())
                    .flatten(),
            },
            None => MessageSource::Telemetry,
        };

        let mut message = bag.apply(Message::new(source, publication.payload.clone()));
        message.system_properties.insert(
            SYSTEM_PROPERTY_CONNECTION_DEVICE_ID.into(),
            identity.device_id().into(),
        );
        if let Some(module) = identity.module_id() {
            message
                .system_properties
                .insert(SYSTEM_PROPERTY_CONNECTION_MODULE_ID.into(), module.into());
        }
        message
    }
}

#[async_trait]
impl MessageHandler for TelemetryHandler {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn topics(&self) -> Vec<&'static Regex> {
        vec![&topic::TELEMETRY, &topic::MODULE_OUTPUT]
    }

    async fn handle(&self, publication: &Publication) -> Result<bool, HandlerError> {
        let (pattern, output): (&Regex, bool) = if topic::TELEMETRY.is_match(&publication.topic) {
            (&topic::TELEMETRY, false)
        } else {
            (&topic::MODULE_OUTPUT, true)
        };

        let (identity, captures) = match_identity(pattern, &publication.topic)?;
        if let Some(sender) = &publication.sender {
            self.authorize(sender, &identity)?;
        }

        let message = Self::message(&identity, output, publication, &captures["props"]);
        self.sink.accept(&identity, message).await?;

        Ok(true)
    }
}
