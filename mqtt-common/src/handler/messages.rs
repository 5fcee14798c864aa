use super::require;
use crate::{
    connection::{Capability, ConnectionRegistry},
    error::HandlerError,
    publish::{Publication, Publisher},
    router::MessageHandler,
    topic::{self, client_topic, PropertyBag},
};
use async_trait::async_trait;
use edgeplane_routing_common::message::Message;
use edgeplane_service_api::Identity;
use regex::Regex;
use std::sync::Arc;

/// Delivers messages to module inputs and devices.
///
/// Only clients subscribed to receive those messages get them. This handler doesn't process
/// any topics itself, it only tracks the subscriptions.
pub struct MessageDelivery {
    registry: ConnectionRegistry,
    publisher: Arc<dyn Publisher>,
}

impl MessageDelivery {
    pub fn new(registry: ConnectionRegistry, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    pub async fn send_to_input(
        &self,
        identity: &Identity,
        input: &str,
        message: &Message,
    ) -> Result<(), HandlerError> {
        require(&self.registry, identity, Capability::ModuleMessages).await?;
        self.send(
            format!(
                "{}/inputs/{input}/{}",
                client_topic(identity),
                PropertyBag::encode(message)
            ),
            message,
        )
        .await
    }

    /// Send a cloud to device message.
    pub async fn send_c2d(&self, identity: &Identity, message: &Message) -> Result<(), HandlerError> {
        require(&self.registry, identity, Capability::C2D).await?;
        self.send(
            format!(
                "{}/messages/c2d/post/{}",
                client_topic(identity),
                PropertyBag::encode(message)
            ),
            message,
        )
        .await
    }

    async fn send(&self, topic: String, message: &Message) -> Result<(), HandlerError> {
        let publication = Publication::new(topic, message.body.clone());
        Ok(self.publisher.publish(publication).await?)
    }
}

#[async_trait]
impl MessageHandler for MessageDelivery {
    fn name(&self) -> &'static str {
        "messages"
    }

    fn topics(&self) -> Vec<&'static Regex> {
        vec![]
    }

    fn watched_subscriptions(&self) -> Vec<(&'static Regex, Capability)> {
        vec![
            (&topic::INPUTS_SUBSCRIPTION, Capability::ModuleMessages),
            (&topic::MODULE_MESSAGES_SUBSCRIPTION, Capability::ModuleMessages),
            (&topic::C2D_SUBSCRIPTION, Capability::C2D),
        ]
    }

    async fn handle(&self, _: &Publication) -> Result<bool, HandlerError> {
        Ok(false)
    }
}
