use super::require;
use crate::{
    connection::{Capability, ConnectionRegistry},
    error::HandlerError,
    publish::{Publication, Publisher},
    router::MessageHandler,
    topic::{self, client_topic, match_identity},
};
use async_trait::async_trait;
use edgeplane_service_api::Identity;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

/// Stores the twins of clients.
#[async_trait]
pub trait TwinSource: Send + Sync {
    async fn get_twin(&self, identity: &Identity) -> Result<Value, HandlerError>;

    async fn update_reported(&self, identity: &Identity, patch: Value)
        -> Result<(), HandlerError>;
}

/// Serves twin requests of clients, and pushes desired property updates to them.
pub struct TwinHandler {
    registry: ConnectionRegistry,
    publisher: Arc<dyn Publisher>,
    source: Arc<dyn TwinSource>,
}

impl TwinHandler {
    pub fn new(
        registry: ConnectionRegistry,
        publisher: Arc<dyn Publisher>,
        source: Arc<dyn TwinSource>,
    ) -> Self {
        Self {
            registry,
            publisher,
            source,
        }
    }

    /// Send a desired properties patch to a client.
    pub async fn send_desired(
        &self,
        identity: &Identity,
        patch: &Value,
        version: u64,
    ) -> Result<(), HandlerError> {
        require(&self.registry, identity, Capability::DesiredPropertyUpdates).await?;

        let publication = Publication::new(
            format!("{}/twin/desired/?$version={version}", client_topic(identity)),
            serde_json::to_vec(patch)?,
        );
        Ok(self.publisher.publish(publication).await?)
    }

    async fn respond(
        &self,
        identity: &Identity,
        rid: &str,
        result: Result<Option<Value>, HandlerError>,
    ) -> Result<(), HandlerError> {
        let (status, payload) = match result {
            Ok(Some(twin)) => (200, serde_json::to_vec(&twin)?),
            Ok(None) => (204, vec![]),
            Err(HandlerError::Twin { status, message }) => {
                (status, serde_json::to_vec(&serde_json::json!({ "message": message }))?)
            }
            Err(err) => (
                500,
                serde_json::to_vec(&serde_json::json!({ "message": err.to_string() }))?,
            ),
        };

        require(&self.registry, identity, Capability::TwinResponses).await?;

        let publication = Publication::new(
            format!("{}/twin/res/{status}/?$rid={rid}", client_topic(identity)),
            payload,
        );
        Ok(self.publisher.publish(publication).await?)
    }
}

#[async_trait]
impl MessageHandler for TwinHandler {
    fn name(&self) -> &'static str {
        "twin"
    }

    fn topics(&self) -> Vec<&'static Regex> {
        vec![&topic::TWIN_GET, &topic::TWIN_REPORTED]
    }

    fn watched_subscriptions(&self) -> Vec<(&'static Regex, Capability)> {
        vec![
            (&topic::TWIN_RESPONSE_SUBSCRIPTION, Capability::TwinResponses),
            (&topic::DESIRED_SUBSCRIPTION, Capability::DesiredPropertyUpdates),
        ]
    }

    async fn handle(&self, publication: &Publication) -> Result<bool, HandlerError> {
        if topic::TWIN_GET.is_match(&publication.topic) {
            let (identity, captures) = match_identity(&topic::TWIN_GET, &publication.topic)?;
            let result = self.source.get_twin(&identity).await.map(Some);
            self.respond(&identity, &captures["rid"], result).await?;
            return Ok(true);
        }

        let (identity, captures) = match_identity(&topic::TWIN_REPORTED, &publication.topic)?;
        let patch: Value = serde_json::from_slice(&publication.payload)?;
        let result = self
            .source
            .update_reported(&identity, patch)
            .await
            .map(|_| None);
        self.respond(&identity, &captures["rid"], result).await?;

        Ok(true)
    }
}
