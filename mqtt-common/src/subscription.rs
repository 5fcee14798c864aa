use crate::{
    connection::{Capability, ConnectionRegistry},
    error::HandlerError,
    publish::Publication,
    router::MessageHandler,
    topic::{self, identity_from_captures, match_identity},
};
use async_trait::async_trait;
use edgeplane_service_api::Identity;
use regex::Regex;

/// Tracks the subscriptions of clients, enabling capabilities on their connections.
///
/// The broker publishes the complete list of topics a client is subscribed to. A capability is
/// enabled if one of those topics matches any of its watched patterns for the client's own
/// identity, and disabled otherwise.
pub struct SubscriptionChangeHandler {
    registry: ConnectionRegistry,
    watched: Vec<(&'static Regex, Capability)>,
}

impl SubscriptionChangeHandler {
    pub fn new(registry: ConnectionRegistry, watched: Vec<(&'static Regex, Capability)>) -> Self {
        Self { registry, watched }
    }

    fn subscribed(pattern: &Regex, identity: &Identity, topics: &[String]) -> bool {
        topics.iter().any(|topic| {
            pattern
                .captures(topic)
                .and_then(|captures| identity_from_captures(&captures).ok())
                .map_or(false, |subscriber| &subscriber == identity)
        })
    }
}

#[async_trait]
impl MessageHandler for SubscriptionChangeHandler {
    fn name(&self) -> &'static str {
        "subscriptions"
    }

    fn topics(&self) -> Vec<&'static Regex> {
        vec![&topic::SUBSCRIPTIONS]
    }

    async fn handle(&self, publication: &Publication) -> Result<bool, HandlerError> {
        let (identity, _) = match_identity(&topic::SUBSCRIPTIONS, &publication.topic)?;
        let topics: Vec<String> = serde_json::from_slice(&publication.payload)?;

        let connection = self.registry.get_or_create(&identity).await;
        let mut connection = connection.lock().await;

        let mut capabilities = Vec::<Capability>::new();
        for (_, capability) in &self.watched {
            if !capabilities.contains(capability) {
                capabilities.push(*capability);
            }
        }

        for capability in capabilities {
            let enabled = self
                .watched
                .iter()
                .filter(|(_, watched)| *watched == capability)
                .any(|(pattern, _)| Self::subscribed(pattern, &identity, &topics));
            if connection.set(capability, enabled) {
                log::info!("{identity}: {capability:?} enabled: {enabled}");
            }
        }

        Ok(true)
    }
}
