use crate::{
    connection::ConnectionRegistry, error::HandlerError, publish::Publication,
    router::MessageHandler, topic,
};
use async_trait::async_trait;
use edgeplane_service_api::Identity;
use regex::Regex;

/// Tracks the clients connected to the broker.
///
/// The broker publishes the list of all connected client identities. Invalid entries are
/// skipped, they don't affect the other clients.
pub struct ConnectionHandler {
    registry: ConnectionRegistry,
}

impl ConnectionHandler {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for ConnectionHandler {
    fn name(&self) -> &'static str {
        "connections"
    }

    fn topics(&self) -> Vec<&'static Regex> {
        vec![&topic::CONNECTED_TOPIC]
    }

    async fn handle(&self, publication: &Publication) -> Result<bool, HandlerError> {
        let clients: Vec<String> = serde_json::from_slice(&publication.payload)?;

        let identities = clients
            .into_iter()
            .filter_map(|client| match client.parse::<Identity>() {
                Ok(identity) => Some(identity),
                Err(err) => {
                    log::warn!("Skipping invalid client identity '{client}': {err}");
                    None
                }
            })
            .collect::<Vec<_>>();

        self.registry.connected(identities).await;

        Ok(true)
    }
}
