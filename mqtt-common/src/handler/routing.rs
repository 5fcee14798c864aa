use super::{MessageDelivery, MessageSink};
use crate::error::HandlerError;
use async_trait::async_trait;
use edgeplane_routing_common::{message::Message, route::Endpoint, router::Router};
use edgeplane_service_api::Identity;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sends messages to the endpoints of the matching routes.
///
/// Failing to deliver to one endpoint doesn't affect the others.
pub struct RoutingSink {
    device_id: String,
    router: RwLock<Router>,
    delivery: Arc<MessageDelivery>,
    upstream: Arc<dyn MessageSink>,
}

impl RoutingSink {
    /// Create a new sink, for the edge hub of the device.
    pub fn new<D: Into<String>>(
        device_id: D,
        router: Router,
        delivery: Arc<MessageDelivery>,
        upstream: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            router: RwLock::new(router),
            delivery,
            upstream,
        }
    }

    /// Replace the routes, after the configuration changed.
    pub async fn update(&self, router: Router) {
        log::info!("Updating routes: {} routes", router.routes().len());
        *self.router.write().await = router;
    }

    async fn deliver(
        &self,
        identity: &Identity,
        endpoint: &Endpoint,
        message: &Message,
    ) -> Result<(), HandlerError> {
        match endpoint {
            Endpoint::Upstream => self.upstream.accept(identity, message.clone()).await,
            Endpoint::Brokered { module, input } => {
                let target = Identity::module(self.device_id.clone(), module.clone());
                self.delivery.send_to_input(&target, input, message).await
            }
        }
    }
}

#[async_trait]
impl MessageSink for RoutingSink {
    async fn accept(&self, identity: &Identity, message: Message) -> Result<(), HandlerError> {
        let router = self.router.read().await;
        let endpoints = router.route(&message);
        if endpoints.is_empty() {
            log::debug!("{identity}: no route matches message");
            return Ok(());
        }

        let results = join_all(
            endpoints
                .iter()
                .map(|endpoint| self.deliver(identity, endpoint, &message)),
        )
        .await;

        for (endpoint, result) in endpoints.iter().zip(results) {
            if let Err(err) = result {
                log::warn!("{identity}: failed to deliver message to {endpoint}: {err}");
            }
        }

        Ok(())
    }
}
