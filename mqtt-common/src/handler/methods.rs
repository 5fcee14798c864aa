use super::require;
use crate::{
    connection::{Capability, Connection, ConnectionRegistry, MethodResponse},
    error::HandlerError,
    publish::{Publication, Publisher},
    router::MessageHandler,
    topic::{self, client_topic, match_identity},
};
use async_trait::async_trait;
use bytes::Bytes;
use edgeplane_service_api::Identity;
use regex::Regex;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::instrument;

pub const DEFAULT_METHOD_TIMEOUT: Duration = Duration::from_secs(30);

/// Invokes direct methods on clients, and correlates their responses.
pub struct DirectMethodHandler {
    registry: ConnectionRegistry,
    publisher: Arc<dyn Publisher>,
    timeout: Duration,
    next_rid: AtomicU64,
}

impl DirectMethodHandler {
    pub fn new(registry: ConnectionRegistry, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            registry,
            publisher,
            timeout: DEFAULT_METHOD_TIMEOUT,
            next_rid: AtomicU64::new(1),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Call a method on a client, waiting for its response.
    #[instrument(skip(self, identity, payload), fields(identity = %identity))]
    pub async fn call_method(
        &self,
        identity: &Identity,
        method: &str,
        payload: Bytes,
    ) -> Result<MethodResponse, HandlerError> {
        let connection = require(&self.registry, identity, Capability::Methods).await?;

        let rid = self.next_rid.fetch_add(1, Ordering::Relaxed).to_string();
        let response = connection.lock().await.register(rid.clone());
        // the request is removed on every way out, including the caller dropping this future
        let _pending = PendingRequest {
            connection,
            rid: rid.clone(),
        };

        let publication = Publication::new(
            format!("{}/methods/post/{method}/?$rid={rid}", client_topic(identity)),
            payload,
        );
        self.publisher.publish(publication).await?;

        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(response)) => Ok(response),
            // the connection went away
            Ok(Err(_)) => Err(HandlerError::Cancelled(rid)),
            Err(_) => {
                log::info!("{identity}: method {method} timed out");
                Err(HandlerError::Timeout(rid))
            }
        }
    }
}

/// A registered method request, cancelled when dropped.
struct PendingRequest {
    connection: Connection,
    rid: String,
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if let Ok(mut connection) = self.connection.try_lock() {
            connection.cancel(&self.rid);
            return;
        }

        let connection = self.connection.clone();
        let rid = std::mem::take(&mut self.rid);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    connection.lock().await.cancel(&rid);
                });
            }
            Err(_) => log::warn!("Unable to cancel method request {rid}, no runtime"),
        }
    }
}

#[async_trait]
impl MessageHandler for DirectMethodHandler {
    fn name(&self) -> &'static str {
        "methods"
    }

    fn topics(&self) -> Vec<&'static Regex> {
        vec![&topic::METHOD_RESPONSE]
    }

    fn watched_subscriptions(&self) -> Vec<(&'static Regex, Capability)> {
        vec![(&topic::METHODS_SUBSCRIPTION, Capability::Methods)]
    }

    async fn handle(&self, publication: &Publication) -> Result<bool, HandlerError> {
        let (identity, captures) = match_identity(&topic::METHOD_RESPONSE, &publication.topic)?;
        let status = captures["status"]
            .parse::<u16>()
            .map_err(|err| HandlerError::Payload(err.to_string()))?;
        let rid = &captures["rid"];

        let connection = self
            .registry
            .get(&identity)
            .await
            .ok_or_else(|| HandlerError::NotConnected(identity.clone()))?;

        let completed = connection.lock().await.complete(
            rid,
            MethodResponse {
                status,
                payload: publication.payload.clone(),
            },
        );
        if !completed {
            log::info!("{identity}: no pending method call for response {rid}");
        }

        Ok(true)
    }
}
