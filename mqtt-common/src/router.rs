use crate::{
    connection::{Capability, ConnectionRegistry},
    error::HandlerError,
    publish::Publication,
    subscription::SubscriptionChangeHandler,
};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::instrument;

/// Handles publications on a set of topics.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// The topics this handler processes.
    fn topics(&self) -> Vec<&'static Regex>;

    /// Subscription patterns of clients, enabling a capability on their connection.
    fn watched_subscriptions(&self) -> Vec<(&'static Regex, Capability)> {
        vec![]
    }

    /// Handle a publication, returns `false` if the handler didn't process it after all.
    async fn handle(&self, publication: &Publication) -> Result<bool, HandlerError>;
}

/// The outcome of dispatching a publication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Handled(&'static str),
    Unhandled,
    /// The publication was invalid and got dropped.
    Dropped(String),
}

/// Dispatches publications to the first handler claiming their topic.
pub struct TopicRouter {
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl TopicRouter {
    /// Create a new router. A handler for subscription changes is added, tracking the watched
    /// subscriptions of all handlers.
    pub fn new(registry: ConnectionRegistry, handlers: Vec<Arc<dyn MessageHandler>>) -> Self {
        let watched = handlers
            .iter()
            .flat_map(|handler| handler.watched_subscriptions())
            .collect::<Vec<_>>();

        let mut all: Vec<Arc<dyn MessageHandler>> =
            vec![Arc::new(SubscriptionChangeHandler::new(registry, watched))];
        all.extend(handlers);

        Self { handlers: all }
    }

    #[instrument(skip_all, fields(topic = %publication.topic))]
    pub async fn dispatch(&self, publication: &Publication) -> Dispatch {
        for handler in &self.handlers {
            if !handler
                .topics()
                .iter()
                .any(|topic| topic.is_match(&publication.topic))
            {
                continue;
            }

            match handler.handle(publication).await {
                Ok(true) => {
                    log::debug!("Handled by {}", handler.name());
                    return Dispatch::Handled(handler.name());
                }
                Ok(false) => continue,
                Err(err) => {
                    log::warn!(
                        "Dropping publication on '{}', handler {} failed: {err}",
                        publication.topic,
                        handler.name()
                    );
                    return Dispatch::Dropped(err.to_string());
                }
            }
        }

        log::debug!("No handler for topic: {}", publication.topic);
        Dispatch::Unhandled
    }
}
