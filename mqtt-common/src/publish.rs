use crate::error::PublishError;
use async_trait::async_trait;
use bytes::Bytes;
use edgeplane_service_api::Identity;

/// A message on a broker topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Bytes,
    /// The client which published the message, if it was received from the broker.
    pub sender: Option<Identity>,
}

impl Publication {
    pub fn new<T, P>(topic: T, payload: P) -> Self
    where
        T: Into<String>,
        P: Into<Bytes>,
    {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            sender: None,
        }
    }

    pub fn from_sender(mut self, sender: Identity) -> Self {
        self.sender = Some(sender);
        self
    }
}

/// Sends publications to the broker.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, publication: Publication) -> Result<(), PublishError>;
}
