use crate::connection::Capability;
use edgeplane_service_api::{auth::AuthChainError, Identity, IdentityError};
use thiserror::Error;

/// Failure to hand a publication over to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("not authorized")]
    NotAuthorized,
    #[error("topic name invalid")]
    TopicNameInvalid,
    #[error("unspecified error")]
    UnspecifiedError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("Topic doesn't match: {0}")]
    Unmatched(String),
    #[error("Invalid identity: {0}")]
    Identity(#[from] IdentityError),
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error("Failed to publish: {0}")]
    Publish(#[from] PublishError),
    #[error("Invalid payload: {0}")]
    Payload(String),
    #[error("Not authorized: {0}")]
    NotAuthorized(#[from] AuthChainError),
    #[error("No connection for {0}")]
    NotConnected(Identity),
    #[error("{identity} is not subscribed to {capability:?}")]
    MissingCapability {
        identity: Identity,
        capability: Capability,
    },
    #[error("No response for request {0} in time")]
    Timeout(String),
    #[error("Request {0} was cancelled")]
    Cancelled(String),
    #[error("Failed to deliver message: {0}")]
    Sink(String),
    #[error("Twin operation failed with status {status}: {message}")]
    Twin { status: u16, message: String },
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}
