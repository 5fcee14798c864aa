//! Topic handling for the MQTT bridge of the edge hub.
//!
//! Publications received from the broker are dispatched by the [`router::TopicRouter`] to
//! the [`router::MessageHandler`] claiming their topic. Per client state is kept in the
//! [`connection::ConnectionRegistry`].

pub mod connection;
pub mod error;
pub mod handler;
pub mod publish;
pub mod router;
pub mod subscription;
pub mod topic;

pub use connection::{Capability, ConnectionRegistry};
pub use error::{HandlerError, PublishError, TopicError};
pub use publish::{Publication, Publisher};
pub use router::{Dispatch, MessageHandler, TopicRouter};
