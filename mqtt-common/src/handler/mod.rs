mod connection;
mod messages;
mod methods;
mod routing;
mod telemetry;
mod twin;

pub use connection::*;
pub use messages::*;
pub use methods::*;
pub use routing::*;
pub use telemetry::*;
pub use twin::*;

use crate::{
    connection::{Capability, Connection, ConnectionRegistry},
    error::HandlerError,
};
use edgeplane_service_api::Identity;

/// Get the connection of a client, which must be subscribed to receive the capability.
pub(crate) async fn require(
    registry: &ConnectionRegistry,
    identity: &Identity,
    capability: Capability,
) -> Result<Connection, HandlerError> {
    let connection = registry
        .get(identity)
        .await
        .ok_or_else(|| HandlerError::NotConnected(identity.clone()))?;

    if !connection.lock().await.has(capability) {
        return Err(HandlerError::MissingCapability {
            identity: identity.clone(),
            capability,
        });
    }

    Ok(connection)
}
