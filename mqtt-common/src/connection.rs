//! State of the clients connected to the broker.

use bytes::Bytes;
use edgeplane_service_api::Identity;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use tokio::sync::{oneshot, Mutex};

/// What a client is subscribed to receive.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Direct method calls.
    Methods,
    /// Responses to twin requests.
    TwinResponses,
    /// Desired property updates.
    DesiredPropertyUpdates,
    /// Messages routed to module inputs.
    ModuleMessages,
    /// Cloud to device messages.
    C2D,
}

/// The response to a direct method call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodResponse {
    pub status: u16,
    pub payload: Bytes,
}

#[derive(Debug)]
pub struct ConnectionState {
    identity: Identity,
    capabilities: HashSet<Capability>,
    pending: HashMap<String, oneshot::Sender<MethodResponse>>,
}

impl ConnectionState {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            capabilities: Default::default(),
            pending: Default::default(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Add or remove a capability, returns `true` if that changed anything.
    pub fn set(&mut self, capability: Capability, enabled: bool) -> bool {
        if enabled {
            self.capabilities.insert(capability)
        } else {
            self.capabilities.remove(&capability)
        }
    }

    /// Register a pending request, receiving its response.
    pub fn register(&mut self, rid: String) -> oneshot::Receiver<MethodResponse> {
        let (tx, rx) = oneshot::channel();
        if self.pending.insert(rid.clone(), tx).is_some() {
            log::warn!("{}: replaced pending request {rid}", self.identity);
        }
        rx
    }

    /// Complete a pending request, returns `false` if the request is unknown.
    pub fn complete(&mut self, rid: &str, response: MethodResponse) -> bool {
        match self.pending.remove(rid) {
            // the caller might have given up already
            Some(tx) => {
                let _ = tx.send(response);
                true
            }
            None => false,
        }
    }

    pub fn cancel(&mut self, rid: &str) {
        self.pending.remove(rid);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

pub type Connection = Arc<Mutex<ConnectionState>>;

/// All connections, by identity.
#[derive(Clone, Debug, Default)]
pub struct ConnectionRegistry {
    connections: Arc<Mutex<HashMap<Identity, Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, identity: &Identity) -> Option<Connection> {
        self.connections.lock().await.get(identity).cloned()
    }

    pub async fn get_or_create(&self, identity: &Identity) -> Connection {
        self.connections
            .lock()
            .await
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ConnectionState::new(identity.clone()))))
            .clone()
    }

    /// Update the connections to the set of connected clients.
    ///
    /// Known clients keep their state, clients no longer connected are dropped, cancelling their
    /// pending requests.
    pub async fn connected<I>(&self, identities: I) -> (Vec<Identity>, Vec<Identity>)
    where
        I: IntoIterator<Item = Identity>,
    {
        let identities = identities.into_iter().collect::<HashSet<_>>();
        let mut connections = self.connections.lock().await;

        let mut removed = connections
            .keys()
            .filter(|identity| !identities.contains(identity))
            .cloned()
            .collect::<Vec<_>>();
        for identity in &removed {
            connections.remove(identity);
        }

        let mut added = vec![];
        for identity in identities {
            if !connections.contains_key(&identity) {
                connections.insert(
                    identity.clone(),
                    Arc::new(Mutex::new(ConnectionState::new(identity.clone()))),
                );
                added.push(identity);
            }
        }

        added.sort();
        removed.sort();
        log::info!("Connections changed - added: {added:?}, removed: {removed:?}");

        (added, removed)
    }

    pub async fn identities(&self) -> Vec<Identity> {
        let mut result = self
            .connections
            .lock()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        result.sort();
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_connected() {
        let registry = ConnectionRegistry::new();
        let d1 = Identity::device("d1");
        let m1 = Identity::module("d1", "m1");

        let (added, removed) = registry.connected(vec![d1.clone(), m1.clone()]).await;
        assert_eq!(added, vec![d1.clone(), m1.clone()]);
        assert!(removed.is_empty());

        let connection = registry.get(&m1).await.unwrap();
        connection.lock().await.set(Capability::Methods, true);
        let rx = connection.lock().await.register("1".into());

        // state survives an update keeping the client
        let (added, removed) = registry.connected(vec![m1.clone()]).await;
        assert!(added.is_empty());
        assert_eq!(removed, vec![d1.clone()]);
        assert!(registry.get(&m1).await.unwrap().lock().await.has(Capability::Methods));

        // dropping the client cancels its requests
        drop(connection);
        registry.connected(vec![]).await;
        assert!(registry.identities().await.is_empty());
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_pending() {
        let mut state = ConnectionState::new(Identity::device("d1"));
        let mut rx = state.register("1".into());
        assert_eq!(state.pending(), 1);

        let response = MethodResponse {
            status: 200,
            payload: Bytes::from_static(b"{}"),
        };
        assert!(!state.complete("2", response.clone()));
        assert!(state.complete("1", response.clone()));
        assert_eq!(rx.try_recv(), Ok(response));
        assert_eq!(state.pending(), 0);
        assert!(state.set(Capability::C2D, true));
        assert!(!state.set(Capability::C2D, true));
        assert!(state.set(Capability::C2D, false));
    }
}
