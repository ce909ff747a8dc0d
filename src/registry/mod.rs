use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::{DashMap, Entry};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::client::{ClientName, ClientRole};

use self::error::{ClientNotFound, DeliveryError};

pub mod error;

/// Identifies one connection of a client. A reconnecting client gets a new one.
#[derive(Clone, Hash, PartialEq, Eq)]
pub struct SessionId(Arc<Uuid>);

impl SessionId {
    pub fn generate() -> Self {
        Self(Arc::new(Uuid::new_v4()))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct ClientEntry {
    session_id: SessionId,
    role: ClientRole,
    outbound: mpsc::Sender<Bytes>,
    // Dropped together with the entry, which wakes the connection's eviction receiver.
    _evict: oneshot::Sender<()>,
}

/// Handed back to the connection that registered.
#[derive(Debug)]
pub struct Registration {
    pub session_id: SessionId,
    pub role: ClientRole,
    /// Resolves once this connection's entry is removed or superseded.
    pub evicted: oneshot::Receiver<()>,
    /// Session of the connection that was replaced, if the name was already taken.
    pub superseded: Option<SessionId>,
}

/// A live outbound route, cloned out of the registry so sending never holds a map lock.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: ClientName,
    pub role: ClientRole,
    outbound: mpsc::Sender<Bytes>,
}

impl Route {
    /// Queue a record without waiting. A full or closed channel is reported, never awaited.
    pub fn deliver(&self, record: Bytes) -> Result<(), DeliveryError> {
        self.outbound.try_send(record).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full {
                name: self.name.clone(),
            },
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed {
                name: self.name.clone(),
            },
        })
    }
}

/// Live mapping from client name to the outbound channel of its connection.
///
/// Only the connection lifecycle (identification, disconnect, shutdown) adds or removes entries;
/// everything else gets read access through [`route`](Self::route) and
/// [`routes`](Self::routes).
#[derive(Debug)]
pub struct ClientRegistry {
    clients: DashMap<ClientName, ClientEntry, ahash::RandomState>,
}

impl ClientRegistry {
    /// Construct a new empty [`ClientRegistry`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` for a freshly identified connection.
    ///
    /// The role is derived from the name here and stored, so nothing downstream has to look at
    /// the name again. If the name is already live, the old entry is replaced and its
    /// connection gets evicted.
    pub fn register(&self, name: ClientName, outbound: mpsc::Sender<Bytes>) -> Registration {
        let (evict_tx, evict_rx) = oneshot::channel();
        let role = name.role();
        let session_id = SessionId::generate();
        let entry = ClientEntry {
            session_id: session_id.clone(),
            role,
            outbound,
            _evict: evict_tx,
        };

        let superseded = match self.clients.entry(name) {
            Entry::Occupied(mut slot) => {
                let previous = slot.insert(entry);
                Some(previous.session_id)
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
                None
            }
        };

        Registration {
            session_id,
            role,
            evicted: evict_rx,
            superseded,
        }
    }

    /// Remove the entry for `name`, but only while it still belongs to `session_id`.
    ///
    /// A connection that has been superseded gets [`ClientNotFound`] and leaves its successor
    /// alone.
    pub fn deregister(
        &self,
        name: &ClientName,
        session_id: &SessionId,
    ) -> Result<(), ClientNotFound> {
        self.clients
            .remove_if(name, |_, entry| entry.session_id == *session_id)
            .ok_or_else(|| ClientNotFound { name: name.clone() })?;

        Ok(())
    }

    /// Outbound route of a single client.
    pub fn route(&self, name: &ClientName) -> Result<Route, ClientNotFound> {
        self.clients
            .get(name)
            .map(|entry| Route {
                name: name.clone(),
                role: entry.role,
                outbound: entry.outbound.clone(),
            })
            .ok_or_else(|| ClientNotFound { name: name.clone() })
    }

    /// Outbound routes of every client accepted by `filter`, ordered by name.
    pub fn routes<F>(&self, filter: F) -> Vec<Route>
    where
        F: Fn(&ClientName, ClientRole) -> bool,
    {
        let mut routes: Vec<Route> = self
            .clients
            .iter()
            .filter(|entry| filter(entry.key(), entry.role))
            .map(|entry| Route {
                name: entry.key().clone(),
                role: entry.role,
                outbound: entry.outbound.clone(),
            })
            .collect();
        routes.sort_by(|a, b| a.name.cmp(&b.name));
        routes
    }

    /// Names and roles of every live client, ordered by name.
    pub fn clients(&self) -> Vec<(ClientName, ClientRole)> {
        self.routes(|_, _| true)
            .into_iter()
            .map(|route| (route.name, route.role))
            .collect()
    }

    /// Names of every live client with the given role, ordered by name.
    pub fn names_with_role(&self, role: ClientRole) -> Vec<ClientName> {
        self.routes(|_, r| r == role)
            .into_iter()
            .map(|route| route.name)
            .collect()
    }

    pub fn session_id(&self, name: &ClientName) -> Option<SessionId> {
        self.clients.get(name).map(|entry| entry.session_id.clone())
    }

    pub fn contains(&self, name: &ClientName) -> bool {
        self.clients.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Drop every entry, closing all outbound channels and evicting every connection.
    pub fn clear(&self) {
        self.clients.clear();
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self {
            clients: DashMap::default(),
        }
    }
}
