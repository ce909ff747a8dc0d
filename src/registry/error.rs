//! Error types for client registry lookups and deliveries.

use crate::client::ClientName;

/// Indicates that an operation on a client failed because no live entry matches.
#[derive(Debug, thiserror::Error)]
#[error("no live client named {name}")]
pub struct ClientNotFound {
    pub name: ClientName,
}

/// Indicates that a record could not be queued for a client.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error(transparent)]
    NotFound(#[from] ClientNotFound),

    /// The client's writer is gone, usually because the connection is closing.
    #[error("outbound channel of {name} is closed")]
    Closed { name: ClientName },

    /// The client is not draining its outbound queue fast enough.
    #[error("outbound channel of {name} is full")]
    Full { name: ClientName },
}
