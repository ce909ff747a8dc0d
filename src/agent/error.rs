use crate::link::LinkError;

/// Why a drone agent stopped before its shutdown signal.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("could not reach the relay")]
    Connect(#[source] LinkError),

    /// Reading from or writing to the relay failed.
    #[error("connection to the relay lost")]
    ConnectionLost(#[source] LinkError),

    #[error("relay closed the connection")]
    RelayClosed,
}
