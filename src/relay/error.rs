use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::message::MalformedMessage;

/// Errors that stop the relay as a whole. Only startup can produce these.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The listening socket could not be opened.
    #[error("failed to bind relay on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// A connection broke the protocol and is being closed. Other connections are unaffected.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    /// The first record decoded fine but was not a `cid`.
    #[error("first record must be `cid`, got `{0}`")]
    NotIdentified(&'static str),

    /// The first record could not be decoded at all.
    #[error("first record is malformed")]
    MalformedHandshake(#[source] MalformedMessage),

    #[error("client name is empty")]
    EmptyName,

    #[error("no identification within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("record exceeds {limit} bytes")]
    RecordTooLong { limit: usize },
}

/// Why a connection task ended.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    /// The socket failed while reading or writing.
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] std::io::Error),
}
