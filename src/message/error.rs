//! Error types for the wire codec.

/// A record could not be turned into a [`Message`](super::Message).
///
/// These are always recoverable: the reader logs them and moves on to the next record.
#[derive(Debug, thiserror::Error)]
pub enum MalformedMessage {
    /// The record is not valid JSON.
    #[error("record is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The record is JSON but not an object.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// The object has no string `type` field.
    #[error("record has no `type` discriminator")]
    MissingType,

    /// The `type` field names a variant this codec does not know.
    #[error("unknown message type `{0}`")]
    UnknownType(String),

    /// The `type` is known but the remaining fields do not match it.
    #[error("invalid fields for `{kind}` message: {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Indicates that a message could not be serialized.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode message")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// Errors produced while splitting a byte stream into records.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// More than `limit` bytes arrived without a record delimiter.
    #[error("record exceeds {limit} bytes")]
    RecordTooLong { limit: usize },

    /// The underlying stream failed.
    #[error("stream error")]
    Io(#[from] std::io::Error),
}
