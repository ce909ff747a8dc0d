/// Indicates that a `dcmd` could not be turned into a [`FlightOrder`](super::FlightOrder).
#[derive(Debug, thiserror::Error)]
pub enum InvalidOrder {
    #[error("unsupported drone command `{0}`")]
    UnknownCommand(String),

    #[error("invalid arguments for `{command}`: {reason}")]
    InvalidArgs { command: String, reason: String },
}

impl InvalidOrder {
    pub(super) fn args(command: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgs {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}
