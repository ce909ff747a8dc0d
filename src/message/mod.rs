//! Wire messages exchanged through the relay.
//!
//! Every message is a single JSON object carrying a `type` discriminator, written as one line of
//! text. The known discriminators are:
//!
//! | `type`  | Variant                          | Direction                               |
//! |---------|----------------------------------|-----------------------------------------|
//! | `cid`   | [`Message::Identify`]            | client -> relay, first record only      |
//! | `log`   | [`Message::Log`]                 | any -> relay -> telemetry sink          |
//! | `dstat` | [`Message::Status`]              | drone -> relay -> telemetry sink        |
//! | `dcmd`  | [`Message::DroneCommand`]        | control -> relay -> matching drone(s)   |
//! | `scmd`  | [`Message::ServerCommand`]       | control -> relay, handled by the relay  |
//!
//! Anything else fails to decode with [`MalformedMessage::UnknownType`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geo::{Coordinate, Orientation};

pub mod error;
pub mod framing;

pub use self::error::{EncodeError, FrameError, MalformedMessage};
pub use self::framing::{DEFAULT_MAX_RECORD_LEN, RecordReader, RecordWriter};

/// `dcmd` target that addresses every drone.
pub const ALL_DRONES: &str = "all";

const KNOWN_TYPES: [&str; 5] = ["cid", "log", "dstat", "dcmd", "scmd"];

const EXCERPT_LEN: usize = 96;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "cid")]
    Identify(Identify),
    #[serde(rename = "log")]
    Log(LogRecord),
    #[serde(rename = "dstat")]
    Status(DroneStatus),
    #[serde(rename = "dcmd")]
    DroneCommand(DroneCommand),
    #[serde(rename = "scmd")]
    ServerCommand(ServerCommand),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identify {
    pub component: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub component: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneStatus {
    pub component: String,
    pub location: Coordinate,
    pub orientation: Orientation,
    pub speed: f64,
    pub autonomy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroneCommand {
    /// A drone name, or [`ALL_DRONES`].
    pub target: String,
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub command: String,
}

impl Message {
    /// The `type` discriminator of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Identify(_) => "cid",
            Message::Log(_) => "log",
            Message::Status(_) => "dstat",
            Message::DroneCommand(_) => "dcmd",
            Message::ServerCommand(_) => "scmd",
        }
    }

    pub fn identify(component: impl Into<String>) -> Self {
        Message::Identify(Identify {
            component: component.into(),
        })
    }

    pub fn log(component: impl Into<String>, message: impl Into<String>) -> Self {
        Message::Log(LogRecord {
            component: component.into(),
            message: message.into(),
        })
    }

    pub fn drone_command(
        target: impl Into<String>,
        command: impl Into<String>,
        args: Value,
    ) -> Self {
        Message::DroneCommand(DroneCommand {
            target: target.into(),
            command: command.into(),
            args,
        })
    }

    pub fn server_command(command: impl Into<String>) -> Self {
        Message::ServerCommand(ServerCommand {
            command: command.into(),
        })
    }

    /// Serialize into a single newline-terminated record.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut buf = serde_json::to_vec(self)?;
        buf.push(b'\n');
        Ok(Bytes::from(buf))
    }

    /// Parse exactly one record. A trailing newline is tolerated.
    pub fn decode(record: &[u8]) -> Result<Message, MalformedMessage> {
        let value: Value = serde_json::from_slice(record).map_err(MalformedMessage::InvalidJson)?;

        let kind = match &value {
            Value::Object(fields) => match fields.get("type") {
                Some(Value::String(kind)) => kind.clone(),
                _ => return Err(MalformedMessage::MissingType),
            },
            _ => return Err(MalformedMessage::NotAnObject),
        };

        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(MalformedMessage::UnknownType(kind));
        }

        serde_json::from_value(value)
            .map_err(|source| MalformedMessage::InvalidFields { kind, source })
    }
}

impl DroneCommand {
    /// Whether this command is addressed to a drone known by `id` or by its client `name`.
    pub fn is_addressed_to(&self, id: &str, name: &str) -> bool {
        self.target == ALL_DRONES || self.target == id || self.target == name
    }
}

/// A short, printable prefix of a raw record for log lines.
pub fn excerpt(record: &[u8]) -> String {
    let text = String::from_utf8_lossy(record);
    let text = text.trim_end();
    match text.char_indices().nth(EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
