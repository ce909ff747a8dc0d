use std::fmt::Display;
use std::sync::Arc;

/// Name prefix that marks a client as a drone agent for `dcmd` fan-out.
pub const DRONE_PREFIX: &str = "Drone";

/// Exact name reserved for the telemetry sink.
pub const DATA_SYSTEM: &str = "DataSystem";

/// The name a client declares in its identification handshake.
///
/// Names are unique among live connections on a relay; identifying twice with the same name
/// replaces the earlier connection.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClientName(Arc<str>);

impl ClientName {
    /// Create a new [`ClientName`] from any type that can be converted into an `Arc<str>`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the underlying string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the [`ClientRole`] from the naming convention.
    ///
    /// This is only meant to be called once, when the client is registered.
    pub fn role(&self) -> ClientRole {
        ClientRole::from_name(&self.0)
    }
}

impl Display for ClientName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ClientName {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&str> for ClientName {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl PartialEq<str> for ClientName {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

/// What a connected client is, as far as routing is concerned.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ClientRole {
    /// A drone agent, receives `dcmd` traffic.
    Drone,
    /// The telemetry sink, receives `log` and `dstat` traffic.
    DataSystem,
    /// Anything else, e.g. a control console.
    Other,
}

impl ClientRole {
    pub fn from_name(name: &str) -> Self {
        if name == DATA_SYSTEM {
            Self::DataSystem
        } else if name.starts_with(DRONE_PREFIX) {
            Self::Drone
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drone => "drone",
            Self::DataSystem => "data-system",
            Self::Other => "other",
        }
    }
}

impl Display for ClientRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client name a drone agent identifies with, given its fleet id.
pub fn drone_client_name(drone_id: &str) -> ClientName {
    if drone_id.starts_with(DRONE_PREFIX) {
        ClientName::from(drone_id)
    } else {
        ClientName::from(format!("{DRONE_PREFIX}-{drone_id}"))
    }
}
