pub mod agent;
pub mod client;
pub mod config;
pub mod geo;
pub mod link;
pub mod message;
pub mod registry;
pub mod relay;
pub mod state_machine;

pub use agent::{AgentConfig, AgentError, DroneAgent};
pub use client::{ClientName, ClientRole};
pub use link::{Link, LinkError};
pub use message::Message;
pub use relay::Relay;
pub use relay::config::RelayConfig;
