use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::{ClientName, ClientRole, drone_client_name};
use crate::message::{ALL_DRONES, DroneCommand, Message, ServerCommand, excerpt};
use crate::registry::{ClientRegistry, Route};

/// Component name the relay uses for records it originates.
pub const RELAY_COMPONENT: &str = "Relay";

pub const LIST_DRONES: &str = "list-drones";
pub const LIST_DRONES_ALIAS: &str = "drones";
pub const LIST_CLIENTS: &str = "list-clients";

const DRONES_REPLY: &str = "drones: ";
const EMPTY_LIST: &str = "none";

/// A decoded record waiting to be routed, with the exact bytes it arrived as.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub sender: ClientName,
    pub record: Bytes,
    pub message: Message,
}

/// Applies the routing policy to every inbound record.
///
/// The router never adds or removes registry entries; it only looks routes up.
#[derive(Debug)]
pub struct Router {
    registry: Arc<ClientRegistry>,
}

impl Router {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    /// Drain the inbound queue until every sender is gone.
    pub async fn run(self, mut inbound: mpsc::Receiver<Inbound>) {
        debug!("Router started");
        while let Some(message) = inbound.recv().await {
            self.route(message);
        }
        debug!("Inbound queue closed, router stopping");
    }

    /// Route one record. Returns how many recipients it was queued for.
    pub fn route(&self, inbound: Inbound) -> usize {
        let Inbound {
            sender,
            record,
            message,
        } = inbound;

        match message {
            Message::Log(_) | Message::Status(_) => {
                let sinks = self
                    .registry
                    .routes(|_, role| role == ClientRole::DataSystem);
                if sinks.is_empty() {
                    debug!(sender = %sender, kind = message.kind(), "No telemetry sink connected");
                }
                self.deliver(&sinks, &record)
            }

            Message::DroneCommand(command) => {
                let recipients = self.command_recipients(&command);
                if recipients.is_empty() {
                    debug!(
                        sender = %sender,
                        target = %command.target,
                        command = %command.command,
                        "No recipient for drone command"
                    );
                }
                self.deliver(&recipients, &record)
            }

            Message::ServerCommand(command) => {
                self.handle_server_command(&sender, &command);
                0
            }

            Message::Identify(_) => {
                debug!(sender = %sender, "Ignoring identification past the handshake");
                0
            }
        }
    }

    fn command_recipients(&self, command: &DroneCommand) -> Vec<Route> {
        if command.target == ALL_DRONES {
            self.registry.routes(|_, role| role == ClientRole::Drone)
        } else {
            // A bare drone id addresses the same client as its `Drone-<id>` name.
            let target = ClientName::from(command.target.as_str());
            self.registry
                .route(&target)
                .or_else(|_| self.registry.route(&drone_client_name(&command.target)))
                .map(|route| vec![route])
                .unwrap_or_default()
        }
    }

    /// Queue `record` for every route. A failed delivery is logged and does not stop the rest.
    fn deliver(&self, routes: &[Route], record: &Bytes) -> usize {
        routes
            .iter()
            .filter(|route| match route.deliver(record.clone()) {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        recipient = %route.name,
                        error = %e,
                        record = %excerpt(record),
                        "Dropped record"
                    );
                    false
                }
            })
            .count()
    }

    fn handle_server_command(&self, sender: &ClientName, command: &ServerCommand) {
        let reply = match command.command.as_str() {
            LIST_DRONES | LIST_DRONES_ALIAS => {
                let drones = self.registry.names_with_role(ClientRole::Drone);
                info!(sender = %sender, count = drones.len(), "Listing drones");
                format!("{DRONES_REPLY}{}", join(drones.iter().map(ClientName::as_str)))
            }
            LIST_CLIENTS => {
                let clients = self.registry.clients();
                info!(sender = %sender, count = clients.len(), "Listing clients");
                let entries: Vec<String> = clients
                    .iter()
                    .map(|(name, role)| format!("{name} ({role})"))
                    .collect();
                format!("clients: {}", join(entries.iter().map(String::as_str)))
            }
            other => {
                warn!(sender = %sender, command = %other, "Unknown server command");
                return;
            }
        };

        self.reply(sender, Message::log(RELAY_COMPONENT, reply));
    }

    fn reply(&self, recipient: &ClientName, message: Message) {
        let record = match message.encode() {
            Ok(record) => record,
            Err(e) => {
                warn!(recipient = %recipient, error = %e, "Failed to encode reply");
                return;
            }
        };

        match self.registry.route(recipient) {
            Ok(route) => {
                self.deliver(&[route], &record);
            }
            Err(e) => debug!(error = %e, "Reply recipient left"),
        }
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        EMPTY_LIST.to_string()
    } else {
        joined
    }
}

/// Drone names from the text of a `list-drones` reply, or `None` if `text` is not one.
pub fn parse_drone_list(text: &str) -> Option<Vec<&str>> {
    let names = text.strip_prefix(DRONES_REPLY)?;
    if names == EMPTY_LIST {
        return Some(Vec::new());
    }
    Some(names.split(", ").collect())
}
