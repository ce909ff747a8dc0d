//! Async runner for one simulated drone.
//!
//! [`DroneAgent`] owns the relay connection and a [`FlightMachine`]. It feeds the machine a
//! [`FlightInput::Tick`] on every interval tick and a [`FlightInput::Order`] for every `dcmd`
//! addressed to it, and turns the machine's outputs into `dstat` and `log` records.

use std::future::Future;
use std::time::Duration;

use bon::Builder;
use tokio::net::ToSocketAddrs;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::geo::Coordinate;
use crate::link::Link;
use crate::message::{DroneCommand, Message, excerpt};
use crate::state_machine::StateMachine;
use crate::state_machine::flight::{
    DroneState, FlightConfig, FlightInput, FlightMachine, FlightOrder, FlightOutput,
};
use crate::state_machine::route::patrol_route;

pub use self::error::AgentError;

pub mod error;

pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Builder)]
pub struct AgentConfig {
    /// Drone id. The agent identifies as `Drone-<id>`.
    #[builder(into)]
    pub id: String,

    pub start: Coordinate,

    /// Simulation step, also the period between status records.
    #[builder(default = DEFAULT_TICK)]
    pub tick: Duration,

    #[builder(default)]
    pub flight: FlightConfig,

    /// Waypoints to fly once connected. Defaults to the patrol loop around `start`.
    pub route: Option<Vec<Coordinate>>,
}

#[derive(Debug)]
pub struct DroneAgent {
    machine: FlightMachine,
    tick: Duration,
}

impl DroneAgent {
    pub fn new(config: AgentConfig) -> Self {
        let route = config
            .route
            .unwrap_or_else(|| patrol_route(config.start));
        let machine = FlightMachine::new(config.id, config.start, config.flight).with_route(route);
        Self {
            machine,
            tick: config.tick,
        }
    }

    pub fn machine(&self) -> &FlightMachine {
        &self.machine
    }

    /// Fly until the connection to the relay ends.
    pub async fn run(self, addr: impl ToSocketAddrs) -> Result<DroneState, AgentError> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Fly until `shutdown` resolves, returning the final state.
    pub async fn run_until<F>(
        mut self,
        addr: impl ToSocketAddrs,
        shutdown: F,
    ) -> Result<DroneState, AgentError>
    where
        F: Future<Output = ()>,
    {
        let mut link = Link::connect(addr, self.machine.component())
            .await
            .map_err(AgentError::Connect)?;
        info!(
            drone = %link.name(),
            position = ?self.machine.state().position,
            waypoints = self.machine.route().pending_count(),
            "Drone is online"
        );

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(drone = %link.name(), "Drone shutting down");
                    break;
                }

                _ = ticker.tick() => {
                    self.machine.process_input(FlightInput::Tick(self.tick));
                    self.flush(&mut link).await?;
                }

                message = link.next_message() => {
                    match message.map_err(AgentError::ConnectionLost)? {
                        Some((_, Ok(Message::DroneCommand(command)))) => {
                            self.handle_command(command, &mut link).await?;
                        }
                        Some((_, Ok(other))) => {
                            debug!(drone = %link.name(), kind = other.kind(), "Ignoring message");
                        }
                        Some((record, Err(e))) => {
                            warn!(drone = %link.name(), error = %e, record = %excerpt(&record), "Malformed message");
                        }
                        None => {
                            warn!(drone = %link.name(), "Relay closed the connection");
                            return Err(AgentError::RelayClosed);
                        }
                    }
                }
            }
        }

        Ok(self.machine.state().clone())
    }

    async fn handle_command(
        &mut self,
        command: DroneCommand,
        link: &mut Link,
    ) -> Result<(), AgentError> {
        let state = self.machine.state();
        if !command.is_addressed_to(&state.id, self.machine.component()) {
            debug!(drone = %link.name(), target = %command.target, "Command not addressed to this drone");
            return Ok(());
        }

        let reply = match FlightOrder::from_command(&command) {
            Ok(order) => {
                info!(drone = %link.name(), order = ?order, "Received command");
                self.machine.process_input(FlightInput::Order(order));
                format!("Received: {} {}", command.command, command.args)
            }
            Err(e) => {
                warn!(drone = %link.name(), error = %e, "Rejected command");
                format!("Rejected: {e}")
            }
        };

        let ack = Message::log(self.machine.component(), reply);
        link.send(&ack).await.map_err(AgentError::ConnectionLost)
    }

    /// Send everything the machine produced since the last flush.
    async fn flush(&mut self, link: &mut Link) -> Result<(), AgentError> {
        while let Some(output) = self.machine.poll_output() {
            let message = match output {
                FlightOutput::Status(status) => Message::Status(status),
                FlightOutput::Arrived(at) => {
                    debug!(drone = %link.name(), longitude = at.longitude, latitude = at.latitude, "Waypoint reached");
                    Message::log(
                        self.machine.component(),
                        format!("Reached ({}, {})", at.longitude, at.latitude),
                    )
                }
            };
            link.send(&message)
                .await
                .map_err(AgentError::ConnectionLost)?;
        }
        Ok(())
    }
}
