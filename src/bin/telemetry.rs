use std::time::Duration;

use anyhow::Result;
use skymesh::client::DATA_SYSTEM;
use skymesh::relay::router::{LIST_DRONES, RELAY_COMPONENT, parse_drone_list};
use skymesh::state_machine::StateMachine;
use skymesh::state_machine::fleet::{FleetInput, FleetMachine, FleetOutput};
use skymesh::{Link, Message, RelayConfig};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// How often the relay is asked which drones are still connected.
const ROSTER_PERIOD: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let relay = RelayConfig::from_env()?;
    let mut link = Link::connect(relay.address(), DATA_SYSTEM).await?;
    info!(relay = %relay.address(), "Telemetry sink connected");

    let mut fleet = FleetMachine::new();
    let mut roster = tokio::time::interval(ROSTER_PERIOD);

    loop {
        let inputs = tokio::select! {
            message = link.next_message() => match message? {
                Some((_, Ok(Message::Status(status)))) => vec![FleetInput::Status(status)],
                Some((_, Ok(Message::Log(log)))) if log.component == RELAY_COMPONENT => {
                    let forgotten = parse_drone_list(&log.message).map(|live| departed(&fleet, &live));
                    forgotten.unwrap_or_else(|| vec![FleetInput::Log(log)])
                }
                Some((_, Ok(Message::Log(log)))) => vec![FleetInput::Log(log)],
                Some((_, Ok(other))) => {
                    warn!(kind = other.kind(), "Unexpected message");
                    continue;
                }
                Some((_, Err(e))) => {
                    warn!(error = %e, "Malformed message");
                    continue;
                }
                None => {
                    info!("Relay closed the connection");
                    break;
                }
            },
            _ = roster.tick() => {
                link.send(&Message::server_command(LIST_DRONES)).await?;
                continue;
            }
            _ = tokio::signal::ctrl_c() => break,
        };

        for input in inputs {
            fleet.process_input(input);
        }
        while let Some(output) = fleet.poll_output() {
            match output {
                FleetOutput::Log(log) => println!("[{}] {}", log.component, log.message),
                FleetOutput::StatusUpdate(status) => println!(
                    "{:<12} lon={:>11.6} lat={:>10.6} speed={:>5.2} m/s yaw={:>6.1} autonomy={:>5.1}%",
                    status.component,
                    status.location.longitude,
                    status.location.latitude,
                    status.speed,
                    status.orientation.yaw,
                    status.autonomy,
                ),
            }
        }
    }

    info!(drones = fleet.len(), "Telemetry sink stopped");
    Ok(())
}

/// Drop every drone the relay no longer lists.
fn departed(fleet: &FleetMachine, live: &[&str]) -> Vec<FleetInput> {
    fleet
        .drones()
        .filter(|status| !live.contains(&status.component.as_str()))
        .map(|status| {
            debug!(drone = %status.component, "Drone left the relay");
            FleetInput::Forget(status.component.clone())
        })
        .collect()
}
