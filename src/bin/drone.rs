use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use skymesh::config::{self, DRONE_ID, DRONE_START, DRONE_TICK_MS};
use skymesh::geo::Coordinate;
use skymesh::{AgentConfig, DroneAgent, RelayConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Default start area when `DRONE_START` is unset.
const HOME: Coordinate = Coordinate {
    longitude: -0.4,
    latitude: 39.4628,
    elevation: 0.0,
};

/// Spread of the random start offset around [`HOME`], in degrees.
const START_JITTER_DEG: f64 = 0.01;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let relay = RelayConfig::from_env()?;
    let id = config::env_opt(DRONE_ID).unwrap_or_else(|| Uuid::new_v4().to_string());
    let start = match config::env_opt(DRONE_START) {
        Some(value) => config::parse_coordinate(DRONE_START, &value)?,
        None => {
            let mut rng = rand::rng();
            Coordinate::new(
                HOME.longitude + rng.random_range(-START_JITTER_DEG..START_JITTER_DEG),
                HOME.latitude + rng.random_range(-START_JITTER_DEG..START_JITTER_DEG),
            )
        }
    };
    let tick_ms: u64 = config::env_or(DRONE_TICK_MS, 100)?;

    let agent = DroneAgent::new(
        AgentConfig::builder()
            .id(id.clone())
            .start(start)
            .tick(Duration::from_millis(tick_ms.max(1)))
            .build(),
    );

    info!(drone_id = %id, relay = %relay.address(), "Drone connecting to relay");

    let state = agent
        .run_until(relay.address(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!(
        drone_id = %state.id,
        longitude = state.position.longitude,
        latitude = state.position.latitude,
        autonomy = state.autonomy,
        "Drone landed"
    );
    Ok(())
}
