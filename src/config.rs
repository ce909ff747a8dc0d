//! Startup configuration read from the environment.
//!
//! Every binary reads its settings from `RELAY_*` / `DRONE_*` variables. Anything unparsable is a
//! [`ConfigurationError`], which is fatal: nothing is bound or connected until configuration is
//! valid.

use std::str::FromStr;

use crate::geo::Coordinate;

pub const RELAY_HOST: &str = "RELAY_HOST";
pub const RELAY_PORT: &str = "RELAY_PORT";
pub const DRONE_ID: &str = "DRONE_ID";
pub const DRONE_START: &str = "DRONE_START";
pub const DRONE_TICK_MS: &str = "DRONE_TICK_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("invalid value for {key}: `{value}` ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid host `{0}`")]
    InvalidHost(String),

    #[error("{name} must be greater than zero")]
    ZeroLimit { name: &'static str },
}

/// Read `key` from the environment, falling back to `default` when it is unset or empty.
pub fn env_or<T>(key: &'static str, default: T) -> Result<T, ConfigurationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => parse_value(key, &value),
        _ => Ok(default),
    }
}

/// Read `key` from the environment if it is set.
pub fn env_opt(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigurationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigurationError::InvalidValue {
            key,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a `"lon,lat"` pair.
pub fn parse_coordinate(key: &'static str, value: &str) -> Result<Coordinate, ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let (lon, lat) = value.split_once(',').ok_or_else(|| invalid("expected `lon,lat`"))?;
    let lon: f64 = lon.trim().parse().map_err(|_| invalid("longitude is not a number"))?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid("latitude is not a number"))?;

    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(invalid("coordinate out of range"));
    }

    Ok(Coordinate::new(lon, lat))
}

/// Hosts are either an IP literal or a plain DNS name.
pub fn validate_host(host: &str) -> Result<(), ConfigurationError> {
    let valid = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'));

    if valid {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidHost(host.to_string()))
    }
}
