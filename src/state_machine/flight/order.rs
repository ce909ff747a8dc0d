use serde_json::Value;

use super::error::InvalidOrder;
use crate::geo::Coordinate;
use crate::message::DroneCommand;

pub const MOVE_TO: &str = "moveto";
pub const SET_SPEED: &str = "speed";
pub const ORIENT: &str = "orient";
pub const HOLD: &str = "hold";

/// A typed drone command, parsed from the `command`/`args` pair of a `dcmd` record.
#[derive(Debug, Clone, PartialEq)]
pub enum FlightOrder {
    /// Fly straight to the coordinate, dropping the rest of the route.
    MoveTo(Coordinate),
    /// New cruise speed in m/s.
    SetSpeed(f64),
    /// New target attitude. Axes left out keep their current target.
    Orient {
        roll: Option<f64>,
        pitch: Option<f64>,
        yaw: Option<f64>,
    },
    /// Drop the target and the route, and come to a stop.
    Hold,
}

impl FlightOrder {
    pub fn from_command(command: &DroneCommand) -> Result<Self, InvalidOrder> {
        let name = command.command.as_str();
        match name {
            MOVE_TO => parse_coordinate(name, &command.args).map(FlightOrder::MoveTo),
            SET_SPEED => match command.args.as_f64() {
                Some(speed) if speed.is_finite() => Ok(FlightOrder::SetSpeed(speed.max(0.0))),
                _ => Err(InvalidOrder::args(name, "expected a finite number")),
            },
            ORIENT => parse_orientation(name, &command.args),
            HOLD => Ok(FlightOrder::Hold),
            other => Err(InvalidOrder::UnknownCommand(other.to_string())),
        }
    }
}

/// Accepts `[lon, lat]`, `[lon, lat, elevation]` or `{"x": lon, "y": lat, "z"?: elevation}`.
fn parse_coordinate(command: &str, args: &Value) -> Result<Coordinate, InvalidOrder> {
    let coordinate = match args {
        Value::Array(items) => {
            let numbers = items
                .iter()
                .map(Value::as_f64)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| InvalidOrder::args(command, "coordinates must be numbers"))?;
            match numbers.as_slice() {
                [lon, lat] => Coordinate::new(*lon, *lat),
                [lon, lat, elevation] => Coordinate::new(*lon, *lat).with_elevation(*elevation),
                _ => {
                    return Err(InvalidOrder::args(
                        command,
                        format!("expected 2 or 3 coordinates, got {}", numbers.len()),
                    ));
                }
            }
        }
        Value::Object(_) => serde_json::from_value::<Coordinate>(args.clone())
            .map_err(|e| InvalidOrder::args(command, e.to_string()))?,
        _ => return Err(InvalidOrder::args(command, "expected [lon, lat] or {x, y}")),
    };

    let finite = [coordinate.longitude, coordinate.latitude, coordinate.elevation]
        .iter()
        .all(|v| v.is_finite());
    let in_range = coordinate.longitude.abs() <= 180.0 && coordinate.latitude.abs() <= 90.0;
    if !finite || !in_range {
        return Err(InvalidOrder::args(command, "coordinate out of range"));
    }

    Ok(coordinate)
}

fn parse_orientation(command: &str, args: &Value) -> Result<FlightOrder, InvalidOrder> {
    let Value::Object(fields) = args else {
        return Err(InvalidOrder::args(command, "expected {roll?, pitch?, yaw?}"));
    };

    let axis = |key: &str| -> Result<Option<f64>, InvalidOrder> {
        match fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| InvalidOrder::args(command, format!("`{key}` must be a number"))),
        }
    };

    Ok(FlightOrder::Orient {
        roll: axis("roll")?,
        pitch: axis("pitch")?,
        yaw: axis("yaw")?,
    })
}
