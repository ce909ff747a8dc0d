use std::collections::VecDeque;

use super::StateMachine;
use crate::geo::Coordinate;

/// Unit-square patrol pattern, as `(x, y)` fractions of the route extent.
const PATROL_PATTERN: [(f64, f64); 14] = [
    (0.0020161290322580627, 0.005952380952380959),
    (0.1754032258064516, 0.18722943722943727),
    (0.30645161290322576, 0.308982683982684),
    (0.4032258064516129, 0.400974025974026),
    (0.497983870967742, 0.4902597402597403),
    (0.5362903225806451, 0.7418831168831169),
    (0.3306451612903226, 0.9880952380952382),
    (0.04032258064516128, 0.833874458874459),
    (0.10887096774193547, 0.5064935064935066),
    (0.33669354838709675, 0.42261904761904767),
    (0.5, 0.49837662337662336),
    (0.6935483870967742, 0.6931818181818182),
    (0.8205645161290323, 0.833874458874459),
    (0.9919354838709676, 0.9935064935064936),
];

/// Side of the patrol square, in degrees.
pub const PATROL_EXTENT_DEG: f64 = 0.005;

/// The default route a drone flies when it is not given explicit waypoints.
pub fn patrol_route(start: Coordinate) -> Vec<Coordinate> {
    PATROL_PATTERN
        .iter()
        .map(|(x, y)| {
            Coordinate::new(
                start.longitude + x * PATROL_EXTENT_DEG,
                start.latitude + y * PATROL_EXTENT_DEG,
            )
        })
        .collect()
}

/// FIFO of waypoints still to be flown.
#[derive(Debug, Clone, Default)]
pub struct RouteMachine {
    waypoints: VecDeque<Coordinate>,
}

impl RouteMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_waypoints(waypoints: impl IntoIterator<Item = Coordinate>) -> Self {
        Self {
            waypoints: waypoints.into_iter().collect(),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    fn append(&mut self, waypoint: Coordinate) {
        self.waypoints.push_back(waypoint);
    }

    fn clear(&mut self) {
        self.waypoints.clear();
    }

    fn next_waypoint(&mut self) -> Option<Coordinate> {
        self.waypoints.pop_front()
    }
}

pub enum RouteInput {
    Append(Coordinate),
    Clear,
}

pub enum RouteOutput {
    Waypoint(Coordinate),
}

impl StateMachine for RouteMachine {
    type Input = RouteInput;
    type Output = RouteOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            RouteInput::Append(waypoint) => self.append(waypoint),
            RouteInput::Clear => self.clear(),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        self.next_waypoint().map(RouteOutput::Waypoint)
    }
}
