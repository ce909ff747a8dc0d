//! Per-drone navigation and kinematics.
//!
//! [`FlightMachine`] owns a single drone's [`DroneState`] and its waypoint route. It is advanced
//! one fixed step at a time by [`FlightInput::Tick`] and steered by [`FlightInput::Order`]; the
//! runner in [`crate::agent`] supplies both.

use std::collections::VecDeque;
use std::time::Duration;

use bon::Builder;

use super::StateMachine;
use super::route::{RouteInput, RouteMachine, RouteOutput};
use crate::client::drone_client_name;
use crate::geo::{Coordinate, Orientation, advance_toward, great_circle_distance_m, rate_limited_step};
use crate::message::DroneStatus;

pub mod error;
pub mod order;

pub use self::error::InvalidOrder;
pub use self::order::FlightOrder;

/// Full autonomy, in percent.
pub const FULL_AUTONOMY: f64 = 100.0;

/// Kinematic limits of a simulated drone.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct FlightConfig {
    /// Speed the drone ramps up to while it has a target, in m/s.
    #[builder(default = 15.0)]
    pub cruise_speed_mps: f64,

    /// Maximum change of speed, in m/s².
    #[builder(default = 7.5)]
    pub acceleration_mps2: f64,

    /// Maximum change of each orientation axis, in degrees per second.
    #[builder(default = 180.0)]
    pub angular_rate_dps: f64,

    /// Distance under which a target counts as reached, in metres.
    #[builder(default = 10.0)]
    pub arrival_threshold_m: f64,

    /// Autonomy lost per second, moving or not.
    #[builder(default = 0.05)]
    pub drain_per_second: f64,

    /// Autonomy lost per metre travelled.
    #[builder(default = 0.002)]
    pub drain_per_meter: f64,
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Everything that describes where a drone is and what it is doing right now.
#[derive(Debug, Clone, PartialEq)]
pub struct DroneState {
    pub id: String,
    pub position: Coordinate,
    pub orientation: Orientation,
    pub speed: f64,
    pub autonomy: f64,
    pub target: Option<Coordinate>,
}

pub enum FlightInput {
    /// Advance the simulation by the given step.
    Tick(Duration),
    Order(FlightOrder),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlightOutput {
    /// Emitted once per tick, after the state has been advanced.
    Status(DroneStatus),
    /// The drone reached a target and was snapped onto it.
    Arrived(Coordinate),
}

#[derive(Debug)]
pub struct FlightMachine {
    component: String,
    state: DroneState,
    route: RouteMachine,
    config: FlightConfig,
    target_speed: f64,
    target_orientation: Orientation,
    pending: VecDeque<FlightOutput>,
}

impl FlightMachine {
    /// A drone at rest at `start`, with full autonomy and an empty route.
    pub fn new(id: impl Into<String>, start: Coordinate, config: FlightConfig) -> Self {
        let id = id.into();
        Self {
            component: drone_client_name(&id).to_string(),
            state: DroneState {
                id,
                position: start,
                orientation: Orientation::default(),
                speed: 0.0,
                autonomy: FULL_AUTONOMY,
                target: None,
            },
            route: RouteMachine::new(),
            target_speed: config.cruise_speed_mps,
            target_orientation: Orientation::default(),
            config,
            pending: VecDeque::new(),
        }
    }

    /// Seed the route. The first waypoint becomes the target on the next tick.
    pub fn with_route(mut self, waypoints: impl IntoIterator<Item = Coordinate>) -> Self {
        for waypoint in waypoints {
            self.route.process_input(RouteInput::Append(waypoint));
        }
        self
    }

    pub fn state(&self) -> &DroneState {
        &self.state
    }

    pub fn route(&self) -> &RouteMachine {
        &self.route
    }

    /// Name the drone identifies with on the relay.
    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn status(&self) -> DroneStatus {
        DroneStatus {
            component: self.component.clone(),
            location: self.state.position,
            orientation: self.state.orientation,
            speed: self.state.speed,
            autonomy: self.state.autonomy,
        }
    }

    fn tick(&mut self, dt: Duration) {
        let dt = dt.as_secs_f64();
        self.resolve_target();

        self.state.orientation = self
            .state
            .orientation
            .step_toward(self.target_orientation, self.config.angular_rate_dps * dt);

        let mut travelled = 0.0;
        match self.state.target {
            Some(target)
                if great_circle_distance_m(self.state.position, target)
                    < self.config.arrival_threshold_m =>
            {
                travelled = great_circle_distance_m(self.state.position, target);
                self.state.position = target;
                self.state.target = None;
                self.pending.push_back(FlightOutput::Arrived(target));
                self.resolve_target();
            }
            Some(target) => {
                self.ramp_speed(self.commanded_speed(), dt);
                let next = advance_toward(self.state.position, target, self.state.speed * dt);
                travelled = great_circle_distance_m(self.state.position, next);
                self.state.position = next;
            }
            None => self.ramp_speed(0.0, dt),
        }

        self.drain(dt, travelled);
        self.pending.push_back(FlightOutput::Status(self.status()));
    }

    fn apply(&mut self, order: FlightOrder) {
        match order {
            FlightOrder::MoveTo(target) => {
                self.route.process_input(RouteInput::Clear);
                self.state.target = Some(target);
            }
            FlightOrder::SetSpeed(speed) => self.target_speed = speed,
            FlightOrder::Orient { roll, pitch, yaw } => {
                let current = self.target_orientation;
                self.target_orientation = Orientation {
                    roll: roll.unwrap_or(current.roll),
                    pitch: pitch.unwrap_or(current.pitch),
                    yaw: yaw.unwrap_or(current.yaw),
                };
            }
            FlightOrder::Hold => {
                self.route.process_input(RouteInput::Clear);
                self.state.target = None;
            }
        }
    }

    /// Keeps "no target while waypoints remain" from outliving the current tick.
    fn resolve_target(&mut self) {
        if self.state.target.is_none() {
            if let Some(RouteOutput::Waypoint(next)) = self.route.poll_output() {
                self.state.target = Some(next);
            }
        }
    }

    fn commanded_speed(&self) -> f64 {
        if self.state.autonomy <= 0.0 {
            0.0
        } else {
            self.target_speed
        }
    }

    fn ramp_speed(&mut self, target: f64, dt: f64) {
        let speed = rate_limited_step(self.state.speed, target, self.config.acceleration_mps2 * dt);
        self.state.speed = speed.max(0.0);
    }

    fn drain(&mut self, dt: f64, travelled_m: f64) {
        let used = self.config.drain_per_second * dt + self.config.drain_per_meter * travelled_m;
        self.state.autonomy = (self.state.autonomy - used).clamp(0.0, FULL_AUTONOMY);
    }
}

impl StateMachine for FlightMachine {
    type Input = FlightInput;
    type Output = FlightOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            FlightInput::Tick(dt) => self.tick(dt),
            FlightInput::Order(order) => self.apply(order),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(100);

    fn start() -> Coordinate {
        Coordinate::new(-0.4, 39.4628)
    }

    /// Roughly 170 m north-east of [`start`].
    fn w1() -> Coordinate {
        Coordinate::new(-0.399, 39.4639)
    }

    /// Roughly 170 m north-east of [`w1`].
    fn w2() -> Coordinate {
        Coordinate::new(-0.398, 39.4650)
    }

    fn tick(machine: &mut FlightMachine) -> Vec<FlightOutput> {
        machine.process_input(FlightInput::Tick(TICK));
        std::iter::from_fn(|| machine.poll_output()).collect()
    }

    fn arrivals(outputs: &[FlightOutput]) -> Vec<Coordinate> {
        outputs
            .iter()
            .filter_map(|o| match o {
                FlightOutput::Arrived(c) => Some(*c),
                FlightOutput::Status(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let machine = FlightMachine::new("1", start(), FlightConfig::default());
        let state = machine.state();

        assert_eq!(state.id, "1");
        assert_eq!(machine.component(), "Drone-1");
        assert_eq!(state.position, start());
        assert_eq!(state.speed, 0.0);
        assert_eq!(state.autonomy, FULL_AUTONOMY);
        assert!(state.target.is_none());
    }

    #[test]
    fn test_every_tick_emits_status() {
        let mut machine = FlightMachine::new("1", start(), FlightConfig::default());

        let outputs = tick(&mut machine);
        assert_eq!(outputs.len(), 1);
        assert!(matches!(&outputs[0], FlightOutput::Status(s) if s.component == "Drone-1"));
    }

    #[test]
    fn test_first_tick_pops_waypoint() {
        let mut machine =
            FlightMachine::new("1", start(), FlightConfig::default()).with_route([w1(), w2()]);
        assert!(machine.state().target.is_none());

        tick(&mut machine);
        assert_eq!(machine.state().target, Some(w1()));
        assert_eq!(machine.route().pending_count(), 1);
    }

    #[test]
    fn test_converges_through_waypoints() {
        let mut machine =
            FlightMachine::new("1", start(), FlightConfig::default()).with_route([w1(), w2()]);

        let mut reached = Vec::new();
        for _ in 0..2_000 {
            let outputs = tick(&mut machine);
            reached.extend(arrivals(&outputs));

            // The target may only be empty once the route is exhausted.
            if machine.state().target.is_none() {
                assert!(machine.route().is_empty());
            }
            if reached.len() == 2 {
                break;
            }
        }

        assert_eq!(reached, vec![w1(), w2()]);
        assert_eq!(machine.state().position, w2());
        assert!(machine.state().target.is_none());

        // Holds position afterwards and comes to a stop.
        for _ in 0..100 {
            tick(&mut machine);
        }
        assert_eq!(machine.state().position, w2());
        assert_eq!(machine.state().speed, 0.0);
    }

    #[test]
    fn test_speed_is_rate_limited() {
        let config = FlightConfig::default();
        let mut machine = FlightMachine::new("1", start(), config.clone()).with_route([w2()]);

        let max_delta = config.acceleration_mps2 * TICK.as_secs_f64();
        let mut previous = machine.state().speed;
        for _ in 0..40 {
            tick(&mut machine);
            let speed = machine.state().speed;
            assert!(speed - previous <= max_delta + 1e-9);
            assert!(speed <= config.cruise_speed_mps);
            previous = speed;
        }
        assert_eq!(previous, config.cruise_speed_mps);
    }

    #[test]
    fn test_moveto_discards_route() {
        let mut machine =
            FlightMachine::new("1", start(), FlightConfig::default()).with_route([w1(), w2()]);
        tick(&mut machine);

        let detour = Coordinate::new(-0.401, 39.4620);
        machine.process_input(FlightInput::Order(FlightOrder::MoveTo(detour)));

        assert_eq!(machine.state().target, Some(detour));
        assert!(machine.route().is_empty());

        let mut reached = Vec::new();
        for _ in 0..2_000 {
            reached.extend(arrivals(&tick(&mut machine)));
        }
        assert_eq!(reached, vec![detour]);
    }

    #[test]
    fn test_hold_stops_the_drone() {
        let mut machine =
            FlightMachine::new("1", start(), FlightConfig::default()).with_route([w1(), w2()]);
        for _ in 0..30 {
            tick(&mut machine);
        }
        assert!(machine.state().speed > 0.0);

        machine.process_input(FlightInput::Order(FlightOrder::Hold));
        for _ in 0..30 {
            tick(&mut machine);
        }
        let parked = machine.state().position;
        tick(&mut machine);

        assert!(machine.state().target.is_none());
        assert_eq!(machine.state().speed, 0.0);
        assert_eq!(machine.state().position, parked);
    }

    #[test]
    fn test_orientation_ramps_toward_order() {
        let mut machine = FlightMachine::new("1", start(), FlightConfig::default());
        machine.process_input(FlightInput::Order(FlightOrder::Orient {
            roll: None,
            pitch: Some(-10.0),
            yaw: Some(90.0),
        }));

        // 180 deg/s over 0.1 s is 18 degrees per tick.
        tick(&mut machine);
        assert_eq!(machine.state().orientation, Orientation::new(0.0, -10.0, 18.0));

        for _ in 0..4 {
            tick(&mut machine);
        }
        assert_eq!(machine.state().orientation, Orientation::new(0.0, -10.0, 90.0));
    }

    #[test]
    fn test_set_speed_changes_cruise() {
        let mut machine = FlightMachine::new("1", start(), FlightConfig::default()).with_route([w2()]);
        machine.process_input(FlightInput::Order(FlightOrder::SetSpeed(3.0)));

        for _ in 0..20 {
            tick(&mut machine);
        }
        assert_eq!(machine.state().speed, 3.0);
    }

    #[test]
    fn test_autonomy_is_non_increasing() {
        let mut machine =
            FlightMachine::new("1", start(), FlightConfig::default()).with_route([w1(), w2()]);

        let mut previous = machine.state().autonomy;
        for _ in 0..500 {
            tick(&mut machine);
            let autonomy = machine.state().autonomy;
            assert!(autonomy <= previous);
            assert!((0.0..=FULL_AUTONOMY).contains(&autonomy));
            previous = autonomy;
        }
        assert!(previous < FULL_AUTONOMY);
    }

    #[test]
    fn test_depleted_drone_stops() {
        let config = FlightConfig::builder().drain_per_second(50.0).build();
        let mut machine = FlightMachine::new("1", start(), config).with_route([w2()]);

        for _ in 0..100 {
            tick(&mut machine);
        }
        let stranded = machine.state().position;
        tick(&mut machine);

        assert_eq!(machine.state().autonomy, 0.0);
        assert_eq!(machine.state().speed, 0.0);
        assert_eq!(machine.state().position, stranded);
        assert_eq!(machine.state().target, Some(w2()));
    }
}
