use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::StateMachine;
use crate::message::{DroneStatus, LogRecord};

/// Latest known status of every drone, as seen by the telemetry sink.
#[derive(Debug, Default)]
pub struct FleetMachine {
    latest: BTreeMap<String, DroneStatus>,
    changed: BTreeSet<String>,
    logs: VecDeque<LogRecord>,
}

impl FleetMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, component: &str) -> Option<&DroneStatus> {
        self.latest.get(component)
    }

    pub fn drones(&self) -> impl Iterator<Item = &DroneStatus> {
        self.latest.values()
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    fn update_status(&mut self, status: DroneStatus) {
        self.changed.insert(status.component.clone());
        self.latest.insert(status.component.clone(), status);
    }

    fn forget(&mut self, component: &str) {
        self.latest.remove(component);
        self.changed.remove(component);
    }

    fn poll_status(&mut self) -> Option<DroneStatus> {
        let component = self.changed.pop_first()?;
        self.latest.get(&component).cloned()
    }
}

pub enum FleetInput {
    Status(DroneStatus),
    Log(LogRecord),
    /// Drop a drone from the view, e.g. after it has been silent for too long.
    Forget(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FleetOutput {
    Log(LogRecord),
    StatusUpdate(DroneStatus),
}

impl StateMachine for FleetMachine {
    type Input = FleetInput;
    type Output = FleetOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            FleetInput::Status(status) => self.update_status(status),
            FleetInput::Log(record) => self.logs.push_back(record),
            FleetInput::Forget(component) => self.forget(&component),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        if let Some(record) = self.logs.pop_front() {
            return Some(FleetOutput::Log(record));
        }

        self.poll_status().map(FleetOutput::StatusUpdate)
    }
}
