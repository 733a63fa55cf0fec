//! In-memory simulation engine.
//!
//! A scripted engine with native fixed-time signal timers and directly
//! settable lane occupancy and pedestrian state. It is intended for tests,
//! benchmarks and as a reference implementation of [`SimulationEngine`].
//!
//! Native timers: a light reports `time_until_switch < 1` on the last tick
//! of its phase; if nobody commits a phase at that point, the light moves
//! to its program successor on the next [`SimulationEngine::advance`].

use std::collections::{BTreeMap, BTreeSet};

use crate::engine::{SignalLink, SimulationEngine, UserClass};
use crate::error::EngineError;
use crate::program::PhaseProgram;

#[derive(Debug, Clone)]
struct LightState {
    program: PhaseProgram,
    links: Vec<SignalLink>,
    phase: usize,
    remaining: f64,
}

impl LightState {
    fn enter(&mut self, phase: usize) {
        self.phase = phase;
        self.remaining = self.program.phase(phase).map_or(0.0, |p| p.duration);
    }
}

#[derive(Debug, Clone)]
struct PersonState {
    edge: String,
    waiting: f64,
    next_edge: Option<String>,
}

fn lane_edge(lane: &str) -> &str {
    lane.rsplit_once('_').map_or(lane, |(edge, _)| edge)
}

/// Scripted single-threaded engine.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    time: f64,
    lights: BTreeMap<String, LightState>,
    lanes: BTreeMap<String, BTreeMap<UserClass, u32>>,
    edges: BTreeSet<String>,
    persons: BTreeMap<String, PersonState>,
    expected: Option<usize>,
    commits: Vec<(String, usize)>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a traffic light starting in phase 0.
    ///
    /// Every lane named by `links` is registered, together with its edge.
    #[must_use]
    pub fn with_traffic_light(
        mut self,
        id: impl Into<String>,
        program: PhaseProgram,
        links: Vec<SignalLink>,
    ) -> Self {
        for link in &links {
            self.register_lane(&link.incoming);
            self.register_lane(&link.outgoing);
        }
        let mut light = LightState {
            program,
            links,
            phase: 0,
            remaining: 0.0,
        };
        light.enter(0);
        self.lights.insert(id.into(), light);
        self
    }

    /// Registers a lane (and its edge) that no traffic light controls.
    #[must_use]
    pub fn with_lane(mut self, lane: &str) -> Self {
        self.register_lane(lane);
        self
    }

    /// Registers an edge without lanes, e.g. a walking area.
    #[must_use]
    pub fn with_edge(mut self, edge: impl Into<String>) -> Self {
        self.edges.insert(edge.into());
        self
    }

    fn register_lane(&mut self, lane: &str) {
        self.lanes.entry(lane.to_string()).or_default();
        self.edges.insert(lane_edge(lane).to_string());
    }

    /// Sets the number of `class` agents on `lane`.
    pub fn set_lane_count(&mut self, lane: &str, class: UserClass, count: u32) -> Result<(), EngineError> {
        let counts = self
            .lanes
            .get_mut(lane)
            .ok_or_else(|| EngineError::UnknownLane(lane.to_string()))?;
        counts.insert(class, count);
        Ok(())
    }

    /// Places a person on `edge`.
    pub fn add_person(
        &mut self,
        id: impl Into<String>,
        edge: &str,
        waiting: f64,
        next_edge: Option<&str>,
    ) -> Result<(), EngineError> {
        if !self.edges.contains(edge) {
            return Err(EngineError::UnknownEdge(edge.to_string()));
        }
        self.persons.insert(
            id.into(),
            PersonState {
                edge: edge.to_string(),
                waiting,
                next_edge: next_edge.map(str::to_string),
            },
        );
        Ok(())
    }

    /// Removes a person from the simulation.
    pub fn remove_person(&mut self, id: &str) -> Result<(), EngineError> {
        self.persons
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::UnknownPerson(id.to_string()))
    }

    /// Overrides the number of expected agents reported to the driver.
    pub fn set_expected_agents(&mut self, expected: usize) {
        self.expected = Some(expected);
    }

    /// Current phase of a traffic light.
    #[must_use]
    pub fn current_phase(&self, tls: &str) -> Option<usize> {
        self.lights.get(tls).map(|l| l.phase)
    }

    /// Every `set_phase` call received, in order.
    #[must_use]
    pub fn commits(&self) -> &[(String, usize)] {
        &self.commits
    }

    fn light(&self, tls: &str) -> Result<&LightState, EngineError> {
        self.lights
            .get(tls)
            .ok_or_else(|| EngineError::UnknownTrafficLight(tls.to_string()))
    }

    fn person(&self, id: &str) -> Result<&PersonState, EngineError> {
        self.persons
            .get(id)
            .ok_or_else(|| EngineError::UnknownPerson(id.to_string()))
    }
}

impl SimulationEngine for InMemoryEngine {
    fn time(&self) -> f64 {
        self.time
    }

    fn expected_agents(&self) -> Result<usize, EngineError> {
        if let Some(expected) = self.expected {
            return Ok(expected);
        }
        let on_lanes: u32 = self.lanes.values().flat_map(BTreeMap::values).sum();
        Ok(on_lanes as usize + self.persons.len())
    }

    fn advance(&mut self) -> Result<(), EngineError> {
        self.time += 1.0;
        for light in self.lights.values_mut() {
            if light.remaining < 1.0 {
                let next = light.program.next_phase_id(light.phase);
                light.enter(next);
            }
            light.remaining -= 1.0;
        }
        for person in self.persons.values_mut() {
            person.waiting += 1.0;
        }
        Ok(())
    }

    fn phase_program(&self, tls: &str) -> Result<PhaseProgram, EngineError> {
        Ok(self.light(tls)?.program.clone())
    }

    fn controlled_links(&self, tls: &str) -> Result<Vec<SignalLink>, EngineError> {
        Ok(self.light(tls)?.links.clone())
    }

    fn lane_ids(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.lanes.keys().cloned().collect())
    }

    fn edge_ids(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.edges.iter().cloned().collect())
    }

    fn lane_agent_count(&self, lane: &str, class: UserClass) -> Result<u32, EngineError> {
        let counts = self
            .lanes
            .get(lane)
            .ok_or_else(|| EngineError::UnknownLane(lane.to_string()))?;
        Ok(counts.get(&class).copied().unwrap_or(0))
    }

    fn persons_on_edge(&self, edge: &str) -> Result<Vec<String>, EngineError> {
        if !self.edges.contains(edge) {
            return Err(EngineError::UnknownEdge(edge.to_string()));
        }
        Ok(self
            .persons
            .iter()
            .filter(|(_, p)| p.edge == edge)
            .map(|(id, _)| id.clone())
            .collect())
    }

    fn person_waiting_time(&self, person: &str) -> Result<f64, EngineError> {
        Ok(self.person(person)?.waiting)
    }

    fn person_next_edge(&self, person: &str) -> Result<Option<String>, EngineError> {
        Ok(self.person(person)?.next_edge.clone())
    }

    fn time_until_switch(&self, tls: &str) -> Result<f64, EngineError> {
        Ok(self.light(tls)?.remaining.max(0.0))
    }

    fn set_phase(&mut self, tls: &str, phase: usize) -> Result<(), EngineError> {
        let light = self
            .lights
            .get_mut(tls)
            .ok_or_else(|| EngineError::UnknownTrafficLight(tls.to_string()))?;
        if phase >= light.program.len() {
            return Err(EngineError::PhaseOutOfRange {
                tls: tls.to_string(),
                phase,
            });
        }
        light.enter(phase);
        self.commits.push((tls.to_string(), phase));
        Ok(())
    }
}
