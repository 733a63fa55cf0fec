//! Simulation engine abstraction.
//!
//! The engine is an external collaborator: it owns traffic dynamics, phase
//! programs and native signal timers. Controllers read from it through
//! `&dyn SimulationEngine` and commit phases through `&mut`.
//!
//! `memory::InMemoryEngine` is a scripted reference implementation used by
//! tests and embedded callers.

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::program::PhaseProgram;

pub use memory::InMemoryEngine;

/// Road-user classes that can be counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserClass {
    Passenger,
    Pedestrian,
    Bicycle,
    Bus,
    Truck,
    Moped,
}

impl UserClass {
    /// Returns a short stable identifier suitable for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Passenger => "passenger",
            Self::Pedestrian => "pedestrian",
            Self::Bicycle => "bicycle",
            Self::Bus => "bus",
            Self::Truck => "truck",
            Self::Moped => "moped",
        }
    }
}

impl fmt::Display for UserClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One controlled connection, aligned with one signal head.
///
/// Link `i` of [`SimulationEngine::controlled_links`] is governed by
/// character `i` of every phase's state string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalLink {
    /// Lane the connection starts on. Pedestrian links start on an
    /// internal walking-area lane (prefixed with `:`).
    pub incoming: String,
    /// Lane the connection leads to. For pedestrian links this is a
    /// crossing lane such as `:C_c0_0`.
    pub outgoing: String,
}

impl SignalLink {
    pub fn new(incoming: impl Into<String>, outgoing: impl Into<String>) -> Self {
        Self {
            incoming: incoming.into(),
            outgoing: outgoing.into(),
        }
    }

    /// Returns true for links whose incoming lane is internal.
    #[must_use]
    pub fn is_pedestrian(&self) -> bool {
        self.incoming.starts_with(':')
    }

    /// Edge of the outgoing lane (lane id without its `_<index>` suffix).
    #[must_use]
    pub fn outgoing_edge(&self) -> &str {
        self.outgoing
            .rsplit_once('_')
            .map_or(self.outgoing.as_str(), |(edge, _)| edge)
    }
}

/// Read/write interface to a running traffic micro-simulation.
pub trait SimulationEngine {
    /// Current simulation time in seconds.
    fn time(&self) -> f64;

    /// Number of agents still expected in the simulation (running or pending).
    fn expected_agents(&self) -> Result<usize, EngineError>;

    /// Advance the simulation by one tick.
    fn advance(&mut self) -> Result<(), EngineError>;

    /// Phase program of a traffic light.
    fn phase_program(&self, tls: &str) -> Result<PhaseProgram, EngineError>;

    /// Controlled links of a traffic light, one per signal head.
    fn controlled_links(&self, tls: &str) -> Result<Vec<SignalLink>, EngineError>;

    /// All lane ids.
    fn lane_ids(&self) -> Result<Vec<String>, EngineError>;

    /// All edge ids, including internal ones.
    fn edge_ids(&self) -> Result<Vec<String>, EngineError>;

    /// Number of agents of `class` currently on `lane`.
    fn lane_agent_count(&self, lane: &str, class: UserClass) -> Result<u32, EngineError>;

    /// Persons currently on `edge`.
    fn persons_on_edge(&self, edge: &str) -> Result<Vec<String>, EngineError>;

    /// Accumulated waiting time of a person, in seconds.
    fn person_waiting_time(&self, person: &str) -> Result<f64, EngineError>;

    /// Next edge on the person's route, if any.
    fn person_next_edge(&self, person: &str) -> Result<Option<String>, EngineError>;

    /// Seconds until the traffic light's native timer switches phase.
    fn time_until_switch(&self, tls: &str) -> Result<f64, EngineError>;

    /// Force the traffic light into `phase`.
    fn set_phase(&mut self, tls: &str, phase: usize) -> Result<(), EngineError>;
}
