//! Strongly-typed policy constants.
//!
//! Each policy decodes the free-form `constants` object of its controller
//! declaration into one of these structs exactly once, at construction.
//! Unknown fields are rejected and required fields must be present.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;
use crate::variables::Target;

/// Decodes `constants` into the typed config of `policy`.
pub fn parse_constants<T: DeserializeOwned>(
    policy: &str,
    constants: &Map<String, Value>,
) -> Result<T, ConfigurationError> {
    serde_json::from_value(Value::Object(constants.clone()))
        .map_err(|e| ConfigurationError::constants(policy, e.to_string()))
}

/// The fixed-time policy takes no constants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimedConfig {}

/// One step of a recorded phase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedStep {
    pub phase: usize,
    /// Value of `elapsed` at which the step ends.
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordedConfig {
    pub sequence: Vec<RecordedStep>,
}

fn default_crosswalk_min_green() -> u64 {
    15
}

/// Pedestrian-responsive two-phase crossing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrosswalkConfig {
    /// Vehicle-green phase. Defaults to the first phase whose leading
    /// signal is green.
    #[serde(default)]
    pub veh_phase_id: Option<usize>,

    /// Minimum vehicle green, in ticks.
    #[serde(default = "default_crosswalk_min_green", alias = "MIN_GREEN")]
    pub min_green: u64,

    /// Pedestrian request variable. Defaults to the only template key.
    #[serde(default)]
    pub request_variable: Option<Target>,
}

impl Default for CrosswalkConfig {
    fn default() -> Self {
        Self {
            veh_phase_id: None,
            min_green: default_crosswalk_min_green(),
            request_variable: None,
        }
    }
}

/// Demand-actuated intersection with explicit transition phases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActuatedConfig {
    pub n_movement_phases: usize,

    /// Movement phases where demand is checked at the native switch time.
    pub decision_phases: Vec<usize>,

    /// Target phase per decision phase when pedestrians are waiting.
    pub next_ped: Vec<usize>,

    /// Target phase per decision phase without demand. The program's own
    /// successor is used on that path; the list is validated only.
    pub next_no_ped: Vec<usize>,

    /// Sequence variable holding one demand count per decision phase.
    pub request_variable: String,
}

fn default_mpc_step() -> u64 {
    5
}

fn default_predictive_min_green() -> u64 {
    4
}

/// Optimizer-backed model-predictive control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictiveConfig {
    pub n_movement_phases: usize,

    /// Re-plan every `mpc_step` ticks of a movement phase.
    #[serde(default = "default_mpc_step")]
    pub mpc_step: u64,

    /// Minimum green before the first re-plan, in ticks.
    #[serde(default = "default_predictive_min_green")]
    pub min_green: u64,
}
