//! # tlsagent - Traffic-Signal Controllers for Micro-Simulation
//!
//! tlsagent drives the signal phases of intersections inside a tick-based
//! traffic simulation. Each intersection gets a [`Controller`]: a small
//! state machine over the phases of its [`PhaseProgram`], fed by an
//! [`ExtractionPipeline`] that counts road users into a template-shaped
//! [`VariableStore`], and driven by one [`Policy`].
//!
//! ## Core Concepts
//!
//! - **Phase program**: signal-state strings with durations and optional
//!   explicit successors
//! - **Extraction**: validated count queries accumulated into named variables
//! - **Policy**: the per-tick transition rule (timed, recorded, crosswalk,
//!   actuated, predictive)
//! - **Optimizer**: an external solver consulted by the predictive policy
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tlsagent::{InMemoryEngine, PolicyRegistry, RunConfig, Runner};
//!
//! let config = RunConfig::from_path("run.json")?;
//! let mut engine = InMemoryEngine::new(); // or any SimulationEngine
//! let mut runner = Runner::from_config(&config, &engine, &PolicyRegistry::builtin())?;
//! let summary = runner.run(&mut engine, |record| println!("{record:?}"))?;
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod error;
pub mod program;
pub mod variables;

// Collaborator seams
pub mod engine;
pub mod optimizer;

// Control
pub mod controller;
pub mod extract;
pub mod registry;

// Driving a run
pub mod config;
pub mod replay;
pub mod runner;
pub mod telemetry;

pub use config::{JobConfig, RunConfig};
pub use controller::{
    Controller, ControllerSnapshot, ControllerState, Policy, PolicyContext, RecordedStep,
    TransitionTable,
};
pub use engine::{InMemoryEngine, SignalLink, SimulationEngine, UserClass};
pub use error::{
    ConfigurationError, ControlError, ControlResult, EngineError, SolverError,
    UnsupportedFeatureError,
};
pub use extract::{ExtractionPipeline, ExtractionQuery, ExtractionSpec, Mapping, SignalQuery};
pub use optimizer::{CommandSolver, Optimizer, OptimizerRequest, PlanStep, SolverConfig};
pub use program::{Phase, PhaseProgram};
pub use registry::{ControllerSpec, PolicyRegistry};
pub use runner::{RunSummary, Runner, TickRecord};
pub use telemetry::{init_tracing, LogConfig, LogFormat};
pub use variables::{Target, Variable, VariableStore, VariableTemplate};
