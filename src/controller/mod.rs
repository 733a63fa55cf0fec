//! Per-intersection signal controllers.
//!
//! A [`Controller`] owns the phase state of one traffic light. Once per
//! tick [`Controller::update`] asks its [`Policy`] for the next phase and
//! commits the answer to the simulation engine:
//!
//! - same phase: `elapsed` grows by one. When the engine's native timer is
//!   about to switch, the phase is re-committed so the engine holds it.
//! - new phase: the phase is committed and `elapsed` restarts at zero.

pub mod config;
pub mod policy;
pub mod transitions;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::SimulationEngine;
use crate::error::{ConfigurationError, ControlResult};
use crate::extract::ExtractionPipeline;
use crate::program::PhaseProgram;
use crate::variables::VariableStore;

pub use config::{
    ActuatedConfig, CrosswalkConfig, PredictiveConfig, RecordedConfig, RecordedStep, TimedConfig,
};
pub use policy::{Policy, PolicyContext};
pub use transitions::TransitionTable;

use policy::{native_switch_due, Decision};

/// Phase and ticks since the last phase change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    pub phase: usize,
    pub elapsed: u64,
}

/// Externally visible controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub id: String,
    pub phase: usize,
    pub elapsed: u64,
}

/// One traffic light under control.
#[derive(Debug)]
pub struct Controller {
    id: String,
    program: PhaseProgram,
    state: ControllerState,
    pipeline: ExtractionPipeline,
    policy: Policy,
}

impl Controller {
    /// Binds a policy to a program and extraction pipeline.
    ///
    /// The controller starts in the policy's initial phase.
    ///
    /// # Errors
    /// Returns `ConfigurationError::UnknownPhase` if the initial phase lies
    /// outside the program.
    pub fn new(
        id: impl Into<String>,
        program: PhaseProgram,
        pipeline: ExtractionPipeline,
        policy: Policy,
    ) -> ControlResult<Self> {
        let id = id.into();
        let phase = policy.initial_phase();
        if phase >= program.len() {
            return Err(ConfigurationError::UnknownPhase {
                tls: id,
                phase: phase.to_string(),
                count: program.len(),
            }
            .into());
        }
        Ok(Self {
            id,
            program,
            state: ControllerState { phase, elapsed: 0 },
            pipeline,
            policy,
        })
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    #[must_use]
    pub fn program(&self) -> &PhaseProgram {
        &self.program
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    #[must_use]
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Successor of the current phase in the program.
    #[must_use]
    pub fn next_phase_id(&self) -> usize {
        self.program.next_phase_id(self.state.phase)
    }

    /// Commits the initial phase to the engine before the first tick.
    ///
    /// # Errors
    /// Returns `EngineError` if the engine rejects the phase.
    pub fn engage(&self, engine: &mut dyn SimulationEngine) -> ControlResult<()> {
        engine.set_phase(&self.id, self.state.phase)?;
        debug!(tls = %self.id, phase = self.state.phase, policy = self.policy.name(), "controller engaged");
        Ok(())
    }

    /// Runs the policy's transition rule for the current tick.
    ///
    /// Policies that read demand refresh the variable store here.
    ///
    /// # Errors
    /// Propagates extraction, optimizer and engine failures.
    pub fn calculate_next_phase(&mut self, engine: &dyn SimulationEngine) -> ControlResult<usize> {
        let mut decision = Decision {
            tls_id: &self.id,
            program: &self.program,
            state: self.state,
            pipeline: &mut self.pipeline,
            engine,
        };
        self.policy.decide(&mut decision)
    }

    /// Advances the controller by one tick.
    ///
    /// Returns `true` if the phase changed.
    ///
    /// # Errors
    /// Any failure is fatal for the run; the state is left unchanged.
    pub fn update(&mut self, engine: &mut dyn SimulationEngine) -> ControlResult<bool> {
        let next = self.calculate_next_phase(&*engine)?;
        if next >= self.program.len() {
            return Err(ConfigurationError::UnknownPhase {
                tls: self.id.clone(),
                phase: next.to_string(),
                count: self.program.len(),
            }
            .into());
        }

        if next == self.state.phase {
            if native_switch_due(engine.time_until_switch(&self.id)?) {
                engine.set_phase(&self.id, next)?;
            }
            self.state.elapsed += 1;
            return Ok(false);
        }

        engine.set_phase(&self.id, next)?;
        debug!(
            tls = %self.id,
            from = self.state.phase,
            to = next,
            elapsed = self.state.elapsed,
            policy = self.policy.name(),
            "phase change"
        );
        self.state = ControllerState {
            phase: next,
            elapsed: 0,
        };
        Ok(true)
    }

    #[must_use]
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            id: self.id.clone(),
            phase: self.state.phase,
            elapsed: self.state.elapsed,
        }
    }

    /// Copy of the variable store as of the last extraction.
    #[must_use]
    pub fn variables(&self) -> VariableStore {
        self.pipeline.variables().clone()
    }
}
