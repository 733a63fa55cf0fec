//! Transition rules.
//!
//! A [`Policy`] is a closed set of decision functions. Each one answers a
//! single question per tick: which phase should the intersection be in
//! after this tick. Committing the answer, elapsed-time bookkeeping and
//! holding against the engine's native timer live in
//! [`Controller::update`](crate::controller::Controller::update).

use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::controller::config::{
    parse_constants, ActuatedConfig, CrosswalkConfig, PredictiveConfig, RecordedConfig,
    RecordedStep, TimedConfig,
};
use crate::controller::transitions::TransitionTable;
use crate::controller::ControllerState;
use crate::engine::SimulationEngine;
use crate::error::{ConfigurationError, ControlResult, SolverError};
use crate::extract::ExtractionPipeline;
use crate::optimizer::{Optimizer, OptimizerRequest, PlanStep};
use crate::program::PhaseProgram;
use crate::variables::{Target, VariableTemplate};

/// Inputs handed to a policy constructor.
pub struct PolicyContext<'a> {
    pub tls_id: &'a str,
    pub program: &'a PhaseProgram,
    pub template: &'a VariableTemplate,
    pub constants: &'a Map<String, Value>,
    pub optimizer: Option<Box<dyn Optimizer>>,
}

/// Everything a decision may read or refresh during one tick.
pub(crate) struct Decision<'a> {
    pub tls_id: &'a str,
    pub program: &'a PhaseProgram,
    pub state: ControllerState,
    pub pipeline: &'a mut ExtractionPipeline,
    pub engine: &'a dyn SimulationEngine,
}

/// True when the engine's own timer switches at the end of this tick.
///
/// Anything under one tick counts, so float noise in the engine clock
/// (`30.000000001 - 30.0`) still lands on the switch.
pub(crate) fn native_switch_due(remaining: f64) -> bool {
    remaining < 1.0
}

impl Decision<'_> {
    fn at_switch_time(&self) -> ControlResult<bool> {
        Ok(native_switch_due(self.engine.time_until_switch(self.tls_id)?))
    }

    /// Mirrors the engine's fixed-time program.
    fn timed(&self) -> ControlResult<usize> {
        if self.at_switch_time()? {
            Ok(self.program.next_phase_id(self.state.phase))
        } else {
            Ok(self.state.phase)
        }
    }

    fn refresh(&mut self) -> ControlResult<()> {
        self.pipeline.extract(self.engine, &self.state)?;
        Ok(())
    }

    fn read(&self, target: &Target) -> f64 {
        self.pipeline.variables().value(target).unwrap_or(0.0)
    }
}

/// Replays a recorded `{phase, duration}` sequence.
#[derive(Debug, Clone)]
pub struct Recorded {
    sequence: Vec<RecordedStep>,
    index: usize,
}

impl Recorded {
    fn step(&self) -> Option<&RecordedStep> {
        self.sequence.get(self.index)
    }

    fn decide(&mut self, d: &Decision<'_>) -> usize {
        let Some(step) = self.step() else {
            return d.state.phase;
        };
        if d.state.elapsed < u64::from(step.duration) {
            return d.state.phase;
        }
        // Exhausted sequences hold their last phase.
        if self.index + 1 >= self.sequence.len() {
            return d.state.phase;
        }
        self.index += 1;
        self.sequence[self.index].phase
    }
}

/// Early vehicle-phase termination on pedestrian demand.
#[derive(Debug, Clone)]
pub struct Crosswalk {
    veh_phase: usize,
    min_green: u64,
    request: Target,
}

impl Crosswalk {
    fn decide(&self, d: &mut Decision<'_>) -> ControlResult<usize> {
        d.refresh()?;
        if d.state.phase == self.veh_phase {
            let requested = d.read(&self.request) > 0.0;
            if requested && d.state.elapsed + 1 > self.min_green {
                return Ok(d.program.next_phase_id(d.state.phase));
            }
        }
        d.timed()
    }
}

/// Demand-actuated switching through explicit transition phases.
#[derive(Debug, Clone)]
pub struct Actuated {
    decision_phases: Vec<usize>,
    next_ped: Vec<usize>,
    next_no_ped: Vec<usize>,
    request_variable: String,
    transitions: TransitionTable,
}

impl Actuated {
    fn decide(&self, d: &mut Decision<'_>) -> ControlResult<usize> {
        d.refresh()?;
        let Some(idx) = self.decision_phases.iter().position(|&p| p == d.state.phase) else {
            return d.timed();
        };
        if !d.at_switch_time()? {
            return Ok(d.state.phase);
        }

        // Phase order follows the program when nobody is waiting.
        let demand = d.read(&Target::Slot(self.request_variable.clone(), idx));
        if demand > 0.0 {
            let to = self.next_ped[idx];
            debug!(tls = d.tls_id, phase = d.state.phase, to, demand, "serving demand");
            return Ok(self.transitions.resolve(d.state.phase, to)?);
        }
        d.timed()
    }

    /// Targets used when no demand is present, per decision phase.
    #[must_use]
    pub fn next_no_ped(&self) -> &[usize] {
        &self.next_no_ped
    }
}

/// Re-plans with an external optimizer at fixed intervals.
pub struct Predictive {
    n_movement: usize,
    mpc_step: u64,
    min_green: u64,
    transitions: TransitionTable,
    optimizer: Box<dyn Optimizer>,
}

impl fmt::Debug for Predictive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predictive")
            .field("n_movement", &self.n_movement)
            .field("mpc_step", &self.mpc_step)
            .field("min_green", &self.min_green)
            .field("transitions", &self.transitions)
            .finish_non_exhaustive()
    }
}

impl Predictive {
    fn is_trigger(&self, state: &ControllerState) -> bool {
        state.phase < self.n_movement
            && state.elapsed >= self.min_green
            && state.elapsed % self.mpc_step == 0
    }

    /// Picks the step to act on from a fresh plan.
    fn candidate(&self, plan: &[PlanStep]) -> Result<usize, SolverError> {
        let first = plan.first().ok_or(SolverError::EmptyPlan)?;
        let chosen = match plan.get(1) {
            Some(second) if u64::from(first.duration) == self.min_green => second,
            _ => first,
        };
        if chosen.phase >= self.n_movement {
            return Err(SolverError::malformed(format!(
                "plan phase {} is not a movement phase (n = {})",
                chosen.phase, self.n_movement
            )));
        }
        Ok(chosen.phase)
    }

    fn decide(&mut self, d: &mut Decision<'_>) -> ControlResult<usize> {
        if !self.is_trigger(&d.state) {
            return d.timed();
        }
        d.refresh()?;

        let request = OptimizerRequest {
            tls_id: d.tls_id.to_string(),
            time: d.engine.time(),
            variables: d.pipeline.variables().clone(),
            active_phases: (0..self.n_movement).map(|i| i == d.state.phase).collect(),
        };
        let plan = self.optimizer.solve(&request)?;
        let candidate = self.candidate(&plan)?;
        debug!(
            tls = d.tls_id,
            phase = d.state.phase,
            candidate,
            steps = plan.len(),
            "optimizer plan"
        );
        Ok(self.transitions.resolve(d.state.phase, candidate)?)
    }
}

/// Closed set of controller behaviours.
#[derive(Debug)]
pub enum Policy {
    Timed,
    Recorded(Recorded),
    Crosswalk(Crosswalk),
    Actuated(Actuated),
    Predictive(Predictive),
}

fn check_phase(ctx: &PolicyContext<'_>, phase: usize) -> Result<(), ConfigurationError> {
    if phase >= ctx.program.len() {
        return Err(ConfigurationError::UnknownPhase {
            tls: ctx.tls_id.to_string(),
            phase: phase.to_string(),
            count: ctx.program.len(),
        });
    }
    Ok(())
}

impl Policy {
    pub fn timed(ctx: PolicyContext<'_>) -> ControlResult<Self> {
        let _: TimedConfig = parse_constants("timed", ctx.constants)?;
        Ok(Self::Timed)
    }

    pub fn recorded(ctx: PolicyContext<'_>) -> ControlResult<Self> {
        let cfg: RecordedConfig = parse_constants("recorded", ctx.constants)?;
        if cfg.sequence.is_empty() {
            return Err(ConfigurationError::constants("recorded", "sequence is empty").into());
        }
        for step in &cfg.sequence {
            check_phase(&ctx, step.phase)?;
        }
        if let Some(pair) = cfg.sequence.windows(2).find(|w| w[0].phase == w[1].phase) {
            return Err(ConfigurationError::constants(
                "recorded",
                format!("phase {} is recorded twice in a row", pair[0].phase),
            )
            .into());
        }
        Ok(Self::Recorded(Recorded {
            sequence: cfg.sequence,
            index: 0,
        }))
    }

    pub fn crosswalk(ctx: PolicyContext<'_>) -> ControlResult<Self> {
        let cfg: CrosswalkConfig = parse_constants("crosswalk", ctx.constants)?;

        let veh_phase = match cfg.veh_phase_id {
            Some(phase) => phase,
            None => ctx.program.first_vehicle_green().ok_or_else(|| {
                ConfigurationError::constants("crosswalk", "program has no vehicle-green phase")
            })?,
        };
        check_phase(&ctx, veh_phase)?;

        let request = match cfg.request_variable {
            Some(target) => target,
            None => {
                let mut keys = ctx.template.keys();
                match (keys.next(), keys.next()) {
                    (Some(key), None) => Target::Key(key.to_string()),
                    _ => {
                        return Err(ConfigurationError::constants(
                            "crosswalk",
                            "request_variable is required unless the template has exactly one key",
                        )
                        .into())
                    }
                }
            }
        };
        ctx.template.check_target(&request)?;

        Ok(Self::Crosswalk(Crosswalk {
            veh_phase,
            min_green: cfg.min_green,
            request,
        }))
    }

    pub fn actuated(ctx: PolicyContext<'_>) -> ControlResult<Self> {
        let cfg: ActuatedConfig = parse_constants("actuated", ctx.constants)?;
        let n = cfg.decision_phases.len();
        if cfg.next_ped.len() != n || cfg.next_no_ped.len() != n {
            return Err(ConfigurationError::constants(
                "actuated",
                format!(
                    "next_ped ({}) and next_no_ped ({}) must have one entry per decision phase ({n})",
                    cfg.next_ped.len(),
                    cfg.next_no_ped.len()
                ),
            )
            .into());
        }
        let transitions = TransitionTable::from_program(ctx.program, cfg.n_movement_phases)?;

        for &phase in cfg.decision_phases.iter().chain(&cfg.next_ped).chain(&cfg.next_no_ped) {
            if phase >= cfg.n_movement_phases {
                return Err(ConfigurationError::constants(
                    "actuated",
                    format!("phase {phase} is not a movement phase"),
                )
                .into());
            }
        }
        for (&from, &to) in cfg.decision_phases.iter().zip(&cfg.next_ped) {
            transitions.resolve(from, to)?;
        }
        ctx.template.check_sequence(&cfg.request_variable, n)?;

        Ok(Self::Actuated(Actuated {
            decision_phases: cfg.decision_phases,
            next_ped: cfg.next_ped,
            next_no_ped: cfg.next_no_ped,
            request_variable: cfg.request_variable,
            transitions,
        }))
    }

    pub fn predictive(ctx: PolicyContext<'_>) -> ControlResult<Self> {
        let cfg: PredictiveConfig = parse_constants("predictive", ctx.constants)?;
        if cfg.mpc_step == 0 {
            return Err(ConfigurationError::constants("predictive", "mpc_step must be positive").into());
        }
        let transitions = TransitionTable::from_program(ctx.program, cfg.n_movement_phases)?;
        let optimizer = ctx.optimizer.ok_or_else(|| ConfigurationError::MissingOptimizer {
            policy: "predictive".to_string(),
            tls: ctx.tls_id.to_string(),
        })?;

        Ok(Self::Predictive(Predictive {
            n_movement: cfg.n_movement_phases,
            mpc_step: cfg.mpc_step,
            min_green: cfg.min_green,
            transitions,
            optimizer,
        }))
    }

    /// Registry name of this policy.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Timed => "timed",
            Self::Recorded(_) => "recorded",
            Self::Crosswalk(_) => "crosswalk",
            Self::Actuated(_) => "actuated",
            Self::Predictive(_) => "predictive",
        }
    }

    /// Phase the controller starts in.
    #[must_use]
    pub fn initial_phase(&self) -> usize {
        match self {
            Self::Recorded(r) => r.sequence.first().map_or(0, |s| s.phase),
            _ => 0,
        }
    }

    pub(crate) fn decide(&mut self, d: &mut Decision<'_>) -> ControlResult<usize> {
        match self {
            Self::Timed => d.timed(),
            Self::Recorded(r) => Ok(r.decide(d)),
            Self::Crosswalk(c) => c.decide(d),
            Self::Actuated(a) => a.decide(d),
            Self::Predictive(p) => p.decide(d),
        }
    }
}
