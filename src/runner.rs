//! Tick driver.
//!
//! One tick advances the engine by one step, then updates every controller
//! in declaration order. Nothing overlaps: a controller's extraction,
//! decision and commit finish before the next controller starts, and the
//! sweep finishes before the next tick.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::RunConfig;
use crate::controller::{Controller, ControllerSnapshot};
use crate::engine::SimulationEngine;
use crate::error::ControlResult;
use crate::optimizer::{CommandSolver, Optimizer, SolverConfig};
use crate::registry::PolicyRegistry;

/// State of one controller after one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub time: f64,
    pub states: ControllerSnapshot,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub steps: u64,
    pub phase_changes: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Controllers plus the stop condition.
#[derive(Debug)]
pub struct Runner {
    controllers: Vec<Controller>,
    max_steps: u64,
}

impl Runner {
    #[must_use]
    pub fn new(controllers: Vec<Controller>, max_steps: u64) -> Self {
        Self {
            controllers,
            max_steps,
        }
    }

    /// Builds every configured controller, in declaration order.
    ///
    /// Controllers with an `optimizer` section get a [`CommandSolver`]
    /// whose paths are resolved against the job directory.
    ///
    /// # Errors
    /// Fails on the first controller that does not build.
    pub fn from_config(
        config: &RunConfig,
        engine: &dyn SimulationEngine,
        registry: &PolicyRegistry,
    ) -> ControlResult<Self> {
        let mut controllers = Vec::with_capacity(config.tls.len());
        for spec in &config.tls {
            let optimizer = match &spec.optimizer {
                Some(solver) => {
                    let solver = SolverConfig {
                        model_template: config.job_path(&solver.model_template),
                        query: solver.query.as_deref().map(|q| config.job_path(q)),
                        work_dir: config.job_path(&solver.work_dir),
                        ..solver.clone()
                    };
                    Some(Box::new(CommandSolver::from_config(solver)?) as Box<dyn Optimizer>)
                }
                None => None,
            };
            controllers.push(registry.build(spec, engine, optimizer)?);
        }
        Ok(Self::new(controllers, config.job.max_steps))
    }

    #[must_use]
    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    /// Runs until the engine is empty or the step limit is hit.
    ///
    /// `observer` receives one [`TickRecord`] per controller per tick.
    ///
    /// # Errors
    /// Any controller or engine error halts the run.
    pub fn run<F>(&mut self, engine: &mut dyn SimulationEngine, mut observer: F) -> ControlResult<RunSummary>
    where
        F: FnMut(&TickRecord),
    {
        let started_at = Utc::now();
        for controller in &self.controllers {
            controller.engage(engine)?;
        }
        info!(controllers = self.controllers.len(), max_steps = self.max_steps, "run started");

        let mut steps = 0;
        let mut phase_changes = 0;
        while steps < self.max_steps && engine.expected_agents()? > 0 {
            engine.advance()?;
            steps += 1;
            let time = engine.time();
            for controller in &mut self.controllers {
                if controller.update(engine)? {
                    phase_changes += 1;
                }
                observer(&TickRecord {
                    time,
                    states: controller.snapshot(),
                });
            }
        }

        let summary = RunSummary {
            steps,
            phase_changes,
            started_at,
            finished_at: Utc::now(),
        };
        info!(steps, phase_changes, "run finished");
        Ok(summary)
    }
}
