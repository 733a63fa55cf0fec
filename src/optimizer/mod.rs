//! Optimizer adapter.
//!
//! The predictive policy hands its variable store and the active movement
//! phase to an [`Optimizer`] and receives a short phase trajectory back.
//! Each call is one blocking round trip with no retry; every failure is a
//! [`SolverError`] surfaced to the driver.
//!
//! [`CommandSolver`] talks to an external model checker: it renders a
//! [`ModelTemplate`], runs the solver binary on it and decodes the printed
//! trajectory with [`parse_plan`].

pub mod command;
pub mod plan;
pub mod template;

use serde::{Deserialize, Serialize};

use crate::error::SolverError;
use crate::variables::VariableStore;

pub use command::{CommandSolver, SolverConfig};
pub use plan::parse_plan;
pub use template::ModelTemplate;

/// Everything the optimizer sees for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerRequest {
    pub tls_id: String,
    /// Simulation time of the decision.
    pub time: f64,
    pub variables: VariableStore,
    /// One flag per movement phase; exactly the current one is set.
    pub active_phases: Vec<bool>,
}

/// One step of a recommended trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Ticks to stay in `phase`.
    pub duration: u32,
    pub phase: usize,
}

impl PlanStep {
    #[must_use]
    pub const fn new(duration: u32, phase: usize) -> Self {
        Self { duration, phase }
    }
}

/// Synchronous trajectory optimizer.
pub trait Optimizer: Send {
    /// Computes the recommended `(duration, phase)` trajectory.
    ///
    /// # Errors
    /// Returns `SolverError` if the solver fails or answers with an empty or
    /// malformed trajectory.
    fn solve(&mut self, request: &OptimizerRequest) -> Result<Vec<PlanStep>, SolverError>;
}

impl<F> Optimizer for F
where
    F: FnMut(&OptimizerRequest) -> Result<Vec<PlanStep>, SolverError> + Send,
{
    fn solve(&mut self, request: &OptimizerRequest) -> Result<Vec<PlanStep>, SolverError> {
        self(request)
    }
}
