//! Error types for tlsagent.
//!
//! All errors are strongly typed using thiserror. Every error is fatal for
//! the controller that raised it: construction-time problems abort
//! construction, runtime problems propagate to the driver, which halts the
//! run. Nothing is retried.

use thiserror::Error;

/// Errors raised while building a controller from configuration.
///
/// These are detected before the first tick executes.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Lane '{lane}' does not exist in the simulation")]
    UnknownLane {
        lane: String,
    },

    #[error("'{phase}' is not a phase of traffic light '{tls}' ({count} phases)")]
    UnknownPhase {
        tls: String,
        phase: String,
        count: usize,
    },

    #[error("Variable '{key}' is not declared in the variable template")]
    UnknownVariable {
        key: String,
    },

    #[error("Index {index} is out of bounds for variable '{key}' of length {len}")]
    SlotOutOfBounds {
        key: String,
        index: usize,
        len: usize,
    },

    #[error("Variable '{key}' has the wrong shape: expected {expected}")]
    ShapeMismatch {
        key: String,
        expected: &'static str,
    },

    #[error("Unknown controller policy '{name}'")]
    UnknownPolicy {
        name: String,
    },

    #[error("Controller policy '{name}' is already registered")]
    DuplicatePolicy {
        name: String,
    },

    #[error("Invalid constants for policy '{policy}': {reason}")]
    InvalidConstants {
        policy: String,
        reason: String,
    },

    #[error("Policy '{policy}' of traffic light '{tls}' requires an optimizer")]
    MissingOptimizer {
        policy: String,
        tls: String,
    },

    #[error("No transition phase leads from phase {from} to phase {to}")]
    MissingTransition {
        from: usize,
        to: usize,
    },

    #[error("Transition phase {phase} has name {name:?}, expected \"(from, to)\"")]
    InvalidTransitionName {
        phase: usize,
        name: Option<String>,
    },

    #[error("Invalid phase program: {reason}")]
    InvalidProgram {
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

impl ConfigurationError {
    /// Shorthand for [`ConfigurationError::InvalidConstants`].
    pub fn constants(policy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConstants {
            policy: policy.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ConfigurationError::InvalidConfig`].
    pub fn config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// A feature/origin combination that is declared but not implemented.
#[derive(Debug, Error)]
#[error("Extraction of '{feature}' from origin '{origin}' is not implemented")]
pub struct UnsupportedFeatureError {
    pub feature: &'static str,
    pub origin: &'static str,
}

/// Errors from the external optimizer round-trip.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Solver I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Solver command exited with {status}: {stderr}")]
    CommandFailed {
        status: String,
        stderr: String,
    },

    #[error("Model template error: {reason}")]
    Template {
        reason: String,
    },

    #[error("Malformed solver response: {reason}")]
    Malformed {
        reason: String,
    },

    #[error("Solver returned an empty plan")]
    EmptyPlan,
}

impl SolverError {
    /// Shorthand for [`SolverError::Malformed`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Errors reported by a simulation engine backend.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Traffic light not found: {0}")]
    UnknownTrafficLight(String),

    #[error("Lane not found: {0}")]
    UnknownLane(String),

    #[error("Edge not found: {0}")]
    UnknownEdge(String),

    #[error("Person not found: {0}")]
    UnknownPerson(String),

    #[error("Phase {phase} is out of range for traffic light '{tls}'")]
    PhaseOutOfRange {
        tls: String,
        phase: usize,
    },

    #[error("Engine backend error: {0}")]
    Backend(String),
}

/// Top-level error type for tlsagent.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Unsupported feature: {0}")]
    Unsupported(#[from] UnsupportedFeatureError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl ControlError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns true if this is an unsupported-feature error.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }

    /// Returns true if this is a solver error.
    #[must_use]
    pub const fn is_solver(&self) -> bool {
        matches!(self, Self::Solver(_))
    }

    /// Returns true if this is an engine error.
    #[must_use]
    pub const fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}

/// Result type alias for tlsagent operations.
pub type ControlResult<T> = Result<T, ControlError>;
