//! Transition-phase lookup.
//!
//! Programs with explicit clearance phases list their movement phases first
//! (`0..n_movement`) and name every following phase `"(from, to)"` after the
//! movement pair it connects.

use crate::error::ConfigurationError;
use crate::program::PhaseProgram;

/// Table of `(from, to) -> transition phase` built from phase names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionTable {
    n_movement: usize,
    pairs: Vec<(usize, usize)>,
}

fn parse_pair(name: &str) -> Option<(usize, usize)> {
    let inner = name.trim().strip_prefix('(')?.strip_suffix(')')?;
    let (from, to) = inner.split_once(',')?;
    Some((from.trim().parse().ok()?, to.trim().parse().ok()?))
}

impl TransitionTable {
    /// Parses the names of every phase at index `n_movement` and above.
    pub fn from_program(program: &PhaseProgram, n_movement: usize) -> Result<Self, ConfigurationError> {
        if n_movement == 0 || n_movement > program.len() {
            return Err(ConfigurationError::InvalidProgram {
                reason: format!(
                    "{n_movement} movement phases declared for a program of {} phases",
                    program.len()
                ),
            });
        }

        let mut pairs = Vec::with_capacity(program.len() - n_movement);
        for (idx, phase) in program.phases().iter().enumerate().skip(n_movement) {
            let pair = phase
                .name
                .as_deref()
                .and_then(parse_pair)
                .filter(|(from, to)| *from < n_movement && *to < n_movement)
                .ok_or_else(|| ConfigurationError::InvalidTransitionName {
                    phase: idx,
                    name: phase.name.clone(),
                })?;
            pairs.push(pair);
        }

        Ok(Self { n_movement, pairs })
    }

    /// Number of movement phases.
    #[must_use]
    pub fn movement_phases(&self) -> usize {
        self.n_movement
    }

    /// Phase to enter when moving from `from` towards `to`.
    ///
    /// Equal ends need no transition and return `to` itself.
    pub fn resolve(&self, from: usize, to: usize) -> Result<usize, ConfigurationError> {
        if from == to {
            return Ok(to);
        }
        self.pairs
            .iter()
            .position(|pair| *pair == (from, to))
            .map(|offset| self.n_movement + offset)
            .ok_or(ConfigurationError::MissingTransition { from, to })
    }
}
