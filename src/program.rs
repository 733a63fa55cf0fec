//! Phase programs.
//!
//! A phase program is the ordered catalog of signal phases of one controlled
//! intersection, as loaded from the simulation engine. It is immutable once
//! constructed and shared read-only by the controller and its extraction
//! pipeline.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// One signal-state configuration of an intersection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    /// One character per signal head (`G`, `g`, `y`, `r`, ...).
    pub state: String,

    /// Default duration in simulation seconds.
    pub duration: f64,

    /// Explicit successor phase, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<usize>,

    /// Phase label. Transition phases are named `"(from, to)"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Phase {
    /// Creates an unnamed phase without an explicit successor.
    pub fn new(state: impl Into<String>, duration: f64) -> Self {
        Self {
            state: state.into(),
            duration,
            next: None,
            name: None,
        }
    }

    /// Sets the explicit successor.
    #[must_use]
    pub fn with_next(mut self, next: usize) -> Self {
        self.next = Some(next);
        self
    }

    /// Sets the phase label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns true if signal head `head` shows green (either priority).
    #[must_use]
    pub fn is_green(&self, head: usize) -> bool {
        self.state
            .chars()
            .nth(head)
            .is_some_and(|c| c.eq_ignore_ascii_case(&'g'))
    }
}

/// Ordered, validated sequence of phases indexed `0..n`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PhaseProgram(Vec<Phase>);

impl PhaseProgram {
    /// Construct a validated program.
    ///
    /// # Validation
    /// - The program must contain at least one phase.
    /// - All signal-state strings must have the same length.
    /// - Every explicit `next` pointer must be a valid index.
    pub fn new(phases: Vec<Phase>) -> Result<Self, ConfigurationError> {
        let Some(first) = phases.first() else {
            return Err(ConfigurationError::InvalidProgram {
                reason: "program has no phases".to_string(),
            });
        };

        let heads = first.state.chars().count();
        for (idx, phase) in phases.iter().enumerate() {
            let len = phase.state.chars().count();
            if len != heads {
                return Err(ConfigurationError::InvalidProgram {
                    reason: format!("phase {idx} controls {len} signals, phase 0 controls {heads}"),
                });
            }
            if let Some(next) = phase.next {
                if next >= phases.len() {
                    return Err(ConfigurationError::InvalidProgram {
                        reason: format!("phase {idx} points to missing successor {next}"),
                    });
                }
            }
        }

        Ok(Self(phases))
    }

    /// Number of phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a validated program.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of signal heads controlled by every phase.
    #[must_use]
    pub fn signal_count(&self) -> usize {
        self.0.first().map_or(0, |p| p.state.chars().count())
    }

    /// Returns the phase at `idx`.
    #[must_use]
    pub fn phase(&self, idx: usize) -> Option<&Phase> {
        self.0.get(idx)
    }

    /// Returns all phases in order.
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.0
    }

    /// Successor of `current`: the explicit `next` pointer when present,
    /// otherwise `(current + 1) mod n`.
    #[must_use]
    pub fn next_phase_id(&self, current: usize) -> usize {
        match self.0.get(current).and_then(|p| p.next) {
            Some(next) => next,
            None => (current + 1) % self.0.len(),
        }
    }

    /// Indices of the signal heads that are green under phase `idx`.
    pub fn green_heads(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let state = self.0.get(idx).map_or("", |p| p.state.as_str());
        state
            .chars()
            .enumerate()
            .filter(|(_, c)| c.eq_ignore_ascii_case(&'g'))
            .map(|(i, _)| i)
    }

    /// First phase whose leading signal is green.
    #[must_use]
    pub fn first_vehicle_green(&self) -> Option<usize> {
        self.0.iter().position(|p| p.is_green(0))
    }
}

impl<'de> Deserialize<'de> for PhaseProgram {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Vec::<Phase>::deserialize(deserializer)?;
        PhaseProgram::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_phase() -> PhaseProgram {
        PhaseProgram::new(vec![Phase::new("GGrr", 30.0), Phase::new("rrGG", 30.0)]).unwrap()
    }

    #[test]
    fn test_next_phase_wraps() {
        let program = two_phase();
        assert_eq!(program.next_phase_id(0), 1);
        assert_eq!(program.next_phase_id(1), 0);
    }

    #[test]
    fn test_next_phase_explicit_pointer() {
        let program = PhaseProgram::new(vec![
            Phase::new("Gr", 10.0).with_next(2),
            Phase::new("rG", 10.0).with_next(3),
            Phase::new("yr", 3.0).with_next(1).with_name("(0, 1)"),
            Phase::new("ry", 3.0).with_next(0).with_name("(1, 0)"),
        ])
        .unwrap();
        assert_eq!(program.next_phase_id(0), 2);
        assert_eq!(program.next_phase_id(2), 1);
        assert_eq!(program.next_phase_id(3), 0);
    }

    #[test]
    fn test_empty_program_rejected() {
        let err = PhaseProgram::new(Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidProgram { .. }));
    }

    #[test]
    fn test_inconsistent_signal_count_rejected() {
        let err = PhaseProgram::new(vec![Phase::new("GGrr", 5.0), Phase::new("rrG", 5.0)])
            .unwrap_err();
        assert!(format!("{err}").contains("phase 1"));
    }

    #[test]
    fn test_dangling_next_rejected() {
        let err = PhaseProgram::new(vec![Phase::new("G", 5.0).with_next(4)]).unwrap_err();
        assert!(format!("{err}").contains("successor 4"));
    }

    #[test]
    fn test_green_heads() {
        let program = PhaseProgram::new(vec![Phase::new("GgryG", 5.0)]).unwrap();
        let heads: Vec<usize> = program.green_heads(0).collect();
        assert_eq!(heads, vec![0, 1, 4]);
        assert_eq!(program.green_heads(7).count(), 0);
        assert_eq!(program.signal_count(), 5);
    }

    #[test]
    fn test_first_vehicle_green() {
        let program = PhaseProgram::new(vec![
            Phase::new("rrG", 5.0),
            Phase::new("gGr", 5.0),
        ])
        .unwrap();
        assert_eq!(program.first_vehicle_green(), Some(1));
    }

    #[test]
    fn test_program_deserialization_validates() {
        let ok: PhaseProgram =
            serde_json::from_str(r#"[{"state": "Gr", "duration": 4}, {"state": "rG", "duration": 4}]"#)
                .unwrap();
        assert_eq!(ok.len(), 2);

        let bad = serde_json::from_str::<PhaseProgram>(r#"[{"state": "Gr", "duration": 4, "next": 9}]"#);
        assert!(bad.is_err());
    }
}
