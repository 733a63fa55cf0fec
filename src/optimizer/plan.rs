//! Decoding of solver trajectories.
//!
//! Solvers print a strategy simulation as `(time,value)` tuples, e.g.
//! `phase: [0]: (0,0) (12,0) (12,1) (30,1)`. The value is the phase and a
//! new step begins wherever it changes.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::SolverError;
use crate::optimizer::PlanStep;

const TUPLE_PATTERN: &str = r"\(\s*(-?\d+(?:\.\d+)?)\s*,\s*(-?\d+(?:\.\d+)?)\s*\)";

static TUPLE_REGEX: OnceLock<Regex> = OnceLock::new();

fn tuple_regex() -> Result<&'static Regex, SolverError> {
    if let Some(re) = TUPLE_REGEX.get() {
        return Ok(re);
    }
    let compiled = Regex::new(TUPLE_PATTERN)
        .map_err(|e| SolverError::malformed(format!("invalid tuple pattern: {e}")))?;
    Ok(TUPLE_REGEX.get_or_init(|| compiled))
}

/// Extracts every `(time, value)` tuple in `output`.
///
/// # Errors
/// Returns `SolverError::Malformed` if a number cannot be parsed.
pub fn tuples(output: &str) -> Result<Vec<(f64, f64)>, SolverError> {
    tuple_regex()?
        .captures_iter(output)
        .map(|c| {
            let time = c[1]
                .parse::<f64>()
                .map_err(|e| SolverError::malformed(format!("time '{}': {e}", &c[1])))?;
            let value = c[2]
                .parse::<f64>()
                .map_err(|e| SolverError::malformed(format!("value '{}': {e}", &c[2])))?;
            Ok((time, value))
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn ticks(span: f64) -> u32 {
    span.max(0.0).round().min(f64::from(u32::MAX)) as u32
}

/// Turns solver output into `(duration, phase)` steps.
///
/// The last step runs until `horizon`. Steps shorter than half a tick are
/// dropped and equal neighbours left behind are merged, so every step
/// returned has a positive duration.
///
/// # Errors
/// - `SolverError::EmptyPlan` if the output holds no tuples, or no step
///   lasts a tick.
/// - `SolverError::Malformed` for decreasing times or a negative or
///   fractional phase.
pub fn parse_plan(output: &str, horizon: f64) -> Result<Vec<PlanStep>, SolverError> {
    let points = tuples(output)?;
    if points.is_empty() {
        return Err(SolverError::EmptyPlan);
    }

    // (start, phase) of every run of equal values.
    let mut runs: Vec<(f64, usize)> = Vec::new();
    let mut last_time = f64::NEG_INFINITY;
    for (time, value) in points {
        if time < last_time {
            return Err(SolverError::malformed(format!(
                "time {time} precedes {last_time}"
            )));
        }
        last_time = time;
        if value < 0.0 || value.fract() != 0.0 {
            return Err(SolverError::malformed(format!("'{value}' is not a phase index")));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let phase = value as usize;
        if runs.last().map(|&(_, p)| p) != Some(phase) {
            runs.push((time, phase));
        }
    }

    let ends = runs.iter().skip(1).map(|&(t, _)| t).chain(std::iter::once(horizon));
    let mut plan: Vec<PlanStep> = Vec::with_capacity(runs.len());
    for (&(start, phase), end) in runs.iter().zip(ends) {
        let duration = ticks(end - start);
        if duration == 0 {
            continue;
        }
        match plan.last_mut() {
            Some(last) if last.phase == phase => last.duration = last.duration.saturating_add(duration),
            _ => plan.push(PlanStep::new(duration, phase)),
        }
    }

    if plan.is_empty() {
        return Err(SolverError::EmptyPlan);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_collapses_runs() {
        let out = "phase:\n[0]: (0,0) (12,0) (12,1) (30,1) (30,0) (41,0)\n";
        let plan = parse_plan(out, 60.0).unwrap();
        assert_eq!(
            plan,
            vec![PlanStep::new(12, 0), PlanStep::new(18, 1), PlanStep::new(30, 0)]
        );
    }

    #[test]
    fn test_fractional_times_round() {
        let plan = parse_plan("(0,1) (4.4,1) (4.4,2)", 10.0).unwrap();
        assert_eq!(plan, vec![PlanStep::new(4, 1), PlanStep::new(6, 2)]);
    }

    #[test]
    fn test_empty_output() {
        assert!(matches!(parse_plan("Formula is satisfied.", 10.0), Err(SolverError::EmptyPlan)));
    }

    #[test]
    fn test_malformed_output() {
        assert!(matches!(parse_plan("(5,0) (3,1)", 10.0), Err(SolverError::Malformed { .. })));
        assert!(matches!(parse_plan("(0,-1)", 10.0), Err(SolverError::Malformed { .. })));
        assert!(matches!(parse_plan("(0,0.5)", 10.0), Err(SolverError::Malformed { .. })));
    }

    #[test]
    fn test_horizon_before_last_change_drops_empty_step() {
        let plan = parse_plan("(0,0) (20,1)", 10.0).unwrap();
        assert_eq!(plan, vec![PlanStep::new(20, 0)]);
    }

    #[test]
    fn test_zero_length_steps_dropped_and_neighbours_merged() {
        let plan = parse_plan("(0,0) (6,1) (6.2,0) (10,2)", 15.0).unwrap();
        assert_eq!(plan, vec![PlanStep::new(10, 0), PlanStep::new(5, 2)]);
        assert!(plan.iter().all(|s| s.duration > 0));
    }

    #[test]
    fn test_plan_with_no_full_tick_is_empty() {
        assert!(matches!(parse_plan("(10,1)", 10.0), Err(SolverError::EmptyPlan)));
    }
}
