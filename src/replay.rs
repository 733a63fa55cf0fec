//! Controller log splitting.
//!
//! A run log holds one JSON [`TickRecord`] per line. Splitting turns it
//! into one recorded `{phase, duration}` sequence per traffic light,
//! suitable as `constants.sequence` of the `recorded` policy.

use std::collections::BTreeMap;
use std::io::BufRead;

use thiserror::Error;

use crate::controller::RecordedStep;
use crate::runner::TickRecord;

/// Errors while reading a run log.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Failed to read log: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Parses a JSON-lines run log. Blank lines are skipped.
///
/// # Errors
/// Returns `ReplayError::Parse` with the 1-based line number of the first
/// line that is not a tick record.
pub fn read_records<R: BufRead>(reader: R) -> Result<Vec<TickRecord>, ReplayError> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| ReplayError::Parse {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        records.push(record);
    }
    Ok(records)
}

struct OpenStep {
    phase: usize,
    last_elapsed: u64,
}

impl OpenStep {
    fn close(&self) -> RecordedStep {
        RecordedStep {
            phase: self.phase,
            duration: u32::try_from(self.last_elapsed).unwrap_or(u32::MAX),
        }
    }
}

/// Splits records into per-controller phase sequences.
///
/// A step ends at every phase change; its duration is the last `elapsed`
/// logged in it. The final step of every controller lasts
/// `final_duration`.
#[must_use]
pub fn split_records(records: &[TickRecord], final_duration: u32) -> BTreeMap<String, Vec<RecordedStep>> {
    let mut open: BTreeMap<&str, OpenStep> = BTreeMap::new();
    let mut closed: BTreeMap<String, Vec<RecordedStep>> = BTreeMap::new();

    for record in records {
        let s = &record.states;
        match open.get_mut(s.id.as_str()) {
            Some(step) if step.phase == s.phase => step.last_elapsed = s.elapsed,
            Some(step) => {
                closed.entry(s.id.clone()).or_default().push(step.close());
                *step = OpenStep {
                    phase: s.phase,
                    last_elapsed: s.elapsed,
                };
            }
            None => {
                open.insert(
                    &s.id,
                    OpenStep {
                        phase: s.phase,
                        last_elapsed: s.elapsed,
                    },
                );
            }
        }
    }

    for (id, step) in open {
        closed.entry(id.to_string()).or_default().push(RecordedStep {
            phase: step.phase,
            duration: final_duration,
        });
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerSnapshot;

    fn rec(time: f64, id: &str, phase: usize, elapsed: u64) -> TickRecord {
        TickRecord {
            time,
            states: ControllerSnapshot {
                id: id.to_string(),
                phase,
                elapsed,
            },
        }
    }

    #[test]
    fn test_split_single_controller() {
        let records = vec![
            rec(1.0, "C", 0, 1),
            rec(2.0, "C", 0, 2),
            rec(3.0, "C", 1, 0),
            rec(4.0, "C", 2, 0),
            rec(5.0, "C", 2, 1),
        ];
        let split = split_records(&records, 100);
        assert_eq!(
            split["C"],
            vec![
                RecordedStep { phase: 0, duration: 2 },
                RecordedStep { phase: 1, duration: 0 },
                RecordedStep { phase: 2, duration: 100 },
            ]
        );
    }

    #[test]
    fn test_split_interleaved_controllers() {
        let records = vec![
            rec(1.0, "A", 0, 1),
            rec(1.0, "B", 1, 1),
            rec(2.0, "A", 1, 0),
            rec(2.0, "B", 1, 2),
        ];
        let split = split_records(&records, 7);
        assert_eq!(split.len(), 2);
        assert_eq!(split["A"].len(), 2);
        assert_eq!(split["B"], vec![RecordedStep { phase: 1, duration: 7 }]);
    }

    #[test]
    fn test_read_records() {
        let log = concat!(
            r#"{"time": 1.0, "states": {"id": "C", "phase": 0, "elapsed": 1}}"#,
            "\n\n",
            r#"{"time": 2.0, "states": {"id": "C", "phase": 1, "elapsed": 0}}"#,
            "\n",
        );
        let records = read_records(log.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].states.phase, 1);
    }

    #[test]
    fn test_read_records_reports_line() {
        let log = "{\"time\": 1.0, \"states\": {\"id\": \"C\", \"phase\": 0, \"elapsed\": 1}}\nnot json\n";
        match read_records(log.as_bytes()) {
            Err(ReplayError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
