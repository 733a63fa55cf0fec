use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use serde_json::json;
use tempfile::NamedTempFile;

use tlsagent::replay::{read_records, split_records, ReplayError};
use tlsagent::{
    ControllerSpec, InMemoryEngine, Phase, PhaseProgram, PolicyRegistry, RecordedStep, Runner,
    SignalLink, TickRecord,
};

const TICKS: u64 = 25;

fn engine(durations: [f64; 3]) -> InMemoryEngine {
    let lights = ["A", "B"];
    let mut e = InMemoryEngine::new();
    for (n, id) in lights.iter().enumerate() {
        let program = PhaseProgram::new(vec![
            Phase::new("Gr", durations[0] + n as f64),
            Phase::new("yr", durations[1]),
            Phase::new("rG", durations[2]),
        ])
        .unwrap();
        e = e.with_traffic_light(
            *id,
            program,
            vec![
                SignalLink::new(format!("{id}N_0"), format!("{id}S_0")),
                SignalLink::new(format!("{id}E_0"), format!("{id}W_0")),
            ],
        );
    }
    e.set_expected_agents(1);
    e
}

fn run(runner: &mut Runner, e: &mut InMemoryEngine) -> Vec<TickRecord> {
    let mut records = Vec::new();
    runner.run(e, |r| records.push(r.clone())).unwrap();
    records
}

fn phases_of(records: &[TickRecord], id: &str) -> Vec<usize> {
    records
        .iter()
        .filter(|r| r.states.id == id)
        .map(|r| r.states.phase)
        .collect()
}

#[test]
fn recorded_replay_reproduces_a_logged_run() {
    let registry = PolicyRegistry::builtin();

    // Log a fixed-time run as JSON lines.
    let mut e = engine([4.0, 1.0, 3.0]);
    let timed: Vec<_> = ["A", "B"]
        .iter()
        .map(|id| registry.build(&ControllerSpec::new(*id, "timed"), &e, None).unwrap())
        .collect();
    let mut runner = Runner::new(timed, TICKS);
    let original = run(&mut runner, &mut e);

    let log = NamedTempFile::new().unwrap();
    {
        let mut out = BufWriter::new(log.reopen().unwrap());
        for record in &original {
            serde_json::to_writer(&mut out, record).unwrap();
            writeln!(out).unwrap();
        }
        out.flush().unwrap();
    }

    let records = read_records(BufReader::new(File::open(log.path()).unwrap())).unwrap();
    assert_eq!(records, original);
    let split = split_records(&records, 100);
    assert_eq!(split.len(), 2);
    assert_eq!(
        split["A"][..3],
        [
            RecordedStep { phase: 0, duration: 3 },
            RecordedStep { phase: 1, duration: 0 },
            RecordedStep { phase: 2, duration: 2 },
        ]
    );

    // Replay on an engine whose native timers would disagree.
    let mut e = engine([50.0, 50.0, 50.0]);
    let recorded: Vec<_> = ["A", "B"]
        .iter()
        .map(|id| {
            let spec = ControllerSpec::new(*id, "recorded")
                .with_constants(json!({ "sequence": split[*id] }))
                .unwrap();
            registry.build(&spec, &e, None).unwrap()
        })
        .collect();
    let mut runner = Runner::new(recorded, TICKS);
    let replayed = run(&mut runner, &mut e);

    for id in ["A", "B"] {
        assert_eq!(phases_of(&replayed, id), phases_of(&original, id), "controller {id}");
    }
}

#[test]
fn corrupt_log_reports_the_line() {
    let mut log = NamedTempFile::new().unwrap();
    writeln!(log, r#"{{"time": 1.0, "states": {{"id": "A", "phase": 0, "elapsed": 1}}}}"#).unwrap();
    writeln!(log, r#"{{"time": 2.0, "states": {{"id": "A"}}}}"#).unwrap();

    let err = read_records(BufReader::new(File::open(log.path()).unwrap())).unwrap_err();
    match err {
        ReplayError::Parse { line, .. } => assert_eq!(line, 2),
        other => panic!("expected parse error, got {other}"),
    }
}
