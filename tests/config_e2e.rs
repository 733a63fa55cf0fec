use std::fs;
use std::path::Path;

use tempfile::TempDir;

use tlsagent::{
    InMemoryEngine, LogFormat, Phase, PhaseProgram, PolicyRegistry, RunConfig, Runner, SignalLink,
    TickRecord, UserClass,
};

const ACTUATED_RUN: &str = r#"{
  "job": { "name": "demo", "dir": ".", "max_steps": 30 },
  "logging": { "level": "info", "format": "compact" },
  "tls": [
    {
      "id": "C",
      "controller": "actuated",
      "constants": { "n_movement_phases": 2, "decision_phases": [0, 1],
                     "next_ped": [1, 0], "next_no_ped": [1, 0],
                     "request_variable": "ped" },
      "variables": { "ped": [0, 0], "cars": 0, "green": 0 },
      "extract": {
        "user_data": [
          { "feature": "count", "user_class": "pedestrian", "at": "phase",
            "mapping": { "0": ["ped", 0], "1": ["ped", 1] } }
        ],
        "tls_data": [ { "feature": "elapsed_time", "to_variable": "green" } ]
      },
      "optimizer": null
    }
  ]
}"#;

fn engine_with(movement: f64) -> InMemoryEngine {
    let program = PhaseProgram::new(vec![
        Phase::new("GGrr", movement).with_next(2),
        Phase::new("rrGG", movement).with_next(3),
        Phase::new("yrrr", 2.0).with_next(1).with_name("(0, 1)"),
        Phase::new("rryr", 2.0).with_next(0).with_name("(1, 0)"),
    ])
    .unwrap();
    let mut e = InMemoryEngine::new().with_traffic_light(
        "C",
        program,
        vec![
            SignalLink::new("L1", "O1"),
            SignalLink::new(":C_w0_0", ":C_c0_0"),
            SignalLink::new("L2", "O2"),
            SignalLink::new(":C_w1_0", ":C_c1_0"),
        ],
    );
    e.set_lane_count("L1", UserClass::Passenger, 2).unwrap();
    e
}

fn engine() -> InMemoryEngine {
    engine_with(5.0)
}

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn run(config: &RunConfig, engine: &mut InMemoryEngine) -> (Vec<TickRecord>, u64) {
    let mut runner = Runner::from_config(config, engine, &PolicyRegistry::builtin()).unwrap();
    let mut records = Vec::new();
    let summary = runner.run(engine, |r| records.push(r.clone())).unwrap();
    (records, summary.steps)
}

fn distinct_phases(records: &[TickRecord]) -> Vec<usize> {
    let mut out: Vec<usize> = Vec::new();
    for r in records {
        if out.last() != Some(&r.states.phase) {
            out.push(r.states.phase);
        }
    }
    out
}

#[test]
fn documented_actuated_run_loads_and_cycles() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "run.json", ACTUATED_RUN);

    let config = RunConfig::from_path(&path).unwrap();
    assert_eq!(config.job.max_steps, 30);
    assert_eq!(config.logging.format, LogFormat::Compact);
    assert!(config.tls[0].optimizer.is_none());

    let mut e = engine();
    let (records, steps) = run(&config, &mut e);
    assert_eq!(steps, 30);
    assert_eq!(records.len(), 30);
    assert!(records.iter().all(|r| r.states.id == "C"));
    assert_eq!(&distinct_phases(&records)[..5], &[0, 2, 1, 3, 0]);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let config = RunConfig::from_json(
        r#"{"job": {"name": "bare"}, "tls": [{"id": "C", "controller": "timed"}]}"#,
    )
    .unwrap();
    assert_eq!(config.job.max_steps, 1_000_000);
    assert_eq!(config.logging.level, "info");

    let mut e = engine();
    e.set_expected_agents(0);
    let (records, steps) = run(&config, &mut e);
    assert_eq!(steps, 0);
    assert!(records.is_empty());
}

#[test]
fn unknown_policy_fails_the_whole_run() {
    let config = RunConfig::from_json(
        r#"{"job": {"name": "bad"}, "tls": [
            {"id": "C", "controller": "timed"},
            {"id": "D", "controller": "adaptive"}
        ]}"#,
    )
    .unwrap();
    let err = Runner::from_config(&config, &engine(), &PolicyRegistry::builtin()).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("adaptive"));
}

#[test]
fn malformed_documents_are_rejected() {
    let cases = [
        r#"{"job": {"name": "x"}, "tls": []}"#,
        r#"{"job": {"name": "x", "max_steps": 0}, "tls": [{"id": "C", "controller": "timed"}]}"#,
        r#"{"job": {"name": "x"}, "tls": [{"id": "C", "controller": "timed"}, {"id": "C", "controller": "timed"}]}"#,
        r#"{"job": {"name": "x"}, "tls": [{"id": "C", "controller": "timed", "colour": "red"}]}"#,
        r#"{"job": {"name": "x"}}"#,
        "not json",
    ];
    for raw in cases {
        assert!(RunConfig::from_json(raw).is_err(), "accepted: {raw}");
    }
}

#[cfg(unix)]
#[test]
fn predictive_run_uses_the_configured_solver() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "model.xml", "int queue[2] = //TAG_queue;\n");
    let raw = format!(
        r#"{{
          "job": {{ "name": "mpc", "dir": {dir:?}, "max_steps": 8 }},
          "tls": [{{
            "id": "C",
            "controller": "predictive",
            "constants": {{ "n_movement_phases": 2, "mpc_step": 5, "min_green": 4 }},
            "variables": {{ "queue": [0, 0] }},
            "extract": {{ "user_data": [
              {{ "feature": "count", "user_class": "passenger", "at": "phase",
                "mapping": {{ "0": ["queue", 0], "1": ["queue", 1] }} }}
            ] }},
            "optimizer": {{
              "command": "sh",
              "args": ["-c", "grep -q 'queue\\[2\\] = {{2,0}}' \"$1\" && echo 'phase: (0,1) (40,1)'", "solver"],
              "model_template": "model.xml",
              "horizon": 100
            }}
          }}]
        }}"#,
        dir = dir.path().display().to_string(),
    );
    let config_path = write(dir.path(), "run.json", &raw);
    let config = RunConfig::from_path(&config_path).unwrap();

    let mut e = engine_with(30.0);
    let (records, steps) = run(&config, &mut e);
    assert_eq!(steps, 8);

    let phases: Vec<usize> = records.iter().map(|r| r.states.phase).collect();
    assert_eq!(phases, vec![0, 0, 0, 0, 0, 2, 2, 1]);
    assert_eq!(records[5].time, 6.0);

    // Rendered models are removed after each solve.
    let mut left: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    left.sort();
    assert_eq!(left, vec!["model.xml", "run.json"]);
}
