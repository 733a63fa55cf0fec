//! tls-split-log
//!
//! Splits a controller run log into recorded phase sequences, one per
//! traffic light, ready to be replayed by the `recorded` policy.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Local;
use tracing::info;

use tlsagent::replay::{read_records, split_records};
use tlsagent::{init_tracing, LogConfig};

struct Config {
    log: Option<PathBuf>,
    out: PathBuf,
    final_duration: u32,
    timestamped: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log: None,
            out: PathBuf::from("results.json"),
            final_duration: 100,
            timestamped: false,
        }
    }
}

fn usage() {
    println!("tls-split-log - split a controller log into recorded sequences");
    println!();
    println!("USAGE:");
    println!("    tls-split-log [OPTIONS] <LOGFILE>");
    println!();
    println!("OPTIONS:");
    println!("    -o, --out <FILE>              Output file [default: results.json]");
    println!("    -f, --final-duration <TICKS>  Duration of each last step [default: 100]");
    println!("    -t, --timestamped             Append _%Y%m%d%H%M%S to the output name");
    println!("    -h, --help                    Print help information");
}

fn fail(msg: &str) -> ! {
    eprintln!("error: {msg}");
    std::process::exit(1);
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--out" | "-o" => {
                let Some(value) = args.get(i + 1) else {
                    fail("--out requires a value");
                };
                config.out = PathBuf::from(value);
                i += 2;
            }
            "--final-duration" | "-f" => {
                let Some(value) = args.get(i + 1) else {
                    fail("--final-duration requires a value");
                };
                config.final_duration = value
                    .parse()
                    .unwrap_or_else(|_| fail(&format!("invalid duration: {value}")));
                i += 2;
            }
            "--timestamped" | "-t" => {
                config.timestamped = true;
                i += 1;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            arg if arg.starts_with('-') => fail(&format!("unknown argument: {arg}")),
            arg => {
                if config.log.is_some() {
                    fail("only one log file may be given");
                }
                config.log = Some(PathBuf::from(arg));
                i += 1;
            }
        }
    }

    config
}

fn timestamped(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d%H%M%S");
    let stem = path.file_stem().map_or_else(String::new, |s| s.to_string_lossy().into_owned());
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{stamp}"),
    };
    path.with_file_name(name)
}

fn run(config: &Config) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log = config.log.as_ref().ok_or("missing <LOGFILE>")?;
    let records = read_records(BufReader::new(File::open(log)?))?;
    let split = split_records(&records, config.final_duration);

    let out = if config.timestamped {
        timestamped(&config.out)
    } else {
        config.out.clone()
    };
    let file = File::create(&out)?;
    serde_json::to_writer_pretty(file, &split)?;
    info!(
        records = records.len(),
        controllers = split.len(),
        out = %out.display(),
        "log split"
    );
    Ok(out)
}

fn main() -> ExitCode {
    let config = parse_args();
    if let Err(e) = init_tracing(&LogConfig::default()) {
        eprintln!("warning: {e}");
    }
    match run(&config) {
        Ok(out) => {
            println!("wrote {}", out.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
