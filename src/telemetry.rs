//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events. Binaries and test harnesses
//! call [`init_tracing`] once to install a subscriber. `RUST_LOG` takes
//! precedence over the configured level:
//!
//! ```bash
//! # Phase changes of every controller
//! RUST_LOG=tlsagent::controller=debug cargo test --test controller_e2e
//! ```

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Multi-line, human-readable.
    Pretty,
    /// Single-line.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

fn default_level() -> String {
    "info".to_string()
}

/// Logging section of a run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,

    #[error("invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("failed to install subscriber: {0}")]
    Subscriber(String),
}

fn filter(config: &LogConfig) -> Result<EnvFilter, InitError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| InitError::Filter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber described by `config`.
///
/// # Errors
/// - `InitError::AlreadyInitialised` on a second call.
/// - `InitError::Filter` if the configured level does not parse.
pub fn init_tracing(config: &LogConfig) -> Result<(), InitError> {
    let filter = filter(config)?;
    INITIALISED
        .set(())
        .map_err(|_| InitError::AlreadyInitialised)?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| InitError::Subscriber(e.to_string()))
}
