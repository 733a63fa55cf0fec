//! External solver process.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::SolverError;
use crate::optimizer::plan::parse_plan;
use crate::optimizer::template::ModelTemplate;
use crate::optimizer::{Optimizer, OptimizerRequest, PlanStep};

fn default_command() -> String {
    "verifyta".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_horizon() -> f64 {
    1000.0
}

/// How to invoke the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SolverConfig {
    /// Solver executable.
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments placed before the model path.
    #[serde(default)]
    pub args: Vec<String>,

    pub model_template: PathBuf,

    /// Query file appended after the model path.
    #[serde(default)]
    pub query: Option<PathBuf>,

    /// Directory for rendered models.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// End time of the last plan step.
    #[serde(default = "default_horizon")]
    pub horizon: f64,

    /// Leave rendered models on disk.
    #[serde(default)]
    pub keep_models: bool,
}

impl SolverConfig {
    pub fn new(command: impl Into<String>, model_template: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            model_template: model_template.into(),
            query: None,
            work_dir: default_work_dir(),
            horizon: default_horizon(),
            keep_models: false,
        }
    }
}

/// Runs an external solver once per request.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    config: SolverConfig,
    template: ModelTemplate,
}

impl CommandSolver {
    /// Loads the model template named by `config`.
    pub fn from_config(config: SolverConfig) -> Result<Self, SolverError> {
        let template = ModelTemplate::load(&config.model_template)?;
        Ok(Self::new(config, template))
    }

    #[must_use]
    pub fn new(config: SolverConfig, template: ModelTemplate) -> Self {
        Self { config, template }
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    fn model_path(&self, tls_id: &str) -> PathBuf {
        self.config
            .work_dir
            .join(format!("{tls_id}-{}.xml", Uuid::new_v4()))
    }

    fn run(&self, model: &Path) -> Result<String, SolverError> {
        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args).arg(model);
        if let Some(query) = &self.config.query {
            cmd.arg(query);
        }

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(SolverError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Optimizer for CommandSolver {
    fn solve(&mut self, request: &OptimizerRequest) -> Result<Vec<PlanStep>, SolverError> {
        let model = self.template.render(request)?;
        let path = self.model_path(&request.tls_id);
        fs::write(&path, model)?;

        let result = self.run(&path);

        if !self.config.keep_models {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove model file");
            }
        }

        let stdout = result?;
        let plan = parse_plan(&stdout, self.config.horizon)?;
        debug!(
            tls = %request.tls_id,
            time = request.time,
            steps = plan.len(),
            "solver plan"
        );
        Ok(plan)
    }
}
