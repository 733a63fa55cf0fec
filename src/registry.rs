//! Controller construction.
//!
//! [`PolicyRegistry`] is an explicit name → constructor table, filled once
//! at startup. [`PolicyRegistry::build`] turns a [`ControllerSpec`] into a
//! fully validated [`Controller`]; any inconsistency between the declaration, the
//! engine and the selected policy is a construction-time error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::controller::{Controller, Policy, PolicyContext};
use crate::engine::SimulationEngine;
use crate::error::{ConfigurationError, ControlResult};
use crate::extract::{ExtractionPipeline, ExtractionSpec};
use crate::optimizer::{Optimizer, SolverConfig};
use crate::variables::VariableTemplate;

/// Builds a policy from its construction context.
pub type PolicyConstructor = fn(PolicyContext<'_>) -> ControlResult<Policy>;

/// Declaration of one controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerSpec {
    /// Traffic light id in the engine.
    pub id: String,

    /// Registered policy name.
    pub controller: String,

    #[serde(default)]
    pub constants: Map<String, Value>,

    #[serde(default)]
    pub variables: VariableTemplate,

    #[serde(default)]
    pub extract: ExtractionSpec,

    /// External solver, for policies that plan with one.
    #[serde(default)]
    pub optimizer: Option<SolverConfig>,
}

impl ControllerSpec {
    pub fn new(id: impl Into<String>, controller: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            controller: controller.into(),
            constants: Map::new(),
            variables: VariableTemplate::new(),
            extract: ExtractionSpec::default(),
            optimizer: None,
        }
    }

    /// Sets the policy constants.
    ///
    /// # Errors
    /// Returns `ConfigurationError::InvalidConstants` unless `constants` is
    /// a JSON object.
    pub fn with_constants(mut self, constants: Value) -> Result<Self, ConfigurationError> {
        match constants {
            Value::Object(map) => {
                self.constants = map;
                Ok(self)
            }
            other => Err(ConfigurationError::constants(
                self.controller,
                format!("constants must be an object, got {other}"),
            )),
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: VariableTemplate) -> Self {
        self.variables = variables;
        self
    }

    #[must_use]
    pub fn with_extract(mut self, extract: ExtractionSpec) -> Self {
        self.extract = extract;
        self
    }
}

/// Name → constructor table.
#[derive(Debug, Clone, Default)]
pub struct PolicyRegistry {
    constructors: BTreeMap<String, PolicyConstructor>,
}

impl PolicyRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in policy.
    #[must_use]
    pub fn builtin() -> Self {
        let builtins: [(&str, PolicyConstructor); 5] = [
            ("timed", Policy::timed),
            ("recorded", Policy::recorded),
            ("crosswalk", Policy::crosswalk),
            ("actuated", Policy::actuated),
            ("predictive", Policy::predictive),
        ];
        Self {
            constructors: builtins
                .into_iter()
                .map(|(name, ctor)| (name.to_string(), ctor))
                .collect(),
        }
    }

    /// Adds a constructor under `name`.
    ///
    /// # Errors
    /// Returns `ConfigurationError::DuplicatePolicy` if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        ctor: PolicyConstructor,
    ) -> Result<(), ConfigurationError> {
        let name = name.into();
        if self.constructors.contains_key(&name) {
            return Err(ConfigurationError::DuplicatePolicy { name });
        }
        self.constructors.insert(name, ctor);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Builds the controller declared by `spec`.
    ///
    /// # Errors
    /// - `ConfigurationError::UnknownPolicy` for an unregistered name.
    /// - Any validation error from the extraction pipeline or the policy.
    /// - `EngineError` if the engine does not know the traffic light.
    pub fn build(
        &self,
        spec: &ControllerSpec,
        engine: &dyn SimulationEngine,
        optimizer: Option<Box<dyn Optimizer>>,
    ) -> ControlResult<Controller> {
        let ctor = self
            .constructors
            .get(&spec.controller)
            .ok_or_else(|| ConfigurationError::UnknownPolicy {
                name: spec.controller.clone(),
            })?;

        let program = engine.phase_program(&spec.id)?;
        let pipeline = ExtractionPipeline::new(
            spec.id.as_str(),
            &program,
            spec.variables.clone(),
            &spec.extract,
            engine,
        )?;
        let policy = ctor(PolicyContext {
            tls_id: &spec.id,
            program: &program,
            template: &spec.variables,
            constants: &spec.constants,
            optimizer,
        })?;

        info!(
            tls = %spec.id,
            policy = %spec.controller,
            phases = program.len(),
            queries = spec.extract.user_data.len(),
            "controller built"
        );
        Controller::new(spec.id.as_str(), program, pipeline, policy)
    }
}
