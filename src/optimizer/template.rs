//! Model-file rendering.
//!
//! A model template is plain text with `//TAG_<name>` markers. Rendering
//! replaces the marker of every store variable with its value: scalars as
//! numbers, sequences as `{a,b,c}`. The optional `//TAG_active_phases`
//! marker receives the active-phase flags as `{true,false}`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::SolverError;
use crate::optimizer::OptimizerRequest;
use crate::variables::Variable;

const TAG_PREFIX: &str = "//TAG_";
const ACTIVE_PHASES: &str = "active_phases";
const MARKER_PATTERN: &str = r"//TAG_([A-Za-z0-9_]+)";

static MARKER_REGEX: OnceLock<Regex> = OnceLock::new();

fn marker_regex() -> Result<&'static Regex, SolverError> {
    if let Some(re) = MARKER_REGEX.get() {
        return Ok(re);
    }
    let compiled = Regex::new(MARKER_PATTERN).map_err(|e| SolverError::Template {
        reason: format!("invalid marker pattern: {e}"),
    })?;
    Ok(MARKER_REGEX.get_or_init(|| compiled))
}

fn tag(name: &str) -> String {
    format!("{TAG_PREFIX}{name}")
}

#[allow(clippy::cast_possible_truncation)]
fn format_number(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn format_list<I>(items: I) -> String
where
    I: IntoIterator<Item = String>,
{
    format!("{{{}}}", items.into_iter().collect::<Vec<_>>().join(","))
}

/// Encodes one variable in model syntax.
#[must_use]
pub fn format_variable(v: &Variable) -> String {
    match v {
        Variable::Scalar(x) => format_number(*x),
        Variable::Sequence(xs) => format_list(xs.iter().copied().map(format_number)),
    }
}

/// Model file with `//TAG_<name>` insertion markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTemplate {
    source: String,
}

impl ModelTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Reads a template from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SolverError> {
        Ok(Self::new(fs::read_to_string(path)?))
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders `request` into a model.
    ///
    /// Markers are matched whole, so `//TAG_q` never touches `//TAG_queue`.
    /// Markers naming neither a variable nor the active phases are left as is.
    ///
    /// # Errors
    /// Returns `SolverError::Template` if a variable has no marker, or if a
    /// variable is named like the active-phases marker.
    pub fn render(&self, request: &OptimizerRequest) -> Result<String, SolverError> {
        if request.variables.get(ACTIVE_PHASES).is_some() {
            return Err(SolverError::Template {
                reason: format!("variable '{ACTIVE_PHASES}' shadows the built-in marker"),
            });
        }

        let re = marker_regex()?;
        let mut seen = BTreeSet::new();
        let model = re.replace_all(&self.source, |caps: &Captures<'_>| {
            let name = &caps[1];
            if name == ACTIVE_PHASES {
                return format_list(request.active_phases.iter().map(bool::to_string));
            }
            match request.variables.get(name) {
                Some(value) => {
                    seen.insert(name.to_string());
                    format_variable(value)
                }
                None => caps[0].to_string(),
            }
        });

        if let Some((name, _)) = request.variables.iter().find(|(name, _)| !seen.contains(*name)) {
            return Err(SolverError::Template {
                reason: format!("no {} marker for variable '{name}'", tag(name)),
            });
        }

        Ok(model.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::{Target, VariableStore, VariableTemplate};

    fn request() -> OptimizerRequest {
        let template = VariableTemplate::new().scalar("cars").sequence("queue", 3);
        let mut variables = VariableStore::from_template(&template);
        variables.assign(&Target::Key("cars".into()), 4.0);
        variables.assign(&Target::Slot("queue".into(), 1), 2.5);
        OptimizerRequest {
            tls_id: "C".to_string(),
            time: 10.0,
            variables,
            active_phases: vec![false, true],
        }
    }

    #[test]
    fn test_render_replaces_markers() {
        let t = ModelTemplate::new(
            "int cars = //TAG_cars;\ndouble q[3] = //TAG_queue;\nbool active[2] = //TAG_active_phases;\n",
        );
        let model = t.render(&request()).unwrap();
        assert_eq!(
            model,
            "int cars = 4;\ndouble q[3] = {0,2.5,0};\nbool active[2] = {false,true};\n"
        );
    }

    #[test]
    fn test_missing_marker_is_template_error() {
        let t = ModelTemplate::new("int cars = //TAG_cars;");
        let err = t.render(&request()).unwrap_err();
        assert!(matches!(err, SolverError::Template { .. }));
        assert!(err.to_string().contains("queue"));
    }

    #[test]
    fn test_active_phases_marker_optional() {
        let t = ModelTemplate::new("//TAG_cars //TAG_queue");
        assert_eq!(t.render(&request()).unwrap(), "4 {0,2.5,0}");
    }

    #[test]
    fn test_prefix_names_replace_whole_markers() {
        let template = VariableTemplate::new().scalar("q").sequence("queue", 2).scalar("active");
        let mut variables = VariableStore::from_template(&template);
        variables.assign(&Target::Key("q".into()), 7.0);
        variables.assign(&Target::Slot("queue".into(), 0), 3.0);
        variables.assign(&Target::Key("active".into()), 1.0);
        let request = OptimizerRequest {
            tls_id: "C".to_string(),
            time: 0.0,
            variables,
            active_phases: vec![true, false],
        };

        let t = ModelTemplate::new(
            "int q = //TAG_q;\nint queue[2] = //TAG_queue;\nint a = //TAG_active;\nbool act[2] = //TAG_active_phases;",
        );
        assert_eq!(
            t.render(&request).unwrap(),
            "int q = 7;\nint queue[2] = {3,0};\nint a = 1;\nbool act[2] = {true,false};"
        );
    }

    #[test]
    fn test_active_variable_keeps_active_phases_marker() {
        let mut variables = VariableStore::from_template(&VariableTemplate::new().scalar("active"));
        variables.assign(&Target::Key("active".into()), 0.0);
        let request = OptimizerRequest {
            tls_id: "C".to_string(),
            time: 0.0,
            variables,
            active_phases: vec![false, true],
        };
        let t = ModelTemplate::new("int a = //TAG_active;\nbool act[2] = //TAG_active_phases;");
        assert_eq!(t.render(&request).unwrap(), "int a = 0;\nbool act[2] = {false,true};");

        // A marker only present inside a longer one does not count.
        let t = ModelTemplate::new("bool act[2] = //TAG_active_phases;");
        assert!(matches!(t.render(&request), Err(SolverError::Template { .. })));
    }

    #[test]
    fn test_variable_named_like_builtin_marker_rejected() {
        let variables = VariableStore::from_template(&VariableTemplate::new().scalar("active_phases"));
        let request = OptimizerRequest {
            tls_id: "C".to_string(),
            time: 0.0,
            variables,
            active_phases: vec![true],
        };
        let t = ModelTemplate::new("//TAG_active_phases");
        assert!(matches!(t.render(&request), Err(SolverError::Template { .. })));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(0.25), "0.25");
    }
}
