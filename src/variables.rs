//! Named, template-shaped variable store.
//!
//! The template fixes which keys exist and, for sequence-valued keys, their
//! length. A store built from a template only ever has its values
//! overwritten; keys are never added or removed and sequences never change
//! length.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A variable value: a scalar or a fixed-length sequence of numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Variable {
    Scalar(f64),
    Sequence(Vec<f64>),
}

impl Variable {
    pub const fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar(_))
    }

    pub const fn is_sequence(&self) -> bool {
        matches!(self, Self::Sequence(_))
    }

    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Sequence(_) => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[f64]> {
        match self {
            Self::Sequence(v) => Some(v),
            Self::Scalar(_) => None,
        }
    }

    /// Same shape, all values zero.
    #[must_use]
    pub fn zeroed(&self) -> Self {
        match self {
            Self::Scalar(_) => Self::Scalar(0.0),
            Self::Sequence(v) => Self::Sequence(vec![0.0; v.len()]),
        }
    }

    fn zero_in_place(&mut self) {
        match self {
            Self::Scalar(v) => *v = 0.0,
            Self::Sequence(v) => v.iter_mut().for_each(|x| *x = 0.0),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Sequence(v) => {
                write!(f, "[")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A write/read location in a variable store.
///
/// Serialized as `"key"` or `["key", index]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// A scalar variable.
    Key(String),
    /// One slot of a sequence variable.
    Slot(String, usize),
}

impl Target {
    /// The variable key this target refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Key(k) | Self::Slot(k, _) => k,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Slot(k, i) => write!(f, "{k}[{i}]"),
        }
    }
}

impl From<&str> for Target {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<(&str, usize)> for Target {
    fn from((key, idx): (&str, usize)) -> Self {
        Self::Slot(key.to_string(), idx)
    }
}

/// Caller-declared variable shape.
///
/// Only the shape matters; declared values are discarded when a store is
/// built from the template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableTemplate(BTreeMap<String, Variable>);

impl VariableTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a scalar variable.
    #[must_use]
    pub fn scalar(mut self, key: impl Into<String>) -> Self {
        self.0.insert(key.into(), Variable::Scalar(0.0));
        self
    }

    /// Declares a sequence variable of length `len`.
    #[must_use]
    pub fn sequence(mut self, key: impl Into<String>, len: usize) -> Self {
        self.0.insert(key.into(), Variable::Sequence(vec![0.0; len]));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks that `target` resolves to a single number in this template.
    ///
    /// A plain key must name a scalar; a slot must name a sequence and be
    /// strictly in bounds.
    pub fn check_target(&self, target: &Target) -> Result<(), ConfigurationError> {
        let var = self
            .0
            .get(target.key())
            .ok_or_else(|| ConfigurationError::UnknownVariable {
                key: target.key().to_string(),
            })?;

        match (target, var) {
            (Target::Key(_), Variable::Scalar(_)) => Ok(()),
            (Target::Key(key), Variable::Sequence(_)) => Err(ConfigurationError::ShapeMismatch {
                key: key.clone(),
                expected: "a scalar, or a [key, index] slot",
            }),
            (Target::Slot(key, _), Variable::Scalar(_)) => Err(ConfigurationError::ShapeMismatch {
                key: key.clone(),
                expected: "a sequence",
            }),
            (Target::Slot(key, index), Variable::Sequence(v)) => {
                if *index < v.len() {
                    Ok(())
                } else {
                    Err(ConfigurationError::SlotOutOfBounds {
                        key: key.clone(),
                        index: *index,
                        len: v.len(),
                    })
                }
            }
        }
    }

    /// Checks that `key` names a sequence of at least `min_len` elements.
    pub fn check_sequence(&self, key: &str, min_len: usize) -> Result<(), ConfigurationError> {
        match self.0.get(key) {
            None => Err(ConfigurationError::UnknownVariable {
                key: key.to_string(),
            }),
            Some(Variable::Scalar(_)) => Err(ConfigurationError::ShapeMismatch {
                key: key.to_string(),
                expected: "a sequence",
            }),
            Some(Variable::Sequence(v)) if v.len() < min_len => {
                Err(ConfigurationError::SlotOutOfBounds {
                    key: key.to_string(),
                    index: min_len.saturating_sub(1),
                    len: v.len(),
                })
            }
            Some(Variable::Sequence(_)) => Ok(()),
        }
    }
}

/// Variable values for one controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore(BTreeMap<String, Variable>);

impl VariableStore {
    /// A zero-valued store with the template's shape.
    #[must_use]
    pub fn from_template(template: &VariableTemplate) -> Self {
        Self(
            template
                .0
                .iter()
                .map(|(k, v)| (k.clone(), v.zeroed()))
                .collect(),
        )
    }

    /// Zeroes every value, keeping keys and sequence lengths.
    pub fn reset(&mut self) {
        self.0.values_mut().for_each(Variable::zero_in_place);
    }

    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.0.get(key)
    }

    /// Reads the number at `target`.
    #[must_use]
    pub fn value(&self, target: &Target) -> Option<f64> {
        match (target, self.0.get(target.key())?) {
            (Target::Key(_), Variable::Scalar(v)) => Some(*v),
            (Target::Slot(_, i), Variable::Sequence(v)) => v.get(*i).copied(),
            _ => None,
        }
    }

    /// Adds `amount` to the number at `target`.
    ///
    /// Returns false if the target does not resolve.
    pub fn accumulate(&mut self, target: &Target, amount: f64) -> bool {
        match self.slot_mut(target) {
            Some(slot) => {
                *slot += amount;
                true
            }
            None => false,
        }
    }

    /// Overwrites the number at `target`.
    ///
    /// Returns false if the target does not resolve.
    pub fn assign(&mut self, target: &Target, value: f64) -> bool {
        match self.slot_mut(target) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    fn slot_mut(&mut self, target: &Target) -> Option<&mut f64> {
        match (target, self.0.get_mut(target.key())?) {
            (Target::Key(_), Variable::Scalar(v)) => Some(v),
            (Target::Slot(_, i), Variable::Sequence(v)) => v.get_mut(*i),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
