//! Telemetry extraction.
//!
//! A declarative set of queries is validated once against the phase program,
//! the variable template and the engine's lane set, then executed every time
//! a policy needs fresh variables. Extraction resets the store to zero and
//! *accumulates* each query's counts into its targets, so several queries or
//! several origins may sum into the same variable.
//!
//! Traversal order is part of the contract: queries run in declaration
//! order, each mapping in its declared entry order, and signal queries run
//! after all user queries.

mod pipeline;
mod validation;

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::engine::UserClass;
use crate::variables::Target;

pub use pipeline::ExtractionPipeline;

/// Measured quantity of a user query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Count,
    Speed,
    Eta,
    Delay,
    WaitingTime,
}

impl Feature {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Speed => "speed",
            Self::Eta => "eta",
            Self::Delay => "delay",
            Self::WaitingTime => "waiting_time",
        }
    }
}

/// What the identifiers of a query mapping refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Lane,
    Detector,
    Phase,
}

impl Origin {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Lane => "lane",
            Self::Detector => "detector",
            Self::Phase => "phase",
        }
    }
}

/// Ordered map from origin identifier to store target.
///
/// Deserialized from a JSON object with its entry order preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping(Vec<(String, Target)>);

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    #[must_use]
    pub fn entry(mut self, origin: impl Into<String>, target: impl Into<Target>) -> Self {
        self.0.push((origin.into(), target.into()));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Target)> {
        self.0.iter().map(|(o, t)| (o.as_str(), t))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Mapping {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (origin, target) in &self.0 {
            map.serialize_entry(origin, target)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Mapping {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = Mapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from lane id or phase index to a variable target")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((origin, target)) = access.next_entry::<String, Target>()? {
                    entries.push((origin, target));
                }
                Ok(Mapping(entries))
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// One user-data query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionQuery {
    pub feature: Feature,
    pub user_class: UserClass,
    #[serde(rename = "at", alias = "from")]
    pub origin: Origin,
    pub mapping: Mapping,
}

impl ExtractionQuery {
    /// A count query.
    pub fn count(user_class: UserClass, origin: Origin, mapping: Mapping) -> Self {
        Self {
            feature: Feature::Count,
            user_class,
            origin,
            mapping,
        }
    }
}

/// Controller-state features that can be written into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalFeature {
    /// Ticks since the last phase change.
    ElapsedTime,
    /// Current phase index.
    IntegerPhase,
    /// One-hot marker of the current phase in a sequence variable.
    BinaryPhase,
}

/// One signal-data query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalQuery {
    pub feature: SignalFeature,
    pub to_variable: Target,
}

/// Full extraction declaration of one controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSpec {
    #[serde(default)]
    pub user_data: Vec<ExtractionQuery>,
    #[serde(default)]
    pub tls_data: Vec<SignalQuery>,
}

impl ExtractionSpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, query: ExtractionQuery) -> Self {
        self.user_data.push(query);
        self
    }

    #[must_use]
    pub fn signal(mut self, feature: SignalFeature, to_variable: impl Into<Target>) -> Self {
        self.tls_data.push(SignalQuery {
            feature,
            to_variable: to_variable.into(),
        });
        self
    }
}
