//! Construction-time validation of extraction queries.
//!
//! Every identifier and target is checked here, and phase origins are
//! resolved into concrete lane and crossing sets, so extraction itself only
//! reads the engine.

use std::collections::BTreeSet;

use crate::engine::{SignalLink, UserClass};
use crate::error::{ConfigurationError, UnsupportedFeatureError};
use crate::extract::{ExtractionQuery, Feature, Origin, SignalFeature, SignalQuery};
use crate::program::PhaseProgram;
use crate::variables::{Target, VariableTemplate};

/// What one mapping entry reads from the engine.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Source {
    /// A single lane.
    Lane(String),
    /// Vehicle lanes granted green under one phase, sorted.
    Lanes(Vec<String>),
    /// Pedestrians waiting on walking areas for one of these crossings.
    Crossings(BTreeSet<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Binding {
    pub source: Source,
    pub target: Target,
}

/// A validated user query.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Plan {
    Count {
        class: UserClass,
        bindings: Vec<Binding>,
    },
    /// Validated, but fails on first execution.
    Unsupported {
        feature: &'static str,
        origin: &'static str,
    },
}

impl Plan {
    pub fn unsupported_error(&self) -> Option<UnsupportedFeatureError> {
        match self {
            Self::Unsupported { feature, origin } => Some(UnsupportedFeatureError {
                feature: *feature,
                origin: *origin,
            }),
            Self::Count { .. } => None,
        }
    }
}

/// Everything a query is validated against.
pub(crate) struct ValidationContext<'a> {
    pub tls_id: &'a str,
    pub program: &'a PhaseProgram,
    pub template: &'a VariableTemplate,
    pub lanes: &'a BTreeSet<String>,
    pub links: &'a [SignalLink],
}

fn parse_phase(ctx: &ValidationContext<'_>, raw: &str) -> Result<usize, ConfigurationError> {
    let unknown = || ConfigurationError::UnknownPhase {
        tls: ctx.tls_id.to_string(),
        phase: raw.to_string(),
        count: ctx.program.len(),
    };
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(unknown());
    }
    let phase: usize = raw.parse().map_err(|_| unknown())?;
    if phase >= ctx.program.len() {
        return Err(unknown());
    }
    Ok(phase)
}

fn phase_source(ctx: &ValidationContext<'_>, phase: usize, class: UserClass) -> Source {
    let green = ctx.program.green_heads(phase).filter_map(|head| ctx.links.get(head));

    if class == UserClass::Pedestrian {
        let crossings = green
            .filter(|link| link.is_pedestrian())
            .map(|link| link.outgoing_edge().to_string())
            .collect();
        Source::Crossings(crossings)
    } else {
        let lanes: BTreeSet<String> = green
            .filter(|link| !link.is_pedestrian())
            .map(|link| link.incoming.clone())
            .collect();
        Source::Lanes(lanes.into_iter().collect())
    }
}

/// Validates a user query and resolves its sources.
pub(crate) fn validate_query(
    ctx: &ValidationContext<'_>,
    query: &ExtractionQuery,
) -> Result<Plan, ConfigurationError> {
    let mut bindings = Vec::with_capacity(query.mapping.len());

    for (origin_id, target) in query.mapping.iter() {
        ctx.template.check_target(target)?;

        let source = match query.origin {
            Origin::Lane => {
                if !ctx.lanes.contains(origin_id) {
                    return Err(ConfigurationError::UnknownLane {
                        lane: origin_id.to_string(),
                    });
                }
                Some(Source::Lane(origin_id.to_string()))
            }
            Origin::Phase => {
                let phase = parse_phase(ctx, origin_id)?;
                Some(phase_source(ctx, phase, query.user_class))
            }
            // No detector interface exists; only targets can be checked.
            Origin::Detector => None,
        };

        if let Some(source) = source {
            bindings.push(Binding {
                source,
                target: target.clone(),
            });
        }
    }

    if query.feature != Feature::Count || query.origin == Origin::Detector {
        return Ok(Plan::Unsupported {
            feature: query.feature.name(),
            origin: query.origin.name(),
        });
    }

    Ok(Plan::Count {
        class: query.user_class,
        bindings,
    })
}

/// Validates a signal query against the template.
pub(crate) fn validate_signal(
    template: &VariableTemplate,
    query: &SignalQuery,
) -> Result<(), ConfigurationError> {
    match query.feature {
        SignalFeature::ElapsedTime | SignalFeature::IntegerPhase => {
            template.check_target(&query.to_variable)
        }
        SignalFeature::BinaryPhase => match &query.to_variable {
            Target::Key(key) => template.check_sequence(key, 1),
            Target::Slot(key, _) => Err(ConfigurationError::ShapeMismatch {
                key: key.clone(),
                expected: "a plain sequence key",
            }),
        },
    }
}
