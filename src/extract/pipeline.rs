//! Extraction pipeline bound to one controller.

use std::collections::BTreeSet;

use crate::controller::ControllerState;
use crate::engine::{SimulationEngine, UserClass};
use crate::error::{ControlError, ControlResult};
use crate::extract::validation::{validate_query, validate_signal, Binding, Plan, Source, ValidationContext};
use crate::extract::{ExtractionSpec, SignalFeature, SignalQuery};
use crate::program::PhaseProgram;
use crate::variables::{Target, VariableStore, VariableTemplate};

/// Minimum waiting time (seconds) for a pedestrian to count as a request.
const PEDESTRIAN_MIN_WAIT: f64 = 1.0;

/// Validated queries plus the variable store they write into.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    tls_id: String,
    plans: Vec<Plan>,
    signals: Vec<SignalQuery>,
    walking_areas: Vec<String>,
    template: VariableTemplate,
    store: VariableStore,
}

impl ExtractionPipeline {
    /// Validates `spec` and binds a fresh store built from `template`.
    ///
    /// # Errors
    /// - `ConfigurationError` for any unknown lane, phase or target, or a
    ///   target of the wrong shape.
    /// - `EngineError` if the engine cannot list lanes, edges or links.
    pub fn new(
        tls_id: impl Into<String>,
        program: &PhaseProgram,
        template: VariableTemplate,
        spec: &ExtractionSpec,
        engine: &dyn SimulationEngine,
    ) -> ControlResult<Self> {
        let tls_id = tls_id.into();
        let lanes: BTreeSet<String> = engine.lane_ids()?.into_iter().collect();
        let links = engine.controlled_links(&tls_id)?;
        let walking_prefix = format!(":{tls_id}_w");
        let walking_areas = engine
            .edge_ids()?
            .into_iter()
            .filter(|e| e.starts_with(&walking_prefix))
            .collect();

        let ctx = ValidationContext {
            tls_id: &tls_id,
            program,
            template: &template,
            lanes: &lanes,
            links: &links,
        };

        let plans = spec
            .user_data
            .iter()
            .map(|q| validate_query(&ctx, q))
            .collect::<Result<Vec<_>, _>>()?;
        for signal in &spec.tls_data {
            validate_signal(&template, signal)?;
        }

        let store = VariableStore::from_template(&template);
        Ok(Self {
            tls_id,
            plans,
            signals: spec.tls_data.clone(),
            walking_areas,
            template,
            store,
        })
    }

    /// A pipeline with no queries.
    #[must_use]
    pub fn empty(tls_id: impl Into<String>, template: VariableTemplate) -> Self {
        let store = VariableStore::from_template(&template);
        Self {
            tls_id: tls_id.into(),
            plans: Vec::new(),
            signals: Vec::new(),
            walking_areas: Vec::new(),
            template,
            store,
        }
    }

    /// Resets the store and re-runs every query.
    ///
    /// # Errors
    /// - `UnsupportedFeatureError` on the first query that is declared but
    ///   not implemented.
    /// - `EngineError` if the engine fails a read.
    pub fn extract(
        &mut self,
        engine: &dyn SimulationEngine,
        state: &ControllerState,
    ) -> ControlResult<&VariableStore> {
        self.store.reset();

        for plan in &self.plans {
            if let Some(err) = plan.unsupported_error() {
                return Err(err.into());
            }
            let Plan::Count { class, bindings } = plan else {
                continue;
            };
            for binding in bindings {
                let count = count_source(engine, &self.walking_areas, binding, *class)?;
                accumulate(&mut self.store, &binding.target, f64::from(count))?;
            }
        }

        for signal in &self.signals {
            apply_signal(&mut self.store, signal, state)?;
        }

        tracing::trace!(tls = %self.tls_id, variables = self.store.len(), "extracted variables");
        Ok(&self.store)
    }

    /// Current store contents.
    #[must_use]
    pub fn variables(&self) -> &VariableStore {
        &self.store
    }

    /// Declared variable shape.
    #[must_use]
    pub fn template(&self) -> &VariableTemplate {
        &self.template
    }
}

fn accumulate(store: &mut VariableStore, target: &Target, amount: f64) -> ControlResult<()> {
    if store.accumulate(target, amount) {
        Ok(())
    } else {
        Err(ControlError::internal(format!("target {target} vanished from the variable store")))
    }
}

fn count_source(
    engine: &dyn SimulationEngine,
    walking_areas: &[String],
    binding: &Binding,
    class: UserClass,
) -> ControlResult<u32> {
    match &binding.source {
        Source::Lane(lane) => Ok(engine.lane_agent_count(lane, class)?),
        Source::Lanes(lanes) => {
            let mut total = 0;
            for lane in lanes {
                total += engine.lane_agent_count(lane, class)?;
            }
            Ok(total)
        }
        Source::Crossings(crossings) => {
            if crossings.is_empty() {
                return Ok(0);
            }
            let mut total = 0;
            for edge in walking_areas {
                for person in engine.persons_on_edge(edge)? {
                    if engine.person_waiting_time(&person)? < PEDESTRIAN_MIN_WAIT {
                        continue;
                    }
                    if let Some(next) = engine.person_next_edge(&person)? {
                        if crossings.contains(&next) {
                            total += 1;
                        }
                    }
                }
            }
            Ok(total)
        }
    }
}

fn apply_signal(store: &mut VariableStore, signal: &SignalQuery, state: &ControllerState) -> ControlResult<()> {
    #[allow(clippy::cast_precision_loss)]
    let assigned = match signal.feature {
        SignalFeature::ElapsedTime => store.assign(&signal.to_variable, state.elapsed as f64),
        SignalFeature::IntegerPhase => store.assign(&signal.to_variable, state.phase as f64),
        SignalFeature::BinaryPhase => {
            let slot = Target::Slot(signal.to_variable.key().to_string(), state.phase);
            // Phases beyond the sequence (transitions) leave it all-zero.
            store.value(&slot).is_none() || store.assign(&slot, 1.0)
        }
    };
    if assigned {
        Ok(())
    } else {
        Err(ControlError::internal(format!(
            "signal target {} vanished from the variable store",
            signal.to_variable
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{InMemoryEngine, SignalLink};
    use crate::extract::{ExtractionQuery, Mapping, Origin};
    use crate::program::Phase;
    use crate::variables::Variable;

    fn engine() -> InMemoryEngine {
        let program = PhaseProgram::new(vec![
            Phase::new("GGrr", 20.0),
            Phase::new("rrGG", 20.0),
        ])
        .unwrap();
        InMemoryEngine::new()
            .with_traffic_light(
                "C",
                program,
                vec![
                    SignalLink::new("L1", "O1"),
                    SignalLink::new(":C_w0_0", ":C_c0_0"),
                    SignalLink::new("L2", "O2"),
                    SignalLink::new(":C_w1_0", ":C_c1_0"),
                ],
            )
            .with_lane("L9")
    }

    fn pipeline(engine: &InMemoryEngine, template: VariableTemplate, spec: ExtractionSpec) -> ExtractionPipeline {
        let program = engine.phase_program("C").unwrap();
        ExtractionPipeline::new("C", &program, template, &spec, engine).unwrap()
    }

    #[test]
    fn test_lane_count_ignores_unrelated_lanes() {
        let mut e = engine();
        e.set_lane_count("L1", UserClass::Passenger, 3).unwrap();
        e.set_lane_count("L9", UserClass::Passenger, 8).unwrap();
        e.set_lane_count("L1", UserClass::Bus, 2).unwrap();

        let spec = ExtractionSpec::new().query(ExtractionQuery::count(
            UserClass::Passenger,
            Origin::Lane,
            Mapping::new().entry("L1", "cars"),
        ));
        let mut p = pipeline(&e, VariableTemplate::new().scalar("cars"), spec);
        let vars = p.extract(&e, &ControllerState::default()).unwrap();
        assert_eq!(vars.get("cars"), Some(&Variable::Scalar(3.0)));
    }

    #[test]
    fn test_extraction_resets_between_calls() {
        let mut e = engine();
        e.set_lane_count("L1", UserClass::Passenger, 3).unwrap();
        let spec = ExtractionSpec::new().query(ExtractionQuery::count(
            UserClass::Passenger,
            Origin::Lane,
            Mapping::new().entry("L1", "cars"),
        ));
        let mut p = pipeline(&e, VariableTemplate::new().scalar("cars"), spec);
        p.extract(&e, &ControllerState::default()).unwrap();
        e.set_lane_count("L1", UserClass::Passenger, 1).unwrap();
        let vars = p.extract(&e, &ControllerState::default()).unwrap();
        assert_eq!(vars.value(&"cars".into()), Some(1.0));
    }

    #[test]
    fn test_repeated_query_accumulates() {
        let mut e = engine();
        e.set_lane_count("L1", UserClass::Passenger, 3).unwrap();
        let q = ExtractionQuery::count(UserClass::Passenger, Origin::Lane, Mapping::new().entry("L1", "cars"));
        let spec = ExtractionSpec::new().query(q.clone()).query(q);
        let mut p = pipeline(&e, VariableTemplate::new().scalar("cars"), spec);
        let vars = p.extract(&e, &ControllerState::default()).unwrap();
        assert_eq!(vars.value(&"cars".into()), Some(6.0));
    }

    #[test]
    fn test_phase_count_sums_green_lanes() {
        let mut e = engine();
        e.set_lane_count("L1", UserClass::Passenger, 2).unwrap();
        e.set_lane_count("L2", UserClass::Passenger, 5).unwrap();
        let spec = ExtractionSpec::new().query(ExtractionQuery::count(
            UserClass::Passenger,
            Origin::Phase,
            Mapping::new().entry("0", ("queue", 0)).entry("1", ("queue", 1)),
        ));
        let mut p = pipeline(&e, VariableTemplate::new().sequence("queue", 2), spec);
        let vars = p.extract(&e, &ControllerState::default()).unwrap();
        assert_eq!(vars.get("queue"), Some(&Variable::Sequence(vec![2.0, 5.0])));
    }

    #[test]
    fn test_pedestrian_phase_count_requires_waiting_and_destination() {
        let mut e = engine().with_edge(":C_w0").with_edge(":C_w1").with_edge(":D_w0");
        // Waiting for crossing c0 (green in phase 0).
        e.add_person("p1", ":C_w0", 4.0, Some(":C_c0")).unwrap();
        e.add_person("p2", ":C_w1", 2.0, Some(":C_c0")).unwrap();
        // Just arrived, not yet waiting.
        e.add_person("p3", ":C_w0", 0.0, Some(":C_c0")).unwrap();
        // Waiting for the other crossing.
        e.add_person("p4", ":C_w0", 9.0, Some(":C_c1")).unwrap();
        // Walking area of another intersection.
        e.add_person("p5", ":D_w0", 9.0, Some(":C_c0")).unwrap();
        // Leaving, no next edge.
        e.add_person("p6", ":C_w1", 9.0, None).unwrap();

        let spec = ExtractionSpec::new().query(ExtractionQuery::count(
            UserClass::Pedestrian,
            Origin::Phase,
            Mapping::new().entry("0", ("ped", 0)).entry("1", ("ped", 1)),
        ));
        let mut p = pipeline(&e, VariableTemplate::new().sequence("ped", 2), spec);
        let vars = p.extract(&e, &ControllerState::default()).unwrap();
        assert_eq!(vars.get("ped"), Some(&Variable::Sequence(vec![2.0, 1.0])));
    }

    #[test]
    fn test_signal_features() {
        let e = engine();
        let spec = ExtractionSpec::new()
            .signal(SignalFeature::ElapsedTime, "green")
            .signal(SignalFeature::IntegerPhase, "phase")
            .signal(SignalFeature::BinaryPhase, "active");
        let template = VariableTemplate::new()
            .scalar("green")
            .scalar("phase")
            .sequence("active", 2);
        let mut p = pipeline(&e, template, spec);

        let vars = p.extract(&e, &ControllerState { phase: 1, elapsed: 7 }).unwrap();
        assert_eq!(vars.value(&"green".into()), Some(7.0));
        assert_eq!(vars.value(&"phase".into()), Some(1.0));
        assert_eq!(vars.get("active"), Some(&Variable::Sequence(vec![0.0, 1.0])));

        let vars = p.extract(&e, &ControllerState { phase: 3, elapsed: 0 }).unwrap();
        assert_eq!(vars.get("active"), Some(&Variable::Sequence(vec![0.0, 0.0])));
    }

    #[test]
    fn test_unsupported_feature_fails_on_extract() {
        let e = engine();
        let mut q = ExtractionQuery::count(UserClass::Passenger, Origin::Lane, Mapping::new().entry("L1", "cars"));
        q.feature = crate::extract::Feature::WaitingTime;
        let mut p = pipeline(&e, VariableTemplate::new().scalar("cars"), ExtractionSpec::new().query(q));
        let err = p.extract(&e, &ControllerState::default()).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_invalid_target_fails_construction() {
        let e = engine();
        let spec = ExtractionSpec::new().query(ExtractionQuery::count(
            UserClass::Passenger,
            Origin::Lane,
            Mapping::new().entry("L1", "bikes"),
        ));
        let program = e.phase_program("C").unwrap();
        let err = ExtractionPipeline::new("C", &program, VariableTemplate::new().scalar("cars"), &spec, &e)
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
