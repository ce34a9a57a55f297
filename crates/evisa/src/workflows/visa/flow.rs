//! Step sequencing for the multi-page application form.
//!
//! Forward moves are gated on the step validator; backward moves never are. Transition
//! methods take `&mut self`, so one controller can only ever have a single transition in
//! flight. Mutation happens after the validator resolves, which keeps a dropped `go_next`
//! future from leaving the state half-updated.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::blueprint::{FormBlueprint, StepDefinition, StepId};
use super::domain::FieldKey;

/// Per-field messages produced by a failing step validation.
pub type FieldErrors = BTreeMap<FieldKey, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    Passed,
    Failed(FieldErrors),
}

impl StepVerdict {
    pub fn from_errors(errors: FieldErrors) -> Self {
        if errors.is_empty() {
            StepVerdict::Passed
        } else {
            StepVerdict::Failed(errors)
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, StepVerdict::Passed)
    }
}

/// Checks the fields belonging to one step. May suspend, e.g. for cross-field lookups.
pub trait StepValidator: Sync {
    fn validate_step(&self, step: &StepDefinition) -> impl Future<Output = StepVerdict> + Send;
}

/// External record of the current step, such as the `step` query parameter.
pub trait PositionIndicator: Send {
    fn read(&self) -> Option<String>;
    fn write(&mut self, step: StepId);
}

/// Position indicator backed by the raw `step` query parameter value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStep {
    raw: Option<String>,
}

impl QueryStep {
    pub fn new(raw: Option<String>) -> Self {
        Self { raw }
    }

    pub fn value(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    pub fn to_query(&self) -> Option<String> {
        self.raw.as_ref().map(|raw| format!("step={raw}"))
    }
}

impl PositionIndicator for QueryStep {
    fn read(&self) -> Option<String> {
        self.raw.clone()
    }

    fn write(&mut self, step: StepId) {
        self.raw = Some(step.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Advanced { from: StepId, to: StepId },
    /// The last step validated; there is no successor, so checkout may open.
    FinalValidationPassed { step: StepId },
    Blocked { step: StepId, errors: FieldErrors },
    Retreated { from: StepId, to: StepId },
    AtFirstStep,
}

impl TransitionOutcome {
    pub fn moved(&self) -> bool {
        matches!(
            self,
            TransitionOutcome::Advanced { .. } | TransitionOutcome::Retreated { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowState {
    pub current_step: StepId,
    /// `None` until the step has been validated (or after its inputs changed).
    pub step_validity: BTreeMap<StepId, Option<bool>>,
    pub final_validation_passed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepLookup<'a> {
    Known(&'a StepDefinition),
    Unknown(StepId),
}

pub struct StepFlowController<P = QueryStep> {
    blueprint: Arc<FormBlueprint>,
    state: FlowState,
    indicator: P,
}

impl<P: PositionIndicator> StepFlowController<P> {
    /// Start a flow, adopting the indicator's step when it names one of the form's steps.
    ///
    /// Anything else that is present (out of range, not an integer) resets to step 1 and the
    /// corrected value is written back so the indicator never disagrees with the flow.
    pub fn start(blueprint: Arc<FormBlueprint>, mut indicator: P) -> Self {
        let requested = indicator.read();
        let current_step = match requested.as_deref().map(str::trim) {
            None => StepId::FIRST,
            Some(raw) => match raw.parse::<u32>().map(StepId) {
                Ok(step) if blueprint.contains_step(step) => step,
                _ => {
                    debug!(requested = raw, "normalizing out-of-range step indicator");
                    indicator.write(StepId::FIRST);
                    StepId::FIRST
                }
            },
        };

        let step_validity = blueprint.steps().iter().map(|step| (step.id, None)).collect();

        Self {
            blueprint,
            state: FlowState {
                current_step,
                step_validity,
                final_validation_passed: false,
            },
            indicator,
        }
    }

    pub fn current_step(&self) -> StepId {
        self.state.current_step
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn indicator(&self) -> &P {
        &self.indicator
    }

    pub fn blueprint(&self) -> &FormBlueprint {
        &self.blueprint
    }

    pub fn is_last_step(&self) -> bool {
        self.state.current_step == self.blueprint.last_step()
    }

    pub fn current_step_definition(&self) -> StepLookup<'_> {
        match self.blueprint.step(self.state.current_step) {
            Some(step) => StepLookup::Known(step),
            None => StepLookup::Unknown(self.state.current_step),
        }
    }

    /// `(current - 1) / (N - 1)`, or `0` for single-step forms.
    pub fn progress_ratio(&self) -> f64 {
        let total = self.blueprint.step_count();
        if total <= 1 {
            return 0.0;
        }
        let position = self.state.current_step.0.saturating_sub(1).min(total - 1);
        f64::from(position) / f64::from(total - 1)
    }

    pub async fn go_next<V>(&mut self, validator: &V) -> TransitionOutcome
    where
        V: StepValidator,
    {
        let from = self.state.current_step;
        let blueprint = Arc::clone(&self.blueprint);

        let verdict = match blueprint.step(from) {
            Some(step) => validator.validate_step(step).await,
            None => StepVerdict::Passed,
        };

        self.state
            .step_validity
            .insert(from, Some(verdict.passed()));

        match verdict {
            StepVerdict::Failed(errors) => {
                debug!(step = %from, failures = errors.len(), "step validation blocked transition");
                self.state.final_validation_passed = false;
                TransitionOutcome::Blocked { step: from, errors }
            }
            StepVerdict::Passed if from < blueprint.last_step() => {
                let to = StepId(from.0 + 1);
                self.state.current_step = to;
                self.indicator.write(to);
                debug!(%from, %to, "advanced to next step");
                TransitionOutcome::Advanced { from, to }
            }
            StepVerdict::Passed => {
                self.state.final_validation_passed = true;
                debug!(step = %from, "final step validated");
                TransitionOutcome::FinalValidationPassed { step: from }
            }
        }
    }

    pub fn go_previous(&mut self) -> TransitionOutcome {
        let from = self.state.current_step;
        if from <= StepId::FIRST {
            return TransitionOutcome::AtFirstStep;
        }

        let to = StepId(from.0 - 1);
        self.state.current_step = to;
        self.indicator.write(to);
        debug!(%from, %to, "returned to previous step");
        TransitionOutcome::Retreated { from, to }
    }

    /// Forget validation results from `step` onward, e.g. after an answer on that step changed.
    /// Later steps are included because their rules may read earlier answers.
    pub fn invalidate_from(&mut self, step: StepId) {
        for (id, validity) in self.state.step_validity.iter_mut() {
            if *id >= step {
                *validity = None;
            }
        }
        self.state.final_validation_passed = false;
    }

    pub fn step_validity(&self, step: StepId) -> Option<bool> {
        self.state.step_validity.get(&step).copied().flatten()
    }

    /// True when every step before `step` has been validated and passed since its last edit.
    pub fn all_steps_valid_through(&self, step: StepId) -> bool {
        self.state
            .step_validity
            .range(..step)
            .all(|(_, validity)| *validity == Some(true))
    }
}
