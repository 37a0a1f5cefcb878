//! Progress state: the mutable record of where the user is in the wizard
//! and the form data collected so far.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info};

use crate::error::OnboardingError;

use super::completion::CompletionTracker;
use super::inheritance::InheritanceToggles;
use super::plan::{EntityKind, PlanStepCatalog, PlanType, StepDefinition, sub_steps};

/// The validated output of one sub-step form.
pub type FormFields = Map<String, Value>;

/// Form data for one entity, keyed by sub-step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityFormData {
    sub_steps: BTreeMap<String, FormFields>,
}

impl EntityFormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow-merge `payload` into the fields stored under `sub_step`.
    ///
    /// Keys absent from `payload` are kept.
    pub fn merge(&mut self, sub_step: &str, payload: FormFields) {
        let fields = self.sub_steps.entry(sub_step.to_string()).or_default();
        for (key, value) in payload {
            fields.insert(key, value);
        }
    }

    pub fn sub_step(&self, sub_step: &str) -> Option<&FormFields> {
        self.sub_steps.get(sub_step)
    }

    pub fn field(&self, sub_step: &str, name: &str) -> Option<&Value> {
        self.sub_steps.get(sub_step).and_then(|fields| fields.get(name))
    }

    pub fn set_field(&mut self, sub_step: &str, name: &str, value: Value) {
        self.sub_steps
            .entry(sub_step.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormFields)> {
        self.sub_steps.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.sub_steps.is_empty()
    }
}

/// Form data for every entity in the attempt.
pub type EntityDataMap = BTreeMap<EntityKind, EntityFormData>;

/// Serializable view of the wizard position and completion set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub plan_type: Option<PlanType>,
    pub current_step: u32,
    pub current_sub_step: String,
    #[serde(default)]
    pub completed_steps: BTreeSet<String>,
}

impl ProgressRecord {
    /// Check the record against the catalog. Returns the plan it belongs to.
    pub fn validate(&self) -> Result<PlanType, OnboardingError> {
        let plan = self.plan_type.ok_or(OnboardingError::NoPlanSelected)?;
        if !PlanStepCatalog::is_valid_position(plan, self.current_step, &self.current_sub_step) {
            return Err(OnboardingError::InvariantViolation(format!(
                "step {} / sub-step '{}' is not part of the {plan} plan",
                self.current_step, self.current_sub_step
            )));
        }
        Ok(plan)
    }
}

/// Default weekly schedule seeded into every `schedule` sub-step.
///
/// Sunday to Thursday are working days, Friday and Saturday are off.
pub fn default_schedule() -> FormFields {
    const DAYS: [(&str, bool); 7] = [
        ("sunday", true),
        ("monday", true),
        ("tuesday", true),
        ("wednesday", true),
        ("thursday", true),
        ("friday", false),
        ("saturday", false),
    ];

    let working_hours: Vec<Value> = DAYS
        .iter()
        .map(|(day, working)| {
            if *working {
                json!({"day_of_week": day, "is_working": true, "start_time": "08:00", "end_time": "17:00"})
            } else {
                json!({"day_of_week": day, "is_working": false})
            }
        })
        .collect();

    let mut fields = FormFields::new();
    fields.insert("working_hours".to_string(), Value::Array(working_hours));
    fields
}

/// Owns all reads and writes of wizard progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressState {
    plan_type: Option<PlanType>,
    current_step: u32,
    current_sub_step: String,
    completion: CompletionTracker,
    entity_data: EntityDataMap,
    inheritance: InheritanceToggles,
}

impl ProgressState {
    /// A state with no plan selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a plan and reset all progress to its first sub-step.
    pub fn set_plan_type(&mut self, plan: PlanType) {
        let first = &PlanStepCatalog::steps(plan)[0];

        self.plan_type = Some(plan);
        self.current_step = first.id;
        self.current_sub_step = first.first_sub_step().to_string();
        self.completion.clear();
        self.entity_data.clear();
        self.inheritance = InheritanceToggles::default();

        for step in PlanStepCatalog::steps(plan) {
            if step.has_sub_step(sub_steps::SCHEDULE) {
                self.entity_data
                    .entry(step.entity)
                    .or_default()
                    .merge(sub_steps::SCHEDULE, default_schedule());
            }
        }

        info!(plan = %plan, "Onboarding plan selected");
    }

    /// Drop the plan and every piece of collected data.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn plan_type(&self) -> Option<PlanType> {
        self.plan_type
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn current_sub_step(&self) -> &str {
        &self.current_sub_step
    }

    /// The step definition the user is currently on.
    pub fn current_step_definition(&self) -> Option<&'static StepDefinition> {
        self.plan_type
            .and_then(|plan| PlanStepCatalog::step(plan, self.current_step))
    }

    pub fn completion(&self) -> &CompletionTracker {
        &self.completion
    }

    pub(crate) fn completion_mut(&mut self) -> &mut CompletionTracker {
        &mut self.completion
    }

    pub fn inheritance(&self) -> &InheritanceToggles {
        &self.inheritance
    }

    pub(crate) fn inheritance_mut(&mut self) -> &mut InheritanceToggles {
        &mut self.inheritance
    }

    pub fn entity_data(&self, entity: EntityKind) -> Option<&EntityFormData> {
        self.entity_data.get(&entity)
    }

    pub(crate) fn entity_data_mut(&mut self, entity: EntityKind) -> &mut EntityFormData {
        self.entity_data.entry(entity).or_default()
    }

    pub fn all_entity_data(&self) -> &EntityDataMap {
        &self.entity_data
    }

    /// Shallow-merge a sub-step payload into an entity's bag.
    pub fn merge_entity_data(&mut self, entity: EntityKind, sub_step: &str, payload: FormFields) {
        self.entity_data.entry(entity).or_default().merge(sub_step, payload);
    }

    /// Move the step/sub-step pointers. Rejects positions outside the plan.
    pub(crate) fn set_position(&mut self, step: u32, sub_step: &str) -> Result<(), OnboardingError> {
        let plan = self.plan_type.ok_or(OnboardingError::NoPlanSelected)?;
        if !PlanStepCatalog::is_valid_position(plan, step, sub_step) {
            let message = format!("step {step} / sub-step '{sub_step}' is not part of the {plan} plan");
            error!(plan = %plan, step, sub_step, "Progress invariant violated");
            return Err(OnboardingError::InvariantViolation(message));
        }
        self.current_step = step;
        self.current_sub_step = sub_step.to_string();
        Ok(())
    }

    /// Verify the pointers still address a real position.
    pub fn check_invariants(&self) -> Result<(), OnboardingError> {
        if self.plan_type.is_none() {
            return Ok(());
        }
        self.snapshot().validate().map(|_| ()).inspect_err(|e| {
            error!(error = %e, "Progress invariant violated");
        })
    }

    /// Full read of the progress record.
    pub fn snapshot(&self) -> ProgressRecord {
        ProgressRecord {
            plan_type: self.plan_type,
            current_step: self.current_step,
            current_sub_step: self.current_sub_step.clone(),
            completed_steps: self.completion.keys().map(String::from).collect(),
        }
    }

    /// Full write of the progress record. Form data is left untouched.
    ///
    /// An invalid record is rejected without modifying the state.
    pub fn restore(&mut self, record: &ProgressRecord) -> Result<(), OnboardingError> {
        let plan = record.validate().inspect_err(|e| {
            error!(error = %e, "Refusing to restore invalid progress record");
        })?;
        self.plan_type = Some(plan);
        self.current_step = record.current_step;
        self.current_sub_step = record.current_sub_step.clone();
        self.completion = CompletionTracker::from_keys(plan, &record.completed_steps);
        Ok(())
    }

    /// Rebuild a full state from persisted parts.
    pub(crate) fn from_parts(
        record: &ProgressRecord,
        entity_data: EntityDataMap,
        inheritance: InheritanceToggles,
    ) -> Result<Self, OnboardingError> {
        let mut state = Self {
            entity_data,
            inheritance,
            ..Self::default()
        };
        state.restore(record)?;
        Ok(state)
    }
}
