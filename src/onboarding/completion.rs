//! Completion tracking at sub-step granularity.
//!
//! Only composite `"<step>-<sub_step>"` keys are stored. Whole-step
//! completion is derived by checking that every sub-step of the step is
//! present, so the progress percentage can never double count. Plain
//! `"<step>"` keys are still accepted on input and expanded.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::plan::{PlanStepCatalog, PlanType, StepDefinition};

/// Build the completion key for one sub-step.
pub fn sub_step_key(step_name: &str, sub_step: &str) -> String {
    format!("{step_name}-{sub_step}")
}

/// The set of completed sub-steps for one onboarding attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionTracker {
    keys: BTreeSet<String>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a tracker from raw keys, expanding whole-step keys into
    /// their sub-step keys and dropping keys that `plan` does not know.
    pub fn from_keys<I, S>(plan: PlanType, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tracker = Self::new();
        for key in keys {
            let key = key.as_ref();
            if let Some(step) = PlanStepCatalog::step_by_name(plan, key) {
                tracker.mark_all(step);
                continue;
            }
            let known = key.split_once('-').is_some_and(|(step_name, sub_step)| {
                PlanStepCatalog::step_by_name(plan, step_name)
                    .is_some_and(|s| s.has_sub_step(sub_step))
            });
            if known {
                tracker.keys.insert(key.to_string());
            } else {
                debug!(plan = %plan, key, "Dropping unknown completion key");
            }
        }
        tracker
    }

    /// Record one sub-step as done. Returns true if it was not already recorded.
    pub fn mark_sub_step_completed(&mut self, step_name: &str, sub_step: &str) -> bool {
        self.keys.insert(sub_step_key(step_name, sub_step))
    }

    /// Record every sub-step of `step_name` as done.
    ///
    /// Returns false if `plan` has no such step.
    pub fn mark_step_completed(&mut self, plan: PlanType, step_name: &str) -> bool {
        match PlanStepCatalog::step_by_name(plan, step_name) {
            Some(step) => {
                self.mark_all(step);
                true
            }
            None => false,
        }
    }

    fn mark_all(&mut self, step: &StepDefinition) {
        for sub_step in step.sub_steps {
            self.keys.insert(sub_step_key(step.name(), sub_step));
        }
    }

    pub fn is_sub_step_completed(&self, step_name: &str, sub_step: &str) -> bool {
        self.keys.contains(&sub_step_key(step_name, sub_step))
    }

    /// True when every sub-step of `step_name` is recorded.
    pub fn is_step_completed(&self, plan: PlanType, step_name: &str) -> bool {
        PlanStepCatalog::step_by_name(plan, step_name).is_some_and(|step| self.covers(step))
    }

    fn covers(&self, step: &StepDefinition) -> bool {
        step.sub_steps
            .iter()
            .all(|sub_step| self.is_sub_step_completed(step.name(), sub_step))
    }

    /// Whether the user may navigate to `target`.
    ///
    /// Already-reached steps are always open. Forward targets require every
    /// earlier step to be fully complete. Targets outside the plan are closed.
    pub fn can_proceed_to_step(&self, plan: PlanType, current_step: u32, target: u32) -> bool {
        if target == 0 || target > PlanStepCatalog::total_steps(plan) {
            return false;
        }
        if target <= current_step {
            return true;
        }
        PlanStepCatalog::steps(plan)
            .iter()
            .take_while(|step| step.id < target)
            .all(|step| self.covers(step))
    }

    /// Percentage of the plan's sub-steps that are complete, rounded.
    pub fn progress_percentage(&self, plan: PlanType) -> u8 {
        let total = PlanStepCatalog::total_sub_steps(plan);
        if total == 0 {
            return 0;
        }
        let done = PlanStepCatalog::steps(plan)
            .iter()
            .flat_map(|step| step.sub_steps.iter().map(move |s| (step.name(), *s)))
            .filter(|(step_name, sub_step)| self.is_sub_step_completed(step_name, sub_step))
            .count();
        ((done * 100 + total / 2) / total) as u8
    }

    /// True when every step of `plan` is complete.
    pub fn is_plan_completed(&self, plan: PlanType) -> bool {
        PlanStepCatalog::steps(plan).iter().all(|step| self.covers(step))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_step_key_format() {
        assert_eq!(sub_step_key("clinic", "contact"), "clinic-contact");
    }

    #[test]
    fn step_completion_aggregates_sub_steps() {
        let mut tracker = CompletionTracker::new();
        tracker.mark_sub_step_completed("company", "overview");
        tracker.mark_sub_step_completed("company", "contact");
        assert!(!tracker.is_step_completed(PlanType::Company, "company"));

        tracker.mark_sub_step_completed("company", "legal");
        assert!(tracker.is_step_completed(PlanType::Company, "company"));
    }

    #[test]
    fn mark_step_completed_inserts_sub_step_keys_only() {
        let mut tracker = CompletionTracker::new();
        assert!(tracker.mark_step_completed(PlanType::Company, "company"));
        assert_eq!(tracker.len(), 3);
        assert!(tracker.keys().all(|k| k.starts_with("company-")));
        assert!(!tracker.mark_step_completed(PlanType::Clinic, "company"));
    }

    #[test]
    fn from_keys_expands_legacy_step_keys() {
        let tracker = CompletionTracker::from_keys(
            PlanType::Company,
            ["company", "complex-overview", "bogus-key", "clinic-nope"],
        );
        assert!(tracker.is_step_completed(PlanType::Company, "company"));
        assert!(tracker.is_sub_step_completed("complex", "overview"));
        assert_eq!(tracker.len(), 4);
    }

    #[test]
    fn progress_does_not_double_count() {
        let mut tracker = CompletionTracker::new();
        tracker.mark_sub_step_completed("clinic", "overview");
        tracker.mark_sub_step_completed("clinic", "contact");
        assert_eq!(tracker.progress_percentage(PlanType::Clinic), 50);

        tracker.mark_step_completed(PlanType::Clinic, "clinic");
        assert_eq!(tracker.progress_percentage(PlanType::Clinic), 100);
    }

    #[test]
    fn progress_rounds() {
        // company plan has 3 + 4 + 5 = 12 sub-steps
        let mut tracker = CompletionTracker::new();
        tracker.mark_sub_step_completed("company", "overview");
        assert_eq!(tracker.progress_percentage(PlanType::Company), 8);
    }

    #[test]
    fn backward_gate_is_open() {
        let tracker = CompletionTracker::new();
        assert!(tracker.can_proceed_to_step(PlanType::Company, 3, 1));
        assert!(tracker.can_proceed_to_step(PlanType::Company, 3, 3));
    }

    #[test]
    fn forward_gate_requires_prior_steps() {
        let mut tracker = CompletionTracker::new();
        tracker.mark_step_completed(PlanType::Company, "company");
        assert!(tracker.can_proceed_to_step(PlanType::Company, 1, 2));
        assert!(!tracker.can_proceed_to_step(PlanType::Company, 1, 3));

        tracker.mark_step_completed(PlanType::Company, "complex");
        assert!(tracker.can_proceed_to_step(PlanType::Company, 1, 3));
    }

    #[test]
    fn out_of_range_targets_are_closed() {
        let tracker = CompletionTracker::new();
        assert!(!tracker.can_proceed_to_step(PlanType::Company, 3, 0));
        assert!(!tracker.can_proceed_to_step(PlanType::Company, 3, 4));
    }

    #[test]
    fn serializes_as_plain_key_list() {
        let mut tracker = CompletionTracker::new();
        tracker.mark_sub_step_completed("clinic", "overview");
        let json = serde_json::to_value(&tracker).unwrap();
        assert_eq!(json, serde_json::json!(["clinic-overview"]));
    }
}
