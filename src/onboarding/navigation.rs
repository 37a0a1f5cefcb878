//! Step and sub-step transitions.
//!
//! Moves are nested: sub-step moves fall through to step moves at the edges
//! of a step. Backward moves are never gated. Forward moves across a step
//! boundary, and jumps, require [`CompletionTracker::can_proceed_to_step`].
//!
//! [`CompletionTracker::can_proceed_to_step`]: super::completion::CompletionTracker::can_proceed_to_step

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::OnboardingError;

use super::plan::{PlanStepCatalog, PlanType, StepDefinition};
use super::state::ProgressState;

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Navigation {
    /// The pointers now address this position.
    Moved { step: u32, sub_step: String },
    /// Moved past the last step with every step complete.
    WizardComplete,
    /// Moved back from the very first sub-step. The caller decides where to go.
    LeaveWizard,
}

/// Drives `(current_step, current_sub_step)` over a borrowed progress state.
pub struct NavigationController<'a> {
    state: &'a mut ProgressState,
}

impl<'a> NavigationController<'a> {
    pub fn new(state: &'a mut ProgressState) -> Self {
        Self { state }
    }

    fn plan(&self) -> Result<PlanType, OnboardingError> {
        self.state.plan_type().ok_or(OnboardingError::NoPlanSelected)
    }

    fn current(&self) -> Result<&'static StepDefinition, OnboardingError> {
        self.plan()?;
        self.state.current_step_definition().ok_or_else(|| {
            OnboardingError::InvariantViolation(format!(
                "current step {} is not part of the plan",
                self.state.current_step()
            ))
        })
    }

    fn current_index(&self) -> Result<(&'static StepDefinition, usize), OnboardingError> {
        let step = self.current()?;
        let index = step.position(self.state.current_sub_step()).ok_or_else(|| {
            OnboardingError::InvariantViolation(format!(
                "sub-step '{}' is not part of step {}",
                self.state.current_sub_step(),
                step.id
            ))
        })?;
        Ok((step, index))
    }

    fn move_to(&mut self, step: u32, sub_step: &str) -> Result<Navigation, OnboardingError> {
        self.state.set_position(step, sub_step)?;
        debug!(step, sub_step, "Navigated");
        Ok(Navigation::Moved {
            step,
            sub_step: sub_step.to_string(),
        })
    }

    /// Next form within the step, or the next step's first form.
    pub fn advance_sub_step(&mut self) -> Result<Navigation, OnboardingError> {
        let (step, index) = self.current_index()?;
        match step.sub_steps.get(index + 1) {
            Some(next) => self.move_to(step.id, next),
            None => self.advance_step(),
        }
    }

    /// Previous form within the step, or the previous step's last form.
    pub fn retreat_sub_step(&mut self) -> Result<Navigation, OnboardingError> {
        let (step, index) = self.current_index()?;
        match index.checked_sub(1) {
            Some(prev) => self.move_to(step.id, step.sub_steps[prev]),
            None => self.retreat_step(),
        }
    }

    /// First form of the next step. Past the last step this reports
    /// [`Navigation::WizardComplete`] without moving.
    pub fn advance_step(&mut self) -> Result<Navigation, OnboardingError> {
        let plan = self.plan()?;
        let step = self.current()?;
        let target = step.id + 1;
        let completion = self.state.completion();

        if target > PlanStepCatalog::total_steps(plan) {
            if completion.is_plan_completed(plan) {
                info!(plan = %plan, "Onboarding wizard complete");
                return Ok(Navigation::WizardComplete);
            }
            return Err(OnboardingError::IllegalTransition {
                target,
                reason: "complete prior steps first".to_string(),
            });
        }

        if !completion.can_proceed_to_step(plan, step.id, target) {
            return Err(OnboardingError::IllegalTransition {
                target,
                reason: format!("complete the {} step first", step.name()),
            });
        }

        let next = PlanStepCatalog::step(plan, target).ok_or_else(|| {
            OnboardingError::InvariantViolation(format!("step {target} missing from catalog"))
        })?;
        self.move_to(next.id, next.first_sub_step())
    }

    /// Last form of the previous step, or [`Navigation::LeaveWizard`] at step 1.
    pub fn retreat_step(&mut self) -> Result<Navigation, OnboardingError> {
        let plan = self.plan()?;
        let step = self.current()?;
        match step.id.checked_sub(1).and_then(|id| PlanStepCatalog::step(plan, id)) {
            Some(prev) => self.move_to(prev.id, prev.last_sub_step()),
            None => Ok(Navigation::LeaveWizard),
        }
    }

    /// Jump to `step`, optionally to a specific form within it.
    ///
    /// Rejected without mutation when the gate is closed or the sub-step
    /// does not belong to the target step.
    pub fn jump_to_step(
        &mut self,
        step: u32,
        sub_step: Option<&str>,
    ) -> Result<Navigation, OnboardingError> {
        let plan = self.plan()?;
        let current = self.state.current_step();

        if !self.state.completion().can_proceed_to_step(plan, current, step) {
            warn!(plan = %plan, from = current, to = step, "Rejected jump to unfinished step");
            return Err(OnboardingError::IllegalTransition {
                target: step,
                reason: "complete prior steps first".to_string(),
            });
        }

        let target = PlanStepCatalog::step(plan, step).ok_or_else(|| {
            OnboardingError::InvariantViolation(format!("step {step} missing from catalog"))
        })?;
        let sub_step = match sub_step {
            Some(key) if target.has_sub_step(key) => key,
            Some(key) => {
                return Err(OnboardingError::IllegalTransition {
                    target: step,
                    reason: format!("'{key}' is not a form of the {} step", target.name()),
                });
            }
            None => target.first_sub_step(),
        };
        self.move_to(target.id, sub_step)
    }
}
