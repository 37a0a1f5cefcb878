//! OnboardingSession: wires progress state, navigation, persistence and
//! validation into the flow driven by the wizard forms.
//!
//! Every mutation is followed by a snapshot handed to the persistence gateway
//! in the background. The gateway orders writes by snapshot sequence, so a
//! slow early save never overwrites a later one. Persistence failures are
//! logged and never fail the user-facing action.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::WizardConfig;
use crate::error::OnboardingError;

use super::inheritance::{ResolvedField, backfill, resolve_entity_field};
use super::navigation::{Navigation, NavigationController};
use super::persistence::{PersistenceGateway, RemoteProgressSource};
use super::plan::{EntityKind, PlanStepCatalog, PlanType};
use super::state::{FormFields, ProgressState};
use super::submission::{CompleteOnboardingPayload, OnboardingCompleter, UserData, build_final_payload};
use super::validation::{AvailabilityCheck, ValidationGate};

/// Serializable summary of where an attempt stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardingStatus {
    pub plan_type: Option<PlanType>,
    pub current_step: u32,
    pub current_sub_step: String,
    pub total_steps: u32,
    pub progress_percentage: u8,
    pub complete: bool,
}

/// One user's pass through the onboarding wizard.
pub struct OnboardingSession {
    config: WizardConfig,
    state: ProgressState,
    persistence: Arc<PersistenceGateway>,
    validation: ValidationGate,
    pending_saves: Vec<JoinHandle<()>>,
}

impl OnboardingSession {
    pub fn new(config: WizardConfig, persistence: Arc<PersistenceGateway>) -> Self {
        Self {
            config,
            state: ProgressState::new(),
            persistence,
            validation: ValidationGate::new(),
            pending_saves: Vec::new(),
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn config(&self) -> &WizardConfig {
        &self.config
    }

    /// Restore the persisted attempt, if any.
    ///
    /// `remote` is consulted only when remote sync is enabled and there is no
    /// local record. Returns whether an attempt was restored.
    pub async fn resume(
        &mut self,
        remote: Option<&dyn RemoteProgressSource>,
    ) -> Result<bool, OnboardingError> {
        self.flush().await;
        let remote = remote.filter(|_| self.config.remote_sync);
        let Some(persisted) = self.persistence.load_or_fetch(remote).await? else {
            return Ok(false);
        };
        let seq = persisted.seq;
        match persisted.into_state() {
            Ok(state) => {
                self.state = state;
                info!(
                    plan = ?self.state.plan_type(),
                    step = self.state.current_step(),
                    sub_step = self.state.current_sub_step(),
                    seq,
                    "Resumed onboarding progress"
                );
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "Persisted onboarding progress is unusable, starting fresh");
                Ok(false)
            }
        }
    }

    /// Select a plan. Any previous progress and validation state is discarded.
    pub async fn start(&mut self, plan: PlanType) {
        self.state.set_plan_type(plan);
        self.validation.reset();
        self.persist();
    }

    /// Accept the validated output of the current form and move on.
    ///
    /// The payload is merged and the form marked complete even when the move
    /// itself is rejected, so the user never loses submitted input.
    pub async fn submit_current(&mut self, payload: FormFields) -> Result<Navigation, OnboardingError> {
        let plan = self.state.plan_type().ok_or(OnboardingError::NoPlanSelected)?;
        self.state.check_invariants()?;
        let step = self.state.current_step_definition().ok_or_else(|| {
            OnboardingError::InvariantViolation(format!(
                "current step {} is not part of the plan",
                self.state.current_step()
            ))
        })?;
        let sub_step = self.state.current_sub_step().to_string();

        self.state.merge_entity_data(step.entity, &sub_step, payload);
        self.state.completion_mut().mark_sub_step_completed(step.name(), &sub_step);
        if sub_step == step.last_sub_step() && self.state.completion().is_step_completed(plan, step.name()) {
            info!(plan = %plan, step = step.id, name = step.name(), "Onboarding step completed");
        }

        let outcome = NavigationController::new(&mut self.state).advance_sub_step();
        self.persist();
        outcome
    }

    /// Go back one form, crossing into the previous step at its last form.
    pub async fn go_back(&mut self) -> Result<Navigation, OnboardingError> {
        let outcome = NavigationController::new(&mut self.state).retreat_sub_step()?;
        if matches!(outcome, Navigation::Moved { .. }) {
            self.persist();
        }
        Ok(outcome)
    }

    /// Jump to a step (and optionally a form within it) from the stepper.
    pub async fn jump_to(&mut self, step: u32, sub_step: Option<&str>) -> Result<Navigation, OnboardingError> {
        let outcome = NavigationController::new(&mut self.state).jump_to_step(step, sub_step)?;
        self.persist();
        Ok(outcome)
    }

    /// Turn inheritance from the parent entity on or off for `child`.
    ///
    /// Turning it on copies the parent's inheritable values into empty child
    /// fields. Returns the `sub_step.field` names that were filled.
    pub async fn set_inheritance(
        &mut self,
        child: EntityKind,
        enabled: bool,
    ) -> Result<Vec<String>, OnboardingError> {
        let plan = self.state.plan_type().ok_or(OnboardingError::NoPlanSelected)?;
        let parent = child.parent_in(plan).ok_or_else(|| OnboardingError::InvalidField {
            entity: child.to_string(),
            field: "inherits_from_parent".to_string(),
            reason: format!("{child} has no parent entity in the {plan} plan"),
        })?;

        self.state.inheritance_mut().set(child, enabled);
        let mut filled = Vec::new();
        if enabled {
            if let Some(parent_data) = self.state.entity_data(parent).cloned() {
                filled = backfill(self.state.entity_data_mut(child), &parent_data);
            }
        }
        info!(plan = %plan, entity = %child, enabled, filled = filled.len(), "Inheritance toggled");
        self.persist();
        Ok(filled)
    }

    /// Effective value of a field, taking inheritance into account.
    pub fn resolve_field(&self, entity: EntityKind, sub_step: &str, field: &str) -> ResolvedField<'_> {
        let parent = self
            .state
            .plan_type()
            .and_then(|plan| entity.parent_in(plan))
            .and_then(|p| self.state.entity_data(p));
        resolve_entity_field(
            self.state.entity_data(entity),
            parent,
            self.state.inheritance().is_enabled(entity),
            sub_step,
            field,
        )
    }

    /// Register an async check for `field`, using the configured debounce.
    pub fn register_validator(&mut self, field: impl Into<String>, check: Arc<dyn AvailabilityCheck>) {
        self.validation
            .register(field, check, self.config.validation_debounce);
    }

    /// Feed a new input value to a registered field's check.
    ///
    /// Returns false when no check is registered for `field`.
    pub fn validate_field(&self, field: &str, value: impl Into<String>) -> bool {
        self.validation.submit(field, value)
    }

    pub fn validation(&self) -> &ValidationGate {
        &self.validation
    }

    /// Drop all progress and the persisted record.
    pub async fn reset(&mut self) -> Result<(), OnboardingError> {
        self.flush().await;
        self.state.reset();
        self.validation.reset();
        self.persistence.clear().await?;
        info!("Onboarding session reset");
        Ok(())
    }

    /// Build the final payload and hand it to `completer`.
    ///
    /// On success the session and its persisted record are cleared. On
    /// failure both are retained so the user can retry.
    pub async fn finish(
        &mut self,
        user: &UserData,
        completer: &dyn OnboardingCompleter,
    ) -> Result<CompleteOnboardingPayload, OnboardingError> {
        let plan = self.state.plan_type().ok_or(OnboardingError::NoPlanSelected)?;
        if !self.state.completion().is_plan_completed(plan) {
            return Err(OnboardingError::IllegalTransition {
                target: PlanStepCatalog::total_steps(plan) + 1,
                reason: "complete prior steps first".to_string(),
            });
        }

        self.validation
            .settle(self.config.validation_settle_timeout)
            .await?;

        let payload = build_final_payload(
            plan,
            self.state.all_entity_data(),
            self.state.inheritance(),
            user,
        )?;

        if let Err(e) = completer.complete(&payload).await {
            warn!(plan = %plan, error = %e, "Completing onboarding failed, keeping progress");
            return Err(OnboardingError::CompletionFailed(e.to_string()));
        }

        self.flush().await;
        self.state.reset();
        self.validation.reset();
        if let Err(e) = self.persistence.clear().await {
            warn!(error = %e, "Failed to clear persisted onboarding progress");
        }
        info!(plan = %plan, "Onboarding completed");
        Ok(payload)
    }

    pub fn status(&self) -> OnboardingStatus {
        status_of(&self.state)
    }

    /// Wait for every background save issued so far.
    pub async fn flush(&mut self) {
        for task in self.pending_saves.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Background progress save did not finish");
            }
        }
    }

    fn persist(&mut self) {
        let snapshot = self.persistence.snapshot(&self.state);
        self.pending_saves.retain(|task| !task.is_finished());
        self.pending_saves.push(self.persistence.spawn_save(snapshot));
    }
}

/// Status of a progress state, with or without a live session.
pub fn status_of(state: &ProgressState) -> OnboardingStatus {
    let plan = state.plan_type();
    OnboardingStatus {
        plan_type: plan,
        current_step: state.current_step(),
        current_sub_step: state.current_sub_step().to_string(),
        total_steps: plan.map(PlanStepCatalog::total_steps).unwrap_or(0),
        progress_percentage: plan.map(|p| state.completion().progress_percentage(p)).unwrap_or(0),
        complete: plan.is_some_and(|p| state.completion().is_plan_completed(p)),
    }
}
