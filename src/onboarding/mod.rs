//! Onboarding wizard core.
//!
//! A new account picks a plan (company, complex or clinic) and walks through
//! one step per entity, each split into sub-step forms. This module decides
//! which form the user is on, whether they may move, what data has been
//! collected, and what finally gets sent to the backend.

pub mod completion;
pub mod inheritance;
pub mod manager;
pub mod navigation;
pub mod persistence;
pub mod plan;
pub mod state;
pub mod submission;
pub mod validation;

pub use completion::CompletionTracker;
pub use inheritance::{InheritanceToggles, ResolvedField, backfill, resolve_field};
pub use manager::{OnboardingSession, OnboardingStatus, status_of};
pub use navigation::{Navigation, NavigationController};
pub use persistence::{
    PersistedProgress, PersistenceGateway, ProgressStore, RemoteProgressSource, SettingsProgressStore,
};
pub use plan::{EntityKind, PlanStepCatalog, PlanType, StepDefinition};
pub use state::{EntityFormData, FormFields, ProgressRecord, ProgressState};
pub use submission::{CompleteOnboardingPayload, OnboardingCompleter, UserData, build_final_payload};
pub use validation::{Availability, AvailabilityCheck, FieldStatus, FieldValidator, ValidationGate};
