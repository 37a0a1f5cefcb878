//! Clinic onboarding: the progress state machine behind the account setup wizard.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
