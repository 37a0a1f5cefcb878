//! Debounced async field validation with a latest-request-wins contract.
//!
//! Every new input supersedes the previous request: the earlier task is
//! aborted, and if its result still arrives it is dropped because the field
//! status no longer carries its generation. Final submission consults the
//! [`ValidationGate`], which waits for in-flight checks to settle and then
//! rejects any field that is still pending or came back negative.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{OnboardingError, PendingReason};

/// Outcome of one uniqueness/format check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub available: bool,
    #[serde(default)]
    pub message: String,
}

/// An async predicate over a field value, e.g. "is this name taken".
#[async_trait]
pub trait AvailabilityCheck: Send + Sync {
    async fn check(&self, value: &str) -> Result<Availability, OnboardingError>;
}

/// Where a field's validation stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStatus {
    /// Nothing submitted yet.
    Idle,
    /// A check for `value` is debouncing or in flight.
    Pending { generation: u64, value: String },
    /// The latest check finished.
    Resolved {
        generation: u64,
        value: String,
        availability: Availability,
    },
}

impl FieldStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// Validation state for a single field.
pub struct FieldValidator {
    field: String,
    check: Arc<dyn AvailabilityCheck>,
    debounce: Duration,
    generation: AtomicU64,
    status: Arc<watch::Sender<FieldStatus>>,
    inflight: Mutex<Option<JoinHandle<()>>>,
}

impl FieldValidator {
    pub fn new(field: impl Into<String>, check: Arc<dyn AvailabilityCheck>, debounce: Duration) -> Self {
        let (status, _) = watch::channel(FieldStatus::Idle);
        Self {
            field: field.into(),
            check,
            debounce,
            generation: AtomicU64::new(0),
            status: Arc::new(status),
            inflight: Mutex::new(None),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn status(&self) -> FieldStatus {
        self.status.borrow().clone()
    }

    /// Validate a new input value, superseding any outstanding request.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, value: impl Into<String>) {
        let value = value.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.status.send_replace(FieldStatus::Pending {
            generation,
            value: value.clone(),
        });

        let check = Arc::clone(&self.check);
        let status = Arc::clone(&self.status);
        let debounce = self.debounce;
        let field = self.field.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let availability = match check.check(&value).await {
                Ok(availability) => availability,
                Err(e) => Availability {
                    available: false,
                    message: e.to_string(),
                },
            };
            status.send_if_modified(|current| match current {
                FieldStatus::Pending { generation: latest, .. } if *latest == generation => {
                    *current = FieldStatus::Resolved {
                        generation,
                        value,
                        availability,
                    };
                    true
                }
                _ => {
                    debug!(field = %field, generation, "Discarding stale validation result");
                    false
                }
            });
        });

        let previous = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Wait until the latest request resolves or `timeout` elapses, then
    /// return the status at that point.
    pub async fn wait_settled(&self, timeout: Duration) -> FieldStatus {
        let mut rx = self.status.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|s| !s.is_pending())).await {
            Ok(Ok(status)) => status.clone(),
            _ => self.status(),
        }
    }

    /// Forget the current input: abort any outstanding check and go back to
    /// [`FieldStatus::Idle`]. A result that still lands is discarded.
    pub fn reset(&self) {
        let previous = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(previous) = previous {
            previous.abort();
        }
        self.status.send_replace(FieldStatus::Idle);
    }

    /// Whether the current status allows submission.
    pub fn ensure_ready(&self) -> Result<(), OnboardingError> {
        match self.status() {
            FieldStatus::Idle => Ok(()),
            FieldStatus::Pending { .. } => Err(OnboardingError::ValidationPending {
                field: self.field.clone(),
                reason: PendingReason::InFlight,
            }),
            FieldStatus::Resolved { availability, .. } if !availability.available => {
                Err(OnboardingError::ValidationPending {
                    field: self.field.clone(),
                    reason: PendingReason::Rejected(availability.message),
                })
            }
            FieldStatus::Resolved { .. } => Ok(()),
        }
    }
}

impl Drop for FieldValidator {
    fn drop(&mut self) {
        if let Ok(mut inflight) = self.inflight.lock() {
            if let Some(task) = inflight.take() {
                task.abort();
            }
        }
    }
}

/// All async-validated fields of a wizard session.
#[derive(Default)]
pub struct ValidationGate {
    fields: BTreeMap<String, FieldValidator>,
}

impl ValidationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a validated field, replacing any previous validator for it.
    pub fn register(
        &mut self,
        field: impl Into<String>,
        check: Arc<dyn AvailabilityCheck>,
        debounce: Duration,
    ) -> &FieldValidator {
        let field = field.into();
        let validator = FieldValidator::new(field.clone(), check, debounce);
        self.fields.insert(field.clone(), validator);
        &self.fields[&field]
    }

    pub fn validator(&self, field: &str) -> Option<&FieldValidator> {
        self.fields.get(field)
    }

    /// Feed a new input value to `field`. Unregistered fields are ignored.
    pub fn submit(&self, field: &str, value: impl Into<String>) -> bool {
        match self.fields.get(field) {
            Some(validator) => {
                validator.submit(value);
                true
            }
            None => false,
        }
    }

    /// Return every field to idle. Registrations are kept.
    pub fn reset(&self) {
        for validator in self.fields.values() {
            validator.reset();
        }
        debug!(fields = self.fields.len(), "Validation state reset");
    }

    /// Wait up to `timeout` for every field to settle, then require all of
    /// them to be ready.
    pub async fn settle(&self, timeout: Duration) -> Result<(), OnboardingError> {
        let deadline = tokio::time::Instant::now() + timeout;
        for validator in self.fields.values() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            validator.wait_settled(remaining).await;
        }
        self.fields.values().try_for_each(FieldValidator::ensure_ready)
    }
}
