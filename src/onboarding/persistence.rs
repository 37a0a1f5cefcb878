//! Persistence gateway. Saves and restores progress across restarts.
//!
//! Snapshots are stamped with a logical sequence number when taken. The
//! gateway never lets a lower sequence overwrite a higher one, so a delayed
//! write of an older snapshot is dropped instead of clobbering newer state.
//! Only the progress record, form data and inheritance switches are
//! persisted; loading flags and in-flight errors never leave the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{DatabaseError, OnboardingError};
use crate::store::Database;

use super::inheritance::InheritanceToggles;
use super::state::{EntityDataMap, ProgressRecord, ProgressState};

/// Current layout version of [`PersistedProgress`].
pub const PERSISTENCE_VERSION: u32 = 1;

/// Settings keys used for onboarding persistence.
pub mod settings_keys {
    /// Key for the persisted progress JSON blob in the settings table.
    pub const ONBOARDING_PROGRESS: &str = "onboarding_progress";
}

/// Everything persisted for one onboarding attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedProgress {
    pub version: u32,
    /// Logical write order. Higher always wins.
    pub seq: u64,
    pub saved_at: DateTime<Utc>,
    pub record: ProgressRecord,
    #[serde(default)]
    pub entity_data: EntityDataMap,
    #[serde(default)]
    pub inheritance: InheritanceToggles,
}

impl PersistedProgress {
    /// Rebuild the in-memory state.
    pub fn into_state(self) -> Result<ProgressState, OnboardingError> {
        ProgressState::from_parts(&self.record, self.entity_data, self.inheritance)
    }

    /// Parse and check a stored blob against the current layout and catalog.
    pub fn decode(value: serde_json::Value) -> Result<Self, OnboardingError> {
        let persisted: Self = serde_json::from_value(value)
            .map_err(|e| OnboardingError::PersistenceCorruption(format!("unparsable record: {e}")))?;
        if persisted.version != PERSISTENCE_VERSION {
            return Err(OnboardingError::PersistenceCorruption(format!(
                "unsupported version {} (expected {PERSISTENCE_VERSION})",
                persisted.version
            )));
        }
        persisted
            .record
            .validate()
            .map_err(|e| OnboardingError::PersistenceCorruption(e.to_string()))?;
        Ok(persisted)
    }
}

/// Backing store for one persisted attempt.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn read(&self) -> Result<Option<serde_json::Value>, DatabaseError>;
    async fn write(&self, value: &serde_json::Value) -> Result<(), DatabaseError>;
    async fn clear(&self) -> Result<(), DatabaseError>;
}

/// [`ProgressStore`] over the settings table of a [`Database`].
pub struct SettingsProgressStore {
    db: Arc<dyn Database>,
    user_id: String,
}

impl SettingsProgressStore {
    pub fn new(db: Arc<dyn Database>, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl ProgressStore for SettingsProgressStore {
    async fn read(&self) -> Result<Option<serde_json::Value>, DatabaseError> {
        self.db
            .get_setting(&self.user_id, settings_keys::ONBOARDING_PROGRESS)
            .await
    }

    async fn write(&self, value: &serde_json::Value) -> Result<(), DatabaseError> {
        self.db
            .set_setting(&self.user_id, settings_keys::ONBOARDING_PROGRESS, value)
            .await
    }

    async fn clear(&self) -> Result<(), DatabaseError> {
        self.db
            .delete_setting(&self.user_id, settings_keys::ONBOARDING_PROGRESS)
            .await
            .map(|_| ())
    }
}

/// A remote copy of onboarding progress, used only to seed a fresh session.
#[async_trait]
pub trait RemoteProgressSource: Send + Sync {
    async fn fetch(&self) -> Result<Option<serde_json::Value>, OnboardingError>;
}

/// Ordered save/load of onboarding progress.
pub struct PersistenceGateway {
    store: Arc<dyn ProgressStore>,
    next_seq: AtomicU64,
    last_written: Mutex<u64>,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            next_seq: AtomicU64::new(0),
            last_written: Mutex::new(0),
        }
    }

    /// Take a sequenced snapshot of `state`.
    pub fn snapshot(&self, state: &ProgressState) -> PersistedProgress {
        PersistedProgress {
            version: PERSISTENCE_VERSION,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
            saved_at: Utc::now(),
            record: state.snapshot(),
            entity_data: state.all_entity_data().clone(),
            inheritance: state.inheritance().clone(),
        }
    }

    /// Write `snapshot` unless a newer one has already been written.
    ///
    /// Returns false when the snapshot was stale and skipped.
    pub async fn save(&self, snapshot: &PersistedProgress) -> Result<bool, OnboardingError> {
        let mut last_written = self.last_written.lock().await;
        if snapshot.seq <= *last_written {
            debug!(seq = snapshot.seq, last = *last_written, "Skipping stale progress snapshot");
            return Ok(false);
        }

        let value = serde_json::to_value(snapshot)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.store.write(&value).await?;
        *last_written = snapshot.seq;
        debug!(seq = snapshot.seq, "Progress saved");
        Ok(true)
    }

    /// Fire-and-forget save used after every session mutation. Failures are
    /// logged. Ordering is still by `seq`, not by completion order.
    pub fn spawn_save(self: &Arc<Self>, snapshot: PersistedProgress) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = gateway.save(&snapshot).await {
                warn!(seq = snapshot.seq, error = %e, "Failed to persist onboarding progress");
            }
        })
    }

    /// Load the persisted attempt.
    ///
    /// A corrupt, outdated or catalog-invalid record is deleted and reported
    /// as `None`, so the caller starts a fresh session.
    pub async fn load(&self) -> Result<Option<PersistedProgress>, OnboardingError> {
        let Some(value) = self.store.read().await? else {
            return Ok(None);
        };
        match PersistedProgress::decode(value) {
            Ok(persisted) => {
                self.observe(persisted.seq).await;
                Ok(Some(persisted))
            }
            Err(e) => {
                warn!(error = %e, "Discarding persisted onboarding progress");
                if let Err(e) = self.store.clear().await {
                    warn!(error = %e, "Failed to delete discarded onboarding progress");
                }
                Ok(None)
            }
        }
    }

    /// Load the local attempt, falling back to `remote` only when there is
    /// no local record. A record pulled from remote is written locally.
    pub async fn load_or_fetch(
        &self,
        remote: Option<&dyn RemoteProgressSource>,
    ) -> Result<Option<PersistedProgress>, OnboardingError> {
        if let Some(local) = self.load().await? {
            return Ok(Some(local));
        }
        let Some(remote) = remote else {
            return Ok(None);
        };
        let Some(value) = remote.fetch().await? else {
            return Ok(None);
        };
        match PersistedProgress::decode(value) {
            Ok(mut persisted) => {
                persisted.seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
                self.save(&persisted).await?;
                info!(plan = ?persisted.record.plan_type, "Seeded onboarding progress from remote");
                Ok(Some(persisted))
            }
            Err(e) => {
                warn!(error = %e, "Ignoring invalid remote onboarding progress");
                Ok(None)
            }
        }
    }

    /// Delete the persisted attempt. Snapshots taken before this call are
    /// treated as stale afterwards.
    pub async fn clear(&self) -> Result<(), OnboardingError> {
        let mut last_written = self.last_written.lock().await;
        self.store.clear().await?;
        *last_written = self.next_seq.load(Ordering::SeqCst);
        info!("Persisted onboarding progress cleared");
        Ok(())
    }

    /// Continue numbering above a sequence read from the store.
    async fn observe(&self, seq: u64) {
        self.next_seq.fetch_max(seq, Ordering::SeqCst);
        let mut last_written = self.last_written.lock().await;
        *last_written = (*last_written).max(seq);
    }
}
