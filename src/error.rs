//! Error types for the onboarding wizard.

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Why a field's async validation is blocking submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingReason {
    /// A check for the latest input has not resolved yet.
    InFlight,
    /// The latest check resolved negatively (e.g. the name is taken).
    Rejected(String),
}

impl std::fmt::Display for PendingReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InFlight => write!(f, "please wait for validation to finish"),
            Self::Rejected(message) => write!(f, "please fix this field: {message}"),
        }
    }
}

/// Wizard session errors. All are recoverable at the session level.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("Cannot move to step {target}: {reason}")]
    IllegalTransition { target: u32, reason: String },

    #[error("Progress invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Validation pending for {field}: {reason}")]
    ValidationPending { field: String, reason: PendingReason },

    #[error("Missing required field {entity}.{field}")]
    MissingRequiredField { entity: String, field: String },

    #[error("Invalid field {entity}.{field}: {reason}")]
    InvalidField {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("Persisted progress is corrupt: {0}")]
    PersistenceCorruption(String),

    #[error("No plan type selected")]
    NoPlanSelected,

    #[error("Completing onboarding failed: {0}")]
    CompletionFailed(String),

    #[error("Remote progress sync failed: {0}")]
    Remote(String),

    #[error("Store error: {0}")]
    Store(#[from] DatabaseError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
