use thiserror::Error;

use crate::validation::NameError;

/// Errors that can arise while reading or mutating character growth state.
#[derive(Debug, Error)]
pub enum GrowthError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Cache snapshots and event payloads are JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned by `create_*` when the row already exists.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Spendable balance is below what the operation needs.
    #[error("not enough {kind} points: need {required}, have {available}")]
    InsufficientPoints {
        kind: &'static str,
        required: u32,
        available: u32,
    },

    #[error("attribute {attribute} is at maximum ({max})")]
    AttributeAtMaximum { attribute: String, max: u32 },

    #[error("paragon stat {stat} would exceed cap: {current} + {requested} > {cap}")]
    StatCapExceeded {
        stat: String,
        current: u32,
        requested: u32,
        cap: u32,
    },

    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),

    /// Prestige needs the character at or above `required`.
    #[error("character level {current} is below the required level {required}")]
    LevelRequirement { required: u32, current: u32 },

    #[error("unknown mastery type: {0}")]
    UnknownMasteryType(String),

    /// Cache client failures. Services swallow these and fall back to the store.
    #[error("cache error: {0}")]
    Cache(String),

    /// Event sink failures. Services log these and never return them.
    #[error("publish error: {0}")]
    Publish(String),

    #[error("operation timed out")]
    Timeout,

    /// Internal error (poisoned locks, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl GrowthError {
    /// True for caller mistakes that must never be retried and never persist anything.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GrowthError::InsufficientPoints { .. }
                | GrowthError::AttributeAtMaximum { .. }
                | GrowthError::StatCapExceeded { .. }
                | GrowthError::InvalidAllocation(_)
                | GrowthError::InvalidName(_)
                | GrowthError::LevelRequirement { .. }
                | GrowthError::UnknownMasteryType(_)
        )
    }
}
