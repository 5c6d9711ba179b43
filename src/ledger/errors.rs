use thiserror::Error;

/// Errors produced by the ledger engines and the stores behind them.
///
/// Business-rule rejections (`NotFound` through `NotAvailable`, plus `Invalid`) are
/// ordinary results the caller maps to a response. Storage faults are the only kind an
/// API layer may retry. `InvariantViolation` means stored state contradicts the data
/// model and should be investigated rather than retried.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Referenced user, habit, item, user item or pet does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The entity exists but belongs to another user.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The habit was already completed during the current calendar day.
    #[error("habit already completed today")]
    AlreadyCompletedToday,

    /// A non-stackable item is already in the user's inventory.
    #[error("item already owned")]
    AlreadyOwned,

    /// The user's balance does not cover the price.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    /// The item is outside its seasonal window.
    #[error("item not available: {0}")]
    NotAvailable(String),

    /// Input rejected before touching the store (bad name, zero target, duplicate user).
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Observed state contradicts a data model invariant.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },
}

impl LedgerError {
    /// Storage-layer faults; the only errors a caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::Sled(_) | LedgerError::Io(_)
        )
    }

    /// Business-rule rejections that should be reported to the user as-is.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::NotFound(_)
                | LedgerError::Forbidden(_)
                | LedgerError::AlreadyCompletedToday
                | LedgerError::AlreadyOwned
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::NotAvailable(_)
                | LedgerError::Invalid(_)
        )
    }
}
