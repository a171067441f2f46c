use boxstash_types::BoxKey;

/// Errors produced at the ledger boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The remote program or ledger refused the batch. Nothing was applied.
    #[error("batch rejected at call {call}: {reason}")]
    Rejected { call: usize, reason: String },

    /// The batch as a whole was malformed (empty, oversized, badly signed).
    #[error("batch rejected: {0}")]
    InvalidBatch(String),

    #[error("box not found: {0}")]
    NotFound(BoxKey),

    /// Network or node failure. The batch may or may not have been applied.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("no accounts available: {0}")]
    NoAccounts(String),
}

impl LedgerError {
    pub fn rejected(call: usize, reason: impl Into<String>) -> Self {
        Self::Rejected {
            call,
            reason: reason.into(),
        }
    }
}

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
