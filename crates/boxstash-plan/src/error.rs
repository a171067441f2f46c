use boxstash_types::TypeError;

/// Errors raised while planning, before anything is submitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("blob is empty; at least one byte is required")]
    EmptyBlob,

    #[error("invalid store limits: {0}")]
    Limits(#[from] TypeError),

    #[error("chunk size must be positive")]
    ZeroChunkSize,

    #[error("slot range {start}..={end} is empty")]
    InvalidSlotRange { start: u64, end: u64 },

    #[error("batch for {key} declares {declared} references but touches {required}")]
    ReferenceBudget {
        key: String,
        declared: usize,
        required: usize,
    },

    #[error("batch holds {calls} calls, limit is {max}")]
    TooManyCalls { calls: usize, max: usize },

    #[error("rent for {blob_len} bytes overflows u64")]
    CostOverflow { blob_len: u64 },
}

/// Result alias for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;
