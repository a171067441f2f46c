use boxstash_ledger::LedgerError;
use boxstash_plan::PlanError;
use boxstash_types::{BlobStatus, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    /// Store constants missing, inconsistent, or different from the
    /// deployed program's. Raised before any submission.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("blob is empty")]
    EmptyInput,

    /// The remote program refused a batch. Nothing in that batch applied.
    #[error("remote rejected batch: {0}")]
    RemoteRejection(String),

    #[error("no metadata recorded for owner {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("blob of {owner} is {status}, not ready")]
    StillUploading { owner: String, status: BlobStatus },

    #[error("data validation failed: {0}")]
    DataValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PlanError> for SdkError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::EmptyBlob => Self::EmptyInput,
            other => Self::Configuration(other.to_string()),
        }
    }
}

impl From<TypeError> for SdkError {
    fn from(err: TypeError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<LedgerError> for SdkError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected { .. } | LedgerError::InvalidBatch(_) => {
                Self::RemoteRejection(err.to_string())
            }
            LedgerError::NotFound(key) => Self::NotFound(key.to_string()),
            LedgerError::Transport(msg) => Self::Transport(msg),
            LedgerError::NoAccounts(msg) => Self::Configuration(msg),
            LedgerError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;
    use boxstash_types::BoxKey;

    #[test]
    fn ledger_errors_map_to_taxonomy() {
        assert!(matches!(
            SdkError::from(LedgerError::rejected(2, "bad rent")),
            SdkError::RemoteRejection(msg) if msg.contains("call 2")
        ));
        assert!(matches!(
            SdkError::from(LedgerError::NotFound(BoxKey::Slot(3))),
            SdkError::NotFound(_)
        ));
        assert!(matches!(
            SdkError::from(LedgerError::Transport("timeout".into())),
            SdkError::Transport(msg) if msg == "timeout"
        ));
    }

    #[test]
    fn empty_blob_is_empty_input() {
        assert!(matches!(SdkError::from(PlanError::EmptyBlob), SdkError::EmptyInput));
        assert!(matches!(
            SdkError::from(PlanError::ZeroChunkSize),
            SdkError::Configuration(_)
        ));
    }
}
