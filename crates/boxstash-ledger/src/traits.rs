use async_trait::async_trait;

use boxstash_types::{BoxKey, StoreLimits};

use crate::account::{Account, SignedBatch, TxId};
use crate::error::LedgerResult;

/// Submits batches to the ledger and reads boxes back.
///
/// `execute` returns once the batch is confirmed, with one id per call in
/// batch order. Timeouts and retries are the implementation's business;
/// whatever surfaces as an error is final for that submission.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Limits the deployed program enforces.
    async fn limits(&self) -> LedgerResult<StoreLimits>;

    /// Address that receives rent for the application.
    async fn app_address(&self) -> LedgerResult<[u8; 32]>;

    async fn execute(&self, batch: &SignedBatch) -> LedgerResult<Vec<TxId>>;

    /// Raw value of one box. `LedgerError::NotFound` when absent.
    async fn read_box(&self, key: &BoxKey) -> LedgerResult<Vec<u8>>;
}

/// Source of signing accounts.
pub trait KeySource: Send + Sync {
    fn accounts(&self) -> LedgerResult<Vec<Account>>;

    /// The first account, the one tools act as by default.
    fn default_account(&self) -> LedgerResult<Account> {
        self.accounts()?
            .into_iter()
            .next()
            .ok_or_else(|| crate::error::LedgerError::NoAccounts("key source is empty".into()))
    }
}
