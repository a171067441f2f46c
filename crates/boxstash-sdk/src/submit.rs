use std::sync::Arc;

use tracing::{debug, warn};

use boxstash_ledger::{Account, LedgerClient, LedgerError, TxId};
use boxstash_plan::Batch;
use boxstash_types::{BoxKey, MetadataRecord, OwnerKey};

use crate::config::RetryPolicy;
use crate::error::{SdkError, SdkResult};

/// Signs batches as one account and submits them to the ledger.
#[derive(Clone)]
pub struct Submitter {
    ledger: Arc<dyn LedgerClient>,
    account: Account,
    retry: RetryPolicy,
}

impl Submitter {
    pub fn new(ledger: Arc<dyn LedgerClient>, account: Account, retry: RetryPolicy) -> Self {
        Self {
            ledger,
            account,
            retry,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Submit once. Any failure is final.
    pub async fn submit(&self, batch: Batch) -> SdkResult<Vec<TxId>> {
        let signed = self.account.sign_batch(batch)?;
        debug!(batch = %signed.batch, "submitting");
        Ok(self.ledger.execute(&signed).await?)
    }

    /// Submit a batch that is safe to apply twice, retrying transport
    /// failures under the retry policy.
    pub async fn submit_idempotent(&self, batch: Batch) -> SdkResult<Vec<TxId>> {
        let signed = self.account.sign_batch(batch)?;
        let mut attempt = 1;
        loop {
            match self.ledger.execute(&signed).await {
                Ok(ids) => return Ok(ids),
                Err(LedgerError::Transport(reason)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        batch = %signed.batch,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %reason,
                        "transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Read and decode the metadata record of `owner`.
pub async fn read_metadata(ledger: &dyn LedgerClient, owner: OwnerKey) -> SdkResult<MetadataRecord> {
    let raw = match ledger.read_box(&BoxKey::Owner(owner)).await {
        Ok(raw) => raw,
        Err(LedgerError::NotFound(_)) => return Err(SdkError::NotFound(owner.to_hex())),
        Err(err) => return Err(err.into()),
    };
    MetadataRecord::decode(&raw)
        .map_err(|e| SdkError::DataValidation(format!("metadata of {}: {e}", owner.short_hex())))
}
