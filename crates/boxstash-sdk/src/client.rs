use std::sync::Arc;

use tracing::info;

use boxstash_ledger::{Account, KeySource, LedgerClient};
use boxstash_plan::{BatchPlanner, CostBreakdown, CostModel};
use boxstash_types::{DocumentLocator, MetadataRecord, OwnerKey};

use crate::config::ClientConfig;
use crate::delete::DeleteOrchestrator;
use crate::error::{SdkError, SdkResult};
use crate::report::{DeleteReport, UpdateReport, UploadReport};
use crate::resolve;
use crate::submit::{read_metadata, Submitter};
use crate::upload::UploadOrchestrator;

/// High-level boxstash API bound to one account and one application.
///
/// The account's address is the owner key of the blob it uploads and the
/// payer of its rent.
pub struct BoxStash {
    ledger: Arc<dyn LedgerClient>,
    account: Account,
    app_id: u64,
    config: ClientConfig,
    planner: BatchPlanner,
}

impl BoxStash {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        account: Account,
        app_id: u64,
        config: ClientConfig,
    ) -> SdkResult<Self> {
        config.validate()?;
        let planner = BatchPlanner::new(config.limits.clone(), config.call_params)?;
        Ok(Self {
            ledger,
            account,
            app_id,
            config,
            planner,
        })
    }

    /// Act as the key source's default account.
    pub fn from_key_source(
        ledger: Arc<dyn LedgerClient>,
        keys: &dyn KeySource,
        app_id: u64,
        config: ClientConfig,
    ) -> SdkResult<Self> {
        Self::new(ledger, keys.default_account()?, app_id, config)
    }

    pub fn owner(&self) -> OwnerKey {
        self.account.owner_key()
    }

    pub fn locator(&self) -> DocumentLocator {
        DocumentLocator::new(self.owner(), self.app_id)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn estimate(&self, blob_len: u64) -> SdkResult<CostBreakdown> {
        Ok(CostModel::from_limits(&self.config.limits).breakdown(blob_len)?)
    }

    fn submitter(&self) -> Submitter {
        Submitter::new(Arc::clone(&self.ledger), self.account.clone(), self.config.retry)
    }

    pub fn upload_orchestrator(&self) -> UploadOrchestrator {
        UploadOrchestrator::new(
            self.submitter(),
            self.planner.clone(),
            self.config.write_concurrency,
        )
    }

    pub fn delete_orchestrator(&self) -> DeleteOrchestrator {
        DeleteOrchestrator::new(self.submitter(), self.planner.clone())
    }

    /// Store `blob` under this account's owner key.
    pub async fn upload(&self, blob: &[u8]) -> SdkResult<UploadReport> {
        self.upload_orchestrator().run(self.owner(), blob).await
    }

    /// Erase this account's blob and reclaim its rent.
    pub async fn delete(&self) -> SdkResult<DeleteReport> {
        self.delete_orchestrator().run(self.owner()).await
    }

    /// Replace this account's blob, deleting the current one first if any.
    pub async fn update(&self, blob: &[u8]) -> SdkResult<UpdateReport> {
        if blob.is_empty() {
            return Err(SdkError::EmptyInput);
        }
        let deleted = match self.metadata(self.owner()).await {
            Ok(_) => Some(self.delete().await?),
            Err(SdkError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };
        let uploaded = self.upload(blob).await?;
        info!(replaced = deleted.is_some(), "blob updated");
        Ok(UpdateReport { deleted, uploaded })
    }

    pub async fn metadata(&self, owner: OwnerKey) -> SdkResult<MetadataRecord> {
        read_metadata(self.ledger.as_ref(), owner).await
    }

    pub async fn resolve(&self, owner: OwnerKey) -> SdkResult<Vec<u8>> {
        resolve::resolve(self.ledger.as_ref(), owner).await
    }

    /// Resolve a `did:algo:` locator issued by this application.
    pub async fn resolve_locator(&self, locator: &DocumentLocator) -> SdkResult<Vec<u8>> {
        if locator.app_id != self.app_id {
            return Err(SdkError::Configuration(format!(
                "locator names application {}, client is bound to {}",
                locator.app_id, self.app_id
            )));
        }
        self.resolve(locator.owner).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use boxstash_ledger::{InMemoryLedger, LedgerError, LedgerResult, SignedBatch, TxId};
    use boxstash_types::{BlobStatus, BoxKey, StoreLimits};

    use super::*;
    use crate::config::RetryPolicy;
    use crate::delete::DeletePhase;
    use crate::report::Stage;
    use crate::upload::UploadPhase;

    const APP_ID: u64 = 1;
    const FUNDS: u64 = 10_000_000_000;

    /// Fails chosen submissions (1-based) before they reach the ledger.
    struct FlakyLedger {
        inner: InMemoryLedger,
        submissions: AtomicUsize,
        failures: Mutex<HashMap<usize, LedgerError>>,
    }

    impl FlakyLedger {
        fn new(inner: InMemoryLedger, failures: Vec<(usize, LedgerError)>) -> Self {
            Self {
                inner,
                submissions: AtomicUsize::new(0),
                failures: Mutex::new(failures.into_iter().collect()),
            }
        }

        /// Fail the `n`th submission from now (1-based).
        fn fail_upcoming(&self, n: usize, err: LedgerError) {
            let at = self.submissions.load(Ordering::SeqCst) + n;
            self.failures.lock().unwrap().insert(at, err);
        }
    }

    #[async_trait]
    impl LedgerClient for FlakyLedger {
        async fn limits(&self) -> LedgerResult<StoreLimits> {
            self.inner.limits().await
        }

        async fn app_address(&self) -> LedgerResult<[u8; 32]> {
            self.inner.app_address().await
        }

        async fn execute(&self, batch: &SignedBatch) -> LedgerResult<Vec<TxId>> {
            let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(err) = self.failures.lock().unwrap().remove(&n) {
                return Err(err);
            }
            self.inner.execute(batch).await
        }

        async fn read_box(&self, key: &BoxKey) -> LedgerResult<Vec<u8>> {
            self.inner.read_box(key).await
        }
    }

    fn account() -> Account {
        Account::from_seed([42; 32])
    }

    fn funded_ledger() -> Arc<InMemoryLedger> {
        let ledger = InMemoryLedger::new(APP_ID, StoreLimits::default());
        ledger.fund(account().address(), FUNDS).unwrap();
        Arc::new(ledger)
    }

    fn client(ledger: Arc<dyn LedgerClient>, config: ClientConfig) -> BoxStash {
        BoxStash::new(ledger, account(), APP_ID, config).unwrap()
    }

    fn flaky_ledger(failures: Vec<(usize, LedgerError)>) -> Arc<FlakyLedger> {
        let flaky = FlakyLedger::new(InMemoryLedger::new(APP_ID, StoreLimits::default()), failures);
        flaky.inner.fund(account().address(), FUNDS).unwrap();
        Arc::new(flaky)
    }

    fn blob(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn small_blob_uses_one_batch_per_step() {
        let ledger = funded_ledger();
        let stash = client(ledger.clone(), ClientConfig::default());
        let report = stash.upload(b"hello world").await.unwrap();

        assert_eq!(report.batch_count(Stage::Allocate), 1);
        assert_eq!(report.batch_count(Stage::Write), 1);
        assert_eq!(report.batch_count(Stage::Finalize), 1);
        assert_eq!(report.record.slot_count(), 1);
        assert_eq!(report.record.tail_size, 11);

        let accepted = ledger.accepted_batches().unwrap();
        assert_eq!(accepted.len(), 3);
        assert_eq!(accepted[1].len(), 1);
        assert_eq!(report.tx_count(), 2 + 1 + 1);
    }

    #[tokio::test]
    async fn two_slot_blob_layout() {
        let ledger = funded_ledger();
        let stash = client(ledger.clone(), ClientConfig::default());
        let data = blob(64_000);
        let report = stash.upload(&data).await.unwrap();

        assert_eq!(report.record.slot_count(), 2);
        assert_eq!(report.record.tail_size, 31_232);
        let slot_batches: Vec<(Option<u64>, usize)> = report
            .batches
            .iter()
            .filter(|b| b.stage == Stage::Write)
            .map(|b| (b.slot, b.tx_ids.len()))
            .collect();
        let (start, end) = (report.record.start, report.record.end);
        // 17 chunks split 9 + 8, then ceil(31232 / 2002) = 16 in one batch
        assert_eq!(
            slot_batches,
            vec![(Some(start), 9), (Some(start), 8), (Some(end), 16)]
        );
    }

    #[tokio::test]
    async fn uploaded_blob_is_ready_and_resolves() {
        let ledger = funded_ledger();
        let stash = client(ledger.clone(), ClientConfig::default());
        let data = blob(100_000);
        let report = stash.upload(&data).await.unwrap();

        let record = stash.metadata(stash.owner()).await.unwrap();
        assert_eq!(record.status, BlobStatus::Ready);
        assert_eq!(record.slot_count(), report.cost.num_slots);
        assert_eq!(stash.resolve(stash.owner()).await.unwrap(), data);
        assert_eq!(report.digest, blake3::hash(&data).to_hex().to_string());

        let locator: DocumentLocator = stash.locator().to_string().parse().unwrap();
        assert_eq!(stash.resolve_locator(&locator).await.unwrap(), data);
    }

    #[tokio::test]
    async fn delete_removes_metadata_and_returns_rent() {
        let ledger = funded_ledger();
        let stash = client(ledger.clone(), ClientConfig::default());
        let data = blob(70_000);
        let upload = stash.upload(&data).await.unwrap();
        let after_upload = ledger.balance(&account().address()).unwrap();

        let report = stash.delete().await.unwrap();
        assert_eq!(report.slots_erased, 3);
        assert!(matches!(
            stash.metadata(stash.owner()).await,
            Err(SdkError::NotFound(_))
        ));
        assert_eq!(ledger.box_count().unwrap(), 0);
        assert_eq!(ledger.app_balance().unwrap(), InMemoryLedger::APP_MIN_BALANCE);

        // mark: 1000, each erase batch: 2000 + 4 * 1000
        let fees = 1000 + 3 * 6000;
        let after_delete = ledger.balance(&account().address()).unwrap();
        assert_eq!(after_delete, after_upload + upload.cost.total() - fees);

        for batch in ledger.accepted_batches().unwrap().iter().rev().take(3) {
            assert_eq!(batch.count_method("deleteData"), 1);
            assert_eq!(batch.count_method("dummy"), 4);
        }
    }

    #[tokio::test]
    async fn exact_multiple_has_no_empty_slot() {
        let ledger = funded_ledger();
        let stash = client(ledger.clone(), ClientConfig::default());
        let data = blob(65_536);
        let report = stash.upload(&data).await.unwrap();
        assert_eq!(report.record.slot_count(), 2);
        assert_eq!(report.record.tail_size, 32_768);
        assert_eq!(stash.resolve(stash.owner()).await.unwrap(), data);
        stash.delete().await.unwrap();
    }

    #[tokio::test]
    async fn parallel_writes_match_sequential_result() {
        let ledger = funded_ledger();
        let stash = client(
            ledger.clone(),
            ClientConfig::default().with_write_concurrency(4),
        );
        let data = blob(200_000);
        let report = stash.upload(&data).await.unwrap();
        assert_eq!(report.record.slot_count(), 7);
        assert_eq!(stash.resolve(stash.owner()).await.unwrap(), data);

        let slots: Vec<Option<u64>> = report
            .batches
            .iter()
            .filter(|b| b.stage == Stage::Write)
            .map(|b| b.slot)
            .collect();
        let mut sorted = slots.clone();
        sorted.sort();
        assert_eq!(slots, sorted);
    }

    #[tokio::test]
    async fn empty_blob_is_rejected_before_submitting() {
        let ledger = funded_ledger();
        let stash = client(ledger.clone(), ClientConfig::default());
        assert!(matches!(stash.upload(&[]).await, Err(SdkError::EmptyInput)));
        assert!(matches!(stash.update(&[]).await, Err(SdkError::EmptyInput)));
        assert!(ledger.accepted_batches().unwrap().is_empty());
    }

    #[tokio::test]
    async fn limits_mismatch_is_configuration_error() {
        let limits = StoreLimits {
            cost_per_byte: 401,
            ..Default::default()
        };
        let ledger = Arc::new(InMemoryLedger::new(APP_ID, limits));
        ledger.fund(account().address(), FUNDS).unwrap();
        let stash = client(ledger.clone(), ClientConfig::default());
        assert!(matches!(
            stash.upload(b"data").await,
            Err(SdkError::Configuration(_))
        ));
        assert!(ledger.accepted_batches().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_allocation_stops_the_run() {
        let ledger = funded_ledger();
        ledger
            .inject_failure(LedgerError::Transport("node offline".into()))
            .unwrap();
        let stash = client(
            ledger.clone(),
            ClientConfig::default().with_retry(RetryPolicy::linear(3, 1)),
        );
        let mut upload = stash.upload_orchestrator();
        let err = upload.run(stash.owner(), b"hello").await.unwrap_err();
        assert!(matches!(err, SdkError::Transport(_)));
        assert_eq!(upload.phase(), UploadPhase::Failed);
        assert_eq!(ledger.box_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn write_transport_failure_is_retried() {
        let failures = vec![(2, LedgerError::Transport("timeout".into()))];
        let flaky = flaky_ledger(failures);
        let stash = client(
            flaky.clone(),
            ClientConfig::default().with_retry(RetryPolicy::linear(3, 1)),
        );
        stash.upload(b"hello world").await.unwrap();
        assert_eq!(stash.resolve(stash.owner()).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn write_failure_without_retry_is_fatal() {
        let failures = vec![(2, LedgerError::Transport("timeout".into()))];
        let flaky = flaky_ledger(failures);
        let stash = client(flaky.clone(), ClientConfig::default());
        assert!(matches!(
            stash.upload(b"hello world").await,
            Err(SdkError::Transport(_))
        ));
        let record = stash.metadata(stash.owner()).await.unwrap();
        assert_eq!(record.status, BlobStatus::Uploading);
    }

    #[tokio::test]
    async fn unfinished_blob_does_not_resolve() {
        // allocate, write, then the finalize batch is refused
        let failures = vec![(3, LedgerError::rejected(0, "refused"))];
        let flaky = flaky_ledger(failures);
        let stash = client(flaky.clone(), ClientConfig::default());
        assert!(matches!(
            stash.upload(b"hello world").await,
            Err(SdkError::RemoteRejection(_))
        ));
        assert!(matches!(
            stash.resolve(stash.owner()).await,
            Err(SdkError::StillUploading { status: BlobStatus::Uploading, .. })
        ));
    }

    #[tokio::test]
    async fn failed_mark_leaves_blob_ready() {
        let flaky = flaky_ledger(Vec::new());
        let stash = client(flaky.clone(), ClientConfig::default());
        let data = blob(40_000);
        stash.upload(&data).await.unwrap();
        flaky.fail_upcoming(1, LedgerError::Transport("drop".into()));

        let mut delete = stash.delete_orchestrator();
        assert!(matches!(
            delete.run(stash.owner()).await,
            Err(SdkError::Transport(_))
        ));
        assert_eq!(delete.phase(), DeletePhase::Failed);
        assert_eq!(stash.metadata(stash.owner()).await.unwrap().status, BlobStatus::Ready);
        assert_eq!(stash.resolve(stash.owner()).await.unwrap(), data);

        let mut retry = stash.delete_orchestrator();
        let report = retry.run(stash.owner()).await.unwrap();
        assert_eq!(retry.phase(), DeletePhase::Gone);
        assert_eq!(report.slots_erased, 2);
    }

    #[tokio::test]
    async fn failed_erase_stops_delete_and_can_be_resumed() {
        let flaky = flaky_ledger(Vec::new());
        let stash = client(flaky.clone(), ClientConfig::default());
        let data = blob(70_000);
        stash.upload(&data).await.unwrap();
        // mark, erase the first slot, then the second erase is refused
        flaky.fail_upcoming(3, LedgerError::rejected(0, "refused"));

        let mut delete = stash.delete_orchestrator();
        let err = delete.run(stash.owner()).await.unwrap_err();
        assert!(matches!(err, SdkError::RemoteRejection(_)));
        assert_eq!(delete.phase(), DeletePhase::Failed);

        let record = stash.metadata(stash.owner()).await.unwrap();
        assert_eq!(record.status, BlobStatus::Deleting);
        assert_eq!(record.erased, 1);
        assert!(flaky.inner.read_box(&BoxKey::Slot(record.start)).await.is_err());
        for slot in record.remaining_slots() {
            assert!(flaky.inner.read_box(&BoxKey::Slot(slot)).await.is_ok());
        }
        assert!(matches!(
            stash.resolve(stash.owner()).await,
            Err(SdkError::StillUploading { status: BlobStatus::Deleting, .. })
        ));

        let mut resume = stash.delete_orchestrator();
        let report = resume.run(stash.owner()).await.unwrap();
        assert_eq!(resume.phase(), DeletePhase::Gone);
        assert_eq!(report.slots_erased, 2);
        assert!(report
            .batches
            .iter()
            .all(|b| b.stage == Stage::Erase));
        assert!(matches!(
            stash.metadata(stash.owner()).await,
            Err(SdkError::NotFound(_))
        ));
        assert_eq!(flaky.inner.box_count().unwrap(), 0);
        assert_eq!(flaky.inner.app_balance().unwrap(), InMemoryLedger::APP_MIN_BALANCE);
    }

    #[tokio::test]
    async fn update_finishes_an_interrupted_delete() {
        let flaky = flaky_ledger(Vec::new());
        let stash = client(flaky.clone(), ClientConfig::default());
        stash.upload(&blob(70_000)).await.unwrap();
        flaky.fail_upcoming(2, LedgerError::Transport("drop".into()));
        assert!(stash.delete().await.is_err());

        let replacement = b"second version".to_vec();
        let report = stash.update(&replacement).await.unwrap();
        assert_eq!(report.deleted.map(|d| d.slots_erased), Some(3));
        assert_eq!(stash.resolve(stash.owner()).await.unwrap(), replacement);
    }

    #[tokio::test]
    async fn parallel_write_failure_skips_finalize() {
        // submission 1 allocates; a later write is refused
        let flaky = flaky_ledger(vec![(4, LedgerError::rejected(0, "refused"))]);
        let stash = client(
            flaky.clone(),
            ClientConfig::default().with_write_concurrency(4),
        );
        let mut upload = stash.upload_orchestrator();
        let err = upload.run(stash.owner(), &blob(200_000)).await.unwrap_err();
        assert!(matches!(err, SdkError::RemoteRejection(_)));
        assert_eq!(upload.phase(), UploadPhase::Failed);

        let record = stash.metadata(stash.owner()).await.unwrap();
        assert_eq!(record.status, BlobStatus::Uploading);
        let accepted = flaky.inner.accepted_batches().unwrap();
        assert!(accepted.iter().all(|b| b.count_method("finishUpload") == 0));
    }

    #[tokio::test]
    async fn update_replaces_existing_blob() {
        let ledger = funded_ledger();
        let stash = client(ledger.clone(), ClientConfig::default());

        let first = stash.update(&blob(40_000)).await.unwrap();
        assert!(first.deleted.is_none());

        let replacement = b"a much shorter document".to_vec();
        let second = stash.update(&replacement).await.unwrap();
        assert_eq!(second.deleted.map(|d| d.slots_erased), Some(2));
        assert_eq!(stash.resolve(stash.owner()).await.unwrap(), replacement);
        // slot indices are never reused
        assert_eq!(second.uploaded.record.start, 2);
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let ledger = funded_ledger();
        let stash = client(ledger.clone(), ClientConfig::default());
        assert!(matches!(stash.delete().await, Err(SdkError::NotFound(_))));
        assert!(matches!(
            stash.resolve(stash.owner()).await,
            Err(SdkError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn locator_for_other_app_is_rejected() {
        let ledger = funded_ledger();
        let stash = client(ledger, ClientConfig::default());
        let other = DocumentLocator::new(stash.owner(), APP_ID + 1);
        assert!(matches!(
            stash.resolve_locator(&other).await,
            Err(SdkError::Configuration(_))
        ));
    }
}
