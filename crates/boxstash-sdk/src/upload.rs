use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument};

use boxstash_plan::{chunks_for, partition, Batch, BatchPlanner, CostModel};
use boxstash_types::{BlobStatus, OwnerKey};

use crate::error::{SdkError, SdkResult};
use crate::report::{blob_digest, BatchReceipt, Stage, UploadReport};
use crate::submit::{read_metadata, Submitter};

/// Progress of an upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadPhase {
    NotAllocated,
    Allocating,
    Writing,
    Finalizing,
    Ready,
    /// A step failed. The remote metadata shows how far the run got.
    Failed,
}

/// Drives one blob through allocate, write, and finalize.
///
/// Fail-fast: the first error ends the run and nothing is rolled back.
pub struct UploadOrchestrator {
    submitter: Submitter,
    planner: BatchPlanner,
    write_concurrency: usize,
    phase: UploadPhase,
}

impl UploadOrchestrator {
    pub fn new(submitter: Submitter, planner: BatchPlanner, write_concurrency: usize) -> Self {
        Self {
            submitter,
            planner,
            write_concurrency: write_concurrency.max(1),
            phase: UploadPhase::NotAllocated,
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    #[instrument(skip(self, blob), fields(owner = %owner.short_hex(), len = blob.len()))]
    pub async fn run(&mut self, owner: OwnerKey, blob: &[u8]) -> SdkResult<UploadReport> {
        let result = self.run_phases(owner, blob).await;
        if result.is_err() {
            self.phase = UploadPhase::Failed;
        }
        result
    }

    async fn run_phases(&mut self, owner: OwnerKey, blob: &[u8]) -> SdkResult<UploadReport> {
        if blob.is_empty() {
            return Err(SdkError::EmptyInput);
        }
        let limits = self.planner.limits().clone();
        let remote_limits = self.submitter.ledger().limits().await?;
        if remote_limits != limits {
            return Err(SdkError::Configuration(
                "store limits differ from the deployed program's".into(),
            ));
        }

        let cost = CostModel::from_limits(&limits).breakdown(blob.len() as u64)?;
        let layout = partition(blob, limits.slot_capacity)?;
        if layout.concat() != blob {
            return Err(SdkError::DataValidation("slots do not reassemble the blob".into()));
        }
        // Catch reference budget problems before anything is paid for.
        for data in [layout.slots.first(), layout.slots.last()].into_iter().flatten() {
            let chunks = chunks_for(data, limits.write_payload())?;
            self.planner.plan_write_batches(owner, 0, data.len() as u64, &chunks)?;
        }

        let mut receipts = Vec::new();

        self.phase = UploadPhase::Allocating;
        let app_address = self.submitter.ledger().app_address().await?;
        let allocate = self.planner.plan_allocate(
            owner,
            layout.num_slots(),
            layout.tail_size,
            app_address,
            cost.total(),
        );
        let ids = self.submitter.submit(allocate).await?;
        receipts.push(BatchReceipt::new(Stage::Allocate, None, ids));
        info!(slots = layout.num_slots(), cost = cost.total(), "allocated");

        self.phase = UploadPhase::Writing;
        let record = read_metadata(self.submitter.ledger().as_ref(), owner).await?;
        if record.slot_count() != layout.num_slots() || record.tail_size != layout.tail_size {
            return Err(SdkError::DataValidation(format!(
                "remote allocated {} slots with tail {}, planned {} with tail {}",
                record.slot_count(),
                record.tail_size,
                layout.num_slots(),
                layout.tail_size
            )));
        }
        let mut plans = Vec::with_capacity(layout.slots.len());
        for (slot, data) in record.slot_range().zip(&layout.slots) {
            let chunks = chunks_for(data, limits.write_payload())?;
            let batches = self
                .planner
                .plan_write_batches(owner, slot, data.len() as u64, &chunks)?;
            plans.push((slot, batches));
        }
        receipts.extend(self.write_slots(plans).await?);
        info!(start = record.start, end = record.end, "slots written");

        self.phase = UploadPhase::Finalizing;
        let ids = self.submitter.submit(self.planner.plan_finalize(owner)).await?;
        receipts.push(BatchReceipt::new(Stage::Finalize, None, ids));

        let record = read_metadata(self.submitter.ledger().as_ref(), owner).await?;
        if record.status != BlobStatus::Ready {
            return Err(SdkError::DataValidation(format!(
                "blob is {} after finalizing",
                record.status
            )));
        }
        self.phase = UploadPhase::Ready;
        info!(batches = receipts.len(), "upload complete");

        Ok(UploadReport {
            owner,
            record,
            cost,
            digest: blob_digest(blob),
            batches: receipts,
        })
    }

    /// Submit every slot's write batches. Slots may run concurrently; the
    /// batches of one slot never do.
    async fn write_slots(&self, plans: Vec<(u64, Vec<Batch>)>) -> SdkResult<Vec<BatchReceipt>> {
        if self.write_concurrency == 1 {
            let mut receipts = Vec::new();
            for (slot, batches) in plans {
                receipts.extend(write_slot(&self.submitter, slot, batches).await?);
            }
            return Ok(receipts);
        }

        let permits = Arc::new(Semaphore::new(self.write_concurrency));
        let mut tasks = JoinSet::new();
        for (slot, batches) in plans {
            let submitter = self.submitter.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| SdkError::Internal(e.to_string()))?;
                write_slot(&submitter, slot, batches).await
            });
        }

        let mut receipts = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(slot_receipts)) => receipts.extend(slot_receipts),
                Ok(Err(err)) => {
                    tasks.abort_all();
                    return Err(err);
                }
                Err(err) => {
                    tasks.abort_all();
                    return Err(SdkError::Internal(format!("write task failed: {err}")));
                }
            }
        }
        receipts.sort_by_key(|r| r.slot);
        Ok(receipts)
    }
}

async fn write_slot(
    submitter: &Submitter,
    slot: u64,
    batches: Vec<Batch>,
) -> SdkResult<Vec<BatchReceipt>> {
    let mut receipts = Vec::with_capacity(batches.len());
    for batch in batches {
        let ids = submitter.submit_idempotent(batch).await?;
        receipts.push(BatchReceipt::new(Stage::Write, Some(slot), ids));
    }
    debug!(slot, batches = receipts.len(), "slot written");
    Ok(receipts)
}
