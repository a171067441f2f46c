use tracing::{debug, info, instrument};

use boxstash_plan::BatchPlanner;
use boxstash_types::{BlobStatus, OwnerKey};

use crate::error::{SdkError, SdkResult};
use crate::report::{BatchReceipt, DeleteReport, Stage};
use crate::submit::{read_metadata, Submitter};

/// Progress of a deletion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletePhase {
    NotStarted,
    MarkedForDeletion,
    Erasing,
    Gone,
    Failed,
}

/// Marks a blob for deletion, erases every slot, and confirms the metadata
/// record went away with the last one.
///
/// A blob already marked for deletion is not marked again: the run resumes
/// at the first slot the record does not count as erased.
pub struct DeleteOrchestrator {
    submitter: Submitter,
    planner: BatchPlanner,
    phase: DeletePhase,
}

impl DeleteOrchestrator {
    pub fn new(submitter: Submitter, planner: BatchPlanner) -> Self {
        Self {
            submitter,
            planner,
            phase: DeletePhase::NotStarted,
        }
    }

    pub fn phase(&self) -> DeletePhase {
        self.phase
    }

    #[instrument(skip(self), fields(owner = %owner.short_hex()))]
    pub async fn run(&mut self, owner: OwnerKey) -> SdkResult<DeleteReport> {
        let result = self.run_phases(owner).await;
        if result.is_err() {
            self.phase = DeletePhase::Failed;
        }
        result
    }

    async fn run_phases(&mut self, owner: OwnerKey) -> SdkResult<DeleteReport> {
        let ledger = self.submitter.ledger().clone();
        let mut receipts = Vec::new();

        // Absent metadata is NotFound, not a rejected mark.
        let mut record = read_metadata(ledger.as_ref(), owner).await?;
        if record.status == BlobStatus::Deleting {
            info!(erased = record.erased, end = record.end, "resuming deletion");
        } else {
            let ids = self
                .submitter
                .submit(self.planner.plan_mark_for_deletion(owner))
                .await?;
            receipts.push(BatchReceipt::new(Stage::MarkForDeletion, None, ids));
            self.phase = DeletePhase::MarkedForDeletion;

            record = read_metadata(ledger.as_ref(), owner).await?;
            if record.status != BlobStatus::Deleting {
                return Err(SdkError::DataValidation(format!(
                    "blob is {} after marking for deletion",
                    record.status
                )));
            }
            info!(start = record.start, end = record.end, "marked for deletion");
        }

        self.phase = DeletePhase::Erasing;
        let remaining = record.remaining_slots();
        let padding = self.planner.limits().delete_padding();
        let batches = self
            .planner
            .plan_delete_batches(owner, remaining.clone(), padding)?;
        let mut slots_erased = 0;
        for (slot, batch) in remaining.zip(batches) {
            let ids = self.submitter.submit(batch).await?;
            receipts.push(BatchReceipt::new(Stage::Erase, Some(slot), ids));
            slots_erased += 1;
            debug!(slot, "slot erased");
        }

        match read_metadata(ledger.as_ref(), owner).await {
            Err(SdkError::NotFound(_)) => {}
            Ok(left) => {
                return Err(SdkError::DataValidation(format!(
                    "metadata still present after erasing {}..={} (status {})",
                    left.start, left.end, left.status
                )));
            }
            Err(err) => return Err(err),
        }
        self.phase = DeletePhase::Gone;
        info!(slots_erased, "blob deleted");

        Ok(DeleteReport {
            owner,
            record,
            slots_erased,
            batches: receipts,
        })
    }
}
