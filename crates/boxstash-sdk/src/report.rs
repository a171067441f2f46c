use serde::{Deserialize, Serialize};

use boxstash_ledger::TxId;
use boxstash_plan::CostBreakdown;
use boxstash_types::{MetadataRecord, OwnerKey};

/// Protocol step a batch belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Allocate,
    Write,
    Finalize,
    MarkForDeletion,
    Erase,
}

/// Confirmation of one submitted batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub stage: Stage,
    /// Data slot the batch touched, when it touched one.
    pub slot: Option<u64>,
    /// One id per call, in batch order.
    pub tx_ids: Vec<TxId>,
}

impl BatchReceipt {
    pub fn new(stage: Stage, slot: Option<u64>, tx_ids: Vec<TxId>) -> Self {
        Self { stage, slot, tx_ids }
    }
}

/// Outcome of a completed upload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadReport {
    pub owner: OwnerKey,
    /// Metadata as read back after finalizing.
    pub record: MetadataRecord,
    pub cost: CostBreakdown,
    /// BLAKE3 digest of the uploaded blob, hex encoded.
    pub digest: String,
    pub batches: Vec<BatchReceipt>,
}

impl UploadReport {
    pub fn batch_count(&self, stage: Stage) -> usize {
        self.batches.iter().filter(|b| b.stage == stage).count()
    }

    pub fn tx_count(&self) -> usize {
        self.batches.iter().map(|b| b.tx_ids.len()).sum()
    }
}

/// Outcome of a completed deletion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteReport {
    pub owner: OwnerKey,
    /// Metadata as it stood when erasing began.
    pub record: MetadataRecord,
    pub slots_erased: u64,
    pub batches: Vec<BatchReceipt>,
}

impl DeleteReport {
    pub fn tx_count(&self) -> usize {
        self.batches.iter().map(|b| b.tx_ids.len()).sum()
    }
}

/// Outcome of replacing an owner's blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Present when an earlier blob had to be deleted first.
    pub deleted: Option<DeleteReport>,
    pub uploaded: UploadReport,
}

pub(crate) fn blob_digest(blob: &[u8]) -> String {
    blake3::hash(blob).to_hex().to_string()
}
