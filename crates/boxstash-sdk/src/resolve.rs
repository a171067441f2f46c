use tracing::{debug, instrument};

use boxstash_ledger::{LedgerClient, LedgerError};
use boxstash_types::{BlobStatus, BoxKey, OwnerKey};

use crate::error::{SdkError, SdkResult};
use crate::submit::read_metadata;

/// Read back the blob stored for `owner`.
///
/// Only a ready blob resolves. Slots are read in index order and the last
/// one must hold exactly the recorded tail size.
#[instrument(skip(ledger), fields(owner = %owner.short_hex()))]
pub async fn resolve(ledger: &dyn LedgerClient, owner: OwnerKey) -> SdkResult<Vec<u8>> {
    let record = read_metadata(ledger, owner).await?;
    if record.status != BlobStatus::Ready {
        return Err(SdkError::StillUploading {
            owner: owner.to_hex(),
            status: record.status,
        });
    }

    let mut blob = Vec::new();
    for slot in record.slot_range() {
        let data = match ledger.read_box(&BoxKey::Slot(slot)).await {
            Ok(data) => data,
            Err(LedgerError::NotFound(_)) => {
                return Err(SdkError::DataValidation(format!("slot {slot} is missing")));
            }
            Err(err) => return Err(err.into()),
        };
        if slot == record.end && data.len() as u64 != record.tail_size {
            return Err(SdkError::DataValidation(format!(
                "last slot holds {} bytes, metadata records {}",
                data.len(),
                record.tail_size
            )));
        }
        blob.extend_from_slice(&data);
    }
    debug!(slots = record.slot_count(), len = blob.len(), "resolved");
    Ok(blob)
}
