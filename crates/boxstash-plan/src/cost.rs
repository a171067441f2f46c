use serde::{Deserialize, Serialize};

use boxstash_types::limits::SLOT_KEY_BYTES;
use boxstash_types::StoreLimits;

use crate::error::{PlanError, PlanResult};
use crate::partition::{slot_count, tail_size};

/// Itemized rent for storing one blob.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub num_slots: u64,
    pub tail_size: u64,
    /// Flat per-box rent of every data slot.
    pub slot_boxes: u64,
    /// Payload rent of every slot but the last.
    pub full_slots: u64,
    /// Rent of the 8-byte slot keys.
    pub slot_keys: u64,
    /// Payload rent of the last slot.
    pub tail_slot: u64,
    /// Box and byte rent of the metadata record.
    pub metadata: u64,
}

impl CostBreakdown {
    pub fn total(&self) -> u64 {
        self.slot_boxes + self.full_slots + self.slot_keys + self.tail_slot + self.metadata
    }
}

/// Rent formula of the remote store.
///
/// The remote program recomputes this and rejects any funding transfer
/// that differs from it, so it must match exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostModel {
    pub slot_capacity: u64,
    pub cost_per_byte: u64,
    pub cost_per_slot: u64,
    pub metadata_fixed_bytes: u64,
}

impl CostModel {
    pub fn from_limits(limits: &StoreLimits) -> Self {
        Self {
            slot_capacity: limits.slot_capacity,
            cost_per_byte: limits.cost_per_byte,
            cost_per_slot: limits.cost_per_slot,
            metadata_fixed_bytes: limits.metadata_fixed_bytes,
        }
    }

    pub fn breakdown(&self, blob_len: u64) -> PlanResult<CostBreakdown> {
        if blob_len == 0 {
            return Err(PlanError::EmptyBlob);
        }
        if self.slot_capacity == 0 {
            return Err(PlanError::ZeroChunkSize);
        }
        let overflow = || PlanError::CostOverflow { blob_len };
        let per_byte = |bytes: u64| bytes.checked_mul(self.cost_per_byte).ok_or_else(overflow);

        let num_slots = slot_count(blob_len, self.slot_capacity);
        let tail = tail_size(blob_len, self.slot_capacity);
        let breakdown = CostBreakdown {
            num_slots,
            tail_size: tail,
            slot_boxes: num_slots.checked_mul(self.cost_per_slot).ok_or_else(overflow)?,
            full_slots: per_byte((num_slots - 1).checked_mul(self.slot_capacity).ok_or_else(overflow)?)?,
            slot_keys: per_byte(num_slots.checked_mul(SLOT_KEY_BYTES).ok_or_else(overflow)?)?,
            tail_slot: per_byte(tail)?,
            metadata: self
                .cost_per_slot
                .checked_add(per_byte(self.metadata_fixed_bytes)?)
                .ok_or_else(overflow)?,
        };
        [
            breakdown.slot_boxes,
            breakdown.full_slots,
            breakdown.slot_keys,
            breakdown.tail_slot,
            breakdown.metadata,
        ]
        .into_iter()
        .try_fold(0u64, u64::checked_add)
        .ok_or_else(overflow)?;
        Ok(breakdown)
    }

    pub fn estimate(&self, blob_len: u64) -> PlanResult<u64> {
        Ok(self.breakdown(blob_len)?.total())
    }
}

/// Rent owed for a blob of `blob_len` bytes.
pub fn estimate_cost(
    blob_len: u64,
    slot_capacity: u64,
    cost_per_byte: u64,
    cost_per_slot: u64,
    metadata_fixed_bytes: u64,
) -> PlanResult<u64> {
    CostModel {
        slot_capacity,
        cost_per_byte,
        cost_per_slot,
        metadata_fixed_bytes,
    }
    .estimate(blob_len)
}
