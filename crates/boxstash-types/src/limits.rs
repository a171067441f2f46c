use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::keys::OwnerKey;
use crate::metadata::MetadataRecord;

/// Fixed limits and rates of the remote box store.
///
/// These values are a contract with the remote program and must match it
/// exactly: a rent estimate that differs by one unit is rejected, and a
/// batch that under-declares references fails on chain. Defaults are the
/// reference deployment's values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreLimits {
    /// Maximum value size of one data slot, in bytes.
    pub slot_capacity: u64,
    /// Rent per stored byte (key and value).
    pub cost_per_byte: u64,
    /// Flat rent per box.
    pub cost_per_slot: u64,
    /// Key plus value bytes of the metadata box.
    pub metadata_fixed_bytes: u64,
    /// Maximum argument payload of one call.
    pub max_call_payload: u64,
    /// Bytes of each write call's payload taken by the method selector and
    /// its fixed arguments, leaving the rest for chunk data.
    pub call_envelope_overhead: u64,
    /// Maximum box references one call may declare.
    pub max_refs_per_call: usize,
    /// Maximum calls in one atomic batch.
    pub max_calls_per_batch: usize,
    /// Bytes of box I/O granted per declared reference, pooled across a batch.
    pub io_budget_per_ref: u64,
}

/// Length of a data slot's box name.
pub const SLOT_KEY_BYTES: u64 = 8;

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            slot_capacity: 32768,
            cost_per_byte: 400,
            cost_per_slot: 2500,
            metadata_fixed_bytes: (OwnerKey::LEN + MetadataRecord::ENCODED_LEN) as u64,
            max_call_payload: 2048,
            call_envelope_overhead: 46,
            max_refs_per_call: 8,
            max_calls_per_batch: 16,
            io_budget_per_ref: 1024,
        }
    }
}

impl StoreLimits {
    /// Chunk size of a single write call.
    pub fn write_payload(&self) -> u64 {
        self.max_call_payload.saturating_sub(self.call_envelope_overhead)
    }

    /// References a call must declare to cover `bytes` of box I/O by itself.
    pub fn refs_for_bytes(&self, bytes: u64) -> usize {
        bytes.div_ceil(self.io_budget_per_ref.max(1)) as usize
    }

    /// Number of no-op calls padded onto each erase batch.
    ///
    /// Erasing a slot touches the whole slot plus the metadata record. The
    /// erase call's own references cannot cover that, so no-op calls carrying
    /// only slot references top the pooled budget up.
    pub fn delete_padding(&self) -> usize {
        let needed = self.refs_for_bytes(self.slot_capacity + MetadataRecord::ENCODED_LEN as u64);
        let missing = needed.saturating_sub(self.max_refs_per_call);
        missing.div_ceil(self.max_refs_per_call.max(1))
    }

    /// Check the limits are internally consistent.
    pub fn validate(&self) -> Result<(), TypeError> {
        let fail = |reason: String| Err(TypeError::InvalidLimits(reason));
        if self.slot_capacity == 0 {
            return fail("slot_capacity must be positive".into());
        }
        if self.call_envelope_overhead >= self.max_call_payload {
            return fail(format!(
                "call_envelope_overhead {} leaves no payload in max_call_payload {}",
                self.call_envelope_overhead, self.max_call_payload
            ));
        }
        if self.write_payload() > u64::from(u16::MAX) {
            return fail(format!("write payload {} exceeds a byte[] argument", self.write_payload()));
        }
        if self.max_refs_per_call < 2 {
            return fail("max_refs_per_call must allow an owner and a slot reference".into());
        }
        if self.io_budget_per_ref == 0 {
            return fail("io_budget_per_ref must be positive".into());
        }
        let expected_metadata = (OwnerKey::LEN + MetadataRecord::ENCODED_LEN) as u64;
        if self.metadata_fixed_bytes != expected_metadata {
            return fail(format!(
                "metadata_fixed_bytes {} does not match the {expected_metadata}-byte metadata box",
                self.metadata_fixed_bytes
            ));
        }
        if self.max_calls_per_batch < 2 {
            return fail("max_calls_per_batch must fit an allocation and its funding".into());
        }
        if 1 + self.delete_padding() > self.max_calls_per_batch {
            return fail(format!(
                "erase batch needs {} calls but max_calls_per_batch is {}",
                1 + self.delete_padding(),
                self.max_calls_per_batch
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_values() {
        let l = StoreLimits::default();
        assert_eq!(l.slot_capacity, 32768);
        assert_eq!(l.write_payload(), 2002);
        assert_eq!(l.metadata_fixed_bytes, 65);
        assert_eq!(l.max_refs_per_call, 8);
        assert_eq!(l.max_calls_per_batch, 16);
        assert!(l.validate().is_ok());
    }

    #[test]
    fn reference_delete_padding_is_four() {
        assert_eq!(StoreLimits::default().delete_padding(), 4);
    }

    #[test]
    fn small_slots_need_no_padding() {
        let l = StoreLimits { slot_capacity: 4096, ..Default::default() };
        assert_eq!(l.delete_padding(), 0);
    }

    #[test]
    fn rejects_overhead_larger_than_payload() {
        let l = StoreLimits { call_envelope_overhead: 4096, ..Default::default() };
        assert!(matches!(l.validate(), Err(TypeError::InvalidLimits(_))));
    }

    #[test]
    fn rejects_mismatched_metadata_size() {
        let l = StoreLimits { metadata_fixed_bytes: 57, ..Default::default() };
        assert!(l.validate().is_err());
    }

    #[test]
    fn rejects_erase_batch_that_cannot_fit() {
        let l = StoreLimits { slot_capacity: 1 << 20, ..Default::default() };
        assert!(l.validate().is_err());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let l: StoreLimits = serde_json::from_str(r#"{"slot_capacity": 1024}"#).unwrap();
        assert_eq!(l.slot_capacity, 1024);
        assert_eq!(l.cost_per_byte, 400);
    }
}
