//! Rules of the remote box-store program, as enforced by [`InMemoryLedger`].
//!
//! [`InMemoryLedger`]: crate::memory::InMemoryLedger

use std::collections::{BTreeMap, HashMap};

use boxstash_plan::{Call, Operation};
use boxstash_types::limits::SLOT_KEY_BYTES;
use boxstash_types::{BlobStatus, BoxKey, MetadataRecord, OwnerKey, StoreLimits};

use crate::account::SignedBatch;
use crate::error::{LedgerError, LedgerResult};

/// Application and account state the program reads and writes.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub balances: HashMap<[u8; 32], u64>,
    pub boxes: HashMap<BoxKey, Vec<u8>>,
    /// Index the next allocation starts at.
    pub next_index: u64,
}

impl AppState {
    fn credit(&mut self, account: [u8; 32], amount: u64) -> Result<(), String> {
        let balance = self.balances.entry(account).or_default();
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| format!("credit of {amount} overflows balance"))?;
        Ok(())
    }

    fn debit(&mut self, account: [u8; 32], amount: u64) -> Result<(), String> {
        let balance = self.balances.entry(account).or_default();
        if *balance < amount {
            return Err(format!(
                "balance {balance} of {} cannot cover {amount}",
                hex::encode(&account[..4])
            ));
        }
        *balance -= amount;
        Ok(())
    }

    fn metadata(&self, owner: OwnerKey) -> Result<MetadataRecord, String> {
        let raw = self
            .boxes
            .get(&BoxKey::Owner(owner))
            .ok_or_else(|| format!("no metadata for owner {}", owner.short_hex()))?;
        MetadataRecord::decode(raw).map_err(|e| format!("corrupt metadata: {e}"))
    }

    fn put_metadata(&mut self, owner: OwnerKey, record: &MetadataRecord) -> Result<(), String> {
        let raw = record.encode().map_err(|e| e.to_string())?;
        self.boxes.insert(BoxKey::Owner(owner), raw);
        Ok(())
    }
}

/// The remote program's checks and effects.
pub struct BoxProgram<'a> {
    pub limits: &'a StoreLimits,
    pub app_address: [u8; 32],
    pub min_fee: u64,
}

impl BoxProgram<'_> {
    /// Minimum-balance rent of one box. `None` on overflow.
    pub fn box_rent(&self, name_len: u64, value_len: u64) -> Option<u64> {
        name_len
            .checked_add(value_len)?
            .checked_mul(self.limits.cost_per_byte)?
            .checked_add(self.limits.cost_per_slot)
    }

    /// Rent of every box an allocation will eventually hold. `None` when the
    /// request has no slots or the total overflows.
    pub fn allocation_rent(&self, num_slots: u64, tail_size: u64) -> Option<u64> {
        let full_slots = num_slots.checked_sub(1)?;
        let full = self
            .box_rent(SLOT_KEY_BYTES, self.limits.slot_capacity)?
            .checked_mul(full_slots)?;
        let tail = self.box_rent(SLOT_KEY_BYTES, tail_size)?;
        let metadata = self.box_rent(OwnerKey::LEN as u64, MetadataRecord::ENCODED_LEN as u64)?;
        full.checked_add(tail)?.checked_add(metadata)
    }

    fn slot_size(&self, record: &MetadataRecord, slot: u64) -> u64 {
        if slot == record.end {
            record.tail_size
        } else {
            self.limits.slot_capacity
        }
    }

    /// Apply a batch to `state`. On error `state` is left partially
    /// modified; callers apply batches to a scratch copy.
    pub fn run(&self, state: &mut AppState, signed: &SignedBatch) -> LedgerResult<()> {
        let batch = &signed.batch;
        if batch.is_empty() {
            return Err(LedgerError::InvalidBatch("batch has no calls".into()));
        }
        if batch.len() > self.limits.max_calls_per_batch {
            return Err(LedgerError::InvalidBatch(format!(
                "batch has {} calls, limit is {}",
                batch.len(),
                self.limits.max_calls_per_batch
            )));
        }

        // key -> (first call touching it, bytes of I/O)
        let mut touched: BTreeMap<BoxKey, (usize, u64)> = BTreeMap::new();
        for (i, call) in batch.calls.iter().enumerate() {
            self.check_call(call).map_err(|r| LedgerError::rejected(i, r))?;
            state
                .debit(signed.sender, call.params.fee)
                .map_err(|r| LedgerError::rejected(i, r))?;
            let previous = i.checked_sub(1).map(|p| &batch.calls[p]);
            let touches = self
                .apply(state, signed.sender, call, previous)
                .map_err(|r| LedgerError::rejected(i, r))?;
            for (key, bytes) in touches {
                touched.entry(key).or_insert((i, bytes));
            }
        }

        let refs = batch.ref_set();
        for (key, (call, _)) in &touched {
            if !refs.contains(key) {
                return Err(LedgerError::rejected(*call, format!("box {key} is not referenced")));
            }
        }
        let required = touched
            .values()
            .try_fold(0u64, |sum, (_, bytes)| sum.checked_add(*bytes))
            .ok_or_else(|| LedgerError::InvalidBatch("box I/O overflows".into()))?;
        let available = (batch.ref_count() as u64).saturating_mul(self.limits.io_budget_per_ref);
        if available < required {
            return Err(LedgerError::InvalidBatch(format!(
                "references grant {available} bytes of box I/O, batch needs {required}"
            )));
        }
        Ok(())
    }

    fn check_call(&self, call: &Call) -> Result<(), String> {
        if call.refs.len() > self.limits.max_refs_per_call {
            return Err(format!(
                "{} references exceed the per-call limit of {}",
                call.refs.len(),
                self.limits.max_refs_per_call
            ));
        }
        if !call.op.is_program_call() && !call.refs.is_empty() {
            return Err("transfers cannot carry box references".into());
        }
        if call.params.fee < self.min_fee {
            return Err(format!("fee {} below minimum {}", call.params.fee, self.min_fee));
        }
        Ok(())
    }

    fn apply(
        &self,
        state: &mut AppState,
        sender: [u8; 32],
        call: &Call,
        previous: Option<&Call>,
    ) -> Result<Vec<(BoxKey, u64)>, String> {
        let metadata_io = MetadataRecord::ENCODED_LEN as u64;
        match &call.op {
            Operation::Fund { receiver, amount } => {
                state.debit(sender, *amount)?;
                state.credit(*receiver, *amount)?;
                Ok(Vec::new())
            }
            Operation::Allocate {
                owner,
                num_slots,
                tail_size,
            } => {
                let Some(Operation::Fund { receiver, amount }) = previous.map(|c| &c.op) else {
                    return Err("allocation must follow its rent payment".into());
                };
                if *receiver != self.app_address {
                    return Err("rent payment is not addressed to the application".into());
                }
                if *num_slots == 0 {
                    return Err("allocation needs at least one slot".into());
                }
                if *tail_size == 0 || *tail_size > self.limits.slot_capacity {
                    return Err(format!("tail size {tail_size} out of range"));
                }
                let rent = self
                    .allocation_rent(*num_slots, *tail_size)
                    .ok_or_else(|| format!("rent of {num_slots} slots overflows"))?;
                if *amount != rent {
                    return Err(format!("rent payment {amount} does not match rent {rent}"));
                }
                if state.boxes.contains_key(&BoxKey::Owner(*owner)) {
                    return Err(format!("owner {} already has a blob", owner.short_hex()));
                }
                let start = state.next_index;
                let next_index = start
                    .checked_add(*num_slots)
                    .ok_or_else(|| format!("{num_slots} slots exhaust the slot index space"))?;
                let record = MetadataRecord {
                    start,
                    end: next_index - 1,
                    status: BlobStatus::Uploading,
                    tail_size: *tail_size,
                    erased: 0,
                };
                state.put_metadata(*owner, &record)?;
                state.next_index = next_index;
                Ok(vec![(BoxKey::Owner(*owner), metadata_io)])
            }
            Operation::Write {
                owner,
                slot,
                offset,
                data,
            } => {
                let record = state.metadata(*owner)?;
                if record.status != BlobStatus::Uploading {
                    return Err(format!("blob is {}, not uploading", record.status));
                }
                if !record.contains_slot(*slot) {
                    return Err(format!("slot {slot} outside {}..={}", record.start, record.end));
                }
                if data.len() as u64 > self.limits.write_payload() {
                    return Err(format!("write of {} bytes exceeds call payload", data.len()));
                }
                let size = self.slot_size(&record, *slot);
                let key = BoxKey::Slot(*slot);
                if *offset == 0 {
                    state.boxes.entry(key).or_insert_with(|| vec![0; size as usize]);
                }
                let contents = state
                    .boxes
                    .get_mut(&key)
                    .ok_or_else(|| format!("slot {slot} written before offset 0"))?;
                let end = offset
                    .checked_add(data.len() as u64)
                    .ok_or_else(|| format!("write at offset {offset} overruns slot of {size} bytes"))?;
                if end > contents.len() as u64 {
                    return Err(format!("write to {offset}..{end} overruns slot of {size} bytes"));
                }
                contents[*offset as usize..end as usize].copy_from_slice(data);
                Ok(vec![(BoxKey::Owner(*owner), metadata_io), (key, size)])
            }
            Operation::Finalize { owner } => {
                let mut record = state.metadata(*owner)?;
                if record.status != BlobStatus::Uploading {
                    return Err(format!("cannot finalize a blob that is {}", record.status));
                }
                record.status = BlobStatus::Ready;
                state.put_metadata(*owner, &record)?;
                Ok(vec![(BoxKey::Owner(*owner), metadata_io)])
            }
            Operation::MarkForDeletion { owner } => {
                let mut record = state.metadata(*owner)?;
                if record.status == BlobStatus::Deleting {
                    return Err("blob is already being deleted".into());
                }
                record.status = BlobStatus::Deleting;
                state.put_metadata(*owner, &record)?;
                Ok(vec![(BoxKey::Owner(*owner), metadata_io)])
            }
            Operation::Erase { owner, slot } => {
                let mut record = state.metadata(*owner)?;
                if record.status != BlobStatus::Deleting {
                    return Err(format!("blob is {}, not marked for deletion", record.status));
                }
                let next = *record.remaining_slots().start();
                if *slot != next || !record.contains_slot(*slot) {
                    return Err(format!(
                        "slot {slot} is not the next to erase in {}..={} ({} erased)",
                        record.start, record.end, record.erased
                    ));
                }
                if call.params.fee < 2 * self.min_fee {
                    return Err("fee does not cover the inner refund payment".into());
                }
                let now_empty = *slot == record.end;
                let size = self.slot_size(&record, *slot);
                state.boxes.remove(&BoxKey::Slot(*slot));
                let overflow = || "refund overflows".to_string();
                let mut refund = self.box_rent(SLOT_KEY_BYTES, size).ok_or_else(overflow)?;

                if now_empty {
                    state.boxes.remove(&BoxKey::Owner(*owner));
                    let metadata_rent = self
                        .box_rent(OwnerKey::LEN as u64, metadata_io)
                        .ok_or_else(overflow)?;
                    refund = refund.checked_add(metadata_rent).ok_or_else(overflow)?;
                } else {
                    record.erased += 1;
                    state.put_metadata(*owner, &record)?;
                }
                state.debit(self.app_address, refund)?;
                state.credit(sender, refund)?;
                Ok(vec![(BoxKey::Owner(*owner), metadata_io), (BoxKey::Slot(*slot), size)])
            }
            Operation::NoOp => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(limits: &StoreLimits) -> BoxProgram<'_> {
        BoxProgram {
            limits,
            app_address: [0; 32],
            min_fee: 1000,
        }
    }

    #[test]
    fn allocation_rent_matches_box_rents() {
        let limits = StoreLimits::default();
        let program = program(&limits);
        let metadata = 2500 + (32 + 33) * 400;
        assert_eq!(program.allocation_rent(1, 11), Some(2500 + (8 + 11) * 400 + metadata));
        assert_eq!(
            program.allocation_rent(2, 1),
            Some(2500 + (8 + 32768) * 400 + 2500 + (8 + 1) * 400 + metadata)
        );
    }

    #[test]
    fn allocation_rent_overflow_is_none() {
        let limits = StoreLimits::default();
        let program = program(&limits);
        assert_eq!(program.allocation_rent(0, 11), None);
        assert_eq!(program.allocation_rent(u64::MAX / 2, 1), None);
        assert_eq!(program.box_rent(u64::MAX, 1), None);
    }
}
