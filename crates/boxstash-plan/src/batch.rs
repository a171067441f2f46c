use std::ops::RangeInclusive;

use tracing::debug;

use boxstash_types::{BoxKey, MetadataRecord, OwnerKey, StoreLimits};

use crate::error::{PlanError, PlanResult};
use crate::operation::{Batch, Call, CallParams, Operation};
use crate::partition::Chunk;

/// Groups operations into batches the remote program accepts.
///
/// The program enforces two reference rules. A call may declare at most
/// `max_refs_per_call` box references, and the references of a whole batch
/// are pooled into an I/O budget of `io_budget_per_ref` bytes each that
/// must cover every box the batch touches. A full slot is far larger than
/// one call's budget, so slot calls repeat the slot key to fill all their
/// reference positions, and erase batches add no-op calls that do nothing
/// but contribute references.
#[derive(Clone, Debug)]
pub struct BatchPlanner {
    limits: StoreLimits,
    params: CallParams,
}

impl BatchPlanner {
    pub fn new(limits: StoreLimits, params: CallParams) -> PlanResult<Self> {
        limits.validate()?;
        Ok(Self { limits, params })
    }

    pub fn limits(&self) -> &StoreLimits {
        &self.limits
    }

    /// References of a call touching `slot` and the owner's metadata.
    fn slot_and_owner_refs(&self, owner: OwnerKey, slot: u64) -> Vec<BoxKey> {
        let mut refs = vec![BoxKey::Slot(slot); self.limits.max_refs_per_call - 1];
        refs.push(BoxKey::Owner(owner));
        refs
    }

    fn owner_call(&self, op: Operation, owner: OwnerKey) -> Batch {
        Batch::new(vec![Call::new(op, vec![BoxKey::Owner(owner)], self.params)])
    }

    /// Allocation plus the rent transfer that funds it.
    pub fn plan_allocate(
        &self,
        owner: OwnerKey,
        num_slots: u64,
        tail_size: u64,
        receiver: [u8; 32],
        cost: u64,
    ) -> Batch {
        Batch::new(vec![
            Call::new(Operation::Fund { receiver, amount: cost }, Vec::new(), self.params),
            Call::new(
                Operation::Allocate {
                    owner,
                    num_slots,
                    tail_size,
                },
                vec![BoxKey::Owner(owner)],
                self.params,
            ),
        ])
    }

    pub fn plan_finalize(&self, owner: OwnerKey) -> Batch {
        self.owner_call(Operation::Finalize { owner }, owner)
    }

    pub fn plan_mark_for_deletion(&self, owner: OwnerKey) -> Batch {
        self.owner_call(Operation::MarkForDeletion { owner }, owner)
    }

    /// Write batches for one slot.
    ///
    /// Chunks are spread evenly over the fewest batches that respect the
    /// call limit, earlier batches taking the remainder (17 chunks become
    /// 9 + 8). Every batch must carry enough references for the whole slot,
    /// since the first write creates it at full size.
    pub fn plan_write_batches(
        &self,
        owner: OwnerKey,
        slot: u64,
        slot_size: u64,
        chunks: &[Chunk<'_>],
    ) -> PlanResult<Vec<Batch>> {
        if chunks.is_empty() {
            return Err(PlanError::EmptyBlob);
        }
        let max = self.limits.max_calls_per_batch;
        let num_batches = chunks.len().div_ceil(max);
        let base = chunks.len() / num_batches;
        let extra = chunks.len() % num_batches;

        let refs = self.slot_and_owner_refs(owner, slot);
        let mut batches = Vec::with_capacity(num_batches);
        let mut rest = chunks;
        for i in 0..num_batches {
            let take = base + usize::from(i < extra);
            let (group, tail) = rest.split_at(take);
            rest = tail;
            let batch = Batch::new(
                group
                    .iter()
                    .map(|chunk| {
                        Call::new(
                            Operation::Write {
                                owner,
                                slot,
                                offset: chunk.offset,
                                data: chunk.data.to_vec(),
                            },
                            refs.clone(),
                            self.params,
                        )
                    })
                    .collect(),
            );
            self.check_budget(&batch, BoxKey::Slot(slot), slot_size)?;
            batches.push(batch);
        }
        debug!(slot, chunks = chunks.len(), batches = batches.len(), "planned slot writes");
        Ok(batches)
    }

    /// One erase batch per slot in `range`, in increasing slot order.
    ///
    /// Each batch holds the erase call (owner key plus the slot key repeated)
    /// followed by `padding` no-op calls that reference only the slot.
    pub fn plan_delete_batches(
        &self,
        owner: OwnerKey,
        range: RangeInclusive<u64>,
        padding: usize,
    ) -> PlanResult<Vec<Batch>> {
        let (start, end) = (*range.start(), *range.end());
        if start > end {
            return Err(PlanError::InvalidSlotRange { start, end });
        }
        let erase_params = self.params.with_inner_refund();
        let per_call = self.limits.max_refs_per_call;

        range
            .map(|slot| {
                let mut erase_refs = vec![BoxKey::Owner(owner)];
                erase_refs.extend(std::iter::repeat(BoxKey::Slot(slot)).take(per_call - 1));
                let mut calls = vec![Call::new(
                    Operation::Erase { owner, slot },
                    erase_refs,
                    erase_params,
                )];
                calls.extend((0..padding).map(|i| {
                    Call::new(Operation::NoOp, vec![BoxKey::Slot(slot); per_call], self.params)
                        .with_note(format!("dummy {i}"))
                }));
                let batch = Batch::new(calls);
                self.check_budget(&batch, BoxKey::Slot(slot), self.limits.slot_capacity)?;
                Ok(batch)
            })
            .collect()
    }

    /// Verify the batch fits the call limit and its pooled references cover
    /// the slot plus the metadata record.
    fn check_budget(&self, batch: &Batch, key: BoxKey, slot_size: u64) -> PlanResult<()> {
        if batch.len() > self.limits.max_calls_per_batch {
            return Err(PlanError::TooManyCalls {
                calls: batch.len(),
                max: self.limits.max_calls_per_batch,
            });
        }
        let required = self
            .limits
            .refs_for_bytes(slot_size + MetadataRecord::ENCODED_LEN as u64);
        let declared = batch.ref_count();
        if declared < required {
            return Err(PlanError::ReferenceBudget {
                key: key.to_string(),
                declared,
                required,
            });
        }
        Ok(())
    }
}
