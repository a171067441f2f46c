use crate::error::{PlanError, PlanResult};

/// Number of slots needed for `blob_len` bytes.
pub fn slot_count(blob_len: u64, slot_capacity: u64) -> u64 {
    blob_len.div_ceil(slot_capacity)
}

/// Payload length of the last slot.
///
/// An exact multiple of the capacity fills the last slot, so the declared
/// tail is the full capacity rather than zero.
pub fn tail_size(blob_len: u64, slot_capacity: u64) -> u64 {
    match blob_len % slot_capacity {
        0 if blob_len > 0 => slot_capacity,
        rem => rem,
    }
}

/// A blob split into slot payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobLayout<'a> {
    /// Slot payloads in blob order. All but the last are full.
    pub slots: Vec<&'a [u8]>,
    /// Length of the last slot, as declared to the remote program.
    pub tail_size: u64,
}

impl BlobLayout<'_> {
    pub fn num_slots(&self) -> u64 {
        self.slots.len() as u64
    }

    pub fn blob_len(&self) -> u64 {
        self.slots.iter().map(|s| s.len() as u64).sum()
    }

    /// Reassemble the slots; equals the original blob.
    pub fn concat(&self) -> Vec<u8> {
        self.slots.concat()
    }
}

/// One write-sized piece of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Byte offset of `data` within its slot.
    pub offset: u64,
    pub data: &'a [u8],
}

/// Split `blob` into slots of at most `slot_capacity` bytes.
pub fn partition(blob: &[u8], slot_capacity: u64) -> PlanResult<BlobLayout<'_>> {
    if blob.is_empty() {
        return Err(PlanError::EmptyBlob);
    }
    if slot_capacity == 0 {
        return Err(PlanError::ZeroChunkSize);
    }
    let capacity = usize::try_from(slot_capacity).unwrap_or(usize::MAX);
    let slots: Vec<&[u8]> = blob.chunks(capacity).collect();
    let layout = BlobLayout {
        tail_size: tail_size(blob.len() as u64, slot_capacity),
        slots,
    };
    debug_assert_eq!(layout.num_slots(), slot_count(blob.len() as u64, slot_capacity));
    Ok(layout)
}

/// Split one slot payload into chunks of at most `chunk_size` bytes.
pub fn chunks_for(slot: &[u8], chunk_size: u64) -> PlanResult<Vec<Chunk<'_>>> {
    if chunk_size == 0 {
        return Err(PlanError::ZeroChunkSize);
    }
    let size = usize::try_from(chunk_size).unwrap_or(usize::MAX);
    Ok(slot
        .chunks(size)
        .enumerate()
        .map(|(i, data)| Chunk {
            offset: i as u64 * chunk_size,
            data,
        })
        .collect())
}
