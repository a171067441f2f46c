use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::abi::{AbiType, AbiValue};
use crate::error::TypeError;

/// ABI shape of the metadata box value.
pub const METADATA_ABI: &str = "(uint64,uint64,uint8,uint64,uint64)";

/// Lifecycle status of a stored blob.
///
/// The numeric codes belong to the remote program; the client only
/// round-trips them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlobStatus {
    /// Slots are allocated and being written.
    Uploading,
    /// Every slot is written and the blob may be resolved.
    Ready,
    /// Marked for deletion; slots may be erased.
    Deleting,
}

impl BlobStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Uploading => 0,
            Self::Ready => 1,
            Self::Deleting => 2,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, TypeError> {
        match code {
            0 => Ok(Self::Uploading),
            1 => Ok(Self::Ready),
            2 => Ok(Self::Deleting),
            other => Err(TypeError::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for BlobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uploading => write!(f, "uploading"),
            Self::Ready => write!(f, "ready"),
            Self::Deleting => write!(f, "deleting"),
        }
    }
}

/// Layout record stored in the owner's metadata box.
///
/// This record, not the client's own plan, is the authority on which slot
/// indices hold a blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Index of the first data slot.
    pub start: u64,
    /// Index of the last data slot (inclusive).
    pub end: u64,
    pub status: BlobStatus,
    /// Payload length of the last data slot.
    pub tail_size: u64,
    /// Number of data slots erased so far. Slots are erased in ascending
    /// order, so a deletion resumes at `start + erased`.
    pub erased: u64,
}

impl MetadataRecord {
    /// Encoded width of the record value.
    pub const ENCODED_LEN: usize = 8 + 8 + 1 + 8 + 8;

    pub fn abi_type() -> Result<AbiType, TypeError> {
        AbiType::parse(METADATA_ABI)
    }

    /// Number of data slots the record spans.
    pub fn slot_count(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn slot_range(&self) -> RangeInclusive<u64> {
        self.start..=self.end
    }

    pub fn contains_slot(&self, index: u64) -> bool {
        self.slot_range().contains(&index)
    }

    /// Slots not erased yet. Empty once every slot is gone.
    pub fn remaining_slots(&self) -> RangeInclusive<u64> {
        self.start.saturating_add(self.erased)..=self.end
    }

    pub fn encode(&self) -> Result<Vec<u8>, TypeError> {
        Self::abi_type()?.encode(&AbiValue::Tuple(vec![
            AbiValue::Uint(self.start),
            AbiValue::Uint(self.end),
            AbiValue::Uint(u64::from(self.status.code())),
            AbiValue::Uint(self.tail_size),
            AbiValue::Uint(self.erased),
        ]))
    }

    pub fn decode(data: &[u8]) -> Result<Self, TypeError> {
        Self::from_abi_value(&Self::abi_type()?.decode(data)?)
    }

    /// Build a record from a decoded `(uint64,uint64,uint8,uint64,uint64)` value.
    pub fn from_abi_value(value: &AbiValue) -> Result<Self, TypeError> {
        let mismatch = || TypeError::AbiMismatch { expected: METADATA_ABI.to_string() };
        let fields = value.as_tuple().ok_or_else(mismatch)?;
        let [start, end, status, tail_size, erased] = fields else {
            return Err(mismatch());
        };
        let uint = |v: &AbiValue| v.as_uint().ok_or_else(mismatch);
        let status = u8::try_from(uint(status)?).map_err(|_| mismatch())?;
        Ok(Self {
            start: uint(start)?,
            end: uint(end)?,
            status: BlobStatus::from_code(status)?,
            tail_size: uint(tail_size)?,
            erased: uint(erased)?,
        })
    }
}
