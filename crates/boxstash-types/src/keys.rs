use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identity of a stored blob's owner.
///
/// The owner key is used verbatim as the name of the metadata box, so the
/// remote program can find a blob's layout from the owner alone. For
/// ed25519 accounts it is the raw public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerKey([u8; 32]);

impl OwnerKey {
    pub const LEN: usize = 32;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for OwnerKey {
    type Error = TypeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl From<[u8; 32]> for OwnerKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerKey({})", self.short_hex())
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Name of one box in the remote store.
///
/// Metadata boxes are keyed by the 32-byte owner key; data slots by the
/// 8-byte big-endian slot index. The two name lengths never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BoxKey {
    Owner(OwnerKey),
    Slot(u64),
}

impl BoxKey {
    /// Raw box name as the remote store sees it.
    pub fn name(&self) -> Vec<u8> {
        match self {
            Self::Owner(owner) => owner.as_bytes().to_vec(),
            Self::Slot(index) => index.to_be_bytes().to_vec(),
        }
    }

    /// Length of the box name in bytes (counts toward rent).
    pub fn name_len(&self) -> usize {
        match self {
            Self::Owner(_) => OwnerKey::LEN,
            Self::Slot(_) => 8,
        }
    }

    /// Recover a key from a raw box name.
    pub fn from_name(name: &[u8]) -> Result<Self, TypeError> {
        match name.len() {
            8 => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(name);
                Ok(Self::Slot(u64::from_be_bytes(arr)))
            }
            OwnerKey::LEN => Ok(Self::Owner(OwnerKey::try_from(name)?)),
            actual => Err(TypeError::InvalidLength {
                expected: OwnerKey::LEN,
                actual,
            }),
        }
    }

    pub fn is_slot(&self) -> bool {
        matches!(self, Self::Slot(_))
    }
}

impl fmt::Debug for BoxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner(owner) => write!(f, "Owner({})", owner.short_hex()),
            Self::Slot(index) => write!(f, "Slot({index})"),
        }
    }
}

impl fmt::Display for BoxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner(owner) => write!(f, "owner:{}", owner.short_hex()),
            Self::Slot(index) => write!(f, "slot:{index}"),
        }
    }
}
