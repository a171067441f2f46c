use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use boxstash_types::{BoxKey, OwnerKey};

/// One operation the remote program understands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Reserve `num_slots` slots for `owner` and create its metadata record.
    Allocate {
        owner: OwnerKey,
        num_slots: u64,
        tail_size: u64,
    },
    /// Transfer `amount` to `receiver`. Funds the rent of an allocation.
    Fund { receiver: [u8; 32], amount: u64 },
    /// Write `data` into slot `slot` at byte `offset`.
    Write {
        owner: OwnerKey,
        slot: u64,
        offset: u64,
        data: Vec<u8>,
    },
    /// Mark the owner's blob as ready.
    Finalize { owner: OwnerKey },
    /// Mark the owner's blob for deletion.
    MarkForDeletion { owner: OwnerKey },
    /// Free one data slot and refund its rent.
    Erase { owner: OwnerKey, slot: u64 },
    /// Does nothing. Exists only to carry references.
    NoOp,
}

impl Operation {
    /// Name of the program method (or transfer) this operation invokes.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Allocate { .. } => "startUpload",
            Self::Fund { .. } => "pay",
            Self::Write { .. } => "upload",
            Self::Finalize { .. } => "finishUpload",
            Self::MarkForDeletion { .. } => "startDelete",
            Self::Erase { .. } => "deleteData",
            Self::NoOp => "dummy",
        }
    }

    /// Whether this operation is a program call (and may carry references).
    pub fn is_program_call(&self) -> bool {
        !matches!(self, Self::Fund { .. })
    }
}

/// Per-call transaction parameters.
///
/// Passed by value into every planned call; nothing downstream mutates a
/// shared copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallParams {
    /// Fee paid by the call.
    pub fee: u64,
    /// When set, `fee` is charged as-is regardless of the call's size.
    pub flat_fee: bool,
}

impl Default for CallParams {
    fn default() -> Self {
        Self {
            fee: 1000,
            flat_fee: false,
        }
    }
}

impl CallParams {
    /// Parameters for a call whose program issues one inner payment.
    pub fn with_inner_refund(self) -> Self {
        Self {
            fee: self.fee * 2,
            flat_fee: true,
        }
    }
}

/// An operation plus the box references it declares.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub op: Operation,
    /// Declared box references. Repeats are intentional: each entry adds
    /// to the batch's pooled I/O budget.
    pub refs: Vec<BoxKey>,
    pub note: Option<Vec<u8>>,
    pub params: CallParams,
}

impl Call {
    pub fn new(op: Operation, refs: Vec<BoxKey>, params: CallParams) -> Self {
        Self {
            op,
            refs,
            note: None,
            params,
        }
    }

    pub fn with_note(mut self, note: impl Into<Vec<u8>>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Calls submitted together as one atomic unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub calls: Vec<Call>,
}

impl Batch {
    pub fn new(calls: Vec<Call>) -> Self {
        Self { calls }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Total references across all calls, repeats included.
    pub fn ref_count(&self) -> usize {
        self.calls.iter().map(|c| c.refs.len()).sum()
    }

    /// Distinct keys the batch is permitted to touch.
    pub fn ref_set(&self) -> BTreeSet<BoxKey> {
        self.calls.iter().flat_map(|c| c.refs.iter().copied()).collect()
    }

    /// Number of calls invoking `method`.
    pub fn count_method(&self, method: &str) -> usize {
        self.calls.iter().filter(|c| c.op.method() == method).count()
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.calls.iter().map(|c| c.op.method()).collect();
        write!(f, "[{}] ({} refs)", methods.join(", "), self.ref_count())
    }
}
