//! Chunked-storage planning for boxstash.
//!
//! Everything in this crate is pure: given a blob and the store's
//! [`StoreLimits`](boxstash_types::StoreLimits) it decides how many slots
//! to allocate, what that costs, how each slot splits into write-sized
//! chunks, and how calls group into batches the remote program accepts.
//!
//! # Pipeline
//!
//! 1. [`CostModel`]: rent owed for a blob of a given length
//! 2. [`partition`] / [`chunks_for`]: blob → slots → chunks
//! 3. [`BatchPlanner`]: chunks and slot ranges → [`Batch`]es of [`Call`]s
//!
//! # Exact multiples
//!
//! A blob whose length is an exact multiple of the slot capacity fills its
//! last slot completely and declares a tail size equal to the capacity. No
//! empty trailing slot is ever planned.

pub mod batch;
pub mod cost;
pub mod error;
pub mod operation;
pub mod partition;

pub use batch::BatchPlanner;
pub use cost::{estimate_cost, CostBreakdown, CostModel};
pub use error::{PlanError, PlanResult};
pub use operation::{Batch, Call, CallParams, Operation};
pub use partition::{chunks_for, partition, slot_count, tail_size, BlobLayout, Chunk};
