//! Ledger boundary for boxstash.
//!
//! The ledger itself is an external collaborator: it accepts signed
//! batches, returns one transaction id per call, and serves box reads.
//! This crate defines that seam and ships a faithful in-memory stand-in.
//!
//! - [`LedgerClient`] / [`KeySource`]: collaborator traits
//! - [`Account`] / [`SignedBatch`] / [`TxId`]: ed25519 signing of batches
//! - [`InMemoryLedger`]: simulated box store that enforces the remote
//!   program's reference, funding, and lifecycle rules

pub mod account;
pub mod error;
pub mod memory;
pub mod program;
pub mod traits;

pub use account::{Account, LocalKeySource, SignedBatch, TxId};
pub use error::{LedgerError, LedgerResult};
pub use memory::{application_address, InMemoryLedger};
pub use traits::{KeySource, LedgerClient};
