//! High-level boxstash client.
//!
//! Stores arbitrarily large blobs on a remote box store whose program caps
//! slot size, call payload, references per call, and calls per batch.
//! [`BoxStash`] ties an account, a [`LedgerClient`](boxstash_ledger::LedgerClient)
//! and a [`ClientConfig`] together; the orchestrators underneath run each
//! protocol as an explicit state machine.
//!
//! - [`UploadOrchestrator`]: allocate, write every slot, finalize
//! - [`DeleteOrchestrator`]: mark for deletion, erase every slot
//! - [`resolve()`]: read a ready blob back

pub mod client;
pub mod config;
pub mod delete;
pub mod error;
pub mod report;
pub mod resolve;
pub mod submit;
pub mod upload;

pub use client::BoxStash;
pub use config::{ClientConfig, RetryPolicy};
pub use delete::{DeleteOrchestrator, DeletePhase};
pub use error::{SdkError, SdkResult};
pub use report::{BatchReceipt, DeleteReport, Stage, UpdateReport, UploadReport};
pub use resolve::resolve;
pub use submit::{read_metadata, Submitter};
pub use upload::{UploadOrchestrator, UploadPhase};

// Re-export key types
pub use boxstash_ledger::{Account, InMemoryLedger, LedgerClient, LocalKeySource};
pub use boxstash_plan::CostBreakdown;
pub use boxstash_types::{BlobStatus, DocumentLocator, MetadataRecord, OwnerKey, StoreLimits};
