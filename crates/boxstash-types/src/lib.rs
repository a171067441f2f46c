//! Foundation types for boxstash.
//!
//! boxstash lays an arbitrarily large blob out over a remote box store whose
//! program enforces hard per-call limits. This crate holds the vocabulary
//! every other boxstash crate shares.
//!
//! # Key Types
//!
//! - [`OwnerKey`]: 32-byte identity that names a blob's metadata box
//! - [`BoxKey`]: either the owner's metadata box or a numbered data slot
//! - [`MetadataRecord`]: remote layout record (`start`, `end`, status, tail size)
//! - [`StoreLimits`]: the remote program's fixed limits as named constants
//! - [`AbiType`] / [`AbiValue`]: static ABI codec used for the metadata record
//! - [`DocumentLocator`]: `did:algo:<owner>-<app>` resolver input

pub mod abi;
pub mod error;
pub mod keys;
pub mod limits;
pub mod locator;
pub mod metadata;

pub use abi::{AbiType, AbiValue};
pub use error::TypeError;
pub use keys::{BoxKey, OwnerKey};
pub use limits::StoreLimits;
pub use locator::DocumentLocator;
pub use metadata::{BlobStatus, MetadataRecord, METADATA_ABI};
