//! Foundation types for casket.
//!
//! casket is a content-addressable facade over remote, paginated key-value
//! blob stores. This crate holds the plain data shared by every other
//! casket crate; it performs no I/O.
//!
//! # Key Types
//!
//! - [`BlobKey`] -- Opaque, non-empty identifier of a blob within one store
//! - [`Properties`] -- Name/value pairs attached to a blob at upload time
//! - [`BlobMetadata`] -- Read-only snapshot returned by download/describe
//! - [`ContentHash`] -- Fixed-size digest of a blob's bytes
//! - [`StatisticsSummary`] -- Count/size/min/max over a whole store

pub mod error;
pub mod hash;
pub mod key;
pub mod metadata;
pub mod properties;
pub mod stats;

pub use error::TypeError;
pub use hash::ContentHash;
pub use key::BlobKey;
pub use metadata::BlobMetadata;
pub use properties::Properties;
pub use stats::StatisticsSummary;
