//! Blob store abstraction for casket.
//!
//! A [`BlobStore`] is a key-addressed store whose key listing arrives in
//! pages from a remote service and whose per-key metadata costs a network
//! round trip. This crate provides the store contract, the lazy paged
//! enumeration it hands out, and the parallel whole-store operations built
//! on top of it.
//!
//! # Building Blocks
//!
//! - [`LazyPagedSequence`] -- forward-only sequence over a paged listing,
//!   materialized on first use with a single first-page fetch
//! - [`ObjectTransport`] -- the wire-level client a store delegates to
//! - [`TransportBlobStore`] -- a [`BlobStore`] over any transport, staging
//!   transfers through local scratch files
//! - [`InMemoryTransport`] / [`FsTransport`] -- transports for tests,
//!   embedding, and local directories
//! - [`TransportCache`] -- injected get-or-create cache of transport clients
//!
//! # Whole-Store Operations
//!
//! [`compute_statistics`], [`copy_all`] and [`for_each_key`] fan out per-key
//! work over a bounded worker pool configured by [`FanOut`]:
//!
//! 1. Every key is claimed by exactly one worker.
//! 2. The first error observed is reported and the remaining work is aborted.
//! 3. Cancelling the [`FanOut`] token stops every worker and reports
//!    [`StoreError::Cancelled`].
//! 4. No partial result is returned from a failed run.

pub mod aggregate;
pub mod cache;
pub mod copy;
pub mod error;
pub mod fanout;
pub mod fs;
pub mod memory;
pub mod paged;
pub mod remote;
pub mod staging;
pub mod traits;
pub mod transport;

pub use aggregate::{compute_statistics, StatsAccumulator};
pub use cache::TransportCache;
pub use copy::{copy_all, copy_one, CopyReport};
pub use error::{StoreError, StoreResult, TransportError, TransportResult};
pub use fanout::{cancellable, drive, for_each_key, FanOut, DEFAULT_CONCURRENCY};
pub use fs::FsTransport;
pub use memory::{CallCounts, InMemoryTransport, DEFAULT_PAGE_SIZE};
pub use paged::{LazyPagedSequence, Page, PageSource};
pub use remote::TransportBlobStore;
pub use traits::{BlobStore, ContentReader, ContentSink};
pub use transport::{ListEntry, ObjectTransport};

pub use tokio_util::sync::CancellationToken;
