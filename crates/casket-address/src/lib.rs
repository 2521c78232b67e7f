//! Content-addressed uploads for casket.
//!
//! [`ContentAddresser`] stores content under a key derived from its hash, so
//! callers never choose keys and identical content is stored once. Each step
//! of the pipeline is a pluggable capability:
//!
//! - [`Hasher`] -- content hash of a re-openable [`ByteSource`]
//!   ([`Blake3Hasher`] by default)
//! - [`Deduper`] -- finds content that is already stored
//!   ([`InMemoryDeduper`], [`ProbingDeduper`], [`NoDedupe`])
//! - [`KeyGenerator`] -- pure hash-to-key mapping ([`HexKeyGenerator`])
//! - [`ContentTyper`] -- optional MIME inference ([`NullContentTyper`],
//!   [`MagicContentTyper`])
//!
//! [`UriIngester`] feeds remote resources through the same pipeline.

pub mod addresser;
pub mod dedupe;
pub mod error;
pub mod hasher;
pub mod keygen;
pub mod source;
pub mod typer;
pub mod uri;

pub use addresser::ContentAddresser;
pub use dedupe::{Deduper, InMemoryDeduper, NoDedupe, ProbingDeduper};
pub use error::{AddressError, AddressResult};
pub use hasher::{Blake3Hasher, Hasher};
pub use keygen::{HexKeyGenerator, KeyGenerator};
pub use source::{ByteSource, BytesSource, FileSource, SourceReader};
pub use typer::{ContentTyper, MagicContentTyper, NullContentTyper};
pub use uri::{canonical_header_name, FetchedBody, HttpFetcher, ReqwestFetcher, UriIngester};
