use async_trait::async_trait;
use casket_types::{BlobKey, BlobMetadata, Properties};

use crate::error::TransportResult;
use crate::paged::Page;
use crate::traits::{ContentReader, ContentSink};

/// One entry of a listing page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListEntry {
    pub key: BlobKey,
    pub size: u64,
}

/// Wire-level client of a remote object store.
///
/// This is the boundary casket does not own: transport, authentication and
/// retry policy all live behind it. Implementations report a missing key as
/// [`TransportError::NotFound`](crate::TransportError::NotFound) and every
/// other failure as a different variant.
#[async_trait]
pub trait ObjectTransport: Send + Sync + 'static {
    /// Store `body` under `key`. `size_hint` is the exact body length.
    async fn put_object(
        &self,
        key: &BlobKey,
        body: &mut ContentReader<'_>,
        size_hint: u64,
        properties: &Properties,
    ) -> TransportResult<()>;

    /// Write the object's bytes into `sink` and return its metadata.
    async fn get_object(
        &self,
        key: &BlobKey,
        sink: &mut ContentSink<'_>,
    ) -> TransportResult<BlobMetadata>;

    async fn head_object(&self, key: &BlobKey) -> TransportResult<BlobMetadata>;

    async fn delete_object(&self, key: &BlobKey) -> TransportResult<()>;

    /// Fetch one listing page. `None` requests the first page.
    async fn list_objects_page(&self, continuation: Option<&str>)
        -> TransportResult<Page<ListEntry>>;
}
