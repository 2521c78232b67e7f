use std::sync::Arc;

use async_trait::async_trait;
use casket_types::{BlobKey, BlobMetadata, Properties};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::StoreResult;
use crate::paged::LazyPagedSequence;

/// Byte stream handed to an upload.
pub type ContentReader<'a> = dyn AsyncRead + Send + Unpin + 'a;

/// Destination of a download.
pub type ContentSink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// Key-addressed blob storage.
///
/// All implementations must satisfy these invariants:
/// - Each key is an independent entity; there is no cross-key consistency.
/// - An upload that returns `Ok` is visible to a later `download`/`describe`
///   of the same key, within the backing store's own consistency model.
/// - "Not found" is never an error: reads return `Ok(None)`, deletes succeed.
/// - Cancelling an operation means dropping its future; in-flight transfers
///   are abandoned rather than completed.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create or replace the blob at `key` with every byte of `content`.
    ///
    /// Previous content and properties at `key` are gone once this returns
    /// `Ok`. Concurrent uploads to one key resolve last-writer-wins.
    async fn upload(
        &self,
        key: &BlobKey,
        content: &mut ContentReader<'_>,
        properties: &Properties,
    ) -> StoreResult<()>;

    /// Stream the blob at `key` into `sink`.
    ///
    /// Returns `Ok(None)` if the key does not exist. `sink` receives bytes
    /// only after the full transfer is confirmed, so the not-found and error
    /// paths leave it untouched.
    async fn download(
        &self,
        key: &BlobKey,
        sink: &mut ContentSink<'_>,
    ) -> StoreResult<Option<BlobMetadata>>;

    /// Fetch metadata only. Same not-found semantics as `download`.
    async fn describe(&self, key: &BlobKey) -> StoreResult<Option<BlobMetadata>>;

    /// Remove the blob at `key`. Succeeds whether or not it exists.
    async fn delete(&self, key: &BlobKey) -> StoreResult<()>;

    /// Lazily enumerate every key. Nothing is fetched until first consumed.
    fn enumerate_keys(&self) -> LazyPagedSequence<BlobKey>;

    /// Upload an in-memory buffer.
    async fn upload_bytes(
        &self,
        key: &BlobKey,
        content: &[u8],
        properties: &Properties,
    ) -> StoreResult<()> {
        let mut reader = content;
        self.upload(key, &mut reader, properties).await
    }

    /// Download into memory.
    async fn download_bytes(&self, key: &BlobKey) -> StoreResult<Option<(Vec<u8>, BlobMetadata)>> {
        let mut buf = Vec::new();
        Ok(self
            .download(key, &mut buf)
            .await?
            .map(|meta| (buf, meta)))
    }
}

#[async_trait]
impl<S: BlobStore + ?Sized> BlobStore for Arc<S> {
    async fn upload(
        &self,
        key: &BlobKey,
        content: &mut ContentReader<'_>,
        properties: &Properties,
    ) -> StoreResult<()> {
        (**self).upload(key, content, properties).await
    }

    async fn download(
        &self,
        key: &BlobKey,
        sink: &mut ContentSink<'_>,
    ) -> StoreResult<Option<BlobMetadata>> {
        (**self).download(key, sink).await
    }

    async fn describe(&self, key: &BlobKey) -> StoreResult<Option<BlobMetadata>> {
        (**self).describe(key).await
    }

    async fn delete(&self, key: &BlobKey) -> StoreResult<()> {
        (**self).delete(key).await
    }

    fn enumerate_keys(&self) -> LazyPagedSequence<BlobKey> {
        (**self).enumerate_keys()
    }
}
