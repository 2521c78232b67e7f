//! [`BlobStore`] over a remote [`ObjectTransport`].

use std::sync::Arc;

use async_trait::async_trait;
use casket_types::{BlobKey, BlobMetadata, Properties, StatisticsSummary};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregate::StatsAccumulator;
use crate::error::{StoreError, StoreResult, TransportError};
use crate::fanout::cancellable;
use crate::paged::{LazyPagedSequence, Page, PageSource};
use crate::staging;
use crate::traits::{BlobStore, ContentReader, ContentSink};
use crate::transport::{ListEntry, ObjectTransport};

/// A blob store backed by a remote object transport.
///
/// Uploads are staged to a local scratch file first so the transport always
/// receives an exact, known length. Downloads are staged the same way so the
/// caller's sink sees bytes only once the whole object has arrived.
pub struct TransportBlobStore<T: ObjectTransport> {
    transport: Arc<T>,
}

impl<T: ObjectTransport> TransportBlobStore<T> {
    pub fn new(transport: T) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    pub fn from_shared(transport: Arc<T>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    fn entries(&self) -> LazyPagedSequence<ListEntry> {
        LazyPagedSequence::new(EntryPages {
            transport: Arc::clone(&self.transport),
        })
    }

    /// Summarize the store from listing sizes alone, without per-key describes.
    ///
    /// Cheaper than [`compute_statistics`](crate::compute_statistics) but
    /// trusts the sizes reported by the listing.
    pub async fn listing_statistics(&self, cancel: &CancellationToken) -> StoreResult<StatisticsSummary> {
        let entries = self.entries();
        let stats = StatsAccumulator::new();
        loop {
            let next = cancellable(cancel, async { entries.next().await.transpose() }).await?;
            match next {
                Some(entry) => stats.record(entry.size),
                None => return Ok(stats.summary()),
            }
        }
    }
}

impl<T: ObjectTransport> Clone for TransportBlobStore<T> {
    fn clone(&self) -> Self {
        Self::from_shared(Arc::clone(&self.transport))
    }
}

impl<T: ObjectTransport + std::fmt::Debug> std::fmt::Debug for TransportBlobStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportBlobStore")
            .field("transport", &self.transport)
            .finish()
    }
}

#[async_trait]
impl<T: ObjectTransport> BlobStore for TransportBlobStore<T> {
    async fn upload(
        &self,
        key: &BlobKey,
        content: &mut ContentReader<'_>,
        properties: &Properties,
    ) -> StoreResult<()> {
        let (mut staged, len) = staging::stage(content).await?;
        self.transport
            .put_object(key, &mut staged, len, properties)
            .await?;
        debug!(key = %key, bytes = len, "uploaded blob");
        Ok(())
    }

    async fn download(
        &self,
        key: &BlobKey,
        sink: &mut ContentSink<'_>,
    ) -> StoreResult<Option<BlobMetadata>> {
        let mut scratch = staging::scratch_file().await?;
        match self.transport.get_object(key, &mut scratch).await {
            Ok(meta) => {
                staging::release_into(&mut scratch, sink).await?;
                Ok(Some(meta))
            }
            Err(TransportError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn describe(&self, key: &BlobKey) -> StoreResult<Option<BlobMetadata>> {
        match self.transport.head_object(key).await {
            Ok(meta) => Ok(Some(meta)),
            Err(TransportError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &BlobKey) -> StoreResult<()> {
        match self.transport.delete_object(key).await {
            Ok(()) | Err(TransportError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn enumerate_keys(&self) -> LazyPagedSequence<BlobKey> {
        LazyPagedSequence::new(KeyPages {
            transport: Arc::clone(&self.transport),
        })
    }
}

/// Fetch one listing page, rejecting an empty continuation token.
async fn list_page<T: ObjectTransport>(
    transport: &T,
    continuation: Option<&str>,
) -> StoreResult<Page<ListEntry>> {
    if continuation.is_some_and(str::is_empty) {
        return Err(StoreError::InvariantViolation(
            "transport issued an empty continuation token".into(),
        ));
    }
    Ok(transport.list_objects_page(continuation).await?)
}

struct EntryPages<T> {
    transport: Arc<T>,
}

#[async_trait]
impl<T: ObjectTransport> PageSource<ListEntry> for EntryPages<T> {
    async fn first_page(&self) -> StoreResult<Page<ListEntry>> {
        list_page(self.transport.as_ref(), None).await
    }

    async fn next_page(&self, continuation: &str) -> StoreResult<Page<ListEntry>> {
        list_page(self.transport.as_ref(), Some(continuation)).await
    }
}

struct KeyPages<T> {
    transport: Arc<T>,
}

#[async_trait]
impl<T: ObjectTransport> PageSource<BlobKey> for KeyPages<T> {
    async fn first_page(&self) -> StoreResult<Page<BlobKey>> {
        let page = list_page(self.transport.as_ref(), None).await?;
        Ok(page.map(|entry| entry.key))
    }

    async fn next_page(&self, continuation: &str) -> StoreResult<Page<BlobKey>> {
        let page = list_page(self.transport.as_ref(), Some(continuation)).await?;
        Ok(page.map(|entry| entry.key))
    }
}
