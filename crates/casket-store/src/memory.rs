use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use casket_types::{BlobKey, BlobMetadata, Properties};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{TransportError, TransportResult};
use crate::paged::Page;
use crate::traits::{ContentReader, ContentSink};
use crate::transport::{ListEntry, ObjectTransport};

/// Default number of entries per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct StoredObject {
    data: Bytes,
    properties: Properties,
}

impl StoredObject {
    fn metadata(&self) -> BlobMetadata {
        BlobMetadata::from_properties(self.data.len() as u64, self.properties.clone())
    }
}

/// Per-operation call counts of an [`InMemoryTransport`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub puts: usize,
    pub gets: usize,
    pub heads: usize,
    pub deletes: usize,
    pub list_pages: usize,
}

#[derive(Default)]
struct Counters {
    puts: AtomicUsize,
    gets: AtomicUsize,
    heads: AtomicUsize,
    deletes: AtomicUsize,
    list_pages: AtomicUsize,
}

/// In-memory, `BTreeMap`-based object transport.
///
/// Intended for tests and embedding. Listings are paginated with a
/// configurable page size and a start-after continuation token, the way a
/// remote object store pages its listings. Every call is counted.
pub struct InMemoryTransport {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
    counters: Counters,
}

impl InMemoryTransport {
    /// Create a new empty transport with the default page size.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a new empty transport that lists `page_size` keys per page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            counters: Counters::default(),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the transport holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of every stored key.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Raw bytes stored under `key`, bypassing the call counters.
    pub fn object_bytes(&self, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key)
            .map(|obj| obj.data.clone())
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            puts: self.counters.puts.load(Ordering::SeqCst),
            gets: self.counters.gets.load(Ordering::SeqCst),
            heads: self.counters.heads.load(Ordering::SeqCst),
            deletes: self.counters.deletes.load(Ordering::SeqCst),
            list_pages: self.counters.list_pages.load(Ordering::SeqCst),
        }
    }

    fn lookup(&self, key: &BlobKey) -> TransportResult<StoredObject> {
        self.objects
            .read()
            .expect("lock poisoned")
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| TransportError::NotFound(key.to_string()))
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectTransport for InMemoryTransport {
    async fn put_object(
        &self,
        key: &BlobKey,
        body: &mut ContentReader<'_>,
        size_hint: u64,
        properties: &Properties,
    ) -> TransportResult<()> {
        self.counters.puts.fetch_add(1, Ordering::SeqCst);
        let mut data = Vec::with_capacity(size_hint as usize);
        body.read_to_end(&mut data).await?;
        if data.len() as u64 != size_hint {
            return Err(TransportError::Failed(format!(
                "body length {} does not match declared length {size_hint}",
                data.len()
            )));
        }
        let object = StoredObject {
            data: Bytes::from(data),
            properties: properties.clone(),
        };
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.to_string(), object);
        Ok(())
    }

    async fn get_object(
        &self,
        key: &BlobKey,
        sink: &mut ContentSink<'_>,
    ) -> TransportResult<BlobMetadata> {
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        let object = self.lookup(key)?;
        sink.write_all(&object.data).await?;
        Ok(object.metadata())
    }

    async fn head_object(&self, key: &BlobKey) -> TransportResult<BlobMetadata> {
        self.counters.heads.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup(key)?.metadata())
    }

    async fn delete_object(&self, key: &BlobKey) -> TransportResult<()> {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects
            .write()
            .expect("lock poisoned")
            .remove(key.as_str())
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(key.to_string()))
    }

    async fn list_objects_page(
        &self,
        continuation: Option<&str>,
    ) -> TransportResult<Page<ListEntry>> {
        self.counters.list_pages.fetch_add(1, Ordering::SeqCst);
        let map = self.objects.read().expect("lock poisoned");
        let lower = match continuation {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };
        let mut window = map.range((lower, Bound::Unbounded));
        let mut items = Vec::with_capacity(self.page_size);
        for (key, object) in window.by_ref().take(self.page_size) {
            let key =
                BlobKey::new(key.clone()).map_err(|e| TransportError::Failed(e.to_string()))?;
            items.push(ListEntry {
                key,
                size: object.data.len() as u64,
            });
        }
        let continuation = match (window.next(), items.last()) {
            (Some(_), Some(last)) => Some(last.key.to_string()),
            _ => None,
        };
        Ok(Page::new(items, continuation))
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("object_count", &self.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}
