//! The content-addressed upload pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use casket_store::{BlobStore, ContentReader, ContentSink, LazyPagedSequence, StoreResult};
use casket_types::{BlobKey, BlobMetadata, Properties};
use tracing::debug;

use crate::dedupe::{Deduper, InMemoryDeduper};
use crate::error::{AddressError, AddressResult};
use crate::hasher::{Blake3Hasher, Hasher};
use crate::keygen::{HexKeyGenerator, KeyGenerator};
use crate::source::ByteSource;
use crate::typer::{ContentTyper, NullContentTyper};

/// Uploads content under a key derived from its hash.
///
/// Each upload runs these steps in order:
///
/// 1. Hash the source.
/// 2. Ask the deduper for an existing key. On a hit, return it at once:
///    nothing is uploaded and no properties change.
/// 3. If the caller declared no content type, try to infer one.
/// 4. Derive the key from the hash.
/// 5. Upload from a freshly opened stream.
/// 6. Register the key with the deduper, only after the upload succeeded.
///
/// A failure in steps 1-4 aborts before any transfer. A failed upload is
/// never registered.
///
/// Also a [`BlobStore`]: the keyed operations pass straight through to the
/// wrapped store.
pub struct ContentAddresser {
    store: Arc<dyn BlobStore>,
    hasher: Arc<dyn Hasher>,
    deduper: Arc<dyn Deduper>,
    keys: Arc<dyn KeyGenerator>,
    typer: Arc<dyn ContentTyper>,
}

impl ContentAddresser {
    /// BLAKE3 hashing, an in-memory dedupe index, plain hex keys, and no
    /// type inference.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            hasher: Arc::new(Blake3Hasher::BLOB),
            deduper: Arc::new(InMemoryDeduper::new()),
            keys: Arc::new(HexKeyGenerator::new()),
            typer: Arc::new(NullContentTyper),
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn Hasher>) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn with_deduper(mut self, deduper: Arc<dyn Deduper>) -> Self {
        self.deduper = deduper;
        self
    }

    #[must_use]
    pub fn with_key_generator(mut self, keys: Arc<dyn KeyGenerator>) -> Self {
        self.keys = keys;
        self
    }

    #[must_use]
    pub fn with_content_typer(mut self, typer: Arc<dyn ContentTyper>) -> Self {
        self.typer = typer;
        self
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn key_generator(&self) -> &Arc<dyn KeyGenerator> {
        &self.keys
    }

    /// Store `source` under its content-derived key and return that key.
    pub async fn upload_content(
        &self,
        source: &dyn ByteSource,
        properties: &Properties,
    ) -> AddressResult<BlobKey> {
        let hash = self.hasher.compute_hash(source).await?;
        // The all-zero digest is reserved as "no hash".
        if hash.is_zero() {
            return Err(AddressError::InvariantViolation(
                "hasher produced the all-zero digest".into(),
            ));
        }

        if let Some(existing) = self.deduper.find_existing_key(&hash, source).await? {
            debug!(hash = %hash.short_hex(), key = %existing, "dedupe hit");
            return Ok(existing);
        }

        let mut properties = properties.clone();
        if properties.content_type().is_none() {
            if let Some(inferred) = self.typer.infer_type(source).await? {
                debug!(content_type = %inferred, "inferred content type");
                properties.set_content_type(inferred);
            }
        }

        let key = self.keys.derive_key(&hash)?;

        let mut stream = source.open().await?;
        self.store.upload(&key, &mut stream, &properties).await?;

        self.deduper.register_key(&hash, &key).await?;
        debug!(hash = %hash.short_hex(), key = %key, "stored new content");
        Ok(key)
    }
}

impl std::fmt::Debug for ContentAddresser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentAddresser").finish_non_exhaustive()
    }
}

#[async_trait]
impl BlobStore for ContentAddresser {
    async fn upload(
        &self,
        key: &BlobKey,
        content: &mut ContentReader<'_>,
        properties: &Properties,
    ) -> StoreResult<()> {
        self.store.upload(key, content, properties).await
    }

    async fn download(
        &self,
        key: &BlobKey,
        sink: &mut ContentSink<'_>,
    ) -> StoreResult<Option<BlobMetadata>> {
        self.store.download(key, sink).await
    }

    async fn describe(&self, key: &BlobKey) -> StoreResult<Option<BlobMetadata>> {
        self.store.describe(key).await
    }

    async fn delete(&self, key: &BlobKey) -> StoreResult<()> {
        self.store.delete(key).await
    }

    fn enumerate_keys(&self) -> LazyPagedSequence<BlobKey> {
        self.store.enumerate_keys()
    }
}
