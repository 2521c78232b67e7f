//! Duplicate-content detection.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use casket_store::BlobStore;
use casket_types::{BlobKey, ContentHash};

use crate::error::AddressResult;
use crate::keygen::KeyGenerator;
use crate::source::ByteSource;

/// Finds an already-stored key for content, and records new ones.
///
/// Whether the lookup trusts the hash alone or also compares content is the
/// implementation's choice.
#[async_trait]
pub trait Deduper: Send + Sync {
    async fn find_existing_key(
        &self,
        hash: &ContentHash,
        source: &dyn ByteSource,
    ) -> AddressResult<Option<BlobKey>>;

    /// Record that `hash` is now stored under `key`.
    async fn register_key(&self, hash: &ContentHash, key: &BlobKey) -> AddressResult<()>;
}

/// Hash-to-key index kept in memory. Trusts the hash alone.
///
/// When two registrations race for one hash, the later one wins.
#[derive(Debug, Default)]
pub struct InMemoryDeduper {
    index: RwLock<HashMap<ContentHash, BlobKey>>,
}

impl InMemoryDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.index.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, hash: &ContentHash) -> Option<BlobKey> {
        self.index.read().expect("lock poisoned").get(hash).cloned()
    }
}

#[async_trait]
impl Deduper for InMemoryDeduper {
    async fn find_existing_key(
        &self,
        hash: &ContentHash,
        _source: &dyn ByteSource,
    ) -> AddressResult<Option<BlobKey>> {
        Ok(self.lookup(hash))
    }

    async fn register_key(&self, hash: &ContentHash, key: &BlobKey) -> AddressResult<()> {
        self.index
            .write()
            .expect("lock poisoned")
            .insert(*hash, key.clone());
        Ok(())
    }
}

/// Asks the target store whether the derived key already exists.
///
/// Stateless: registration is a no-op because the store itself is the index.
/// Only meaningful with a deterministic [`KeyGenerator`].
pub struct ProbingDeduper {
    store: Arc<dyn BlobStore>,
    keys: Arc<dyn KeyGenerator>,
}

impl ProbingDeduper {
    pub fn new(store: Arc<dyn BlobStore>, keys: Arc<dyn KeyGenerator>) -> Self {
        Self { store, keys }
    }
}

#[async_trait]
impl Deduper for ProbingDeduper {
    async fn find_existing_key(
        &self,
        hash: &ContentHash,
        _source: &dyn ByteSource,
    ) -> AddressResult<Option<BlobKey>> {
        let key = self.keys.derive_key(hash)?;
        Ok(self.store.describe(&key).await?.map(|_| key))
    }

    async fn register_key(&self, _hash: &ContentHash, _key: &BlobKey) -> AddressResult<()> {
        Ok(())
    }
}

/// Never reports a duplicate.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDedupe;

#[async_trait]
impl Deduper for NoDedupe {
    async fn find_existing_key(
        &self,
        _hash: &ContentHash,
        _source: &dyn ByteSource,
    ) -> AddressResult<Option<BlobKey>> {
        Ok(None)
    }

    async fn register_key(&self, _hash: &ContentHash, _key: &BlobKey) -> AddressResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::HexKeyGenerator;
    use crate::source::BytesSource;
    use casket_store::{InMemoryTransport, TransportBlobStore};
    use casket_types::Properties;

    fn hash(byte: u8) -> ContentHash {
        ContentHash::from_digest([byte; 32])
    }

    #[tokio::test]
    async fn in_memory_last_registration_wins() {
        let deduper = InMemoryDeduper::new();
        let source = BytesSource::default();
        assert!(deduper.find_existing_key(&hash(1), &source).await.unwrap().is_none());

        deduper
            .register_key(&hash(1), &BlobKey::new("first").unwrap())
            .await
            .unwrap();
        deduper
            .register_key(&hash(1), &BlobKey::new("second").unwrap())
            .await
            .unwrap();
        let found = deduper.find_existing_key(&hash(1), &source).await.unwrap();
        assert_eq!(found.unwrap().as_str(), "second");
        assert_eq!(deduper.len(), 1);
    }

    #[tokio::test]
    async fn probing_finds_only_stored_keys() {
        let store: Arc<dyn BlobStore> = Arc::new(TransportBlobStore::new(InMemoryTransport::new()));
        let keys: Arc<dyn KeyGenerator> = Arc::new(HexKeyGenerator::new());
        let deduper = ProbingDeduper::new(Arc::clone(&store), Arc::clone(&keys));
        let source = BytesSource::default();

        assert!(deduper.find_existing_key(&hash(2), &source).await.unwrap().is_none());

        let key = keys.derive_key(&hash(2)).unwrap();
        store
            .upload_bytes(&key, b"present", &Properties::new())
            .await
            .unwrap();
        assert_eq!(
            deduper.find_existing_key(&hash(2), &source).await.unwrap(),
            Some(key)
        );
    }

    #[tokio::test]
    async fn no_dedupe_never_matches() {
        let deduper = NoDedupe;
        deduper
            .register_key(&hash(3), &BlobKey::new("k").unwrap())
            .await
            .unwrap();
        assert!(deduper
            .find_existing_key(&hash(3), &BytesSource::default())
            .await
            .unwrap()
            .is_none());
    }
}
