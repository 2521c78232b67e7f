use casket_types::{BlobKey, ContentHash};

use crate::error::AddressResult;

/// Derives the storage key for a content hash.
///
/// Must be a pure function of the hash: same hash, same key, regardless of
/// call order or prior calls.
pub trait KeyGenerator: Send + Sync {
    fn derive_key(&self, hash: &ContentHash) -> AddressResult<BlobKey>;
}

/// Hex-encodes the hash, optionally under a prefix and shard directories.
///
/// With `shard_levels = 2` and prefix `"blobs"`, hash `abcdef…` becomes
/// `blobs/ab/cd/abcdef…`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HexKeyGenerator {
    prefix: Option<String>,
    shard_levels: usize,
}

impl HexKeyGenerator {
    /// Largest supported shard depth; each level consumes two hex digits.
    pub const MAX_SHARD_LEVELS: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }

    /// Put every key under `prefix/`. Surrounding slashes are trimmed.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        self.prefix = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    #[must_use]
    pub fn with_shard_levels(mut self, levels: usize) -> Self {
        self.shard_levels = levels.min(Self::MAX_SHARD_LEVELS);
        self
    }
}

impl KeyGenerator for HexKeyGenerator {
    fn derive_key(&self, hash: &ContentHash) -> AddressResult<BlobKey> {
        let hex = hash.to_hex();
        let mut key = String::with_capacity(hex.len() + 3 * self.shard_levels + 16);
        if let Some(prefix) = &self.prefix {
            key.push_str(prefix);
            key.push('/');
        }
        for level in 0..self.shard_levels {
            key.push_str(&hex[level * 2..level * 2 + 2]);
            key.push('/');
        }
        key.push_str(&hex);
        Ok(BlobKey::new(key)?)
    }
}
