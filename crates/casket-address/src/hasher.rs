use async_trait::async_trait;
use casket_types::ContentHash;
use tokio::io::AsyncReadExt;

use crate::error::AddressResult;
use crate::source::ByteSource;

const READ_CHUNK: usize = 64 * 1024;

/// Computes the content hash of a byte source.
///
/// Must be deterministic: the same bytes always hash the same.
#[async_trait]
pub trait Hasher: Send + Sync {
    async fn compute_hash(&self, source: &dyn ByteSource) -> AddressResult<ContentHash>;
}

/// Domain-separated BLAKE3 content hasher.
///
/// The domain tag is prepended to every hash computation, so identical bytes
/// hashed under different tags never collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Blake3Hasher {
    domain: &'static str,
}

impl Blake3Hasher {
    /// Hasher for blob content.
    pub const BLOB: Self = Self {
        domain: "casket-blob-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }

    fn start(&self) -> blake3::Hasher {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher
    }

    /// Hash an in-memory buffer.
    pub fn hash_bytes(&self, data: &[u8]) -> ContentHash {
        let mut hasher = self.start();
        hasher.update(data);
        ContentHash::from_digest(*hasher.finalize().as_bytes())
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::BLOB
    }
}

#[async_trait]
impl Hasher for Blake3Hasher {
    async fn compute_hash(&self, source: &dyn ByteSource) -> AddressResult<ContentHash> {
        let mut reader = source.open().await?;
        let mut hasher = self.start();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(ContentHash::from_digest(*hasher.finalize().as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BytesSource;

    #[tokio::test]
    async fn hash_is_deterministic() {
        let source = BytesSource::new(&b"hello world"[..]);
        let a = Blake3Hasher::BLOB.compute_hash(&source).await.unwrap();
        let b = Blake3Hasher::BLOB.compute_hash(&source).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn streaming_matches_in_memory() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let streamed = Blake3Hasher::BLOB
            .compute_hash(&BytesSource::new(data.clone()))
            .await
            .unwrap();
        assert_eq!(streamed, Blake3Hasher::BLOB.hash_bytes(&data));
    }

    #[test]
    fn domains_separate_hashes() {
        let custom = Blake3Hasher::new("casket-test-v1");
        assert_eq!(custom.domain(), "casket-test-v1");
        assert_ne!(custom.hash_bytes(b"same"), Blake3Hasher::BLOB.hash_bytes(b"same"));
    }

    #[test]
    fn different_content_differs() {
        assert_ne!(
            Blake3Hasher::BLOB.hash_bytes(b"a"),
            Blake3Hasher::BLOB.hash_bytes(b"b")
        );
    }
}
