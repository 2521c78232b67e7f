//! Cross-store copy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use casket_types::BlobKey;
use tracing::debug;

use crate::error::StoreResult;
use crate::fanout::{for_each_key, FanOut};
use crate::staging;
use crate::traits::BlobStore;

/// Outcome counts of a [`copy_all`] run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Blobs written to the destination.
    pub copied: u64,
    /// Listed keys that were gone by the time they were downloaded.
    pub skipped: u64,
}

/// Copy one blob between stores, preserving its properties.
///
/// The source is staged into a scratch file that is released on every exit
/// path. Returns `false` without touching the destination when the source
/// key does not exist.
pub async fn copy_one<S, D>(
    source: &S,
    source_key: &BlobKey,
    dest: &D,
    dest_key: &BlobKey,
) -> StoreResult<bool>
where
    S: BlobStore + ?Sized,
    D: BlobStore + ?Sized,
{
    let mut scratch = staging::scratch_file().await?;
    let Some(meta) = source.download(source_key, &mut scratch).await? else {
        debug!(key = %source_key, "copy source missing; skipped");
        return Ok(false);
    };
    staging::rewind(&mut scratch).await?;
    dest.upload(dest_key, &mut scratch, meta.properties()).await?;
    debug!(from = %source_key, to = %dest_key, bytes = meta.content_length(), "copied blob");
    Ok(true)
}

/// Copy every blob of `source` into `dest`, renaming keys with `key_mapper`.
///
/// Keys are copied in parallel. The first failure aborts the run.
pub async fn copy_all<S, D, M>(
    source: &Arc<S>,
    dest: &Arc<D>,
    key_mapper: M,
    fan_out: &FanOut,
) -> StoreResult<CopyReport>
where
    S: BlobStore + ?Sized + 'static,
    D: BlobStore + ?Sized + 'static,
    M: Fn(&BlobKey) -> BlobKey + Send + Sync + 'static,
{
    let copied = Arc::new(AtomicU64::new(0));
    let skipped = Arc::new(AtomicU64::new(0));
    let key_mapper = Arc::new(key_mapper);

    let (from, to) = (Arc::clone(source), Arc::clone(dest));
    let (copied_tally, skipped_tally) = (Arc::clone(&copied), Arc::clone(&skipped));
    for_each_key(source, fan_out, move |key| {
        let (from, to, mapper) = (Arc::clone(&from), Arc::clone(&to), Arc::clone(&key_mapper));
        let (copied, skipped) = (Arc::clone(&copied_tally), Arc::clone(&skipped_tally));
        async move {
            let dest_key = mapper(&key);
            let tally = if copy_one(&*from, &key, &*to, &dest_key).await? {
                copied
            } else {
                skipped
            };
            tally.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    })
    .await?;

    Ok(CopyReport {
        copied: copied.load(Ordering::Acquire),
        skipped: skipped.load(Ordering::Acquire),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::InMemoryTransport;
    use crate::paged::LazyPagedSequence;
    use crate::remote::TransportBlobStore;
    use crate::traits::{ContentReader, ContentSink};
    use async_trait::async_trait;
    use casket_types::{BlobMetadata, Properties};

    type MemStore = TransportBlobStore<InMemoryTransport>;

    fn key(s: &str) -> BlobKey {
        BlobKey::new(s).unwrap()
    }

    fn store() -> Arc<MemStore> {
        Arc::new(TransportBlobStore::new(InMemoryTransport::with_page_size(1)))
    }

    #[tokio::test]
    async fn copy_one_preserves_content_and_properties() {
        let (a, b) = (store(), store());
        let props = Properties::new()
            .with(Properties::CONTENT_TYPE, "text/csv")
            .with("owner", "ops");
        a.upload_bytes(&key("report.csv"), b"x,y\n1,2\n", &props)
            .await
            .unwrap();

        assert!(copy_one(&*a, &key("report.csv"), &*b, &key("archive/report.csv"))
            .await
            .unwrap());

        let (bytes, meta) = b
            .download_bytes(&key("archive/report.csv"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bytes, b"x,y\n1,2\n");
        assert_eq!(meta.properties(), &props);
    }

    #[tokio::test]
    async fn copy_one_from_missing_source_is_a_no_op() {
        let (a, b) = (store(), store());
        assert!(!copy_one(&*a, &key("ghost"), &*b, &key("ghost")).await.unwrap());
        assert!(b.transport().is_empty());
        assert_eq!(b.transport().calls().puts, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn copy_all_with_identity_mapper() {
        let (a, b) = (store(), store());
        a.upload_bytes(&key("a"), b"alpha", &Properties::new().with("n", "1"))
            .await
            .unwrap();
        a.upload_bytes(&key("b"), b"beta", &Properties::new().with("n", "2"))
            .await
            .unwrap();

        let report = copy_all(&a, &b, BlobKey::clone, &FanOut::new())
            .await
            .unwrap();
        assert_eq!(report, CopyReport { copied: 2, skipped: 0 });
        assert_eq!(b.transport().keys(), vec!["a", "b"]);
        for k in ["a", "b"] {
            let (src, src_meta) = a.download_bytes(&key(k)).await.unwrap().unwrap();
            let (dst, dst_meta) = b.download_bytes(&key(k)).await.unwrap().unwrap();
            assert_eq!(src, dst);
            assert_eq!(src_meta, dst_meta);
        }
    }

    #[tokio::test]
    async fn copy_all_applies_the_mapper() {
        let (a, b) = (store(), store());
        a.upload_bytes(&key("x"), b"1", &Properties::new())
            .await
            .unwrap();
        copy_all(&a, &b, |k| key(&format!("backup/{k}")), &FanOut::new())
            .await
            .unwrap();
        assert_eq!(b.transport().keys(), vec!["backup/x"]);
    }

    #[tokio::test]
    async fn copy_all_surfaces_cancellation() {
        let (a, b) = (store(), store());
        a.upload_bytes(&key("x"), b"1", &Properties::new())
            .await
            .unwrap();
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let err = copy_all(&a, &b, BlobKey::clone, &FanOut::new().with_cancellation(token))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
        assert!(b.transport().is_empty());
    }

    /// A store whose listing still names keys that were deleted.
    struct StaleListing {
        inner: Arc<MemStore>,
        listed: Vec<&'static str>,
    }

    #[async_trait]
    impl BlobStore for StaleListing {
        async fn upload(&self, key: &BlobKey, content: &mut ContentReader<'_>, properties: &Properties) -> StoreResult<()> {
            self.inner.upload(key, content, properties).await
        }

        async fn download(&self, key: &BlobKey, sink: &mut ContentSink<'_>) -> StoreResult<Option<BlobMetadata>> {
            self.inner.download(key, sink).await
        }

        async fn describe(&self, key: &BlobKey) -> StoreResult<Option<BlobMetadata>> {
            self.inner.describe(key).await
        }

        async fn delete(&self, key: &BlobKey) -> StoreResult<()> {
            self.inner.delete(key).await
        }

        fn enumerate_keys(&self) -> LazyPagedSequence<BlobKey> {
            let keys = self.listed.iter().map(|k| key(k)).collect();
            LazyPagedSequence::new(crate::paged::tests_support::Fixed(keys))
        }
    }

    #[tokio::test]
    async fn copy_all_skips_keys_gone_before_download() {
        let inner = store();
        inner
            .upload_bytes(&key("kept"), b"1", &Properties::new())
            .await
            .unwrap();
        let source = Arc::new(StaleListing {
            inner,
            listed: vec!["gone", "kept"],
        });
        let dest = store();

        let report = copy_all(&source, &dest, BlobKey::clone, &FanOut::new())
            .await
            .unwrap();
        assert_eq!(report, CopyReport { copied: 1, skipped: 1 });
        assert_eq!(dest.transport().keys(), vec!["kept"]);
    }
}
