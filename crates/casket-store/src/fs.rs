//! Directory-backed object transport.
//!
//! Layout under the root:
//!
//! ```text
//! objects/<hex(key)>                  object bytes
//! objects/<hex(key)>.props.json       properties sidecar
//! objects/.<random>.partial           in-flight write, renamed into place
//! ```
//!
//! Keys are hex-encoded so any key maps to a flat, traversal-free file name.
//! Lowercase hex preserves byte order, so sorted file names are sorted keys.
//!
//! Every upload stages into its own uniquely named file, so concurrent
//! uploads to one key never share a staging path and the last commit wins.
//! An object and its sidecar are committed together under a write lock, and
//! readers take the read lock while pairing a handle with its properties.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use casket_types::{BlobKey, BlobMetadata, Properties};
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{TransportError, TransportResult};
use crate::memory::DEFAULT_PAGE_SIZE;
use crate::paged::Page;
use crate::traits::{ContentReader, ContentSink};
use crate::transport::{ListEntry, ObjectTransport};

const OBJECTS_DIR: &str = "objects";
const PROPS_SUFFIX: &str = ".props.json";
const PARTIAL_SUFFIX: &str = ".partial";

/// Object transport over a local directory.
#[derive(Debug, Clone)]
pub struct FsTransport {
    objects: PathBuf,
    page_size: usize,
    commit: Arc<RwLock<()>>,
}

impl FsTransport {
    /// Open (creating if needed) a transport rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> TransportResult<Self> {
        let objects = root.as_ref().join(OBJECTS_DIR);
        fs::create_dir_all(&objects).await?;
        Ok(Self {
            objects,
            page_size: DEFAULT_PAGE_SIZE,
            commit: Arc::new(RwLock::new(())),
        })
    }

    /// Set the number of entries returned per listing page.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn object_path(&self, key: &BlobKey) -> PathBuf {
        self.objects.join(hex::encode(key.as_str()))
    }

    fn sidecar_path(object: &Path) -> PathBuf {
        let mut name = object.as_os_str().to_owned();
        name.push(PROPS_SUFFIX);
        PathBuf::from(name)
    }

    /// Create a uniquely named staging file beside the committed objects.
    ///
    /// The returned path removes the file when dropped unless it was
    /// committed first.
    async fn staging_file(&self) -> TransportResult<(fs::File, TempPath)> {
        let dir = self.objects.clone();
        let named = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(".")
                .suffix(PARTIAL_SUFFIX)
                .tempfile_in(dir)
        })
        .await
        .map_err(|e| TransportError::Failed(format!("staging task failed: {e}")))??;
        let (file, path) = named.into_parts();
        Ok((fs::File::from_std(file), path))
    }

    async fn read_properties(object: &Path) -> TransportResult<Properties> {
        match fs::read(Self::sidecar_path(object)).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map_err(|e| TransportError::Failed(format!("corrupt properties sidecar: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Properties::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn metadata_at(&self, key: &BlobKey, object: &Path) -> TransportResult<BlobMetadata> {
        let _read = self.commit.read().await;
        let len = match fs::metadata(object).await {
            Ok(meta) => meta.len(),
            Err(e) => return Err(not_found_or(e, key)),
        };
        let properties = Self::read_properties(object).await?;
        Ok(BlobMetadata::from_properties(len, properties))
    }

    /// Sorted hex names of every committed object.
    async fn committed_names(&self) -> TransportResult<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.objects).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            // Sidecars and partial writes carry a dot; object names never do.
            if !name.contains('.') {
                names.push(name);
            }
        }
        names.sort_unstable();
        Ok(names)
    }
}

fn not_found_or(err: std::io::Error, key: &BlobKey) -> TransportError {
    if err.kind() == ErrorKind::NotFound {
        TransportError::NotFound(key.to_string())
    } else {
        err.into()
    }
}

/// Rename a staged file over `dest`.
async fn persist(staged: TempPath, dest: PathBuf) -> TransportResult<()> {
    tokio::task::spawn_blocking(move || staged.persist(dest))
        .await
        .map_err(|e| TransportError::Failed(format!("commit task failed: {e}")))?
        .map_err(|e| TransportError::Io(e.error))
}

#[async_trait]
impl ObjectTransport for FsTransport {
    async fn put_object(
        &self,
        key: &BlobKey,
        body: &mut ContentReader<'_>,
        size_hint: u64,
        properties: &Properties,
    ) -> TransportResult<()> {
        let object = self.object_path(key);

        // Staged paths are removed on drop, covering every early return below.
        let (mut file, staged_body) = self.staging_file().await?;
        let written = tokio::io::copy(body, &mut file).await?;
        file.sync_all().await?;
        drop(file);

        if written != size_hint {
            return Err(TransportError::Failed(format!(
                "body length {written} does not match declared length {size_hint}"
            )));
        }

        let sidecar = serde_json::to_vec(properties)
            .map_err(|e| TransportError::Failed(format!("encode properties: {e}")))?;
        let (mut file, staged_sidecar) = self.staging_file().await?;
        file.write_all(&sidecar).await?;
        file.sync_all().await?;
        drop(file);

        {
            let _write = self.commit.write().await;
            persist(staged_sidecar, Self::sidecar_path(&object)).await?;
            persist(staged_body, object).await?;
        }
        debug!(key = %key, bytes = written, "stored object");
        Ok(())
    }

    async fn get_object(
        &self,
        key: &BlobKey,
        sink: &mut ContentSink<'_>,
    ) -> TransportResult<BlobMetadata> {
        let object = self.object_path(key);
        // An open handle keeps reading the version it opened after a replace.
        let (mut file, metadata) = {
            let _read = self.commit.read().await;
            let file = fs::File::open(&object)
                .await
                .map_err(|e| not_found_or(e, key))?;
            let len = file.metadata().await?.len();
            let properties = Self::read_properties(&object).await?;
            (file, BlobMetadata::from_properties(len, properties))
        };
        let copied = tokio::io::copy(&mut file, sink).await?;
        if copied != metadata.content_length() {
            warn!(key = %key, copied, expected = metadata.content_length(), "object changed during read");
        }
        Ok(metadata)
    }

    async fn head_object(&self, key: &BlobKey) -> TransportResult<BlobMetadata> {
        let object = self.object_path(key);
        self.metadata_at(key, &object).await
    }

    async fn delete_object(&self, key: &BlobKey) -> TransportResult<()> {
        let object = self.object_path(key);
        let _write = self.commit.write().await;
        fs::remove_file(&object)
            .await
            .map_err(|e| not_found_or(e, key))?;
        match fs::remove_file(Self::sidecar_path(&object)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn list_objects_page(
        &self,
        continuation: Option<&str>,
    ) -> TransportResult<Page<ListEntry>> {
        let after = continuation.map(hex::encode);
        let names = self.committed_names().await?;
        let start = match &after {
            Some(after) => names.partition_point(|name| name <= after),
            None => 0,
        };
        let window = &names[start..];
        let take = window.len().min(self.page_size);

        let mut items = Vec::with_capacity(take);
        for name in &window[..take] {
            let raw = hex::decode(name)
                .map_err(|e| TransportError::Failed(format!("foreign file {name}: {e}")))?;
            let key = String::from_utf8(raw)
                .map_err(|e| TransportError::Failed(format!("foreign file {name}: {e}")))
                .and_then(|k| BlobKey::new(k).map_err(|e| TransportError::Failed(e.to_string())))?;
            let size = match fs::metadata(self.objects.join(name)).await {
                Ok(meta) => meta.len(),
                // Deleted between read_dir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            items.push(ListEntry { key, size });
        }

        let continuation = if window.len() > take {
            // Continue after the last name examined, even if it vanished.
            let last = hex::decode(&window[take - 1]).unwrap_or_default();
            Some(String::from_utf8_lossy(&last).into_owned())
        } else {
            None
        };
        Ok(Page::new(items, continuation))
    }
}
