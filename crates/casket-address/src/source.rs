//! Re-openable byte sources.
//!
//! The upload pipeline reads its input several times (hash, dedupe probe,
//! type sniffing, transfer), so it takes a source that can open any number
//! of independent streams rather than a single-use reader.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, BufReader};

/// A stream opened from a [`ByteSource`].
pub type SourceReader = Pin<Box<dyn AsyncRead + Send>>;

/// Content that can be read from the start any number of times.
///
/// Every call to [`open`](Self::open) returns a fresh stream positioned at
/// the first byte, independent of any other stream opened before.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn open(&self) -> io::Result<SourceReader>;
}

/// An in-memory byte source.
#[derive(Clone, Debug, Default)]
pub struct BytesSource(Bytes);

impl BytesSource {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[async_trait]
impl ByteSource for BytesSource {
    async fn open(&self) -> io::Result<SourceReader> {
        Ok(Box::pin(io::Cursor::new(self.0.clone())))
    }
}

/// A file on disk, re-opened for every stream.
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn open(&self) -> io::Result<SourceReader> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(Box::pin(BufReader::new(file)))
    }
}
