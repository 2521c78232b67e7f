//! Local staging artifacts for transfers that must not be observed half-done.
//!
//! Staging files are anonymous temporary files: the OS reclaims them when the
//! handle is dropped, so every exit path (success, error, cancellation)
//! releases them.

use std::io::{self, SeekFrom};

use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::traits::{ContentReader, ContentSink};

/// Create an empty, anonymous scratch file.
pub async fn scratch_file() -> io::Result<File> {
    let file = tokio::task::spawn_blocking(tempfile::tempfile)
        .await
        .map_err(io::Error::other)??;
    Ok(File::from_std(file))
}

/// Copy `content` to a scratch file and rewind it.
///
/// Returns the file and the number of bytes staged.
pub async fn stage(content: &mut ContentReader<'_>) -> io::Result<(File, u64)> {
    let mut file = scratch_file().await?;
    let len = tokio::io::copy(content, &mut file).await?;
    rewind(&mut file).await?;
    Ok((file, len))
}

/// Flush pending writes and seek back to the start.
pub async fn rewind(file: &mut File) -> io::Result<()> {
    file.flush().await?;
    file.seek(SeekFrom::Start(0)).await?;
    Ok(())
}

/// Rewind a filled scratch file and drain it into `sink`.
pub async fn release_into(file: &mut File, sink: &mut ContentSink<'_>) -> io::Result<u64> {
    rewind(file).await?;
    let copied = tokio::io::copy(file, sink).await?;
    sink.flush().await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn stage_counts_and_rewinds() {
        let mut content: &[u8] = b"staged bytes";
        let (mut file, len) = stage(&mut content).await.unwrap();
        assert_eq!(len, 12);

        let mut back = Vec::new();
        file.read_to_end(&mut back).await.unwrap();
        assert_eq!(back, b"staged bytes");
    }

    #[tokio::test]
    async fn release_copies_everything_written() {
        let mut file = scratch_file().await.unwrap();
        file.write_all(b"hello").await.unwrap();

        let mut sink = Vec::new();
        let copied = release_into(&mut file, &mut sink).await.unwrap();
        assert_eq!(copied, 5);
        assert_eq!(sink, b"hello");
    }
}
