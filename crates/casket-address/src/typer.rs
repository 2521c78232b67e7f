use async_trait::async_trait;
use tokio::io::AsyncReadExt;

use crate::error::AddressResult;
use crate::source::ByteSource;

/// Infers a MIME type from content.
#[async_trait]
pub trait ContentTyper: Send + Sync {
    async fn infer_type(&self, source: &dyn ByteSource) -> AddressResult<Option<String>>;
}

/// Never infers anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullContentTyper;

#[async_trait]
impl ContentTyper for NullContentTyper {
    async fn infer_type(&self, _source: &dyn ByteSource) -> AddressResult<Option<String>> {
        Ok(None)
    }
}

const SNIFF_LEN: usize = 16;

const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"\x1f\x8b", "application/gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x28\xb5\x2f\xfd", "application/zstd"),
];

/// Recognizes a handful of common formats by their leading magic bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct MagicContentTyper;

impl MagicContentTyper {
    pub fn sniff(head: &[u8]) -> Option<&'static str> {
        SIGNATURES
            .iter()
            .find(|(magic, _)| head.starts_with(magic))
            .map(|(_, mime)| *mime)
    }
}

#[async_trait]
impl ContentTyper for MagicContentTyper {
    async fn infer_type(&self, source: &dyn ByteSource) -> AddressResult<Option<String>> {
        let mut reader = source.open().await?;
        let mut head = Vec::with_capacity(SNIFF_LEN);
        (&mut reader).take(SNIFF_LEN as u64).read_to_end(&mut head).await?;
        Ok(Self::sniff(&head).map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BytesSource;

    #[tokio::test]
    async fn null_typer_infers_nothing() {
        let source = BytesSource::new(&b"\x89PNG\r\n\x1a\n"[..]);
        assert!(NullContentTyper.infer_type(&source).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn magic_typer_recognizes_png() {
        let source = BytesSource::new(&b"\x89PNG\r\n\x1a\n rest of image"[..]);
        assert_eq!(
            MagicContentTyper.infer_type(&source).await.unwrap().as_deref(),
            Some("image/png")
        );
    }

    #[test]
    fn unknown_and_short_content() {
        assert_eq!(MagicContentTyper::sniff(b"plain text"), None);
        assert_eq!(MagicContentTyper::sniff(b""), None);
        assert_eq!(MagicContentTyper::sniff(b"%PDF-1.7"), Some("application/pdf"));
    }
}
