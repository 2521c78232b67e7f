//! Content-addressed ingestion of remote URIs.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;
use tracing::debug;

use casket_types::{BlobKey, Properties};

use crate::addresser::ContentAddresser;
use crate::error::{AddressError, AddressResult};
use crate::source::{FileSource, SourceReader};

/// Property recording where ingested content came from.
pub const FROM_PROPERTY: &str = "from";

/// Response of a successful GET.
pub struct FetchedBody {
    /// Response headers, with canonical header-name casing.
    pub headers: Properties,
    pub body: SourceReader,
}

impl std::fmt::Debug for FetchedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedBody")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Performs HTTP GETs.
///
/// Implementations fail with [`AddressError::Fetch`] on any non-success
/// status.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> AddressResult<FetchedBody>;
}

/// [`HttpFetcher`] over a `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn fetch(&self, uri: &str) -> AddressResult<FetchedBody> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| AddressError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AddressError::Fetch(format!("GET {uri} returned {status}")));
        }

        let mut headers = Properties::new();
        for (name, value) in response.headers() {
            // Non-ASCII header values cannot be stored as properties.
            if let Ok(value) = value.to_str() {
                headers.insert(canonical_header_name(name.as_str()), value);
            }
        }

        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(FetchedBody {
            headers,
            body: Box::pin(StreamReader::new(body)),
        })
    }
}

/// `content-type` becomes `Content-Type`.
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Fetches URIs and stores their bodies by content.
///
/// The body is staged in a named temporary file, removed on every exit path,
/// so the pipeline can re-read it. Stored properties combine, in order of
/// precedence: response headers, then caller properties, then
/// `from = <uri>`.
pub struct UriIngester {
    addresser: Arc<ContentAddresser>,
    fetcher: Arc<dyn HttpFetcher>,
}

impl UriIngester {
    pub fn new(addresser: Arc<ContentAddresser>, fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self { addresser, fetcher }
    }

    pub fn addresser(&self) -> &Arc<ContentAddresser> {
        &self.addresser
    }

    pub async fn upload_uri(&self, uri: &str, properties: &Properties) -> AddressResult<BlobKey> {
        let fetched = self.fetcher.fetch(uri).await?;

        let origin = Properties::new().with(FROM_PROPERTY, uri);
        let caller = properties.clone().merged_over(&origin);
        let combined = fetched.headers.merged_over(&caller);

        let staged = stage_named(fetched.body).await?;
        debug!(uri, path = %staged.path().display(), "staged remote body");
        let source = FileSource::new(staged.path());
        let key = self.addresser.upload_content(&source, &combined).await?;
        drop(staged);
        Ok(key)
    }
}

async fn stage_named(mut body: SourceReader) -> AddressResult<NamedTempFile> {
    let named = tokio::task::spawn_blocking(|| {
        tempfile::Builder::new().prefix("casket-fetch-").tempfile()
    })
    .await
    .map_err(io::Error::other)??;
    let mut file = tokio::fs::File::from_std(named.as_file().try_clone()?);
    tokio::io::copy(&mut body, &mut file).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(named)
}
