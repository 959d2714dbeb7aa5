//! Document and asset fetching.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};
use tut_config::Config;

use crate::credentials::{BearerToken, CredentialProvider};
use crate::error::FetchError;
use crate::reference::{ProviderSettings, RefKind, classify};
use crate::retry::{RetryPolicy, get_with_retry};
use crate::transport::{Transport, UreqTransport};

/// Default retries for plain documents.
const DOCUMENT_RETRIES: u32 = 3;
/// Default retries for provider documents, includes and assets.
const PROVIDER_RETRIES: u32 = 7;

/// Source format of a fetched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Markdown with a metadata header.
    Markdown,
    /// Rich document exported as HTML by the provider.
    RichDocument,
}

/// A fetched byte stream.
///
/// Owned by the caller; the underlying handle is released on drop.
pub struct Resource {
    body: Box<dyn Read + Send>,
    modified: DateTime<Utc>,
    kind: SourceKind,
    origin: RefKind,
}

impl Resource {
    fn new(body: Vec<u8>, modified: DateTime<Utc>, kind: SourceKind, origin: RefKind) -> Self {
        Self {
            body: Box::new(Cursor::new(body)),
            modified,
            kind,
            origin,
        }
    }

    /// Last modification time, or the fetch time when unknown.
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Where the bytes came from.
    pub fn origin(&self) -> &RefKind {
        &self.origin
    }

    /// Local file backing this resource, if any.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.origin {
            RefKind::Local(path) => Some(path),
            _ => None,
        }
    }
}

impl Read for Resource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.body.read(buf)
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("modified", &self.modified)
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentMeta {
    mime_type: String,
    modified_time: Option<DateTime<Utc>>,
}

/// Fetches documents and assets from disk, plain URLs or the provider API.
///
/// Cheap to clone; clones share the transport and credentials.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    provider: ProviderSettings,
    document_retries: u32,
    provider_retries: u32,
}

impl Fetcher {
    /// Create a fetcher over `transport` with default retry counts.
    pub fn new(transport: Arc<dyn Transport>, provider: ProviderSettings) -> Self {
        Self {
            transport,
            credentials: None,
            provider,
            document_retries: DOCUMENT_RETRIES,
            provider_retries: PROVIDER_RETRIES,
        }
    }

    /// Build the production fetcher from configuration.
    pub fn from_config(config: &Config) -> Self {
        let transport = UreqTransport::new(Duration::from_secs(config.fetch.timeout_secs));
        let mut fetcher = Self::new(Arc::new(transport), ProviderSettings::from(&config.provider))
            .with_retries(config.fetch.document_retries, config.fetch.provider_retries);
        if let Some(token) = &config.provider.token {
            fetcher = fetcher.with_credentials(Arc::new(BearerToken::new(token.clone())));
        }
        fetcher
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_retries(mut self, document: u32, provider: u32) -> Self {
        self.document_retries = document;
        self.provider_retries = provider;
        self
    }

    pub fn provider(&self) -> &ProviderSettings {
        &self.provider
    }

    /// Classify a reference by shape.
    pub fn classify(&self, reference: &str) -> RefKind {
        classify(reference, &self.provider)
    }

    /// Fetch a top-level document.
    ///
    /// An existing local path is read directly with no retry. Provider
    /// documents get a metadata round-trip first to validate their type.
    pub async fn fetch(&self, reference: &str) -> Result<Resource, FetchError> {
        self.fetch_with(reference, false, self.document_retries).await
    }

    /// Fetch an include fragment. Provider metadata is skipped.
    pub async fn fetch_fragment(&self, reference: &str) -> Result<Resource, FetchError> {
        self.fetch_with(reference, true, self.provider_retries).await
    }

    /// Download raw asset bytes from a remote URL.
    ///
    /// With `authenticated`, provider credentials are attached.
    pub async fn fetch_bytes(&self, url: &str, authenticated: bool) -> Result<Vec<u8>, FetchError> {
        let authorization = if authenticated {
            Some(self.authorization()?)
        } else {
            None
        };
        let response = get_with_retry(
            self.transport.as_ref(),
            url,
            authorization.as_deref(),
            RetryPolicy::new(self.provider_retries),
        )
        .await?;
        Ok(response.body)
    }

    async fn fetch_with(
        &self,
        reference: &str,
        no_meta: bool,
        url_retries: u32,
    ) -> Result<Resource, FetchError> {
        if let Ok(metadata) = tokio::fs::metadata(reference).await
            && metadata.is_file()
        {
            return Self::fetch_local(Path::new(reference), &metadata).await;
        }

        match self.classify(reference) {
            RefKind::Local(path) => Err(FetchError::io(
                path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )),
            RefKind::Url(url) => self.fetch_url(url, url_retries).await,
            RefKind::Provider(id) => self.fetch_provider(&id, no_meta).await,
        }
    }

    async fn fetch_local(path: &Path, metadata: &std::fs::Metadata) -> Result<Resource, FetchError> {
        let body = tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::io(path, e))?;
        let modified = metadata
            .modified()
            .map_or_else(|_| Utc::now(), DateTime::<Utc>::from);
        debug!(path = %path.display(), bytes = body.len(), "Read local resource");
        Ok(Resource::new(
            body,
            modified,
            SourceKind::Markdown,
            RefKind::Local(path.to_path_buf()),
        ))
    }

    async fn fetch_url(&self, url: String, retries: u32) -> Result<Resource, FetchError> {
        let response =
            get_with_retry(self.transport.as_ref(), &url, None, RetryPolicy::new(retries)).await?;
        let modified = response
            .last_modified
            .as_deref()
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map_or_else(Utc::now, |t| t.with_timezone(&Utc));
        Ok(Resource::new(
            response.body,
            modified,
            SourceKind::Markdown,
            RefKind::Url(url),
        ))
    }

    async fn fetch_provider(&self, id: &str, no_meta: bool) -> Result<Resource, FetchError> {
        let authorization = self.authorization()?;
        let policy = RetryPolicy::new(self.provider_retries);
        let transport = self.transport.as_ref();

        let modified = if no_meta {
            Utc::now()
        } else {
            let url = self.provider.metadata_url(id);
            let response = get_with_retry(transport, &url, Some(&authorization), policy).await?;
            let meta: DocumentMeta =
                serde_json::from_slice(&response.body).map_err(|source| FetchError::Metadata {
                    id: id.to_owned(),
                    source,
                })?;
            if meta.mime_type != self.provider.mime_type {
                return Err(FetchError::MimeType {
                    id: id.to_owned(),
                    mime_type: meta.mime_type,
                });
            }
            meta.modified_time.unwrap_or_else(Utc::now)
        };

        let export = self.provider.export_url(id);
        let response = get_with_retry(transport, &export, Some(&authorization), policy).await?;
        info!(id, bytes = response.body.len(), "Exported provider document");
        Ok(Resource::new(
            response.body,
            modified,
            SourceKind::RichDocument,
            RefKind::Provider(id.to_owned()),
        ))
    }

    fn authorization(&self) -> Result<String, FetchError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| FetchError::Credentials("no provider token configured".to_owned()))?
            .authorization()
    }
}
