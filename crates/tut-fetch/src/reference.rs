//! Classification of document and asset references.

use std::path::PathBuf;

use tut_config::ProviderConfig;

/// Provider endpoint settings used for classification and requests.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Ref prefix marking a bare provider id (`gdoc:`).
    pub prefix: String,
    /// Host marking a provider document URL.
    pub host: String,
    /// REST API base URL, without trailing slash.
    pub api_base: String,
    /// Expected MIME type of exportable documents.
    pub mime_type: String,
}

impl From<&ProviderConfig> for ProviderSettings {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            prefix: config.prefix.clone(),
            host: config.host.clone(),
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            mime_type: config.mime_type.clone(),
        }
    }
}

impl ProviderSettings {
    /// Metadata endpoint for a document.
    pub fn metadata_url(&self, id: &str) -> String {
        format!("{}/files/{id}?fields=id,mimeType,modifiedTime", self.api_base)
    }

    /// HTML export endpoint for a document.
    pub fn export_url(&self, id: &str) -> String {
        format!("{}/files/{id}/export?mimeType=text/html", self.api_base)
    }
}

/// Where a reference points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKind {
    /// Path on the local filesystem.
    Local(PathBuf),
    /// Plain http(s) URL.
    Url(String),
    /// Provider document id.
    Provider(String),
}

impl RefKind {
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

/// Classify `reference` by its shape alone, without touching the filesystem.
pub fn classify(reference: &str, provider: &ProviderSettings) -> RefKind {
    if let Some(rest) = reference.strip_prefix(&provider.prefix)
        && !rest.contains("://")
    {
        return RefKind::Provider(document_id(rest));
    }

    if reference.contains("://") {
        let host = reference
            .parse::<ureq::http::Uri>()
            .ok()
            .and_then(|uri| uri.host().map(str::to_owned));
        if host.as_deref() == Some(provider.host.as_str()) {
            return RefKind::Provider(document_id(reference));
        }
        return RefKind::Url(reference.to_owned());
    }

    RefKind::Local(PathBuf::from(reference))
}

/// Extract a document id from a provider URL or bare id.
///
/// `https://docs.example.com/document/d/ID/edit` yields `ID`.
fn document_id(reference: &str) -> String {
    const MARKER: &str = "/document/d/";
    let tail = reference
        .find(MARKER)
        .map_or(reference, |i| &reference[i + MARKER.len()..]);
    match tail.find('/') {
        Some(i) if i > 0 => tail[..i].to_owned(),
        _ => tail.to_owned(),
    }
}
