//! Content-addressed asset storage.
//!
//! Every image referenced by a document is read (local) or downloaded
//! (remote), hashed, and written to `img/<sha256[..16]><ext>`. Identical
//! bytes with the same extension always land on the same file, so shared
//! images are stored once.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::debug;
use tut_fetch::{Fetcher, RefKind};

use crate::error::{AssetError, AssetFailure};

/// Stored asset directory, relative to the document output.
pub const IMAGE_DIR: &str = "img";
/// Extension for remote assets whose URL does not declare one.
const DEFAULT_REMOTE_EXT: &str = ".png";
const CHECKSUM_LEN: usize = 16;

/// Result of storing one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Reference as written in the document.
    pub src: String,
    /// Stored file name, `<checksum><ext>`.
    pub name: String,
    /// Local file the bytes were read from, if any.
    pub local_path: Option<PathBuf>,
}

/// Stored name for `bytes`.
pub fn stored_name(bytes: &[u8], ext: &str) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!("{}{ext}", &digest[..CHECKSUM_LEN])
}

fn local_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

fn remote_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_REMOTE_EXT.to_owned(),
    }
}

/// Fetches and stores the assets of one document.
pub struct Materializer {
    fetcher: Fetcher,
    /// Directory local references resolve against.
    base_dir: Option<PathBuf>,
    /// Destination `img/` directory.
    image_dir: PathBuf,
    /// Attach provider credentials to remote downloads.
    authenticated: bool,
}

impl Materializer {
    pub fn new(fetcher: Fetcher, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            base_dir: None,
            image_dir: image_dir.into(),
            authenticated: false,
        }
    }

    /// Resolve relative local references against `dir`.
    #[must_use]
    pub fn with_base_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.base_dir = dir;
        self
    }

    /// Download remote assets with provider credentials.
    #[must_use]
    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    /// Store every asset in `sources` concurrently.
    ///
    /// Waits for all of them; if any failed, returns every failure.
    pub async fn materialize(&self, sources: &[String]) -> Result<Vec<StoredAsset>, AssetError> {
        tokio::fs::create_dir_all(&self.image_dir)
            .await
            .map_err(|e| AssetError {
                failures: vec![AssetFailure {
                    src: self.image_dir.display().to_string(),
                    dest: Some(self.image_dir.clone()),
                    cause: e.to_string(),
                }],
            })?;

        let mut tasks = JoinSet::new();
        for src in sources {
            let job = AssetJob {
                src: src.clone(),
                fetcher: self.fetcher.clone(),
                base_dir: self.base_dir.clone(),
                image_dir: self.image_dir.clone(),
                authenticated: self.authenticated,
            };
            tasks.spawn(job.run());
        }

        let mut stored = Vec::with_capacity(sources.len());
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(asset)) => stored.push(asset),
                Ok(Err(failure)) => failures.push(failure),
                Err(e) => failures.push(AssetFailure {
                    src: String::new(),
                    dest: None,
                    cause: e.to_string(),
                }),
            }
        }

        if failures.is_empty() {
            Ok(stored)
        } else {
            Err(AssetError { failures })
        }
    }
}

struct AssetJob {
    src: String,
    fetcher: Fetcher,
    base_dir: Option<PathBuf>,
    image_dir: PathBuf,
    authenticated: bool,
}

impl AssetJob {
    fn fail(&self, dest: Option<PathBuf>, cause: impl ToString) -> AssetFailure {
        AssetFailure {
            src: self.src.clone(),
            dest,
            cause: cause.to_string(),
        }
    }

    async fn run(self) -> Result<StoredAsset, AssetFailure> {
        let (bytes, ext, local_path) = match self.fetcher.classify(&self.src) {
            RefKind::Local(path) => {
                let path = match &self.base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path,
                };
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| self.fail(None, format!("{}: {e}", path.display())))?;
                (bytes, local_extension(&path), Some(path))
            }
            RefKind::Url(url) => {
                let bytes = self
                    .fetcher
                    .fetch_bytes(&url, self.authenticated)
                    .await
                    .map_err(|e| self.fail(None, e))?;
                (bytes, remote_extension(&url), None)
            }
            RefKind::Provider(_) => {
                let bytes = self
                    .fetcher
                    .fetch_bytes(&self.src, true)
                    .await
                    .map_err(|e| self.fail(None, e))?;
                (bytes, DEFAULT_REMOTE_EXT.to_owned(), None)
            }
        };

        let name = stored_name(&bytes, &ext);
        let dest = self.image_dir.join(&name);
        let exists = tokio::fs::try_exists(&dest).await.unwrap_or(false);
        if !exists {
            tokio::fs::write(&dest, &bytes)
                .await
                .map_err(|e| self.fail(Some(dest.clone()), e))?;
        }
        debug!(src = %self.src, dest = %dest.display(), reused = exists, "Stored asset");

        Ok(StoredAsset {
            src: self.src,
            name,
            local_path,
        })
    }
}
