//! Site index assembly.
//!
//! Combines every built tutorial's metadata with the site-wide category and
//! event definitions into `<api>/codelabs.json`. Event logos are copied to
//! `<api>/assets/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;
use tut_config::Paths;
use tut_content::Meta;

use crate::document::Document;
use crate::error::SiteError;

const CATEGORIES_FILE: &str = "categories.yaml";
const EVENTS_FILE: &str = "events.yaml";
const INDEX_FILE: &str = "codelabs.json";
const ASSETS_DIR: &str = "assets";

/// Colors of one tutorial category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Category {
    #[serde(default)]
    pub lightcolor: String,
    #[serde(default)]
    pub maincolor: String,
    #[serde(default)]
    pub secondarycolor: String,
}

/// An event tutorials can be tagged with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Event {
    pub name: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub description: String,
}

/// Content of `codelabs.json`.
#[derive(Debug, Serialize)]
pub struct SiteIndex<'a> {
    pub categories: BTreeMap<String, Category>,
    pub codelabs: Vec<&'a Meta>,
    pub events: BTreeMap<String, Event>,
}

async fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SiteError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SiteError::io(path, e))?;
    serde_yaml::from_str(&content).map_err(|source| SiteError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy every event logo into `<api>/assets/` and point the event at it.
async fn publish_logos(
    events: &mut BTreeMap<String, Event>,
    metadata_dir: &Path,
    api_dir: &Path,
    api_url: &str,
) -> Result<(), SiteError> {
    let assets = api_dir.join(ASSETS_DIR);
    tokio::fs::create_dir_all(&assets)
        .await
        .map_err(|e| SiteError::io(&assets, e))?;

    for event in events.values_mut() {
        if event.logo.is_empty() {
            continue;
        }
        let src = metadata_dir.join(&event.logo);
        let Some(name) = src.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let dest = assets.join(&name);
        tokio::fs::copy(&src, &dest)
            .await
            .map_err(|e| SiteError::io(&src, e))?;
        event.logo = format!("{}/{ASSETS_DIR}/{name}", api_url.trim_end_matches('/'));
    }
    Ok(())
}

/// Regenerate the API directory from `documents`.
///
/// Both metadata files are loaded and the new directory is written aside
/// before the current one is replaced. Any missing or malformed metadata
/// file aborts the whole assembly and leaves the previous index in place.
pub async fn assemble(
    paths: &Paths,
    api_url: &str,
    documents: &[Document],
) -> Result<PathBuf, SiteError> {
    let mut events: BTreeMap<String, Event> = load_yaml(&paths.metadata.join(EVENTS_FILE)).await?;
    let categories = load_yaml(&paths.metadata.join(CATEGORIES_FILE)).await?;

    let parent = paths.api.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| SiteError::io(parent, e))?;
    let staging = tempfile::Builder::new()
        .prefix(".api-")
        .tempdir_in(parent)
        .map_err(|e| SiteError::io(parent, e))?;

    publish_logos(&mut events, &paths.metadata, staging.path(), api_url).await?;

    let mut codelabs: Vec<&Meta> = documents.iter().map(Document::meta).collect();
    codelabs.sort_by(|a, b| a.id.cmp(&b.id));

    let index = SiteIndex {
        categories,
        codelabs,
        events,
    };
    let json = serde_json::to_vec_pretty(&index)?;
    let staged = staging.path().join(INDEX_FILE);
    tokio::fs::write(&staged, json)
        .await
        .map_err(|e| SiteError::io(&staged, e))?;

    match tokio::fs::remove_dir_all(&paths.api).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(SiteError::io(&paths.api, e)),
    }
    tokio::fs::rename(staging.path(), &paths.api)
        .await
        .map_err(|e| SiteError::io(&paths.api, e))?;

    let path = paths.api.join(INDEX_FILE);
    info!(path = %path.display(), codelabs = documents.len(), "Wrote site index");
    Ok(path)
}
