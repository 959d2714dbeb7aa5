//! Tutorial discovery over input roots.
//!
//! Roots are walked recursively. Names starting with `_` are skipped, `*.md`
//! files become references, and every `gdoc.def` file contributes one
//! provider reference per listed id.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SiteError;

const PROVIDER_DEFINITION: &str = "gdoc.def";

/// Opaque identifier of one source document: a path or a provider id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('_'))
}

/// Collect every document reference under `roots`, in discovery order and
/// without duplicates.
///
/// `provider_prefix` is prepended to the ids listed in `gdoc.def` files.
pub fn discover(roots: &[PathBuf], provider_prefix: &str) -> Result<Vec<DocumentRef>, SiteError> {
    let mut refs = Vec::new();
    for root in roots {
        let metadata = std::fs::metadata(root).map_err(|e| SiteError::io(root, e))?;
        if metadata.is_dir() {
            walk(root, provider_prefix, &mut refs)?;
        } else {
            references_in(root, provider_prefix, &mut refs)?;
        }
    }
    debug!(count = refs.len(), "Discovered documents");
    Ok(refs)
}

fn walk(dir: &Path, provider_prefix: &str, refs: &mut Vec<DocumentRef>) -> Result<(), SiteError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| SiteError::io(dir, e))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(|e| SiteError::io(dir, e))?;
    entries.sort();

    for path in entries {
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() {
            walk(&path, provider_prefix, refs)?;
        } else {
            references_in(&path, provider_prefix, refs)?;
        }
    }
    Ok(())
}

fn push_unique(refs: &mut Vec<DocumentRef>, reference: DocumentRef) {
    if !refs.contains(&reference) {
        refs.push(reference);
    }
}

/// References contributed by a single file.
fn references_in(
    path: &Path,
    provider_prefix: &str,
    refs: &mut Vec<DocumentRef>,
) -> Result<(), SiteError> {
    if is_hidden(path) {
        return Ok(());
    }
    if path.extension().is_some_and(|ext| ext == "md") {
        push_unique(refs, DocumentRef::new(path.to_string_lossy()));
        return Ok(());
    }
    if path.file_name().is_none_or(|name| name != PROVIDER_DEFINITION) {
        return Ok(());
    }

    let content = std::fs::read_to_string(path).map_err(|e| SiteError::io(path, e))?;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        push_unique(refs, DocumentRef::new(format!("{provider_prefix}{line}")));
    }
    Ok(())
}
