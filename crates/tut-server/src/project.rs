//! The built site as a rebuildable [`Project`].

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use tut_config::Paths;
use tut_site::{BuildContext, Document, DocumentRef, assemble, refresh_all};

use crate::watch::Project;

/// Every built document plus what it takes to rebuild them.
pub struct SiteProject {
    ctx: BuildContext,
    paths: Paths,
    documents: Vec<Document>,
}

impl SiteProject {
    pub fn new(ctx: BuildContext, paths: Paths, documents: Vec<Document>) -> Self {
        Self {
            ctx,
            paths,
            documents,
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

#[async_trait]
impl Project for SiteProject {
    fn dependencies(&self) -> Vec<Vec<PathBuf>> {
        self.documents
            .iter()
            .map(|d| d.files_watched().to_vec())
            .collect()
    }

    async fn refresh(&mut self, impacted: &[usize]) -> Vec<String> {
        let order: Vec<DocumentRef> = self
            .documents
            .iter()
            .map(|d| d.reference().clone())
            .collect();

        let mut selected = Vec::new();
        let mut kept = HashMap::new();
        for (index, document) in std::mem::take(&mut self.documents).into_iter().enumerate() {
            if impacted.contains(&index) {
                selected.push(document);
            } else {
                kept.insert(document.reference().clone(), document);
            }
        }

        let (refreshed, failures) = refresh_all(&self.ctx, selected).await;
        let failed: HashSet<&DocumentRef> = failures.iter().map(|(r, _)| r).collect();

        let mut urls = Vec::new();
        for document in refreshed {
            if !failed.contains(document.reference()) {
                urls.push(document.url().to_owned());
            }
            kept.insert(document.reference().clone(), document);
        }
        self.documents = order.iter().filter_map(|r| kept.remove(r)).collect();
        urls
    }

    async fn assemble(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        assemble(&self.paths, &self.ctx.site().api_url, &self.documents).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tut_config::{ProviderConfig, SiteConfig};
    use tut_content::Renderer;
    use tut_fetch::{Fetcher, MockTransport, ProviderSettings, Transport};
    use tut_site::build_all;

    fn context(export: &Path) -> BuildContext {
        let fetcher = Fetcher::new(
            Arc::new(MockTransport::new()) as Arc<dyn Transport>,
            ProviderSettings::from(&ProviderConfig::default()),
        )
        .with_retries(0, 0);
        let renderer = Renderer::from_source("t.html", "{{ meta.title }}").unwrap();
        BuildContext::new(fetcher, renderer, export, SiteConfig::default()).with_watch(true)
    }

    fn layout(root: &Path) -> Paths {
        let paths = Paths {
            website: root.to_path_buf(),
            export: root.join("export"),
            metadata: root.join("metadata"),
            api: root.join("api"),
            inputs: vec![root.join("src")],
        };
        fs::create_dir_all(&paths.metadata).unwrap();
        fs::create_dir_all(&paths.inputs[0]).unwrap();
        fs::write(paths.metadata.join("categories.yaml"), "{}\n").unwrap();
        fs::write(paths.metadata.join("events.yaml"), "{}\n").unwrap();
        paths
    }

    #[tokio::test]
    async fn test_refresh_impacted_only() {
        let root = tempfile::tempdir().unwrap();
        let paths = layout(root.path());
        let a = paths.inputs[0].join("a.md");
        let b = paths.inputs[0].join("b.md");
        fs::write(&a, "# A\n\n## S\n\nold\n").unwrap();
        fs::write(&b, "# B\n\n## S\n\nold\n").unwrap();

        let ctx = context(&paths.export);
        let refs = vec![
            DocumentRef::new(a.to_string_lossy()),
            DocumentRef::new(b.to_string_lossy()),
        ];
        let report = build_all(&ctx, &refs).await;
        let mut project = SiteProject::new(ctx, paths.clone(), report.documents);

        let deps = project.dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0], vec![std::path::absolute(&a).unwrap()]);

        fs::write(&b, "# B\n\n## S\n\nnew\n").unwrap();
        let urls = project.refresh(&[1]).await;
        assert_eq!(urls, vec!["/tutorial/b".to_owned()]);

        let ids: Vec<_> = project
            .documents()
            .iter()
            .map(|d| d.meta().id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        project.assemble().await.unwrap();
        assert!(paths.api.join("codelabs.json").is_file());
    }

    #[tokio::test]
    async fn test_failed_refresh_is_not_reported() {
        let root = tempfile::tempdir().unwrap();
        let paths = layout(root.path());
        let a = paths.inputs[0].join("a.md");
        fs::write(&a, "# A\n\n## S\n\nx\n").unwrap();

        let ctx = context(&paths.export);
        let report = build_all(&ctx, &[DocumentRef::new(a.to_string_lossy())]).await;
        let mut project = SiteProject::new(ctx, paths, report.documents);

        fs::write(&a, "no title\n").unwrap();
        let urls = project.refresh(&[0]).await;

        assert!(urls.is_empty());
        assert_eq!(project.documents().len(), 1);
        assert_eq!(project.dependencies()[0].len(), 1);
    }
}
