//! Building and refreshing one tutorial.
//!
//! A build runs through fixed stages:
//!
//! ```text
//! New -> Downloading -> ResolvingIncludes -> MaterializingAssets -> Persisted
//!   \________________________________________________________________/
//!                             any error -> Failed
//! ```
//!
//! Output is assembled in a private `<export>/.staging-*` directory and
//! renamed over `<export>/<id>` only once everything succeeded, so a failed
//! refresh leaves the previous output in place. The id must be a single plain
//! path component and is owned by one document per [`BuildContext`].

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::TempDir;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tut_config::{Config, SiteConfig};
use tut_content::{
    Codelab, DefaultParser, DocumentParser, Meta, Node, RenderError, Renderer, image_sources,
    import_references, slugify, visit_mut, write_meta,
};
use tut_fetch::{Fetcher, RefKind};

use crate::assets::{IMAGE_DIR, Materializer};
use crate::discovery::DocumentRef;
use crate::error::BuildError;

const PAGE_FILE: &str = "index.html";
const META_FILE: &str = "codelab.json";

/// Build progress of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    New,
    Downloading,
    ResolvingIncludes,
    MaterializingAssets,
    Persisted,
    Failed,
}

/// Which document publishes under each id.
#[derive(Debug, Default)]
struct IdRegistry {
    next: AtomicU64,
    owners: Mutex<HashMap<String, (u64, DocumentRef)>>,
}

impl IdRegistry {
    fn token(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    fn claim(&self, id: &str, token: u64, reference: &DocumentRef) -> Result<(), BuildError> {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((owner, owner_ref)) = owners.get(id)
            && *owner != token
        {
            return Err(BuildError::DuplicateId {
                id: id.to_owned(),
                owner: owner_ref.to_string(),
            });
        }
        owners.insert(id.to_owned(), (token, reference.clone()));
        Ok(())
    }

    fn release(&self, id: &str, token: u64) {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        if owners.get(id).is_some_and(|(owner, _)| *owner == token) {
            owners.remove(id);
        }
    }
}

/// Everything a build needs besides the reference.
///
/// Cheap to clone; clones share the fetcher, parser, template and id
/// ownership.
#[derive(Clone)]
pub struct BuildContext {
    fetcher: Fetcher,
    parser: Arc<dyn DocumentParser>,
    renderer: Arc<Renderer>,
    export_dir: PathBuf,
    site: SiteConfig,
    watch: bool,
    ids: Arc<IdRegistry>,
}

impl BuildContext {
    pub fn new(
        fetcher: Fetcher,
        renderer: Renderer,
        export_dir: impl Into<PathBuf>,
        site: SiteConfig,
    ) -> Self {
        Self {
            fetcher,
            parser: Arc::new(DefaultParser),
            renderer: Arc::new(renderer),
            export_dir: export_dir.into(),
            site,
            watch: false,
            ids: Arc::default(),
        }
    }

    /// Production context: network fetcher and the configured template.
    pub fn from_config(config: &Config) -> Result<Self, RenderError> {
        let renderer = Renderer::from_path(&config.template_path())?;
        Ok(Self::new(
            Fetcher::from_config(config),
            renderer,
            config.paths_resolved.export.clone(),
            config.site.clone(),
        ))
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Record local dependencies of every build for watching.
    #[must_use]
    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn watch(&self) -> bool {
        self.watch
    }
}

/// A rendered build waiting to be published.
pub(crate) struct Prepared {
    codelab: Codelab,
    staging: TempDir,
}

/// A built tutorial and the local files its output depends on.
#[derive(Debug)]
pub struct Document {
    reference: DocumentRef,
    codelab: Codelab,
    output_dir: PathBuf,
    files_watched: Vec<PathBuf>,
    watch: bool,
    stage: Stage,
    token: u64,
}

impl Document {
    pub(crate) fn new(ctx: &BuildContext, reference: DocumentRef) -> Self {
        Self {
            reference,
            codelab: Codelab {
                meta: Meta::default(),
                steps: Vec::new(),
            },
            output_dir: PathBuf::new(),
            files_watched: Vec::new(),
            watch: ctx.watch,
            stage: Stage::New,
            token: ctx.ids.token(),
        }
    }

    /// Build `reference` from scratch.
    pub async fn build(ctx: &BuildContext, reference: DocumentRef) -> Result<Self, BuildError> {
        let mut document = Self::new(ctx, reference);
        document.refresh(ctx).await?;
        Ok(document)
    }

    /// Rebuild from the current reference.
    ///
    /// The dependency list is discarded first and rebuilt from what this run
    /// reads. On failure the previous output stays on disk.
    pub async fn refresh(&mut self, ctx: &BuildContext) -> Result<(), BuildError> {
        let prepared = self.prepare(ctx).await?;
        self.publish(ctx, prepared).await
    }

    /// Point this document at another source. Takes effect on the next refresh.
    pub fn set_reference(&mut self, reference: DocumentRef) {
        self.reference = reference;
    }

    pub fn reference(&self) -> &DocumentRef {
        &self.reference
    }

    pub fn codelab(&self) -> &Codelab {
        &self.codelab
    }

    pub fn meta(&self) -> &Meta {
        &self.codelab.meta
    }

    /// Public URL of the rendered tutorial.
    pub fn url(&self) -> &str {
        &self.codelab.meta.url
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Local files consumed by the last build, without duplicates.
    pub fn files_watched(&self) -> &[PathBuf] {
        &self.files_watched
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Fetch, parse, resolve includes, store assets and render into a
    /// private staging directory. Nothing under `<export>/<id>` is touched.
    pub(crate) async fn prepare(&mut self, ctx: &BuildContext) -> Result<Prepared, BuildError> {
        self.files_watched.clear();
        self.stage = Stage::New;
        match self.render_staged(ctx).await {
            Ok(prepared) => Ok(prepared),
            Err(e) => {
                self.stage = Stage::Failed;
                Err(e)
            }
        }
    }

    /// Claim the id and swap the staged output in.
    ///
    /// Fails with [`BuildError::DuplicateId`] when another document of the
    /// same context already published under that id.
    pub(crate) async fn publish(
        &mut self,
        ctx: &BuildContext,
        prepared: Prepared,
    ) -> Result<(), BuildError> {
        let Prepared { codelab, staging } = prepared;
        let id = codelab.meta.id.clone();
        let previous = (!self.output_dir.as_os_str().is_empty())
            .then(|| (self.codelab.meta.id.clone(), self.output_dir.clone()));

        if let Err(e) = ctx.ids.claim(&id, self.token, &self.reference) {
            self.stage = Stage::Failed;
            return Err(e);
        }
        let output_dir = ctx.export_dir.join(&id);
        if let Err(e) = swap_dir(staging.path(), &output_dir).await {
            if previous.as_ref().is_none_or(|(old_id, _)| *old_id != id) {
                ctx.ids.release(&id, self.token);
            }
            self.stage = Stage::Failed;
            return Err(e);
        }
        drop(staging);

        if let Some((old_id, old_dir)) = previous
            && old_id != id
        {
            // The id changed: drop the output published under the old one.
            ctx.ids.release(&old_id, self.token);
            if let Err(e) = remove_dir_if_exists(&old_dir).await {
                warn!(dir = %old_dir.display(), error = %e, "Cannot remove previous output");
            }
        }

        self.codelab = codelab;
        self.output_dir = output_dir;
        self.stage = Stage::Persisted;
        info!(reference = %self.reference, id = %id, "Built document");
        Ok(())
    }

    async fn render_staged(&mut self, ctx: &BuildContext) -> Result<Prepared, BuildError> {
        let reference = self.reference.as_str().to_owned();

        self.stage = Stage::Downloading;
        let mut resource = ctx
            .fetcher
            .fetch(&reference)
            .await
            .map_err(|source| BuildError::Fetch {
                reference: reference.clone(),
                source,
            })?;
        let modified = resource.modified();
        let source_path = resource.local_path().map(Path::to_path_buf);
        let authenticated = matches!(resource.origin(), RefKind::Provider(_));
        self.track(&reference, source_path.as_deref());

        let mut codelab = ctx
            .parser
            .parse(resource.kind(), &mut resource)
            .map_err(|source| BuildError::Parse {
                reference: reference.clone(),
                source,
            })?;
        drop(resource);
        codelab.meta.updated = modified;
        codelab.meta.id = output_id(&codelab.meta.id, &reference)?;
        let id = codelab.meta.id.clone();
        let source_dir = source_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf);

        self.stage = Stage::ResolvingIncludes;
        self.resolve_includes(ctx, &mut codelab, source_dir.as_deref())
            .await?;

        tokio::fs::create_dir_all(&ctx.export_dir)
            .await
            .map_err(|e| BuildError::io(&ctx.export_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&ctx.export_dir)
            .map_err(|e| BuildError::io(&ctx.export_dir, e))?;

        self.stage = Stage::MaterializingAssets;
        let sources = unique_images(&codelab);
        let stored = Materializer::new(ctx.fetcher.clone(), staging.path().join(IMAGE_DIR))
            .with_base_dir(source_dir)
            .authenticated(authenticated)
            .materialize(&sources)
            .await?;

        let asset_base = format!("{}/{id}/{IMAGE_DIR}", ctx.site.asset_url.trim_end_matches('/'));
        let mut rewritten = HashMap::new();
        for asset in stored {
            self.track(&asset.src, asset.local_path.as_deref());
            rewritten.insert(asset.src, format!("{asset_base}/{}", asset.name));
        }
        codelab.for_each_content_mut(|content| {
            visit_mut(content, &mut |node| {
                if let Node::Image { src, .. } = node
                    && let Some(stored) = rewritten.get(src.as_str())
                {
                    src.clone_from(stored);
                }
            });
        });

        codelab.meta.url = ctx.site.tutorial_url(&id);
        write_output(ctx, &codelab, staging.path()).await?;
        Ok(Prepared { codelab, staging })
    }

    /// Fetch every include concurrently and splice the fragments in.
    ///
    /// All fetches run to completion and every failure is reported.
    async fn resolve_includes(
        &mut self,
        ctx: &BuildContext,
        codelab: &mut Codelab,
        source_dir: Option<&Path>,
    ) -> Result<(), BuildError> {
        let mut references: Vec<String> = Vec::new();
        for content in codelab.contents() {
            for reference in import_references(content) {
                if !references.contains(&reference) {
                    references.push(reference);
                }
            }
        }
        if references.is_empty() {
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for reference in references {
            let location = resolve_relative(&ctx.fetcher, &reference, source_dir);
            let fetcher = ctx.fetcher.clone();
            let parser = Arc::clone(&ctx.parser);
            tasks.spawn(async move {
                let mut resource =
                    fetcher
                        .fetch_fragment(&location)
                        .await
                        .map_err(|source| BuildError::Fetch {
                            reference: location.clone(),
                            source,
                        })?;
                let local = resource.local_path().map(Path::to_path_buf);
                let nodes = parser
                    .parse_fragment(resource.kind(), &mut resource)
                    .map_err(|source| BuildError::Parse {
                        reference: location.clone(),
                        source,
                    })?;
                Ok::<_, BuildError>((reference, location, nodes, local))
            });
        }

        let mut fragments = HashMap::new();
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((reference, location, nodes, local))) => {
                    self.track(&location, local.as_deref());
                    fragments.insert(reference, nodes);
                }
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(BuildError::Task(e.to_string())),
            }
        }
        if errors.len() > 1 {
            errors.sort_by_cached_key(ToString::to_string);
            return Err(BuildError::Includes(errors));
        }
        if let Some(e) = errors.pop() {
            return Err(e);
        }

        codelab.for_each_content_mut(|content| fill_imports(content, &fragments));
        Ok(())
    }

    fn track(&mut self, reference: &str, local: Option<&Path>) {
        if !self.watch {
            return;
        }
        let Some(path) = local else {
            debug!(
                document = %self.reference,
                resource = reference,
                "Remote resource, changes are not tracked"
            );
            return;
        };
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        if !self.files_watched.contains(&path) {
            self.files_watched.push(path);
        }
    }
}

/// Splice fragments into top-level imports. Imports inside fragments are left
/// unresolved.
fn fill_imports(nodes: &mut [Node], fragments: &HashMap<String, Vec<Node>>) {
    for node in nodes {
        if let Node::Import { reference, content } = node {
            if content.is_empty()
                && let Some(fragment) = fragments.get(reference.as_str())
            {
                content.clone_from(fragment);
            }
            continue;
        }
        for children in node.children_mut() {
            fill_imports(children, fragments);
        }
    }
}

/// Relative local references resolve against the including document.
fn resolve_relative(fetcher: &Fetcher, reference: &str, source_dir: Option<&Path>) -> String {
    match (fetcher.classify(reference), source_dir) {
        (RefKind::Local(path), Some(dir)) if path.is_relative() => {
            dir.join(path).to_string_lossy().into_owned()
        }
        _ => reference.to_owned(),
    }
}

/// Whether `id` can name a directory directly under the export root.
fn is_valid_id(id: &str) -> bool {
    if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// The declared or title-derived id, or the slug of the reference's file
/// stem when the title has nothing to slug.
fn output_id(id: &str, reference: &str) -> Result<String, BuildError> {
    let invalid = |id: &str| BuildError::InvalidId {
        reference: reference.to_owned(),
        id: id.to_owned(),
    };
    if !id.is_empty() {
        return if is_valid_id(id) { Ok(id.to_owned()) } else { Err(invalid(id)) };
    }
    let name = reference
        .split(['?', '#'])
        .next()
        .and_then(|r| r.rsplit(['/', '\\', ':']).next())
        .unwrap_or_default();
    let stem = Path::new(name)
        .file_stem()
        .map(|s| slugify(&s.to_string_lossy()))
        .unwrap_or_default();
    if is_valid_id(&stem) {
        debug!(reference, id = %stem, "Title has no usable id, using file name");
        Ok(stem)
    } else {
        Err(invalid(id))
    }
}

fn unique_images(codelab: &Codelab) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for content in codelab.contents() {
        for src in image_sources(content) {
            if !sources.contains(&src) {
                sources.push(src);
            }
        }
    }
    sources
}

async fn remove_dir_if_exists(dir: &Path) -> Result<(), BuildError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::io(dir, e)),
    }
}

/// Replace `dest` with `staged`.
async fn swap_dir(staged: &Path, dest: &Path) -> Result<(), BuildError> {
    remove_dir_if_exists(dest).await?;
    tokio::fs::rename(staged, dest)
        .await
        .map_err(|e| BuildError::io(dest, e))
}

async fn write_output(ctx: &BuildContext, codelab: &Codelab, dir: &Path) -> Result<(), BuildError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| BuildError::io(dir, e))?;

    let render_error = |source| BuildError::Render {
        id: codelab.meta.id.clone(),
        source,
    };

    let mut meta = Vec::new();
    write_meta(&codelab.meta, &mut meta).map_err(render_error)?;
    let meta_path = dir.join(META_FILE);
    tokio::fs::write(&meta_path, meta)
        .await
        .map_err(|e| BuildError::io(&meta_path, e))?;

    let mut page = Vec::new();
    ctx.renderer
        .render(codelab, &mut page)
        .map_err(render_error)?;
    let page_path = dir.join(PAGE_FILE);
    tokio::fs::write(&page_path, page)
        .await
        .map_err(|e| BuildError::io(&page_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tut_config::ProviderConfig;
    use tut_fetch::{HttpResponse, MockTransport, ProviderSettings, Transport};

    const TEMPLATE: &str = "<h1>{{ meta.title }}</h1>{% for s in steps %}{{ s.html }}{% endfor %}";

    fn context(export: &Path, transport: MockTransport, watch: bool) -> BuildContext {
        let fetcher = Fetcher::new(
            Arc::new(transport) as Arc<dyn Transport>,
            ProviderSettings::from(&ProviderConfig::default()),
        )
        .with_retries(0, 0);
        let renderer = Renderer::from_source("test.html", TEMPLATE).unwrap();
        BuildContext::new(fetcher, renderer, export, SiteConfig::default()).with_watch(watch)
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn reference(path: &Path) -> DocumentRef {
        DocumentRef::new(path.to_string_lossy())
    }

    fn absolute(path: &Path) -> PathBuf {
        std::path::absolute(path).unwrap()
    }

    #[tokio::test]
    async fn test_build_local_document() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let doc = src.path().join("tut.md");
        write(
            &doc,
            "id: demo\n\n# Demo\n\n## One\n\n![logo](logo.png)\n\n<<shared.md>>\n",
        );
        write(&src.path().join("logo.png"), "png-bytes");
        write(&src.path().join("shared.md"), "Shared ![inner](inner.png)\n");
        write(&src.path().join("inner.png"), "inner-bytes");

        let ctx = context(out.path(), MockTransport::new(), true);
        let document = Document::build(&ctx, reference(&doc)).await.unwrap();

        assert_eq!(document.stage(), Stage::Persisted);
        assert_eq!(document.url(), "/tutorial/demo");
        assert_eq!(document.output_dir(), out.path().join("demo"));
        assert!(out.path().join("demo/index.html").is_file());
        assert!(out.path().join("demo/codelab.json").is_file());
        let entries: Vec<_> = fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec!["demo"]);

        let images = unique_images(document.codelab());
        assert_eq!(images.len(), 2);
        for src in &images {
            assert!(src.starts_with("/src/codelabs/demo/img/"), "{src}");
            let name = src.rsplit('/').next().unwrap();
            assert!(out.path().join("demo/img").join(name).is_file());
        }

        let mut watched = document.files_watched().to_vec();
        watched.sort();
        let mut expected = vec![
            absolute(&doc),
            absolute(&src.path().join("logo.png")),
            absolute(&src.path().join("shared.md")),
            absolute(&src.path().join("inner.png")),
        ];
        expected.sort();
        assert_eq!(watched, expected);
    }

    #[tokio::test]
    async fn test_watch_disabled_tracks_nothing() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let doc = src.path().join("tut.md");
        write(&doc, "# Demo\n\n## One\n\nText\n");

        let ctx = context(out.path(), MockTransport::new(), false);
        let document = Document::build(&ctx, reference(&doc)).await.unwrap();
        assert!(document.files_watched().is_empty());
        assert_eq!(document.meta().id, "demo");
    }

    #[tokio::test]
    async fn test_refresh_replaces_dependency_list() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let a = src.path().join("a/tut.md");
        let b = src.path().join("b/tut.md");
        write(&a, "id: demo\n\n# A\n\n## One\n\n![x](a.png)\n");
        write(&src.path().join("a/a.png"), "a");
        write(&b, "id: demo\n\n# B\n\n## One\n\n<<frag.md>>\n");
        write(&src.path().join("b/frag.md"), "fragment\n");

        let ctx = context(out.path(), MockTransport::new(), true);
        let mut document = Document::build(&ctx, reference(&a)).await.unwrap();
        assert_eq!(document.files_watched().len(), 2);

        document.set_reference(reference(&b));
        document.refresh(&ctx).await.unwrap();

        let mut watched = document.files_watched().to_vec();
        watched.sort();
        let mut expected = vec![absolute(&b), absolute(&src.path().join("b/frag.md"))];
        expected.sort();
        assert_eq!(watched, expected);
        assert_eq!(document.meta().title, "B");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_output() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let doc = src.path().join("tut.md");
        write(&doc, "id: demo\n\n# Demo\n\n## One\n\nText\n");

        let ctx = context(out.path(), MockTransport::new(), true);
        let mut document = Document::build(&ctx, reference(&doc)).await.unwrap();

        write(&doc, "id: demo\n\n# Demo\n\n## One\n\n![gone](missing.png)\n");
        let err = document.refresh(&ctx).await.unwrap_err();

        assert!(matches!(err, BuildError::Assets(_)));
        assert_eq!(document.stage(), Stage::Failed);
        assert!(out.path().join("demo/index.html").is_file());
        // The source itself was read, so fixing it still triggers a rebuild.
        assert_eq!(document.files_watched(), &[absolute(&doc)]);
    }

    #[tokio::test]
    async fn test_include_failure_fails_document() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let doc = src.path().join("tut.md");
        write(
            &doc,
            "# Demo\n\n## One\n\n<<ok.md>>\n\n<<https://example.com/missing.md>>\n",
        );
        write(&src.path().join("ok.md"), "fine\n");

        let ctx = context(out.path(), MockTransport::new(), true);
        let err = Document::build(&ctx, reference(&doc)).await.unwrap_err();
        match err {
            BuildError::Fetch { reference, .. } => {
                assert_eq!(reference, "https://example.com/missing.md");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!out.path().join("demo").exists());
    }

    #[tokio::test]
    async fn test_every_include_failure_is_reported() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let doc = src.path().join("tut.md");
        write(&doc, "# Demo\n\n## One\n\n<<gone.md>>\n\n<<https://example.com/missing.md>>\n");

        let ctx = context(out.path(), MockTransport::new(), true);
        let err = Document::build(&ctx, reference(&doc)).await.unwrap_err();

        let BuildError::Includes(errors) = &err else {
            panic!("unexpected error: {err:?}");
        };
        assert_eq!(errors.len(), 2);
        let message = err.to_string();
        assert!(message.contains("gone.md"));
        assert!(message.contains("https://example.com/missing.md"));
    }

    #[tokio::test]
    async fn test_remote_document_is_not_tracked() {
        let out = tempfile::tempdir().unwrap();
        let url = "https://example.com/tut.md";
        let transport = MockTransport::new().respond(url, HttpResponse::new(200, "# Remote\n\n## One\n\nHi\n"));

        let ctx = context(out.path(), transport, true);
        let document = Document::build(&ctx, DocumentRef::new(url)).await.unwrap();
        assert!(document.files_watched().is_empty());
        assert_eq!(document.meta().id, "remote");
    }

    #[tokio::test]
    async fn test_title_without_slug_uses_file_name() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let one = src.path().join("one.md");
        let jp = src.path().join("jp.md");
        write(&one, "# One\n\n## Step\n\nText\n");
        write(&jp, "# 日本語\n\n## Step\n\nText\n");

        let ctx = context(out.path(), MockTransport::new(), false);
        Document::build(&ctx, reference(&one)).await.unwrap();
        let document = Document::build(&ctx, reference(&jp)).await.unwrap();

        assert_eq!(document.meta().id, "jp");
        assert_eq!(document.url(), "/tutorial/jp");
        assert!(out.path().join("one/index.html").is_file());
        assert!(out.path().join("jp/index.html").is_file());
    }

    #[tokio::test]
    async fn test_id_outside_export_is_rejected() {
        let src = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let export = root.path().join("export");
        let one = src.path().join("one.md");
        let bad = src.path().join("bad.md");
        write(&one, "# One\n\n## Step\n\nText\n");
        write(&bad, "id: ../escaped\n\n# Bad\n\n## Step\n\nText\n");

        let ctx = context(&export, MockTransport::new(), false);
        Document::build(&ctx, reference(&one)).await.unwrap();
        let err = Document::build(&ctx, reference(&bad)).await.unwrap_err();

        assert!(matches!(err, BuildError::InvalidId { ref id, .. } if id == "../escaped"));
        assert!(export.join("one/index.html").is_file());
        assert!(!root.path().join("escaped").exists());
    }

    #[test]
    fn test_output_id() {
        assert_eq!(output_id("demo", "tut.md").unwrap(), "demo");
        assert_eq!(output_id("", "/src/My Guide.md").unwrap(), "my-guide");
        assert_eq!(output_id("", "https://x.org/a/intro.md?raw=1").unwrap(), "intro");
        assert_eq!(output_id("", "gdoc:1AbC").unwrap(), "1abc");
        for id in ["..", ".hidden", "a/b", "a\\b", "/abs"] {
            assert!(
                matches!(output_id(id, "tut.md"), Err(BuildError::InvalidId { .. })),
                "{id}"
            );
        }
        assert!(output_id("", "/src/???.md").is_err());
    }

    #[test]
    fn test_fill_imports_one_level() {
        let mut nodes = vec![Node::Import {
            reference: "self.md".to_owned(),
            content: Vec::new(),
        }];
        let mut fragments = HashMap::new();
        fragments.insert(
            "self.md".to_owned(),
            vec![Node::Import {
                reference: "self.md".to_owned(),
                content: Vec::new(),
            }],
        );
        fill_imports(&mut nodes, &fragments);

        let Node::Import { content, .. } = &nodes[0] else {
            panic!("expected import");
        };
        assert!(matches!(&content[0], Node::Import { content, .. } if content.is_empty()));
    }
}
