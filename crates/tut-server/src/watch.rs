//! Watch & rebuild engine.
//!
//! Watches the parent directories of every tracked dependency. A change to a
//! tracked file unregisters all watches, refreshes the documents depending on
//! it, reassembles the site, registers the new watch set and notifies the
//! live-reload hub.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::hub::{Hub, ReloadEvent};

/// Capacity of the filesystem event channel.
const EVENT_BUFFER: usize = 100;

/// A change to one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
}

/// Non-recursive directory watching.
pub trait DirectoryWatcher: Send {
    fn watch(&mut self, dir: &Path) -> Result<(), notify::Error>;
    fn unwatch(&mut self, dir: &Path) -> Result<(), notify::Error>;
}

/// [`DirectoryWatcher`] backed by the platform watcher.
pub struct NotifyWatcher {
    inner: RecommendedWatcher,
}

impl NotifyWatcher {
    /// Create the watcher and the channel its create, modify and remove
    /// events arrive on. Events are dropped while the channel is full.
    pub fn new() -> Result<(Self, mpsc::Receiver<WatchEvent>), notify::Error> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let inner = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "File watcher error");
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
            ) {
                return;
            }
            for path in event.paths {
                // Never block the notify thread: `unwatch` waits on it while
                // the engine is not draining the channel
                if let Err(mpsc::error::TrySendError::Full(dropped)) =
                    tx.try_send(WatchEvent { path })
                {
                    trace!(path = %dropped.path.display(), "Event channel full, dropping event");
                }
            }
        })?;
        Ok((Self { inner }, rx))
    }
}

impl DirectoryWatcher for NotifyWatcher {
    fn watch(&mut self, dir: &Path) -> Result<(), notify::Error> {
        self.inner.watch(dir, RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, dir: &Path) -> Result<(), notify::Error> {
        self.inner.unwatch(dir)
    }
}

/// The set of documents the engine rebuilds.
///
/// Documents are addressed by their index in [`Project::dependencies`].
#[async_trait]
pub trait Project: Send {
    /// Local files every document depends on, in document order.
    fn dependencies(&self) -> Vec<Vec<PathBuf>>;

    /// Refresh the given documents and return the public URLs of those that
    /// rebuilt successfully. Failures are logged by the implementation.
    async fn refresh(&mut self, impacted: &[usize]) -> Vec<String>;

    /// Regenerate the site index from every document.
    async fn assemble(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Tracked paths mapped to the documents depending on them, plus the
/// directories to watch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchSet {
    triggers: HashMap<PathBuf, Vec<usize>>,
    dirs: Vec<PathBuf>,
}

impl WatchSet {
    pub fn from_dependencies(dependencies: &[Vec<PathBuf>]) -> Self {
        let mut set = Self::default();
        for (index, files) in dependencies.iter().enumerate() {
            for file in files {
                let documents = set.triggers.entry(file.clone()).or_default();
                if !documents.contains(&index) {
                    documents.push(index);
                }
                if let Some(dir) = file.parent()
                    && !set.dirs.iter().any(|d| d == dir)
                {
                    set.dirs.push(dir.to_path_buf());
                }
            }
        }
        set
    }

    /// Documents depending on `path`.
    pub fn impacted(&self, path: &Path) -> Option<&[usize]> {
        self.triggers.get(path).map(Vec::as_slice)
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.dirs
    }
}

/// Drives rebuilds from filesystem events.
pub struct WatchEngine<W, P> {
    watcher: W,
    project: P,
    hub: Hub,
    set: WatchSet,
    registered: Vec<PathBuf>,
}

impl<W: DirectoryWatcher, P: Project> WatchEngine<W, P> {
    pub fn new(watcher: W, project: P, hub: Hub) -> Self {
        Self {
            watcher,
            project,
            hub,
            set: WatchSet::default(),
            registered: Vec::new(),
        }
    }

    pub fn project(&self) -> &P {
        &self.project
    }

    pub fn watch_set(&self) -> &WatchSet {
        &self.set
    }

    /// Directories currently watched.
    pub fn registered(&self) -> &[PathBuf] {
        &self.registered
    }

    /// Derive the watch set from the project and watch its directories.
    ///
    /// # Panics
    ///
    /// Panics if the previous watch set was not unregistered first.
    pub fn register(&mut self) {
        assert!(
            self.registered.is_empty(),
            "watch set registered twice without unregistering"
        );
        self.set = WatchSet::from_dependencies(&self.project.dependencies());
        for dir in self.set.directories() {
            match self.watcher.watch(dir) {
                Ok(()) => self.registered.push(dir.clone()),
                Err(e) => warn!(dir = %dir.display(), error = %e, "Cannot watch directory"),
            }
        }
        debug!(dirs = self.registered.len(), "Watches registered");
    }

    /// Stop watching every registered directory.
    pub fn unregister(&mut self) {
        for dir in self.registered.drain(..) {
            if let Err(e) = self.watcher.unwatch(&dir) {
                debug!(dir = %dir.display(), error = %e, "Cannot unwatch directory");
            }
        }
    }

    /// Rebuild for one event. Returns whether the event triggered a rebuild.
    pub async fn handle(&mut self, event: &WatchEvent) -> bool {
        let Some(impacted) = self.set.impacted(&event.path).map(<[usize]>::to_vec) else {
            return false;
        };
        info!(path = %event.path.display(), documents = impacted.len(), "Rebuilding");

        self.unregister();
        let urls = self.project.refresh(&impacted).await;
        let assembled = match self.project.assemble().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Site assembly failed");
                false
            }
        };
        self.register();

        if assembled {
            for url in urls {
                if self.hub.send(ReloadEvent::new(url).to_json()).is_err() {
                    warn!("Live-reload hub is stopped");
                    break;
                }
            }
        }
        true
    }

    /// Process events until `shutdown` flips to `true` or the event channel
    /// closes. An in-flight rebuild always completes first.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<WatchEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        if self.registered.is_empty() {
            self.register();
        }
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if self.handle(&event).await {
                        // Events queued during the rebuild describe the state
                        // it already consumed
                        let mut skipped = 0usize;
                        while events.try_recv().is_ok() {
                            skipped += 1;
                        }
                        if skipped > 0 {
                            debug!(skipped, "Dropped events queued during rebuild");
                        }
                    }
                }
            }
        }
        self.unregister();
        info!("Watch engine stopped");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct FakeWatcher {
        watched: Arc<Mutex<Vec<PathBuf>>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl DirectoryWatcher for FakeWatcher {
        fn watch(&mut self, dir: &Path) -> Result<(), notify::Error> {
            self.watched.lock().unwrap().push(dir.to_path_buf());
            self.log.lock().unwrap().push(format!("watch {}", dir.display()));
            Ok(())
        }

        fn unwatch(&mut self, dir: &Path) -> Result<(), notify::Error> {
            self.watched.lock().unwrap().retain(|d| d != dir);
            self.log.lock().unwrap().push(format!("unwatch {}", dir.display()));
            Ok(())
        }
    }

    struct FakeProject {
        deps: Vec<Vec<PathBuf>>,
        refreshed: Arc<Mutex<Vec<Vec<usize>>>>,
        log: Arc<Mutex<Vec<String>>>,
        delay: Duration,
        fail_assembly: bool,
    }

    impl FakeProject {
        fn new(deps: Vec<Vec<PathBuf>>, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                deps,
                refreshed: Arc::default(),
                log,
                delay: Duration::ZERO,
                fail_assembly: false,
            }
        }
    }

    #[async_trait]
    impl Project for FakeProject {
        fn dependencies(&self) -> Vec<Vec<PathBuf>> {
            self.deps.clone()
        }

        async fn refresh(&mut self, impacted: &[usize]) -> Vec<String> {
            self.log.lock().unwrap().push("refresh".to_owned());
            tokio::time::sleep(self.delay).await;
            self.refreshed.lock().unwrap().push(impacted.to_vec());
            impacted.iter().map(|i| format!("/tutorial/doc{i}")).collect()
        }

        async fn assemble(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.log.lock().unwrap().push("assemble".to_owned());
            if self.fail_assembly {
                return Err("categories.yaml missing".into());
            }
            Ok(())
        }
    }

    fn deps() -> Vec<Vec<PathBuf>> {
        vec![
            vec![PathBuf::from("/src/a.md"), PathBuf::from("/src/shared/img.png")],
            vec![PathBuf::from("/src/b.md"), PathBuf::from("/src/shared/img.png")],
        ]
    }

    fn event(path: &str) -> WatchEvent {
        WatchEvent {
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_watch_set_inverts_dependencies() {
        let set = WatchSet::from_dependencies(&deps());

        assert_eq!(set.impacted(Path::new("/src/a.md")), Some(&[0][..]));
        assert_eq!(set.impacted(Path::new("/src/shared/img.png")), Some(&[0, 1][..]));
        assert_eq!(set.impacted(Path::new("/src/other.md")), None);
        assert_eq!(
            set.directories(),
            &[PathBuf::from("/src"), PathBuf::from("/src/shared")]
        );
    }

    #[tokio::test]
    async fn test_rebuild_sequence() {
        let watcher = FakeWatcher::default();
        let log = Arc::clone(&watcher.log);
        let project = FakeProject::new(deps(), Arc::clone(&log));
        let refreshed = Arc::clone(&project.refreshed);
        let (hub, _handle) = Hub::start(10);
        let mut client = hub.connect().unwrap();
        let mut engine = WatchEngine::new(watcher.clone(), project, hub);

        engine.register();
        log.lock().unwrap().clear();

        assert!(engine.handle(&event("/src/shared/img.png")).await);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "unwatch /src",
                "unwatch /src/shared",
                "refresh",
                "assemble",
                "watch /src",
                "watch /src/shared",
            ]
        );
        assert_eq!(*refreshed.lock().unwrap(), vec![vec![0, 1]]);
        assert_eq!(engine.registered().len(), 2);

        let first: serde_json::Value =
            serde_json::from_str(&client.recv().await.unwrap()).unwrap();
        assert_eq!(first["path"], "/tutorial/doc0");
        let second: serde_json::Value =
            serde_json::from_str(&client.recv().await.unwrap()).unwrap();
        assert_eq!(second["path"], "/tutorial/doc1");
    }

    #[tokio::test]
    async fn test_untracked_path_is_ignored() {
        let watcher = FakeWatcher::default();
        let project = FakeProject::new(deps(), Arc::clone(&watcher.log));
        let refreshed = Arc::clone(&project.refreshed);
        let (hub, _handle) = Hub::start(10);
        let mut engine = WatchEngine::new(watcher, project, hub);
        engine.register();

        assert!(!engine.handle(&event("/src/notes.txt")).await);
        assert!(refreshed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_assembly_reregisters_without_notifying() {
        let watcher = FakeWatcher::default();
        let mut project = FakeProject::new(deps(), Arc::clone(&watcher.log));
        project.fail_assembly = true;
        let (hub, _handle) = Hub::start(10);
        let mut client = hub.connect().unwrap();
        let mut engine = WatchEngine::new(watcher.clone(), project, hub.clone());
        engine.register();

        assert!(engine.handle(&event("/src/a.md")).await);

        assert_eq!(watcher.watched.lock().unwrap().len(), 2);
        hub.send("marker").unwrap();
        assert_eq!(client.recv().await.as_deref(), Some("marker"));
    }

    #[tokio::test]
    #[should_panic(expected = "registered twice")]
    async fn test_double_registration_panics() {
        let (hub, _handle) = Hub::start(1);
        let watcher = FakeWatcher::default();
        let project = FakeProject::new(deps(), Arc::clone(&watcher.log));
        let mut engine = WatchEngine::new(watcher, project, hub);

        engine.register();
        engine.register();
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_during_rebuild_do_not_rebuild_twice() {
        let watcher = FakeWatcher::default();
        let mut project = FakeProject::new(deps(), Arc::clone(&watcher.log));
        project.delay = Duration::from_secs(5);
        let refreshed = Arc::clone(&project.refreshed);
        let (hub, _handle) = Hub::start(10);
        let engine = WatchEngine::new(watcher.clone(), project, hub);

        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(rx, stop_rx));

        tx.send(event("/src/a.md")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        // Rebuild in progress: nothing is watched
        assert!(watcher.watched.lock().unwrap().is_empty());
        tx.send(event("/src/a.md")).await.unwrap();
        tx.send(event("/src/b.md")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*refreshed.lock().unwrap(), vec![vec![0]]);
        assert_eq!(watcher.watched.lock().unwrap().len(), 2);

        stop_tx.send(true).unwrap();
        let engine = task.await.unwrap();
        assert!(engine.registered().is_empty());
        assert!(watcher.watched.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_in_flight_rebuild() {
        let watcher = FakeWatcher::default();
        let mut project = FakeProject::new(deps(), Arc::clone(&watcher.log));
        project.delay = Duration::from_secs(3);
        let refreshed = Arc::clone(&project.refreshed);
        let (hub, _handle) = Hub::start(10);
        let engine = WatchEngine::new(watcher, project, hub);

        let (tx, rx) = mpsc::channel(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(engine.run(rx, stop_rx));

        tx.send(event("/src/b.md")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop_tx.send(true).unwrap();

        task.await.unwrap();
        assert_eq!(*refreshed.lock().unwrap(), vec![vec![1]]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_flood_does_not_block_unwatch() {
        let dir = tempfile::tempdir().unwrap();
        let tracked = dir.path().join("a.md");
        std::fs::write(&tracked, "# A\n").unwrap();

        let (watcher, _events) = NotifyWatcher::new().unwrap();
        let project = FakeProject::new(vec![vec![tracked.clone()]], Arc::default());
        let refreshed = Arc::clone(&project.refreshed);
        let (hub, _handle) = Hub::start(10);
        let mut engine = WatchEngine::new(watcher, project, hub);
        engine.register();
        assert_eq!(engine.registered(), &[dir.path().to_path_buf()]);

        // Far more events than the channel holds, none of them consumed
        std::fs::write(&tracked, "# A\n\nchanged\n").unwrap();
        for i in 0..300 {
            std::fs::write(dir.path().join(format!("img{i}.png")), "x").unwrap();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let event = WatchEvent { path: tracked };
        let task = tokio::spawn(async move {
            let rebuilt = engine.handle(&event).await;
            (engine, rebuilt)
        });
        let (mut engine, rebuilt) = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("rebuild blocked on the watcher")
            .unwrap();

        assert!(rebuilt);
        assert_eq!(*refreshed.lock().unwrap(), vec![vec![0]]);
        engine.unregister();
    }
}
