//! Live-reload preview server for tutorials.
//!
//! Serves the website shell, the generated API and the exported tutorials
//! with axum, watches every local dependency of the built documents and
//! pushes reload events to browsers over a websocket.
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum router ──► ServeDir / ServeFile
//!    ▲
//!    └──ws── Hub coordinator ◄── WatchEngine ◄── notify
//!                                    │
//!                                    └─► SiteProject (refresh + assemble)
//! ```

mod app;
mod error;
mod hub;
mod project;
mod state;
mod watch;
mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch as signal;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{error, info, warn};
use tut_config::Config;
use tut_site::{BuildContext, Document};

pub use error::ServerError;
pub use hub::{ClientId, Hub, HubClient, HubStopped, ReloadEvent};
pub use project::SiteProject;
pub use watch::{DirectoryWatcher, NotifyWatcher, Project, WatchEngine, WatchEvent, WatchSet};

use state::AppState;

/// Time allowed for the whole shutdown sequence.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

type EngineTask = JoinHandle<WatchEngine<NotifyWatcher, SiteProject>>;

/// Serve `documents` and rebuild them on change until Ctrl-C.
///
/// `ctx` must be the context the documents were built with. Its export
/// directory is what gets served under `site.asset_url`.
pub async fn run_server(
    config: &Config,
    ctx: BuildContext,
    documents: Vec<Document>,
) -> Result<(), ServerError> {
    let (hub, hub_task) = Hub::start(config.live_reload.client_buffer);
    let (stop_tx, stop_rx) = signal::channel(false);

    let export = ctx.export_dir().to_path_buf();
    let engine_task = if config.live_reload.enabled {
        let (watcher, events) = NotifyWatcher::new()?;
        let project = SiteProject::new(ctx, config.paths_resolved.clone(), documents);
        let engine = WatchEngine::new(watcher, project, hub.clone());
        Some(tokio::spawn(engine.run(events, stop_rx.clone())))
    } else {
        None
    };

    let state = Arc::new(AppState { hub: hub.clone() });
    let app = app::create_router(state, config, &export);

    let addr_text = format!("{}:{}", config.server.host, config.server.port);
    let addr: SocketAddr = addr_text.parse().map_err(|source| ServerError::Address {
        addr: addr_text.clone(),
        source,
    })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr_text,
            source,
        })?;
    info!(address = %addr, "Starting server");

    let mut server_stop = stop_rx;
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_stop.wait_for(|stop| *stop).await;
            })
            .into_future(),
    );

    shutdown_signal().await;
    let _ = stop_tx.send(true);

    match timeout(SHUTDOWN_GRACE, shutdown(engine_task, &hub, hub_task, server)).await {
        Ok(result) => result,
        Err(_) => {
            error!(grace = ?SHUTDOWN_GRACE, "Shutdown timed out");
            Err(ServerError::ShutdownTimeout(SHUTDOWN_GRACE))
        }
    }
}

/// Let the in-flight rebuild finish, close every websocket, then drain the
/// HTTP server.
async fn shutdown(
    engine_task: Option<EngineTask>,
    hub: &Hub,
    hub_task: JoinHandle<()>,
    server: JoinHandle<std::io::Result<()>>,
) -> Result<(), ServerError> {
    if let Some(task) = engine_task {
        // Dropping the engine releases the platform watches
        drop(task.await.map_err(|e| ServerError::Task(e.to_string()))?);
    }
    if hub.stop().is_err() {
        warn!("Live-reload hub already stopped");
    }
    hub_task
        .await
        .map_err(|e| ServerError::Task(e.to_string()))?;
    server
        .await
        .map_err(|e| ServerError::Task(e.to_string()))??;
    info!("Server stopped");
    Ok(())
}

/// Wait for Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}
