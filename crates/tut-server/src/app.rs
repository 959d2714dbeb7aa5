//! Router construction.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tut_config::Config;

use crate::state::AppState;
use crate::websocket;

/// Create the application router.
///
/// `export` overrides the configured export directory, which serve mode
/// points at a temporary tree.
pub(crate) fn create_router(state: Arc<AppState>, config: &Config, export: &Path) -> Router {
    let paths = &config.paths_resolved;
    let site = &config.site;

    let mut router = Router::new();
    if config.live_reload.enabled {
        router = router.route(&config.live_reload.endpoint, get(websocket::ws_handler));
    }

    // Tutorials are rendered client side by the website shell
    let shell = paths.website.join("index.html");
    let base = site.base_url.trim_end_matches('/');
    if !base.is_empty() {
        router = router
            .route_service(base, ServeFile::new(&shell))
            .route_service(&format!("{base}/{{*path}}"), ServeFile::new(&shell));
    }

    router
        .nest_service(site.api_url.trim_end_matches('/'), ServeDir::new(&paths.api))
        .nest_service(site.asset_url.trim_end_matches('/'), ServeDir::new(export))
        .fallback_service(ServeDir::new(&paths.website))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tower::ServiceExt;
    use tut_config::Paths;

    fn config(root: &Path) -> Config {
        let mut config = Config::default();
        config.paths_resolved = Paths {
            website: root.to_path_buf(),
            export: root.join("export"),
            metadata: root.join("metadata"),
            api: root.join("api"),
            inputs: Vec::new(),
        };
        config
    }

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_routes() {
        let root = tempfile::tempdir().unwrap();
        let config = config(root.path());
        let export = root.path().join("preview");
        fs::write(root.path().join("index.html"), "shell").unwrap();
        fs::write(root.path().join("app.js"), "js").unwrap();
        fs::create_dir_all(&config.paths_resolved.api).unwrap();
        fs::write(config.paths_resolved.api.join("codelabs.json"), "{}").unwrap();
        fs::create_dir_all(export.join("intro")).unwrap();
        fs::write(export.join("intro/index.html"), "intro").unwrap();

        let (hub, _handle) = Hub::start(4);
        let router = create_router(Arc::new(AppState { hub }), &config, &export);

        assert_eq!(
            get_body(router.clone(), "/api/codelabs.json").await,
            (StatusCode::OK, "{}".to_owned())
        );
        assert_eq!(
            get_body(router.clone(), "/src/codelabs/intro/index.html").await,
            (StatusCode::OK, "intro".to_owned())
        );
        assert_eq!(
            get_body(router.clone(), "/tutorial/intro").await,
            (StatusCode::OK, "shell".to_owned())
        );
        assert_eq!(
            get_body(router.clone(), "/app.js").await,
            (StatusCode::OK, "js".to_owned())
        );
        assert_eq!(
            get_body(router, "/missing.css").await.0,
            StatusCode::NOT_FOUND
        );
    }
}
