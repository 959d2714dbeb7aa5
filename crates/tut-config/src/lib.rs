//! Configuration for the tutorial preview pipeline.
//!
//! Parses `tut.toml` with serde, discovering it in the working directory or
//! any parent. Every section is optional. CLI flags are layered on top via
//! [`CliSettings`], and relative paths are resolved against the website root.
//!
//! The resolved [`Config`] is built once at startup and handed to every
//! component that needs it; nothing here is global.
//!
//! ## Environment Variable Expansion
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `server.host`
//! - `provider.api_base`
//! - `provider.token`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "tut.toml";

/// Files whose joint presence marks the website root.
const WEBSITE_MARKERS: [&str; 2] = ["index.html", "bower.json"];

const DEFAULT_EXPORT_DIR: &str = "src/codelabs";
const DEFAULT_METADATA_DIR: &str = "metadata";
const DEFAULT_API_DIR: &str = "api";
const DEFAULT_INPUT_DIR: &str = "tutorials";

/// CLI settings that override configuration file values.
///
/// Paths are expected to be absolute already; relative ones are joined to
/// the config base directory.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override server host.
    pub host: Option<String>,
    /// Override server port.
    pub port: Option<u16>,
    /// Override website root.
    pub website: Option<PathBuf>,
    /// Override export directory.
    pub export: Option<PathBuf>,
    /// Override metadata directory.
    pub metadata: Option<PathBuf>,
    /// Override API output directory.
    pub api: Option<PathBuf>,
    /// Discovery roots. Empty keeps the configured inputs.
    pub inputs: Vec<PathBuf>,
    /// Override live reload enabled flag.
    pub live_reload_enabled: Option<bool>,
}

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Path layout as written in TOML.
    paths: PathsConfigRaw,
    /// Live reload configuration.
    pub live_reload: LiveReloadConfig,
    /// Retry and timeout settings for remote fetches.
    pub fetch: FetchConfig,
    /// Remote document provider settings.
    pub provider: ProviderConfig,
    /// Public URL layout and template name.
    pub site: SiteConfig,

    /// Resolved path layout (set after loading).
    #[serde(skip)]
    pub paths_resolved: Paths,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
struct PathsConfigRaw {
    website: Option<PathBuf>,
    export: Option<PathBuf>,
    metadata: Option<PathBuf>,
    api: Option<PathBuf>,
    inputs: Option<Vec<PathBuf>>,
}

/// Resolved path layout with absolute directories.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Website root holding the main `index.html`.
    pub website: PathBuf,
    /// Root for generated tutorials (`<export>/<id>/`).
    pub export: PathBuf,
    /// Directory holding the page template and categories/events files.
    pub metadata: PathBuf,
    /// Directory receiving `codelabs.json` and event assets.
    pub api: PathBuf,
    /// Discovery roots.
    pub inputs: Vec<PathBuf>,
}

impl Paths {
    /// Template file path inside the metadata directory.
    #[must_use]
    pub fn template(&self, name: &str) -> PathBuf {
        self.metadata.join(name)
    }

    /// Redirect export and API outputs under `root`, keeping sources in place.
    ///
    /// Used by serve mode so previews never clobber the published tree.
    #[must_use]
    pub fn with_output_root(&self, root: &Path) -> Self {
        Self {
            export: root.join(DEFAULT_EXPORT_DIR),
            api: root.join(DEFAULT_API_DIR),
            ..self.clone()
        }
    }
}

/// Live reload configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveReloadConfig {
    /// Whether live reload is enabled.
    pub enabled: bool,
    /// Websocket upgrade path.
    pub endpoint: String,
    /// Outbound buffer per connected client.
    pub client_buffer: usize,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "/reload".to_owned(),
            client_buffer: 10,
        }
    }
}

/// Fetch retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Retries after the first attempt for top-level documents.
    pub document_retries: u32,
    /// Retries after the first attempt for provider documents, includes and assets.
    pub provider_retries: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            document_retries: 3,
            provider_retries: 7,
            timeout_secs: 30,
        }
    }
}

/// Remote document provider configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Ref prefix marking a provider document id.
    pub prefix: String,
    /// Host name marking a provider document URL.
    pub host: String,
    /// Provider REST API base URL.
    pub api_base: String,
    /// Expected MIME type of exportable documents.
    pub mime_type: String,
    /// Bearer token for provider requests.
    pub token: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            prefix: "gdoc:".to_owned(),
            host: "docs.google.com".to_owned(),
            api_base: "https://www.googleapis.com/drive/v3".to_owned(),
            mime_type: "application/vnd.google-apps.document".to_owned(),
            token: None,
        }
    }
}

/// Public URL layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Page template name, relative to the metadata directory.
    pub template: String,
    /// URL prefix under which tutorials are browsed.
    pub base_url: String,
    /// URL prefix serving the export directory.
    pub asset_url: String,
    /// URL prefix serving the API directory.
    pub api_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            template: "ubuntu-template.html".to_owned(),
            base_url: "/tutorial".to_owned(),
            asset_url: "/src/codelabs".to_owned(),
            api_url: "/api".to_owned(),
        }
    }
}

impl SiteConfig {
    /// Public URL of a built tutorial.
    #[must_use]
    pub fn tutorial_url(&self, id: &str) -> String {
        format!("{}/{id}", self.base_url.trim_end_matches('/'))
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Website root could not be located.
    #[error("Couldn't detect website directory from or above {}", .0.display())]
    WebsiteNotFound(PathBuf),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`provider.token`").
        field: String,
        /// Error message (e.g., "${`DRIVE_TOKEN`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn require_url_path(value: &str, field: &str) -> Result<(), ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::Validation(format!("{field} must start with /")));
    }
    Ok(())
}

/// Walk up from `start` until a directory holds every website marker.
///
/// The filesystem root never qualifies.
fn detect_website(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        current.parent()?;
        if WEBSITE_MARKERS.iter().all(|m| current.join(m).is_file()) {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `tut.toml` in the current directory and parents, falling back to
    /// defaults rooted at the current directory.
    ///
    /// CLI settings are applied before path resolution so that an explicit
    /// website root also drives where relative defaults land.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, parsing or
    /// validation fails, or no website root can be found when one is needed.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()?;
        let (mut config, base) = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config(&cwd) {
            Self::load_from_file(&discovered)?
        } else {
            (Self::default_with_base(&cwd), cwd.clone())
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }
        config.resolve_paths(&base)?;
        config.validate()?;

        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(host) = &settings.host {
            self.server.host.clone_from(host);
        }
        if let Some(port) = settings.port {
            self.server.port = port;
        }
        if let Some(website) = &settings.website {
            self.paths.website = Some(website.clone());
        }
        if let Some(export) = &settings.export {
            self.paths.export = Some(export.clone());
        }
        if let Some(metadata) = &settings.metadata {
            self.paths.metadata = Some(metadata.clone());
        }
        if let Some(api) = &settings.api {
            self.paths.api = Some(api.clone());
        }
        if !settings.inputs.is_empty() {
            self.paths.inputs = Some(settings.inputs.clone());
        }
        if let Some(live_reload_enabled) = settings.live_reload_enabled {
            self.live_reload.enabled = live_reload_enabled;
        }
    }

    fn discover_config(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with every path under `base`.
    fn default_with_base(base: &Path) -> Self {
        Self {
            server: ServerConfig::default(),
            paths: PathsConfigRaw::default(),
            live_reload: LiveReloadConfig::default(),
            fetch: FetchConfig::default(),
            provider: ProviderConfig::default(),
            site: SiteConfig::default(),
            paths_resolved: Paths {
                website: base.to_path_buf(),
                export: base.join(DEFAULT_EXPORT_DIR),
                metadata: base.join(DEFAULT_METADATA_DIR),
                api: base.join(DEFAULT_API_DIR),
                inputs: vec![base.join(DEFAULT_INPUT_DIR)],
            },
            config_path: None,
        }
    }

    /// Parse a config file, returning it with the directory it lives in.
    fn load_from_file(path: &Path) -> Result<(Self, PathBuf), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.expand_env_vars()?;
        config.config_path = Some(path.to_path_buf());

        let config_dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok((config, config_dir))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.server.host, "server.host")?;
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port cannot be 0".to_owned(),
            ));
        }

        require_url_path(&self.live_reload.endpoint, "live_reload.endpoint")?;
        if self.live_reload.client_buffer == 0 {
            return Err(ConfigError::Validation(
                "live_reload.client_buffer must be greater than 0".to_owned(),
            ));
        }

        require_non_empty(&self.provider.prefix, "provider.prefix")?;
        require_http_url(&self.provider.api_base, "provider.api_base")?;
        require_non_empty(&self.provider.mime_type, "provider.mime_type")?;

        require_non_empty(&self.site.template, "site.template")?;
        require_url_path(&self.site.base_url, "site.base_url")?;
        require_url_path(&self.site.asset_url, "site.asset_url")?;
        require_url_path(&self.site.api_url, "site.api_url")?;
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.server.host = expand::expand_env(&self.server.host, "server.host")?;
        self.provider.api_base = expand::expand_env(&self.provider.api_base, "provider.api_base")?;
        self.provider.token = expand::expand_opt(self.provider.token.as_ref(), "provider.token")?;
        Ok(())
    }

    /// Resolve the raw path layout against `base`.
    ///
    /// The website root is only searched for when some other path still
    /// depends on it.
    fn resolve_paths(&mut self, base: &Path) -> Result<(), ConfigError> {
        let raw = self.paths.clone();
        let needs_website = raw.export.is_none()
            || raw.metadata.is_none()
            || raw.api.is_none()
            || raw.inputs.is_none();

        let website = match raw.website {
            Some(website) => base.join(website),
            None if needs_website => {
                detect_website(base).ok_or_else(|| ConfigError::WebsiteNotFound(base.to_path_buf()))?
            }
            None => base.to_path_buf(),
        };

        let under_website =
            |path: Option<PathBuf>, default: &str| website.join(path.unwrap_or_else(|| default.into()));

        self.paths_resolved = Paths {
            export: under_website(raw.export, DEFAULT_EXPORT_DIR),
            metadata: under_website(raw.metadata, DEFAULT_METADATA_DIR),
            api: under_website(raw.api, DEFAULT_API_DIR),
            inputs: match raw.inputs {
                Some(inputs) => inputs.into_iter().map(|p| base.join(p)).collect(),
                None => vec![website.join(DEFAULT_INPUT_DIR)],
            },
            website,
        };
        Ok(())
    }

    /// Template file for rendering tutorials.
    #[must_use]
    pub fn template_path(&self) -> PathBuf {
        self.paths_resolved.template(&self.site.template)
    }
}
