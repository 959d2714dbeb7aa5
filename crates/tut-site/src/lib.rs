//! Tutorial discovery, builds and site assembly.
//!
//! - [`discover`] turns input roots into [`DocumentRef`]s
//! - [`Document`] builds one tutorial into `<export>/<id>/`, including its
//!   includes and content-addressed assets
//! - [`build_all`] runs builds concurrently and isolates failures
//! - [`assemble`] writes the site index from every built document

mod assets;
mod discovery;
mod document;
mod error;
mod orchestrator;
mod site;

pub use assets::{IMAGE_DIR, Materializer, StoredAsset, stored_name};
pub use discovery::{DocumentRef, discover};
pub use document::{BuildContext, Document, Stage};
pub use error::{AssetError, AssetFailure, BuildError, SiteError, error_chain};
pub use orchestrator::{BuildReport, build_all, refresh_all};
pub use site::{Category, Event, SiteIndex, assemble};
