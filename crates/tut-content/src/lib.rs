//! Tutorial content: the node tree, its parsers and its HTML rendering.
//!
//! Sources are parsed through [`DocumentParser`] into a [`Codelab`]: metadata
//! plus ordered [`Step`]s of [`Node`] content. Markdown is parsed directly;
//! provider exports are converted from HTML first. [`Renderer`] turns a
//! finished tutorial into a page through a `minijinja` template.

mod error;
pub mod html;
mod markdown;
mod model;
mod node;
mod parser;
mod rich;
mod template;

pub use error::{ParseError, RenderError};
pub use model::{Codelab, Meta, Step, slugify};
pub use node::{InfoboxKind, Node, TextStyle, image_sources, import_references, visit, visit_mut};
pub use parser::{DefaultParser, DocumentParser};
pub use template::{Renderer, write_meta};
