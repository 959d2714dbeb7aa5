//! Resource fetching for tutorial sources and assets.
//!
//! A reference is read from disk when it names an existing file. Otherwise
//! it is treated as a plain URL or a provider document (by prefix or host)
//! and fetched over HTTP with retry:
//!
//! - 200 is accepted immediately
//! - connection failures, 5xx and provider rate-limit envelopes are retried
//!   after `2^attempt` seconds plus jitter
//! - any other status fails at once
//!
//! # Features
//!
//! - `mock`: exposes [`MockTransport`], a scripted [`Transport`] for tests.

mod credentials;
mod error;
mod fetcher;
mod reference;
mod retry;
mod transport;

pub use credentials::{BearerToken, CredentialProvider};
pub use error::{FetchError, FetchErrorKind};
pub use fetcher::{Fetcher, Resource, SourceKind};
pub use reference::{ProviderSettings, RefKind, classify};
pub use retry::{RetryPolicy, is_rate_limited};
pub use transport::{HttpResponse, Transport, TransportError, UreqTransport};

#[cfg(any(test, feature = "mock"))]
pub use transport::{MockTransport, RecordedCall};
