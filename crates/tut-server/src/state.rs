//! Application state.

use crate::hub::Hub;

/// State shared across handlers.
pub(crate) struct AppState {
    /// Live-reload hub every websocket registers with.
    pub(crate) hub: Hub,
}
