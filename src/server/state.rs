//! Shared state handed to the boundary handlers.

use crate::client::PumpTimings;
use crate::hub::HubHandle;

/// Shared application state.
pub struct AppState {
    /// Handle to the hub's control channels.
    pub hub: HubHandle,
    /// Pump deadlines; defaults in production, shrunk in tests.
    pub timings: PumpTimings,
}
