//! Error types for the chat relay.

use thiserror::Error;

/// Errors surfaced by the hub's control channels.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub control loop has exited and no longer accepts events.
    #[error("hub control loop is no longer running")]
    Closed,
}
