//! HTTP/WebSocket boundary for the chat relay.

mod handler;
mod runner;
mod signal;
mod state;

pub use runner::{app, run_server};
pub use state::AppState;
