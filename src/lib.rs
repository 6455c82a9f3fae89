//! Single-room WebSocket chat relay.
//!
//! A hub actor owns the registry of connected clients and broadcasts every
//! inbound message to all other connections. Each connection runs a reader
//! pump and a writer pump that talk to the hub exclusively over channels.

// core
pub mod client;
pub mod error;
pub mod hub;
pub mod message;

// boundary
pub mod server;

// shared library
pub mod common;
