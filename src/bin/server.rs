//! Single-room WebSocket chat relay server.
//!
//! Broadcasts every message a client sends to all other connected clients,
//! and serves the bundled web client from `public/`.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin server
//! cargo run --bin server -- --host 0.0.0.0 --port 3000
//! ```

use clap::Parser;
use relay_chat::{common::logger::setup_logger, hub::Hub, server::run_server};

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Single-room WebSocket chat relay", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // The hub control loop runs for the lifetime of the process.
    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    if let Err(e) = run_server(args.host, args.port, handle).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
