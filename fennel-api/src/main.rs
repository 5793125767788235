//! Fennel API Server
//!
//! Main entry point for the Fennel relay gateway

use fennel_api::start_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    start_server().await
}
