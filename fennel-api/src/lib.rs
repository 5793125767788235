//! Fennel API Server Library
//!
//! This library provides the HTTP server for the Fennel relay gateway: the
//! OpenAI-compatible router, application state wiring and the PostgreSQL
//! persistence layer.

pub mod app;
pub mod database;
pub mod repositories;
pub mod router;

// Re-export the main server function
pub use app::start_server;
