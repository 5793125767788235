//! Fennel Relay Library
//!
//! This library provides request relay functionality for the Fennel gateway including:
//! - The relay engine with bounded retries across channels
//! - Asynchronous score feedback
//! - Request log sinks
//! - HTTP handlers for the OpenAI-compatible surface

pub mod relay;

// Re-export commonly used types
pub use relay::handler::LoadBalancedHandler;
pub use relay::{
    Feedback, FeedbackQueue, RelayEngine, RelayError, RelayLogEntry, RelayResponse,
    RequestLogSink, TracingLogSink,
};
