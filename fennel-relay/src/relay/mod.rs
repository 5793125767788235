pub mod engine;
pub mod feedback;
pub mod handler;
pub mod log_sink;

pub use engine::{RelayEngine, RelayError, RelayResponse};
pub use feedback::{Feedback, FeedbackQueue};
pub use log_sink::{RelayLogEntry, RequestLogSink, TracingLogSink};
