pub mod channel;
pub mod request_log;

pub use channel::PgChannelStore;
pub use request_log::PgRequestLogSink;
