//! Fennel Core Library
//!
//! This library provides core functionality for the Fennel relay gateway including:
//! - Configuration management
//! - Channel and channel-model types with their health score rules
//! - The channel store interface and an in-memory store
//! - Upstream clients for OpenAI-compatible providers

pub mod channel;
pub mod client;
pub mod config;
pub mod store;

// Re-export commonly used types
pub use channel::{
    Channel, ChannelModel, ChannelStatus, ChannelType, LimitState, NewChannel, RecoveryReset,
    ScoreLimits,
};
pub use client::{
    AdapterFactory, BodyStream, ClientError, ClientFactory, FilePart, MultipartForm,
    OperationKind, RelayOperation, RequestBody, UnifiedClient, UpstreamAdapter, UpstreamResponse,
};
pub use config::model::{
    BalanceSettings, ChannelConfig, Config, DatabaseSettings, GlobalSettings,
    HealthCheckSettings, RelaySettings,
};
pub use store::{ChannelStore, MemoryChannelStore, StoreError};
