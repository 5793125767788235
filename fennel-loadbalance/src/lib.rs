//! Fennel Load Balance Library
//!
//! This library provides channel selection for the Fennel relay gateway including:
//! - Weighted random selection with model alias expansion
//! - Success / failure score feedback and time-boxed recovery
//! - The background health-check scheduler

pub mod loadbalance;

// Re-export commonly used types
pub use loadbalance::{
    BalanceError, ChannelModelConf, CycleReport, HealthCheckScheduler, LoadBalanceService,
    LoadBalancer, ProbeError, SchedulerState,
};
