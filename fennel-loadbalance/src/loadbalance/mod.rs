pub mod health_checker;
pub mod manager;
pub mod selector;
pub mod service;

#[cfg(test)]
mod manager_tests;

pub use health_checker::{CycleReport, HealthCheckScheduler, ProbeError, SchedulerState};
pub use manager::{BalanceError, ChannelModelConf, LoadBalancer};
pub use selector::select_weighted;
pub use service::LoadBalanceService;
