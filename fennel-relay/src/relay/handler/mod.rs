pub mod loadbalanced;
pub mod types;

pub use loadbalanced::LoadBalancedHandler;
pub use types::*;
