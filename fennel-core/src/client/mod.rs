pub mod factory;
pub mod gemini;
pub mod openai;
pub mod siliconflow;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use factory::{ClientFactory, UnifiedClient};
pub use traits::*;
pub use types::*;
