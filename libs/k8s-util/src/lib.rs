pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod labels;
pub mod rolling_update;

pub use client::{KubeOrchestrator, OrchestratorClient};
pub use error::{Error, Result};
