pub mod controller;
pub mod error;
pub mod indexer;
pub mod log;
pub mod model;
pub mod reconcile;
pub mod render;
pub mod store;
pub mod telemetry;
pub mod webhook;

pub use controller::{DeploymentController, State, Status};
pub use error::{Error, Result};
pub use store::{Entity, Store};
