pub mod config;
pub mod cli;
pub mod metadata;
pub mod planner;
pub mod resources;
pub mod status;
pub mod reconciler;
pub mod controller;

pub use config::{OperatorConfig, OperatorConfigBuilder};
pub use controller::StargateController;
pub use reconciler::StargateReconciler;
