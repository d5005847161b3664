pub mod condition;
pub mod stargate;
pub mod datacenter;
pub mod deployment;
pub mod service;
pub mod telemetry;

// re-export k8-types crate
pub use k8_types;
