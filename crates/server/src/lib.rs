pub mod deployment;
pub mod error;
pub mod routes;

pub use deployment::{DeploymentError, EventProcessorDeployment, TaskApiDeployment};

/// Crates whose logs follow `RUST_LOG`; everything else is held at `warn`.
pub const LOG_CRATES: &[&str] = &[
    "server",
    "event_processor",
    "services",
    "db",
    "utils",
];
