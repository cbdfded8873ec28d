pub mod config;
pub mod error;
pub mod tasks;
pub mod telemetry;
pub mod workflows;
