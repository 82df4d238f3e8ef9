pub mod cli;
pub mod config;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod startup;

pub use error::{Result, SkoopError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
