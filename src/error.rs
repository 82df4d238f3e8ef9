use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkoopError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Kubernetes error: {0}")]
    KubernetesError(String),

    #[error("Cache error: {0}")]
    AgentError(#[from] skoop_agent::Error),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SkoopError>;
