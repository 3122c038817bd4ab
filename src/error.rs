use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Cluster API unreachable: {0}")]
    Connectivity(String),
    #[error("Failed to query events for pod {pod}: {message}")]
    EventQuery { pod: String, message: String },
    #[error("Failed to delete pod {pod}: {message}")]
    Deletion { pod: String, message: String },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
