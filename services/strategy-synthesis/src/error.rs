/// Error types for the synthesis pipeline
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("Malformed feed message: {0}")]
    MalformedMessage(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Factorization failed: {0}")]
    Factorization(String),

    #[error("Tree violates shape limits: depth {depth}, nodes {nodes}")]
    InvalidTree { depth: usize, nodes: usize },

    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type for synthesis operations
pub type Result<T> = std::result::Result<T, SynthesisError>;

impl From<config::ConfigError> for SynthesisError {
    fn from(e: config::ConfigError) -> Self {
        SynthesisError::Config(e.to_string())
    }
}
