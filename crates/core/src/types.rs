use thiserror::Error;

/// The main error type for Stackrun operations
#[derive(Debug, Error)]
pub enum StackrunError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dependency graph error: {0}")]
    Graph(String),

    #[error("Failed to resolve context for service '{service}': {message}")]
    Context { service: String, message: String },

    #[error("Before hook for command '{command}' failed: {message}")]
    Hook { command: String, message: String },

    #[error("Failed to select stack '{stack}' for service '{service}': {message}")]
    StackSelection {
        service: String,
        stack: String,
        message: String,
    },

    #[error("Command error: {0}")]
    Command(String),

    #[error("Circular dependency detected: {0}")]
    DependencyCycle(String),

    #[error("Execution engine error: {0}")]
    Engine(String),
}

/// Result type alias for Stackrun operations
pub type StackrunResult<T> = Result<T, StackrunError>;
