use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemedyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Runner error: {0}")]
    Runner(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl RemedyError {
    /// Faults that abort a run. Probe, runner and notification faults are
    /// advisory and get absorbed by the pipeline instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RemedyError::Probe(_) | RemedyError::Runner(_) | RemedyError::Notify(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RemedyError>;
