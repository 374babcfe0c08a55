use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenieError {
    /// A dialogue state violated a structural contract. The current
    /// generation attempt must be abandoned.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Unexpected command: {0}")]
    UnexpectedCommand(String),

    #[error("Dialogue cancelled")]
    Cancelled,

    #[error("Invalid dialogue state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GenieError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        GenieError::Invariant(msg.into())
    }

    /// Errors the policy loop answers and keeps going after.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GenieError::UnexpectedCommand(_) | GenieError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, GenieError>;

/// Fails with [`GenieError::Invariant`] when the condition does not hold.
#[macro_export]
macro_rules! ensure_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::GenieError::Invariant(format!($($arg)+)));
        }
    };
}
