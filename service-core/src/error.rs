use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Bad Gateway: {0}")]
    BadGateway(String),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    /// Whether retrying the failed call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::BadGateway(_) | AppError::ServiceUnavailable)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_failures_are_transient() {
        assert!(AppError::BadGateway("502 from upstream".to_string()).is_transient());
        assert!(AppError::ServiceUnavailable.is_transient());
        assert!(!AppError::NotFound(anyhow::anyhow!("missing")).is_transient());
        assert!(!AppError::DatabaseError(anyhow::anyhow!("broken pipe")).is_transient());
    }

    #[test]
    fn config_errors_keep_their_message() {
        let err: AppError = config::ConfigError::Message("missing field `url`".to_string()).into();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("missing field `url`"));
    }
}
