use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("TRANSPORT: {0}")]
    Transport(String),
    #[error("TIMEOUT: {0}")]
    Timeout(String),
    #[error("PROTOCOL: {0}")]
    Protocol(String),
    #[error("NETWORK: {0}")]
    Network(String),
    #[error("SERVER_{status}: {}", message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Message the server attached to an application-level failure, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => message.as_deref().filter(|m| !m.trim().is_empty()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Protocol(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) => Self::Server {
                status: status.as_u16(),
                message: None,
            },
            None => Self::Network(value.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn server_error_renders_status_and_message() {
        let err = AppError::Server {
            status: 500,
            message: Some("update already running".to_string()),
        };
        assert_eq!(err.to_string(), "SERVER_500: update already running");
        assert_eq!(err.server_message(), Some("update already running"));
    }

    #[test]
    fn blank_server_message_is_ignored() {
        let err = AppError::Server {
            status: 400,
            message: Some("   ".to_string()),
        };
        assert_eq!(err.server_message(), None);
        assert!(!err.is_timeout());
        assert!(AppError::Timeout("x".to_string()).is_timeout());
    }
}
