use thiserror::Error;

/// How a remote service call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Transport failure, timeout or 5xx-equivalent; worth retrying.
    Unavailable,
    /// Business rejection (4xx-equivalent); retrying cannot help.
    Rejected,
}

/// Error returned by a catalog service client.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    /// A transient failure the caller should retry.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Unavailable,
            message: message.into(),
        }
    }

    /// A business rejection the caller must not retry.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind: ServiceErrorKind::Rejected,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ServiceErrorKind::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_drives_retryability() {
        assert!(ServiceError::unavailable("timeout").is_retryable());
        assert!(!ServiceError::rejected("genre not found").is_retryable());
    }

    #[test]
    fn test_display_shows_message() {
        let err = ServiceError::rejected("author 9 not found");
        assert_eq!(err.to_string(), "author 9 not found");
    }
}
