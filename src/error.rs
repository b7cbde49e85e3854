//! Errors surfaced by the conversation engine

use std::fmt;

use crate::api::ApiError;

/// Collaborator call an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    History,
    Send,
    Edit,
    Delete,
    AcknowledgeRead,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::History => "history fetch",
            Operation::Send => "send",
            Operation::Edit => "edit",
            Operation::Delete => "delete",
            Operation::AcknowledgeRead => "read acknowledgement",
        })
    }
}

/// Failures the operator is told about.
///
/// Stale or duplicate events are not errors; the store resolves them as
/// no-op merges.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Transient: state is unchanged and the caller may retry.
    #[error("{operation} failed: {message}")]
    Network { operation: Operation, message: String },
    /// Rejected locally before any request was made.
    #[error("{0}")]
    Validation(String),
    #[error("{operation} returned a malformed record: {message}")]
    Decode { operation: Operation, message: String },
    #[error("no conversation is open")]
    Inactive,
}

impl SyncError {
    pub fn from_api(operation: Operation, err: ApiError) -> Self {
        match err {
            ApiError::Decode { .. } => SyncError::Decode {
                operation,
                message: err.to_string(),
            },
            other => SyncError::Network {
                operation,
                message: other.to_string(),
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation(message.into())
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Network { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_api_classifies_decode() {
        let err = SyncError::from_api(
            Operation::Send,
            ApiError::Decode {
                url: "http://shop/api".to_string(),
                reason: "record has no usable id".to_string(),
            },
        );
        assert!(matches!(err, SyncError::Decode { .. }));
        assert!(!err.is_transient());

        let err = SyncError::from_api(
            Operation::History,
            ApiError::Status {
                status: 503,
                url: "http://shop/api".to_string(),
                body: "busy".to_string(),
            },
        );
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "history fetch failed: HTTP 503 for http://shop/api: busy"
        );
    }
}
