//! Monitoring service error types.

use thiserror::Error;

use crate::status::MonitorStatus;

/// Error that can occur while talking to the remote monitoring service.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// No live connection exists and the call requires one.
    #[error("monitoring service is not connected")]
    NotConnected,

    /// Establishing a connection failed.
    #[error("connection to monitoring service failed: {message}")]
    ConnectionFailed { message: String },

    /// The remote service returned a failure status for the call.
    #[error("monitoring service rejected the request (code {code}): {message}")]
    Rejected { code: i32, message: String },

    /// The call did not complete in time.
    #[error("monitoring service call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl MonitorError {
    /// The status to surface to listeners for this failure.
    #[must_use]
    pub fn status(&self) -> MonitorStatus {
        match self {
            MonitorError::NotConnected => {
                MonitorStatus::failure(MonitorStatus::NOT_CONNECTED, self.to_string())
            }
            MonitorError::Rejected { code, message } => {
                MonitorStatus::failure(*code, message.clone())
            }
            MonitorError::ConnectionFailed { .. } | MonitorError::Timeout { .. } => {
                MonitorStatus::failure(MonitorStatus::REMOTE_FAILURE, self.to_string())
            }
        }
    }
}

/// Result type for monitoring service operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
