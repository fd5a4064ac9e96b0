//! Per-operation status codes.
//!
//! Every add/remove outcome the engine reports to its listener carries one
//! of these, whether the outcome came back from the remote service or was
//! produced locally (for example an expire-reject during a reconciliation
//! pass).

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Outcome of a single add or remove operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStatus {
    /// Numeric status code. [`MonitorStatus::SUCCESS`] means the operation
    /// was applied by the remote service.
    pub code: i32,
    /// Optional human-readable detail, usually from the remote service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MonitorStatus {
    /// The operation succeeded.
    pub const SUCCESS: i32 = 0;
    /// The remote service was not connected when the call was attempted.
    pub const NOT_CONNECTED: i32 = 1;
    /// The remote service rejected or failed the call.
    pub const REMOTE_FAILURE: i32 = 2;
    /// The geofence expired locally before it could be submitted.
    pub const EXPIRED_LOCALLY: i32 = 3;

    /// A successful status.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            code: Self::SUCCESS,
            message: None,
        }
    }

    /// A failure status with a code and message.
    #[must_use]
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// The local expire-reject status.
    #[must_use]
    pub fn expired_locally() -> Self {
        Self::failure(
            Self::EXPIRED_LOCALLY,
            "geofence expired before it could be submitted",
        )
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS
    }
}

impl Display for MonitorStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "status {}: {message}", self.code),
            None => write!(f, "status {}", self.code),
        }
    }
}
