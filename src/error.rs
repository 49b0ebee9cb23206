use thiserror::Error;

/// Errors that can occur when working with WalkingPad treadmills
#[derive(Error, Debug)]
pub enum PadError {
    /// Bluetooth Low Energy related errors
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// No WalkingPad found during scanning
    #[error("WalkingPad device not found")]
    DeviceNotFound,

    /// Device connection failed
    #[error("Failed to connect to device: {0}")]
    ConnectionFailed(String),

    /// Device disconnected unexpectedly
    #[error("Device disconnected")]
    Disconnected,

    /// A status notification was too short to decode
    #[error("Malformed status frame: {len} payload bytes, expected at least 12")]
    MalformedFrame {
        /// Length of the received payload after the signature bytes
        len: usize,
    },

    /// Operation timed out
    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Webhook delivery returned a non-success status
    #[error("Webhook rejected: status code {status}")]
    WebhookStatus {
        /// HTTP status code returned by the webhook endpoint
        status: u16,
    },

    /// HTTP error during webhook delivery
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for WalkingPad operations
pub type Result<T> = std::result::Result<T, PadError>;

impl PadError {
    /// Check if this error indicates a connection issue
    ///
    /// Connection issues are non-fatal: the supervisor tears the session down
    /// and retries discovery after a backoff.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Ble(_) | Self::ConnectionFailed(_) | Self::Disconnected | Self::DeviceNotFound
        )
    }

    /// Check if this error is recovered locally without touching the
    /// connection state machine
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame { .. }
                | Self::WebhookStatus { .. }
                | Self::Http(_)
                | Self::Json(_)
                | Self::Config(_)
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let connection_error = PadError::ConnectionFailed("test".to_string());
        assert!(connection_error.is_connection_error());
        assert!(!connection_error.is_local());

        let frame_error = PadError::MalformedFrame { len: 4 };
        assert!(!frame_error.is_connection_error());
        assert!(frame_error.is_local());

        let webhook_error = PadError::WebhookStatus { status: 500 };
        assert!(!webhook_error.is_connection_error());
        assert!(webhook_error.is_local());
    }

    #[test]
    fn test_error_display() {
        let error = PadError::MalformedFrame { len: 7 };
        let error_string = format!("{error}");
        assert!(error_string.contains("Malformed status frame"));
        assert!(error_string.contains('7'));

        let error = PadError::Timeout { timeout_ms: 5000 };
        assert!(format!("{error}").contains("5000ms"));
    }
}
