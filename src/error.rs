//! Error types for videoctl operations

use std::io;
use thiserror::Error;

/// Result type alias using videoctl's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for videoctl operations
#[derive(Error, Debug)]
pub enum Error {
    /// Device node missing, not a `video*` node, or failed to open
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A single driver query failed
    #[error("{request} failed: {source}")]
    QueryFailed {
        /// Name of the ioctl request that failed
        request: &'static str,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// A request value was rejected before touching the device
    #[error("Error: {0}")]
    ValidationFailed(String),

    /// Device segment of the request path exceeds the accepted length
    #[error("Device name too long ({0} bytes)")]
    NameTooLong(usize),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or oversized HTTP request
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap a failed driver query.
    pub fn query(request: &'static str, source: io::Error) -> Self {
        Error::QueryFailed { request, source }
    }

    /// Text reported to HTTP clients for per-item failures.
    ///
    /// Driver failures are reported as the bare OS error string (e.g. "Invalid argument"),
    /// everything else uses the display form.
    pub fn client_message(&self) -> String {
        match self {
            Error::QueryFailed { source, .. } => os_error_text(source),
            other => other.to_string(),
        }
    }
}

/// Render an I/O error the way `strerror` would, without the " (os error N)" suffix.
pub fn os_error_text(err: &io::Error) -> String {
    let text = err.to_string();
    match (err.raw_os_error(), text.rfind(" (os error ")) {
        (Some(_), Some(idx)) => text[..idx].to_string(),
        _ => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_text_strips_code() {
        let err = io::Error::from_raw_os_error(22);
        let text = os_error_text(&err);
        assert!(!text.contains("os error"), "unexpected suffix: {text}");
        assert!(!text.is_empty());
    }

    #[test]
    fn test_client_message_for_query_failure() {
        let err = Error::query("VIDIOC_G_CTRL", io::Error::from_raw_os_error(22));
        assert_eq!(
            err.client_message(),
            os_error_text(&io::Error::from_raw_os_error(22))
        );
        assert!(err.to_string().starts_with("VIDIOC_G_CTRL failed"));
    }

    #[test]
    fn test_validation_message() {
        let err = Error::ValidationFailed("Only numbers are expected".to_string());
        assert_eq!(err.client_message(), "Error: Only numbers are expected");
    }
}
