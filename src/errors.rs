use reqwest::StatusCode;
use std::fmt::{self, Formatter};
use thiserror::Error;
use url::Url;

/// Error codes shared by the HTTP-facing error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Client error (4xx) status from any service
    E001,
    /// Server error (5xx) or other unexpected status
    E002,
}

impl ErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::E001 => "E001",
            Self::E002 => "E002",
        }
    }
}

/// A request that reached a server but came back with a non-success status.
#[derive(Debug, Error)]
pub struct RequestFailure {
    pub url: Url,
    pub status: StatusCode,
    pub msg: String,
}

impl RequestFailure {
    pub fn new(url: Url, status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            url,
            status,
            msg: msg.into(),
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        if self.status.is_client_error() {
            ErrorCode::E001
        } else {
            ErrorCode::E002
        }
    }

    fn suggestions(&self) -> Vec<&'static str> {
        match self.status {
            StatusCode::NOT_FOUND => vec![
                "Check that the URL is correct",
                "Verify that the server exposes the requested endpoint",
            ],
            StatusCode::TOO_MANY_REQUESTS => vec![
                "Wait a moment before retrying",
                "Consider reducing request frequency",
            ],
            StatusCode::PAYLOAD_TOO_LARGE => vec![
                "Submit fewer source files",
                "Remove sources that are not imported by the contract",
            ],
            status if status.is_server_error() => vec![
                "The server is experiencing issues, try again later",
                "Check the server status before retrying",
            ],
            _ => vec!["Check the request parameters and try again"],
        }
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        writeln!(
            formatter,
            "[{}] Request to {} failed with status {}",
            self.error_code().as_str(),
            self.url,
            self.status
        )?;
        writeln!(formatter, "Server response: {}", self.msg)?;
        writeln!(formatter, "\nSuggestions:")?;
        for suggestion in self.suggestions() {
            writeln!(formatter, "  • {suggestion}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_and_server_statuses_get_distinct_codes() {
        let url = Url::parse("https://server-verify.hashscan.io/verify").unwrap();
        let client = RequestFailure::new(url.clone(), StatusCode::BAD_REQUEST, "bad");
        assert_eq!(client.error_code(), ErrorCode::E001);

        let compiler = Url::parse("https://compiler.example.com/compile").unwrap();
        let not_found = RequestFailure::new(compiler.clone(), StatusCode::NOT_FOUND, "missing");
        assert_eq!(not_found.error_code(), ErrorCode::E001);

        let moved = RequestFailure::new(compiler, StatusCode::MOVED_PERMANENTLY, "moved");
        assert_eq!(moved.error_code(), ErrorCode::E002);
        let unavailable = RequestFailure::new(url, StatusCode::SERVICE_UNAVAILABLE, "down");
        assert_eq!(unavailable.error_code(), ErrorCode::E002);
    }

    #[test]
    fn test_server_errors_suggest_retry() {
        let url = Url::parse("https://server-verify.hashscan.io/verify").unwrap();
        let failure = RequestFailure::new(url, StatusCode::BAD_GATEWAY, "upstream");
        let message = format!("{failure}");
        assert!(message.starts_with("[E002]"));
        assert!(message.contains("try again later"));
        assert!(message.contains("Server response: upstream"));
    }
}
