use thiserror::Error;
use url::Url;

use crate::errors::RequestFailure;

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("[E006] Invalid base URL: {0}\n\nSuggestions:\n  • Provide a valid HTTP or HTTPS URL\n  • Example: https://server-verify.hashscan.io\n  • Ensure the URL includes the protocol (http:// or https://)")]
    CannotBeBase(Url),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Failure(#[from] RequestFailure),

    #[error("[E007] Unexpected response from {url}: {error}\n\nSuggestions:\n  • Check that the URL points at a verification server\n  • The server may be running an incompatible version")]
    Payload { url: Url, error: serde_json::Error },
}

impl ApiClientError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CannotBeBase(_) => "E006",
            Self::Reqwest(_) => "E999", // Network errors get generic code
            Self::Failure(f) => f.error_code().as_str(),
            Self::Payload { .. } => "E007",
        }
    }
}
