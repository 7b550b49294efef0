// ============================================================================
// REMOTE SERVICES — background-removal and prompt-generation API clients
// ============================================================================

pub mod prompt;
pub mod removebg;

use std::time::Duration;

/// Per-request timeout for both services.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Failures from the third-party endpoints. All of these are expected at
/// runtime and surface as a readable status message; none may leave partial
/// state behind.
#[derive(Debug)]
pub enum RemoteServiceError {
    /// No credential configured for the call at all.
    MissingApiKey,
    /// HTTP 403 from the endpoint.
    InvalidApiKey,
    /// HTTP 402 from the endpoint.
    InsufficientCredits,
    /// Any other non-2xx status, carrying the status text.
    Api(String),
    /// Transport-level failure before any status arrived.
    Network(String),
    /// The endpoint answered 2xx with bytes we could not use.
    BadResponse(String),
}

impl std::fmt::Display for RemoteServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteServiceError::MissingApiKey => write!(f, "No API key configured"),
            RemoteServiceError::InvalidApiKey => write!(f, "Invalid API key"),
            RemoteServiceError::InsufficientCredits => write!(f, "Insufficient credits"),
            RemoteServiceError::Api(status) => write!(f, "API error: {}", status),
            RemoteServiceError::Network(e) => write!(f, "Network error: {}", e),
            RemoteServiceError::BadResponse(e) => write!(f, "Unusable API response: {}", e),
        }
    }
}

impl std::error::Error for RemoteServiceError {}

impl From<reqwest::Error> for RemoteServiceError {
    fn from(e: reqwest::Error) -> Self {
        RemoteServiceError::Network(e.to_string())
    }
}

/// Map a non-2xx HTTP status to the service error taxonomy: 403 means the
/// key was rejected, 402 means the account is out of credits, everything
/// else is a generic API failure carrying the status text.
pub(crate) fn error_for_status(status: u16, status_text: &str) -> RemoteServiceError {
    match status {
        403 => RemoteServiceError::InvalidApiKey,
        402 => RemoteServiceError::InsufficientCredits,
        _ => RemoteServiceError::Api(status_text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_contract() {
        assert!(matches!(error_for_status(403, "Forbidden"), RemoteServiceError::InvalidApiKey));
        assert!(matches!(error_for_status(402, "Payment Required"), RemoteServiceError::InsufficientCredits));
        match error_for_status(500, "Internal Server Error") {
            RemoteServiceError::Api(text) => assert_eq!(text, "Internal Server Error"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
