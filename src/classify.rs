//! Error classifier
//!
//! Pure mapping from any failure shape to a classification the dispatcher
//! and logging can share. No side effects here: the dispatcher decides what
//! to do with the classification, this module only names it.

use crate::types::ApiResponse;

/// Fixed sentinel the backend uses when re-authentication is required but no
/// HTTP status is available (e.g. the failure came from a local check).
/// Treated as equivalent to a bare 401.
pub const AUTH_REQUIRED_SENTINEL: &str = "auth/required";

/// HTTP statuses classified as retryable server failures
const SERVER_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Keywords marking transport-level failures in error text
const NETWORK_KEYWORDS: [&str; 5] = ["network", "timeout", "timed out", "connection", "unreachable"];

/// Keywords marking client-input failures in error text
const VALIDATION_KEYWORDS: [&str; 4] = ["invalid", "required field", "format", "too long"];

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing, invalid, or expired credentials; recoverable via refresh
    Auth,
    /// Transport failure, retryable
    Network,
    /// Client input rejected, not retryable
    Validation,
    /// 5xx-class backend failure, retryable
    Server,
    /// Unclassified, not retryable
    Unknown,
}

/// Classification of one failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: ErrorKind,
    /// Whether the dispatcher may retry the call as-is
    pub retryable: bool,
    /// Message suitable for direct display
    pub user_message: String,
}

/// Classify a raw failure from its error text and optional HTTP status.
///
/// Precedence: auth sentinel / 401 first, then the 5xx server set, then
/// keyword matching on the error text, then unknown (not retryable).
pub fn classify(error: Option<&str>, status: Option<u16>) -> Classified {
    if status == Some(401) || error.is_some_and(|e| e.contains(AUTH_REQUIRED_SENTINEL)) {
        return Classified {
            kind: ErrorKind::Auth,
            retryable: false,
            user_message: "Your session has expired. Please sign in again.".to_string(),
        };
    }

    if let Some(status) = status {
        if SERVER_STATUSES.contains(&status) {
            return Classified {
                kind: ErrorKind::Server,
                retryable: true,
                user_message: "The service is having trouble. Please try again shortly."
                    .to_string(),
            };
        }
    }

    if let Some(text) = error {
        let lower = text.to_lowercase();
        if NETWORK_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Classified {
                kind: ErrorKind::Network,
                retryable: true,
                user_message: "Connection problem. Check your network and try again.".to_string(),
            };
        }
        if VALIDATION_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Classified {
                kind: ErrorKind::Validation,
                retryable: false,
                user_message: text.to_string(),
            };
        }
    }

    Classified {
        kind: ErrorKind::Unknown,
        retryable: false,
        user_message: "Something went wrong. Please try again.".to_string(),
    }
}

/// Classify a failed [`ApiResponse`] directly.
pub fn classify_response<T>(response: &ApiResponse<T>) -> Classified {
    classify(response.error.as_deref(), response.status)
}
