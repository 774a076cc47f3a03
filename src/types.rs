//! Shared error and wire types
//!
//! One crate-level error enum plus the generic REST response shape that the
//! dispatcher, classifier, and collaborators all agree on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, NetError>;

/// Errors surfaced by the resilience layer
#[derive(Debug, Error)]
pub enum NetError {
    /// Missing, invalid, or expired credentials
    #[error("Authentication required: {0}")]
    Auth(String),

    /// Transport failure, including exhausted reconnection
    #[error("Network error: {0}")]
    Network(String),

    /// 5xx-class backend failure
    #[error("Server error: {0}")]
    Server(String),

    /// Request rejected before input left the client
    #[error("Validation error: {0}")]
    Validation(String),

    /// Denied by the call budget guard
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Local persistence failure (token store)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Unclassified failure
    #[error("Unexpected error: {0}")]
    Unknown(String),
}

/// Generic REST collaborator response shape.
///
/// Every wrapped call resolves to this, success or not. The dispatcher and
/// classifier depend only on this shape, never on endpoint semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying a payload
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            status: None,
        }
    }

    /// Failed response with an error message and optional HTTP status
    pub fn err(error: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            status,
        }
    }
}

/// Build provenance captured by the build script, for diagnostics and
/// support reports.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub git_commit: &'static str,
    pub git_commit_full: &'static str,
    pub built_at: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            git_commit: env!("GIT_COMMIT_SHORT"),
            git_commit_full: env!("GIT_COMMIT_FULL"),
            built_at: env!("BUILD_TIMESTAMP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_info_is_populated() {
        let info = BuildInfo::current();
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        // "unknown" outside a git checkout, a hash inside one
        assert!(!info.git_commit.is_empty());
        assert!(!info.built_at.is_empty());
    }

    #[test]
    fn test_api_response_roundtrip() {
        let resp: ApiResponse<String> = ApiResponse::err("boom", Some(503));
        let json = serde_json::to_string(&resp).unwrap();
        let back: ApiResponse<String> = serde_json::from_str(&json).unwrap();
        assert!(!back.success);
        assert_eq!(back.error.as_deref(), Some("boom"));
        assert_eq!(back.status, Some(503));
    }

    #[test]
    fn test_api_response_omits_empty_fields() {
        let resp = ApiResponse::ok(42u32);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("error"));
        assert!(!json.contains("status"));
    }
}
