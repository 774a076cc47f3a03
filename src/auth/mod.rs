//! Auth session controller
//!
//! Owns the single authoritative session state (authenticated?, user,
//! tokens) and every transition on it. Other components read snapshots via
//! a watch channel; nothing else mutates session state.
//!
//! Collaborators sit behind traits so the dispatcher, tests, and the app
//! shell can each wire their own: profile fetch for validation, the token
//! refresh endpoint, the notification collaborator poked at logout, and the
//! redirect side effect for irrecoverable auth failures.

mod session;

pub use session::{AuthCheckOptions, AuthSession};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::profile::UserProfile;
use crate::types::ApiResponse;

/// Session state: the single authoritative instance, mutated only by
/// [`AuthSession`].
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// True while a validation round-trip is in flight
    pub loading: bool,
}

/// Wire shape of the refresh endpoint.
///
/// The backend does not rotate refresh tokens today: `refresh_token` is
/// carried for forward compatibility but the session only consumes the
/// access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Profile fetch used to validate a stored access token.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    async fn fetch_profile(&self, access_token: &str) -> ApiResponse<UserProfile>;
}

/// The refresh collaborator: given the stored refresh token, mint a new
/// access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> RefreshResponse;
}

/// External per-event notification collaborator, told to unsubscribe
/// everything at logout.
#[async_trait]
pub trait NotificationHooks: Send + Sync {
    async fn unsubscribe_all(&self);
}

/// Side effects the session controller raises toward the app shell.
#[async_trait]
pub trait AuthEvents: Send + Sync {
    /// Raised when an auth failure could not be repaired by refresh.
    async fn redirect_to_login(&self);
}

/// No-op hooks for callers that do not care about a collaborator.
pub struct NoopHooks;

#[async_trait]
impl NotificationHooks for NoopHooks {
    async fn unsubscribe_all(&self) {}
}

#[async_trait]
impl AuthEvents for NoopHooks {
    async fn redirect_to_login(&self) {}
}
