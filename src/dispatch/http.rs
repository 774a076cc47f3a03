//! Default reqwest-backed collaborators
//!
//! The profile fetch used for session validation and the token refresh
//! endpoint. Both translate transport failures into the shared response
//! shapes so the classifier sees them as network errors, never panics.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::auth::{ProfileApi, RefreshResponse, TokenRefresher};
use crate::config::NetConfig;
use crate::profile::UserProfile;
use crate::types::{ApiResponse, NetError, Result};

/// Timeout for the validation/refresh round-trips
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| NetError::Network(format!("Failed to create HTTP client: {}", e)))
}

/// Profile fetch against `GET {base}/users/me`.
pub struct HttpProfileApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProfileApi {
    pub fn new(config: &NetConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ProfileApi for HttpProfileApi {
    async fn fetch_profile(&self, access_token: &str) -> ApiResponse<UserProfile> {
        let url = format!("{}/users/me", self.base_url);
        debug!("Validating session against {}", url);

        let response = match self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return ApiResponse::err(format!("network error: {}", e), None),
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return ApiResponse::err(
                format!("Profile fetch failed: {}", text),
                Some(status),
            );
        }

        match response.json::<UserProfile>().await {
            Ok(user) => ApiResponse::ok(user),
            Err(e) => ApiResponse::err(format!("Unreadable profile response: {}", e), Some(status)),
        }
    }
}

/// Token refresh against `POST {base}/auth/refresh`.
///
/// The backend reuses the stored refresh token indefinitely; only a new
/// access token comes back.
pub struct HttpTokenRefresher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTokenRefresher {
    pub fn new(config: &NetConfig) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> RefreshResponse {
        let url = format!("{}/auth/refresh", self.base_url);
        debug!("Refreshing access token against {}", url);

        let failed = RefreshResponse {
            success: false,
            access_token: None,
            refresh_token: None,
        };

        let response = match self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!("Refresh transport failure: {}", e);
                return failed;
            }
        };

        if !response.status().is_success() {
            debug!("Refresh rejected with status {}", response.status());
            return failed;
        }

        response.json::<RefreshResponse>().await.unwrap_or(failed)
    }
}
