//! Persisted user profile types
//!
//! The profile is fetched during session validation and cached in the token
//! store so a transient profile-service failure does not force a logout.

use serde::{Deserialize, Serialize};

/// Identity provider the user signed in with.
///
/// Federated providers propagate new accounts with a short delay, which is
/// why session validation is grace-windowed right after a federated login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Username/password login against our own backend
    Direct,
    Google,
    Kakao,
    Naver,
}

impl Provider {
    /// Whether this provider goes through an external identity service
    pub fn is_federated(&self) -> bool {
        !matches!(self, Provider::Direct)
    }
}

/// User profile as persisted in the client-local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub nickname: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    pub provider: Provider,
    #[serde(default)]
    pub post_count: u32,
    #[serde(default)]
    pub comment_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_camel_case_wire_format() {
        let profile = UserProfile {
            id: "u-1".into(),
            nickname: "dana".into(),
            email: "dana@example.com".into(),
            profile_image_url: Some("https://cdn.example.com/u-1.png".into()),
            provider: Provider::Kakao,
            post_count: 3,
            comment_count: 7,
        };

        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("profileImageUrl"));
        assert!(json.contains("postCount"));
        assert!(json.contains("\"kakao\""));

        let back: UserProfile = serde_json::from_str(&json).unwrap();
        assert!(back.provider.is_federated());
    }

    #[test]
    fn test_counts_default_when_absent() {
        let json = r#"{"id":"u-2","nickname":"m","email":"m@example.com","provider":"direct"}"#;
        let profile: UserProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.post_count, 0);
        assert!(!profile.provider.is_federated());
    }
}
