//! Token store
//!
//! Durable key/value persistence for the access/refresh credential pair, the
//! cached user profile, and per-event notification opt-in markers. Pure
//! persistence: token contents are opaque and never validated here.
//!
//! Backed by one JSON file in the platform data directory, loaded on open
//! and written through on every mutation. A missing or corrupt file loads as
//! an empty store rather than an error, so the client can always start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::profile::UserProfile;
use crate::types::{NetError, Result};

/// Storage key for the access token
const KEY_ACCESS: &str = "access_token";

/// Storage key for the refresh token
const KEY_REFRESH: &str = "refresh_token";

/// Storage key for the serialized user profile
const KEY_USER: &str = "user";

/// Key prefix for per-event notification opt-in markers.
///
/// The markers are owned by the notification collaborator; this store only
/// clears them on logout.
const NOTIFICATION_MARKER_PREFIX: &str = "notificationPermissionRequested_";

/// Client-local key/value store, synchronous and safe from any call site.
pub struct TokenStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl TokenStore {
    /// Open the store at the platform-default location.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_local_dir()
            .ok_or_else(|| NetError::Storage("No local data directory available".into()))?
            .join("fairgrounds");
        Self::open(dir.join("session.json"))
    }

    /// Open the store at an explicit path, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| NetError::Storage(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let entries = load_entries(&path);
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Persist the token pair. A `None` refresh token leaves any stored one
    /// in place (refresh responses reuse the existing refresh token).
    pub fn save(&self, access: &str, refresh: Option<&str>) -> Result<()> {
        let mut entries = self.entries.lock().expect("token store lock poisoned");
        entries.insert(KEY_ACCESS.to_string(), access.to_string());
        if let Some(refresh) = refresh {
            entries.insert(KEY_REFRESH.to_string(), refresh.to_string());
        }
        self.flush(&entries)
    }

    /// Current access token, if any. Absent access token means the session
    /// is unauthenticated.
    pub fn access(&self) -> Option<String> {
        self.entries
            .lock()
            .expect("token store lock poisoned")
            .get(KEY_ACCESS)
            .cloned()
    }

    /// Current refresh token, if any. Present-without-access is a transient,
    /// repairable state: a refresh can mint a new access token.
    pub fn refresh(&self) -> Option<String> {
        self.entries
            .lock()
            .expect("token store lock poisoned")
            .get(KEY_REFRESH)
            .cloned()
    }

    /// Remove both tokens.
    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().expect("token store lock poisoned");
        entries.remove(KEY_ACCESS);
        entries.remove(KEY_REFRESH);
        self.flush(&entries)
    }

    /// Persist the user profile alongside the tokens.
    pub fn save_user(&self, user: &UserProfile) -> Result<()> {
        let json = serde_json::to_string(user)
            .map_err(|e| NetError::Storage(format!("Failed to serialize user: {}", e)))?;
        let mut entries = self.entries.lock().expect("token store lock poisoned");
        entries.insert(KEY_USER.to_string(), json);
        self.flush(&entries)
    }

    /// Load the cached user profile, if one was stored.
    pub fn load_user(&self) -> Option<UserProfile> {
        let entries = self.entries.lock().expect("token store lock poisoned");
        let json = entries.get(KEY_USER)?;
        match serde_json::from_str(json) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Stored user profile is unreadable, ignoring: {}", e);
                None
            }
        }
    }

    /// Remove the cached user profile.
    pub fn clear_user(&self) -> Result<()> {
        let mut entries = self.entries.lock().expect("token store lock poisoned");
        entries.remove(KEY_USER);
        self.flush(&entries)
    }

    /// Set a per-event notification opt-in marker (owned by the notification
    /// collaborator).
    pub fn set_notification_marker(&self, event_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("token store lock poisoned");
        entries.insert(
            format!("{}{}", NOTIFICATION_MARKER_PREFIX, event_id),
            "true".to_string(),
        );
        self.flush(&entries)
    }

    /// Whether a notification marker exists for the event.
    pub fn has_notification_marker(&self, event_id: &str) -> bool {
        self.entries
            .lock()
            .expect("token store lock poisoned")
            .contains_key(&format!("{}{}", NOTIFICATION_MARKER_PREFIX, event_id))
    }

    /// Drop all notification markers. Called only on logout.
    pub fn clear_notification_markers(&self) -> Result<()> {
        let mut entries = self.entries.lock().expect("token store lock poisoned");
        entries.retain(|key, _| !key.starts_with(NOTIFICATION_MARKER_PREFIX));
        self.flush(&entries)
    }

    /// Write the current map to disk.
    fn flush(&self, entries: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| NetError::Storage(format!("Failed to serialize store: {}", e)))?;
        std::fs::write(&self.path, json)
            .map_err(|e| NetError::Storage(format!("Failed to write {}: {}", self.path.display(), e)))
    }
}

/// Load entries from disk; missing or corrupt files yield an empty map.
fn load_entries(path: &Path) -> HashMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(json) => match serde_json::from_str(&json) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Token store at {} is corrupt, starting empty: {}", path.display(), e);
                HashMap::new()
            }
        },
        Err(_) => {
            debug!("No token store at {}, starting empty", path.display());
            HashMap::new()
        }
    }
}
