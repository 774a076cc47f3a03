//! Configuration for the resilience layer
//!
//! CLI arguments and environment variable handling using clap. Embedding
//! apps usually call [`NetConfig::from_env`], which loads `.env` first.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Network resilience configuration for the Fairgrounds client
#[derive(Parser, Debug, Clone)]
#[command(name = "fairgrounds-net")]
#[command(about = "Network resilience core for the Fairgrounds event client")]
pub struct NetConfig {
    /// Base URL for REST calls (profile validation, token refresh)
    #[arg(long, env = "API_BASE_URL", default_value = "https://api.fairgrounds.app")]
    pub api_base_url: String,

    /// Host for the realtime chat channel (no scheme; candidates are derived)
    #[arg(long, env = "REALTIME_HOST", default_value = "chat.fairgrounds.app")]
    pub realtime_host: String,

    /// Allow falling back to plain ws:// when wss:// fails to open
    #[arg(long, env = "ALLOW_INSECURE_FALLBACK", default_value = "true")]
    pub allow_insecure_fallback: bool,

    /// Per-candidate connection timeout in seconds
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value = "5")]
    pub connect_timeout_secs: u64,

    /// Delay before one reconnection attempt, in seconds
    #[arg(long, env = "RECONNECT_DELAY_SECS", default_value = "3")]
    pub reconnect_delay_secs: u64,

    /// Reconnection attempts before settling into a terminal failed state
    #[arg(long, env = "MAX_RECONNECT_ATTEMPTS", default_value = "5")]
    pub max_reconnect_attempts: u32,

    /// Chat message buffer capacity (oldest entries dropped beyond this)
    #[arg(long, env = "MESSAGE_BUFFER_CAP", default_value = "200")]
    pub message_buffer_cap: usize,

    /// Trailing window for call-rate accounting, in seconds
    #[arg(long, env = "RATE_WINDOW_SECS", default_value = "600")]
    pub rate_window_secs: u64,

    /// Global call ceiling within one window
    #[arg(long, env = "RATE_GLOBAL_MAX", default_value = "100")]
    pub rate_global_max: usize,

    /// Per-endpoint call ceiling within one window
    #[arg(long, env = "RATE_ENDPOINT_MAX", default_value = "10")]
    pub rate_endpoint_max: usize,

    /// In-flight request concurrency ceiling
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value = "5")]
    pub max_concurrent_requests: usize,

    /// Retries after the first failed attempt of a dispatched call
    #[arg(long, env = "MAX_RETRIES", default_value = "2")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds (scaled linearly by attempt number)
    #[arg(long, env = "RETRY_DELAY_MS", default_value = "1000")]
    pub retry_delay_ms: u64,

    /// Validation grace window after a federated login, in seconds
    #[arg(long, env = "AUTH_GRACE_SECS", default_value = "10")]
    pub auth_grace_secs: u64,

    /// Override for the token store file (defaults to the platform data dir)
    #[arg(long, env = "TOKEN_STORE_PATH")]
    pub token_store_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl NetConfig {
    /// Load `.env` if present, then resolve from environment variables and
    /// declared defaults without consuming CLI arguments.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::parse_from(std::iter::empty::<std::ffi::OsString>())
    }

    /// Per-candidate connection timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Fixed delay before one reconnection attempt
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Base retry delay for the dispatcher's linear backoff
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Trailing window for call-rate accounting
    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    /// Validation grace window after a federated login
    pub fn auth_grace(&self) -> Duration {
        Duration::from_secs(self.auth_grace_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.realtime_host.is_empty() {
            return Err("REALTIME_HOST must not be empty".to_string());
        }
        if self.api_base_url.is_empty() {
            return Err("API_BASE_URL must not be empty".to_string());
        }
        if self.rate_global_max == 0 || self.rate_endpoint_max == 0 {
            return Err("Rate ceilings must be greater than zero".to_string());
        }
        if self.max_concurrent_requests == 0 {
            return Err("MAX_CONCURRENT_REQUESTS must be greater than zero".to_string());
        }
        if self.message_buffer_cap == 0 {
            return Err("MESSAGE_BUFFER_CAP must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        // Parse with no CLI args so env vars and declared defaults apply
        Self::parse_from(std::iter::empty::<std::ffi::OsString>())
    }
}
