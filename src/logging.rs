//! Logging infrastructure
//!
//! Structured logging via tracing; the embedding app calls [`init`] once at
//! startup. `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with an env-filter and fmt layer.
///
/// Safe to call once per process; returns quietly if a global subscriber is
/// already installed (e.g. in tests).
pub fn init(log_level: &str) {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fairgrounds_net={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed, skipping init");
        return;
    }

    let build = crate::types::BuildInfo::current();
    tracing::info!(
        version = %build.version,
        commit = %build.git_commit,
        built_at = %build.built_at,
        "Logging initialized"
    );
}
