//! Request dispatcher
//!
//! Wraps one outbound call with admission control, bounded retry, and
//! auth-failure recovery. The producer is a zero-argument async closure
//! returning the shared [`ApiResponse`] shape; the dispatcher never looks at
//! endpoint semantics, only at the response envelope.
//!
//! Retry accounting is an explicit loop, not recursion: a charged attempt
//! counter plus a one-shot bonus flag for the refresh-success case, so the
//! budget stays auditable.

mod http;

pub use http::{HttpProfileApi, HttpTokenRefresher};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::AuthSession;
use crate::budget::CallBudget;
use crate::classify::{classify_response, Classified, ErrorKind};
use crate::config::NetConfig;
use crate::types::ApiResponse;

/// Hook invoked after a dispatch resolves successfully.
pub type SuccessHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Hook invoked with the final classification of a failed dispatch.
pub type ErrorHook = Arc<dyn Fn(&str, &Classified) + Send + Sync>;

/// Per-call options.
#[derive(Clone)]
pub struct RequestOptions {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Base delay for linear backoff (delay × attempt number)
    pub retry_delay: Duration,
    /// Diagnostic label carried through logs and hooks
    pub context: String,
    pub on_success: Option<SuccessHook>,
    pub on_error: Option<ErrorHook>,
}

impl RequestOptions {
    pub fn from_config(config: &NetConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            context: String::new(),
            on_success: None,
            on_error: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_success_hook(mut self, hook: SuccessHook) -> Self {
        self.on_success = Some(hook);
        self
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = Some(hook);
        self
    }
}

/// Authenticated request pipeline.
pub struct Dispatcher {
    budget: Arc<CallBudget>,
    session: Arc<AuthSession>,
    defaults: RequestOptions,
}

impl Dispatcher {
    pub fn new(config: &NetConfig, budget: Arc<CallBudget>, session: Arc<AuthSession>) -> Self {
        Self {
            budget,
            session,
            defaults: RequestOptions::from_config(config),
        }
    }

    /// Default options derived from configuration.
    pub fn options(&self) -> RequestOptions {
        self.defaults.clone()
    }

    /// Execute one call with default options.
    pub async fn dispatch<T, F, Fut>(&self, endpoint: &str, producer: F) -> ApiResponse<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ApiResponse<T>>,
    {
        self.dispatch_with(endpoint, self.defaults.clone(), producer)
            .await
    }

    /// Execute one call: admission check, then up to `max_retries + 1`
    /// attempts with linear backoff, plus at most one uncharged bonus
    /// attempt after a successful token refresh.
    pub async fn dispatch_with<T, F, Fut>(
        &self,
        endpoint: &str,
        opts: RequestOptions,
        producer: F,
    ) -> ApiResponse<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ApiResponse<T>>,
    {
        if let Err(reason) = self.budget.admit(endpoint) {
            warn!(context = %opts.context, endpoint, "Call denied: {}", reason);
            let response = ApiResponse::err(format!("Request denied: {}", reason), Some(429));
            if let Some(hook) = &opts.on_error {
                hook(&opts.context, &classify_response(&response));
            }
            return response;
        }

        // Every admission pairs with exactly one untrack, on all exits
        let id = Uuid::new_v4();
        self.budget.track(id);
        let response = self.run_attempts(endpoint, &opts, producer).await;
        self.budget.untrack(id);

        if response.success {
            if let Some(hook) = &opts.on_success {
                hook(&opts.context);
            }
        } else if let Some(hook) = &opts.on_error {
            hook(&opts.context, &classify_response(&response));
        }
        response
    }

    async fn run_attempts<T, F, Fut>(
        &self,
        endpoint: &str,
        opts: &RequestOptions,
        producer: F,
    ) -> ApiResponse<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ApiResponse<T>>,
    {
        // Charged attempts; the refresh-earned bonus attempt is not counted
        let mut attempt: u32 = 0;
        let mut bonus_used = false;

        loop {
            attempt += 1;
            self.budget.record(endpoint);

            let response = producer().await;
            if response.success {
                debug!(context = %opts.context, endpoint, attempt, "Dispatch succeeded");
                return response;
            }

            let classified = classify_response(&response);
            debug!(
                context = %opts.context,
                endpoint,
                attempt,
                kind = ?classified.kind,
                "Attempt failed: {}",
                response.error.as_deref().unwrap_or("no error text")
            );

            match classified.kind {
                ErrorKind::Auth => {
                    if !bonus_used && self.session.handle_auth_error(&classified).await {
                        // Refresh succeeded: one retry on the house
                        bonus_used = true;
                        attempt -= 1;
                        continue;
                    }
                    // Irrecoverable: redirect already fired inside the session
                    return ApiResponse::err(classified.user_message, response.status);
                }
                _ if classified.retryable => {
                    if attempt > opts.max_retries {
                        warn!(
                            context = %opts.context,
                            endpoint,
                            "Giving up after {} attempts",
                            attempt
                        );
                        return ApiResponse::err(classified.user_message, response.status);
                    }
                    tokio::time::sleep(opts.retry_delay * attempt).await;
                }
                _ => {
                    return ApiResponse::err(classified.user_message, response.status);
                }
            }
        }
    }
}
