//! Fairgrounds network resilience core
//!
//! Client-side plumbing for the Fairgrounds event platform: durable token
//! storage, client-enforced call budgets, error classification, session
//! lifecycle, a retrying request dispatcher, and realtime chat channel
//! management.
//!
//! ## Modules
//!
//! - **token**: Durable access/refresh token and user persistence
//! - **budget**: Fixed-window call budget and concurrency guard
//! - **classify**: Error-to-category mapping with user-facing messages
//! - **auth**: Session state, validation, and token refresh
//! - **dispatch**: Budgeted, retrying request execution
//! - **realtime**: Per-event WebSocket chat sessions

pub mod auth;
pub mod budget;
pub mod classify;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod profile;
pub mod realtime;
pub mod token;
pub mod types;

pub use auth::{AuthCheckOptions, AuthSession, SessionState};
pub use budget::CallBudget;
pub use classify::{classify, classify_response, Classified, ErrorKind};
pub use config::NetConfig;
pub use dispatch::{Dispatcher, RequestOptions};
pub use profile::{Provider, UserProfile};
pub use realtime::{ChatEvent, ChatSession, ChatSessionManager, ConnState};
pub use token::TokenStore;
pub use types::{ApiResponse, BuildInfo, NetError, Result};
