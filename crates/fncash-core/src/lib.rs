//! FnCash core - session lifecycle and authenticated backend access.
//!
//! The crate covers how a session credential is acquired, persisted across
//! restarts, attached to every backend request, and invalidated when the
//! backend rejects it, plus the navigation decisions that follow from it.
//!
//! - [`auth`]: credential storage, the session state machine, route guard
//! - [`api`]: the authenticated transport and the transaction client
//! - [`app`]: the composition root a shell constructs once

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod logging;
pub mod models;

pub use api::{ApiClient, ApiError, SessionEvent, TransactionService};
pub use app::App;
pub use auth::{
    AuthState, Credential, CredentialStore, GuardDecision, Route, RouteGuard, SessionController,
};
pub use config::Config;
