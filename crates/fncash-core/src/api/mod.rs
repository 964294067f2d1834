//! REST client module for the FnCash backend.
//!
//! This module provides the `ApiClient`, the single authenticated transport
//! every backend call goes through, plus the domain clients built on it.
//!
//! The backend uses JWT bearer token authentication obtained through
//! the `/auth/login` endpoint.

pub mod client;
pub mod error;
pub mod transactions;

pub use client::{ApiClient, LoginResponse, SessionEvent, DEFAULT_BASE_URL, REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
pub use transactions::TransactionService;
