//! Authentication module for the session lifecycle.
//!
//! This module provides:
//! - `CredentialStore`: persistence of the session token in the OS keychain,
//!   mirrored into a plain fallback file
//! - `SessionController`: the loading / signed-out / signed-in state machine
//! - `RouteGuard`: navigation decisions derived from session state

pub mod credentials;
pub mod guard;
pub mod session;

pub use credentials::{
    Credential, CredentialStore, FileStore, KeyValueStore, KeyringStore, MemoryStore,
    StorageError, CREDENTIAL_KEY, KEYRING_SERVICE,
};
pub use guard::{decide, GuardDecision, Route, RouteGuard};
pub use session::{AuthState, SessionController};
