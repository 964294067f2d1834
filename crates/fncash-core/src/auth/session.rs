//! Session state machine.
//!
//! The controller starts in [`AuthState::Loading`], settles into
//! `Unauthenticated` or `Authenticated` once the stored credential has been
//! read, and moves between those two on sign-in, sign-out, and expiry.
//!
//! Expiry is driven by the transport: a 401 anywhere clears the stored
//! credential and publishes a [`SessionEvent`]. Every read drains those
//! events first and re-derives the state from the credential store, so a
//! caller that just received `SessionExpired` never observes a stale
//! authenticated session.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, SessionEvent};
use crate::models::User;

use super::{Credential, CredentialStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Stored credential not read yet
    Loading,
    Unauthenticated,
    Authenticated {
        credential: Credential,
        /// Present only when it came back from sign-in in this process
        user: Option<User>,
    },
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            AuthState::Authenticated { user, .. } => user.as_ref(),
            _ => None,
        }
    }

    pub fn credential(&self) -> Option<&Credential> {
        match self {
            AuthState::Authenticated { credential, .. } => Some(credential),
            _ => None,
        }
    }
}

/// Owns the in-memory session and mediates sign-in and sign-out.
pub struct SessionController {
    api: ApiClient,
    state: watch::Sender<AuthState>,
    expiry: Mutex<broadcast::Receiver<SessionEvent>>,
    // Held across each store write and the matching state update.
    transition: Mutex<()>,
}

impl SessionController {
    pub fn new(api: ApiClient) -> Self {
        let expiry = Mutex::new(api.subscribe());
        let (state, _) = watch::channel(AuthState::Loading);
        Self {
            api,
            state,
            expiry,
            transition: Mutex::new(()),
        }
    }

    fn credentials(&self) -> &Arc<CredentialStore> {
        self.api.credentials()
    }

    /// Read the stored credential and leave the loading state
    pub async fn initialize(&self) {
        let _transition = self.transition.lock().await;
        self.state.send_if_modified(|state| {
            let changed = !state.is_loading();
            *state = AuthState::Loading;
            changed
        });

        // Anything published before now is already reflected in the store.
        self.drain_expiry_events().await;

        let next = match self.credentials().get().await {
            Ok(Some(credential)) => AuthState::Authenticated {
                credential,
                user: None,
            },
            Ok(None) => AuthState::Unauthenticated,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential, starting signed out");
                AuthState::Unauthenticated
            }
        };

        info!(authenticated = next.is_authenticated(), "Session loaded");
        self.state.send_replace(next);
    }

    /// Authenticate against the backend and persist the new credential.
    /// On any failure the previous state is left untouched.
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<(), ApiError> {
        if identifier.trim().is_empty() || secret.is_empty() {
            return Err(ApiError::InvalidCredentials);
        }

        let _transition = self.transition.lock().await;

        let auth = match self.api.login(identifier.trim(), secret).await {
            Ok(auth) => auth,
            Err(e) => {
                warn!(error = %e, status = ?e.status(), "Sign-in failed");
                return Err(e);
            }
        };

        let credential = Credential::new(auth.token);
        self.credentials().set(&credential).await?;

        self.state.send_replace(AuthState::Authenticated {
            credential,
            user: auth.user,
        });
        info!("Signed in");
        Ok(())
    }

    /// Forget the session. Safe to call when already signed out.
    pub async fn sign_out(&self) -> Result<(), ApiError> {
        let _transition = self.transition.lock().await;
        let removed = self.credentials().remove().await;

        let changed = self.state.send_if_modified(|state| {
            if matches!(state, AuthState::Unauthenticated) {
                false
            } else {
                *state = AuthState::Unauthenticated;
                true
            }
        });
        if changed {
            info!("Signed out");
        }

        removed.map_err(ApiError::from)
    }

    /// Returns the number of expiry events that were pending
    async fn drain_expiry_events(&self) -> usize {
        let mut rx = self.expiry.lock().await;
        let mut pending = 0;
        loop {
            match rx.try_recv() {
                Ok(SessionEvent::Expired) => pending += 1,
                Err(TryRecvError::Lagged(skipped)) => pending += skipped as usize,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        pending
    }

    /// Apply pending expiry events by re-deriving the state from the store.
    /// The store is authoritative: a credential written by a later sign-in
    /// survives an event published for the previous one.
    async fn reconcile(&self) {
        if self.drain_expiry_events().await == 0 {
            return;
        }

        let _transition = self.transition.lock().await;
        let stored = match self.credentials().get().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential, treating session as expired");
                None
            }
        };

        let changed = self.state.send_if_modified(|state| {
            let next = match (&*state, stored) {
                (AuthState::Loading, _) => return false,
                (
                    AuthState::Authenticated {
                        credential: current,
                        user,
                    },
                    Some(credential),
                ) if *current == credential => AuthState::Authenticated {
                    credential,
                    user: user.clone(),
                },
                (_, Some(credential)) => AuthState::Authenticated {
                    credential,
                    user: None,
                },
                (_, None) => AuthState::Unauthenticated,
            };
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });

        if changed {
            info!(
                authenticated = self.state.borrow().is_authenticated(),
                "Session updated after expiry"
            );
        } else {
            debug!("Expiry event did not change session");
        }
    }

    /// Current state, with any pending expiry applied
    pub async fn snapshot(&self) -> AuthState {
        self.reconcile().await;
        self.state.borrow().clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.snapshot().await.is_authenticated()
    }

    /// True only until [`initialize`](Self::initialize) has finished
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    pub async fn user(&self) -> Option<User> {
        self.snapshot().await.user().cloned()
    }

    /// Receiver that changes on every state transition
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Apply expiry events as they arrive so that subscribers see the change
    /// without anyone reading first. The subscription is taken when this is
    /// called, not when the returned future is first polled.
    pub fn watch_expiry(self: Arc<Self>) -> impl Future<Output = ()> + Send + 'static {
        let mut events = self.api.subscribe();
        async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Expired) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        self.reconcile().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Session event channel closed");
        }
    }
}
