//! Composition root.
//!
//! `App` builds each process-wide service exactly once and hands out shared
//! handles. Shells construct one `App`, call [`App::start`], and then drive
//! navigation through `guard` and data through `transactions`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{ApiClient, TransactionService};
use crate::auth::{CredentialStore, RouteGuard, SessionController};
use crate::config::Config;

pub struct App {
    pub config: Config,
    pub credentials: Arc<CredentialStore>,
    pub api: ApiClient,
    pub session: Arc<SessionController>,
    pub guard: RouteGuard,
    pub transactions: TransactionService,
    expiry_watcher: Option<JoinHandle<()>>,
}

impl App {
    /// Build every service, choosing the credential storage for this platform
    pub async fn new(config: Config) -> Result<Self> {
        let data_dir = config.data_dir()?;
        let credentials = Arc::new(
            CredentialStore::for_platform(&data_dir, config.use_secure_store).await,
        );
        Self::with_credentials(config, credentials)
    }

    /// Build every service around an existing credential store
    pub fn with_credentials(config: Config, credentials: Arc<CredentialStore>) -> Result<Self> {
        debug!(base_url = %config.api_base_url, "Creating services");
        let api = ApiClient::new(config.api_base_url.clone(), credentials.clone())
            .context("Failed to create API client")?;
        let session = Arc::new(SessionController::new(api.clone()));
        let guard = RouteGuard::new(session.clone());
        let transactions = TransactionService::new(api.clone());

        Ok(Self {
            config,
            credentials,
            api,
            session,
            guard,
            transactions,
            expiry_watcher: None,
        })
    }

    /// Load the stored session and start applying expiry events in the
    /// background. Calling it again reloads the session.
    pub async fn start(&mut self) {
        if self.expiry_watcher.is_none() {
            self.expiry_watcher = Some(tokio::spawn(self.session.clone().watch_expiry()));
        }
        self.session.initialize().await;
        info!(
            authenticated = self.session.is_authenticated().await,
            secure_store = self.credentials.has_secure_store(),
            "App started"
        );
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(watcher) = self.expiry_watcher.take() {
            watcher.abort();
        }
    }
}
