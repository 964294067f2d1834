//! Authenticated transport for the FnCash backend.
//!
//! Every backend call goes through [`ApiClient::send`], which runs two
//! interceptors around the HTTP exchange:
//!
//! - outbound: read the stored credential and attach it as a bearer token
//! - inbound: on 401 clear the stored credential, publish
//!   [`SessionEvent::Expired`], and fail with [`ApiError::SessionExpired`];
//!   other failures become [`ApiError::RequestFailed`]

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::auth::CredentialStore;
use crate::models::User;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Backend address used when no configuration overrides it
pub const DEFAULT_BASE_URL: &str = "http://192.168.1.100:3000/api";

/// HTTP request timeout in seconds, applied to every request.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Login endpoint, relative to the base URL
const LOGIN_PATH: &str = "/auth/login";

/// Buffer size for the session event channel.
/// Expiry events are idempotent, so a lagging receiver loses nothing important.
const SESSION_EVENT_CAPACITY: usize = 16;

/// Notifications from the transport to whoever tracks session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A request was rejected as unauthorized and the credential was cleared
    Expired,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Successful login payload
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
}

/// Shared HTTP client for the backend.
/// Clone is cheap and every clone shares the connection pool, the credential
/// store, and the session event channel.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<CredentialStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl ApiClient {
    /// Create a client with the standard request timeout
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
    ) -> Result<Self, ApiError> {
        Self::with_timeout(
            base_url,
            credentials,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Create a client whose requests are all bounded by `timeout`
    pub fn with_timeout(
        base_url: impl Into<String>,
        credentials: Arc<CredentialStore>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| ApiError::Config(format!("Invalid base URL {}: {}", base_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);

        Ok(Self {
            client,
            base_url,
            credentials,
            events,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Receive session events published by the inbound interceptor
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Start a request against `path` (relative to the base URL, leading `/`)
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    // ===== Interceptors =====

    /// Attach the stored credential, if any. Nothing else on the request changes.
    async fn authorize(&self, request: &mut Request) {
        match self.credentials.get().await {
            Ok(Some(credential)) => {
                match HeaderValue::from_str(&format!("Bearer {}", credential.as_str())) {
                    Ok(mut value) => {
                        value.set_sensitive(true);
                        request.headers_mut().insert(header::AUTHORIZATION, value);
                    }
                    Err(e) => warn!(error = %e, "Stored credential is not a valid header value"),
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Credential read failed, sending request unauthenticated");
            }
        }
    }

    /// Inspect a response before it reaches the caller
    async fn intercept(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!(url = %response.url(), "Unauthorized response, clearing session");
            drop(response);
            self.expire_session().await;
            return Err(ApiError::SessionExpired);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Request failed");
        Err(ApiError::from_status(status, &body))
    }

    /// Clear the credential, then tell subscribers. Completes before the
    /// rejected call returns.
    async fn expire_session(&self) {
        if let Err(e) = self.credentials.remove().await {
            error!(error = %e, "Failed to clear credential after unauthorized response");
        }
        // No subscribers is fine
        let _ = self.events.send(SessionEvent::Expired);
    }

    /// Send a request through both interceptors
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let mut request = request.build()?;
        self.authorize(&mut request).await;
        debug!(method = %request.method(), url = %request.url(), "Sending request");

        let response = self.client.execute(request).await?;
        self.intercept(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }

    // ===== Typed helpers =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Self::decode(response, path).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self
            .send(self.request(Method::GET, path).query(query))
            .await?;
        Self::decode(response, path).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .send(self.request(Method::POST, path).json(body))
            .await?;
        Self::decode(response, path).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .send(self.request(Method::PUT, path).json(body))
            .await?;
        Self::decode(response, path).await
    }

    /// DELETE, discarding any response body
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    // ===== Authentication =====

    /// Exchange an identifier and secret for a credential.
    ///
    /// Runs the outbound interceptor like any request, but a rejection here
    /// means bad credentials rather than an expired session, so any 4xx maps
    /// to [`ApiError::InvalidCredentials`] and nothing is cleared.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse, ApiError> {
        let mut request = self
            .request(Method::POST, LOGIN_PATH)
            .json(&LoginRequest {
                email: identifier,
                password: secret,
            })
            .build()?;
        self.authorize(&mut request).await;

        let response = self.client.execute(request).await?;
        let status = response.status();

        if status.is_client_error() {
            debug!(status = status.as_u16(), "Login rejected");
            return Err(ApiError::InvalidCredentials);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let auth: LoginResponse = Self::decode(response, LOGIN_PATH).await?;
        if auth.token.is_empty() {
            return Err(ApiError::InvalidResponse(
                "Login response did not include a token".to_string(),
            ));
        }
        Ok(auth)
    }
}
