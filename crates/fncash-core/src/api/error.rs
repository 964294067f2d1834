use thiserror::Error;

use crate::auth::StorageError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Credential storage failed: {0}")]
    StorageFailure(#[from] StorageError),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Request failed with status {}{}", .status, message_suffix(.message))]
    RequestFailed { status: u16, message: Option<String> },

    #[error("Network error: {0}")]
    Network(reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn message_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default()
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::RequestTimeout
        } else if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::Network(e)
        }
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Pull a human-readable message out of an error body. JSON bodies with a
    /// `message` or `error` string win over the raw text.
    fn server_message(body: &str) -> Option<String> {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            return None;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            for field in ["message", "error"] {
                if let Some(msg) = value.get(field).and_then(|v| v.as_str()) {
                    return Some(Self::truncate_body(msg));
                }
            }
        }
        Some(Self::truncate_body(trimmed))
    }

    /// Build the error for a non-success, non-401 status
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        ApiError::RequestFailed {
            status: status.as_u16(),
            message: Self::server_message(body),
        }
    }

    /// True when the caller must send the user back through sign-in
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired)
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::SessionExpired => Some(401),
            _ => None,
        }
    }

    /// Message suitable for an alert or inline form error
    pub fn user_message(&self) -> String {
        match self {
            ApiError::InvalidCredentials => "Invalid email or password".to_string(),
            ApiError::SessionExpired => "Your session has expired. Please sign in again.".to_string(),
            ApiError::RequestTimeout => "Connection timed out. Please try again.".to_string(),
            ApiError::Network(_) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            ApiError::RequestFailed {
                message: Some(message),
                ..
            } => message.clone(),
            ApiError::RequestFailed { status, .. } => format!("Request failed ({})", status),
            ApiError::StorageFailure(_) => "Could not access secure storage on this device.".to_string(),
            ApiError::InvalidResponse(_) | ApiError::Config(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }
}
