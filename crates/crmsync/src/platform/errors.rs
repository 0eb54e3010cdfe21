use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to the remote CRM platform.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The platform answered with a non-zero error code.
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The platform throttled the request.
    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// Credentials missing, invalid or expired.
    #[error("Authentication required: {message}")]
    AuthRequired { message: String },

    /// Customer or group does not exist (or is no longer visible).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The call did not finish within the per-unit deadline.
    #[error("Timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FetchError {
    /// Create an API error.
    #[inline]
    pub fn api(code: i64, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Create a rate-limit error.
    #[inline]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    #[inline]
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::AuthRequired {
            message: message.into(),
        }
    }

    /// Create a not found error.
    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an internal error.
    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is a rate limit error (the only retryable kind).
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// First line of an error's display form, for progress lines and task diagnostics.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, FetchError>;
