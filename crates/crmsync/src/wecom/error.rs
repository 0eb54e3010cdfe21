//! Error types for WeCom API calls.

use thiserror::Error;

use crate::http::HttpError;
use crate::platform::FetchError;

pub const ERRCODE_TOKEN_EXPIRED: i64 = 42001;
pub const ERRCODE_INVALID_TOKEN: i64 = 40014;
pub const ERRCODE_INVALID_SECRET: i64 = 40001;
pub const ERRCODE_FREQ_LIMIT: i64 = 45009;
pub const ERRCODE_API_FREQ_LIMIT: i64 = 84061;
pub const ERRCODE_INVALID_EXTERNAL_USERID: i64 = 40096;
pub const ERRCODE_UNKNOWN_GROUP_CHAT: i64 = 84014;

#[derive(Debug, Error)]
pub enum WeComError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Non-2xx status before any errcode was read.
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// `errcode != 0` in the response envelope.
    #[error("WeCom errcode {errcode}: {errmsg}")]
    Api { errcode: i64, errmsg: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl WeComError {
    pub fn errcode(&self) -> Option<i64> {
        match self {
            Self::Api { errcode, .. } => Some(*errcode),
            _ => None,
        }
    }

    /// Whether the cached access token should be discarded.
    pub fn is_stale_token(&self) -> bool {
        matches!(
            self.errcode(),
            Some(ERRCODE_INVALID_TOKEN | ERRCODE_TOKEN_EXPIRED)
        )
    }
}

impl From<WeComError> for FetchError {
    fn from(err: WeComError) -> Self {
        match err {
            WeComError::Http(e) => FetchError::network(e.to_string()),
            WeComError::Status { status } => FetchError::network(format!("HTTP status {status}")),
            WeComError::Json(e) => FetchError::internal(format!("JSON parse error: {e}")),
            WeComError::Config(msg) => FetchError::internal(msg),
            WeComError::Api { errcode, errmsg } => match errcode {
                ERRCODE_FREQ_LIMIT | ERRCODE_API_FREQ_LIMIT => FetchError::rate_limited(errmsg),
                ERRCODE_INVALID_TOKEN | ERRCODE_TOKEN_EXPIRED | ERRCODE_INVALID_SECRET => {
                    FetchError::auth_required(errmsg)
                }
                ERRCODE_INVALID_EXTERNAL_USERID | ERRCODE_UNKNOWN_GROUP_CHAT => {
                    FetchError::not_found(errmsg)
                }
                _ => FetchError::api(errcode, errmsg),
            },
        }
    }
}
