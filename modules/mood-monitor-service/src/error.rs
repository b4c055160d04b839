//! Error type shared by the store, the ingestion pipeline and the routes.

use std::collections::BTreeMap;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Search or tweet absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Search source or sentiment service failed
    #[error("{op} failed: {message}")]
    Upstream { op: &'static str, message: String },

    /// A response that parsed as nothing usable; asking again gives the same answer
    #[error("{op} returned malformed data: {message}")]
    Malformed { op: &'static str, message: String },

    /// The search owner has not registered a Twitter access token
    #[error("no twitter access token registered for user {0}")]
    MissingToken(String),

    /// The search source answered HTTP 429
    #[error("rate limited by search source")]
    RateLimited,

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("row payload error: {0}")]
    Json(#[from] serde_json::Error),

    /// Field → message map for rejected input
    #[error("validation failed: {0:?}")]
    Validation(BTreeMap<String, String>),

    #[error("missing caller identity")]
    Unauthorized,
}

impl Error {
    pub fn upstream(op: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Upstream {
            op,
            message: message.to_string(),
        }
    }

    pub fn malformed(op: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            op,
            message: message.to_string(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Worth another attempt within the same pass
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upstream { .. })
    }
}
