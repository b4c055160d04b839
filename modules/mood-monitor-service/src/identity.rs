//! Caller identity. Token verification happens in the gateway in front of this
//! service, which forwards the verified user id as a header.

use crate::error::{Error, Result};
use axum::http::HeaderMap;

pub const USER_ID_HEADER: &str = "x-user-id";

pub fn user_id(headers: &HeaderMap) -> Result<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(Error::Unauthorized)
}
