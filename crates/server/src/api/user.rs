use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;

pub const USER_ID_HEADER: &str = "X-USER-ID";

/// Extract the acting user from the `X-USER-ID` header
pub fn extract_user_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(USER_ID_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// The optional user a request acts on behalf of; recorded in history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActingUser(pub Option<String>);

impl ActingUser {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(extract_user_from_headers(&parts.headers)))
    }
}
