//! Axum extractor reading the DN inserted by `acceptor::MtlsAcceptor`,
//! generalizing the teacher's bearer-token `AuthUser` extension-read pattern
//! to certificate-derived identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct PeerDn(pub Option<Arc<str>>);

impl PeerDn {
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for PeerDn
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<PeerDn>().cloned().unwrap_or_default())
    }
}
