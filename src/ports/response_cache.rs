use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use hyper::Response;

/// A buffered backend response suitable for caching and replay.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedResponse {
    /// Rebuild an HTTP response from the cached parts.
    pub fn into_response(self) -> Response<AxumBody> {
        let mut response = Response::new(AxumBody::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// ResponseCache defines the port for the response-caching collaborator.
///
/// Keys are the request path plus query string. The handler consults the
/// cache before instance selection and stores successful responses after a
/// round trip, only for groups with caching enabled; entries expire after
/// the group's TTL. Without an installed cache the flags are inert.
#[async_trait]
pub trait ResponseCache: Send + Sync + 'static {
    /// Look up a cached response; `None` on miss or expiry.
    async fn lookup(&self, key: &str) -> Option<CachedResponse>;

    /// Store a response under `key` for up to `ttl`.
    async fn store(&self, key: &str, response: CachedResponse, ttl: Duration);
}
