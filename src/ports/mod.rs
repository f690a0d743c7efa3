pub mod gatekeeper;
pub mod http_client;
pub mod response_cache;

pub use gatekeeper::{GateDecision, RequestGatekeeper};
pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
pub use response_cache::{CachedResponse, ResponseCache};
