use async_trait::async_trait;
use http::HeaderMap;

/// Outcome of a gatekeeper check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny,
}

/// RequestGatekeeper defines the port for the authentication collaborator.
///
/// The core never verifies credentials itself: when a service group has
/// `auth_required` set and a gatekeeper is installed, the handler consults it
/// with the inbound request headers before routing. Without a gatekeeper the
/// flag is inert.
#[async_trait]
pub trait RequestGatekeeper: Send + Sync + 'static {
    /// Decide whether the request carrying `headers` may proceed.
    async fn check(&self, headers: &HeaderMap) -> GateDecision;
}
