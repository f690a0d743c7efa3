//! In-memory registry of service groups and backend instances.
//!
//! The registry is built once at startup from validated configuration and is
//! never structurally mutated afterwards: groups and instances live until
//! process exit. The mutable per-instance fields (liveness, breaker state)
//! and the per-group round-robin cursor are atomics, shared between the
//! background health checker and every concurrent request handler without any
//! cross-instance or cross-group locking.
use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use serde::Serialize;
use thiserror::Error;

use crate::{
    config::ServiceGroupConfig,
    core::breaker::{CircuitBreaker, CircuitState},
};

/// Errors raised while constructing the registry
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RegistryError {
    /// Error when a backend URL is invalid
    #[error("Invalid target for service group '{group}': {message}")]
    InvalidTarget { group: String, message: String },
}

/// A type-safe representation of a backend base URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendUrl {
    url: String,
}

impl BackendUrl {
    /// Creates a new BackendUrl if the provided string is a valid URL
    pub fn new(url: &str) -> Result<Self, String> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!(
                "Backend URL must start with http:// or https://, got: {url}"
            ));
        }

        // Trailing slashes would double up when the rewritten path is appended
        Ok(BackendUrl {
            url: url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the underlying URL as a string reference
    pub fn as_str(&self) -> &str {
        &self.url
    }
}

impl FromStr for BackendUrl {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BackendUrl::new(s)
    }
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// One backend endpoint within a service group.
///
/// `alive` is written only by the health checker; the request proxy reads it
/// during selection and must never set it. Breaker fields are written by the
/// request proxy after each forwarded request.
#[derive(Debug)]
pub struct ServiceInstance {
    address: BackendUrl,
    alive: AtomicBool,
    pub breaker: CircuitBreaker,
}

impl ServiceInstance {
    /// A new instance starts alive with a closed breaker.
    pub fn new(address: BackendUrl) -> Self {
        Self {
            address,
            alive: AtomicBool::new(true),
            breaker: CircuitBreaker::new(),
        }
    }

    pub fn address(&self) -> &BackendUrl {
        &self.address
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Record the latest liveness probe result. Health checker only.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    /// Eligible for selection: alive and breaker admitting traffic.
    pub fn is_eligible(&self, breaker_cooldown: Duration) -> bool {
        self.is_alive() && self.breaker.allows_traffic(breaker_cooldown)
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            address: self.address.as_str().to_string(),
            alive: self.is_alive(),
            breaker_state: self.breaker.state(),
            consecutive_failures: self.breaker.consecutive_failures(),
        }
    }
}

/// Response-cache settings resolved from configuration.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
}

/// One routable unit: a path prefix owning an ordered pool of instances.
#[derive(Debug)]
pub struct ServiceGroup {
    name: String,
    prefix: String,
    auth_required: bool,
    cache: Option<CacheSettings>,
    instances: Vec<Arc<ServiceInstance>>,
    cursor: AtomicUsize,
}

impl ServiceGroup {
    pub fn from_config(config: &ServiceGroupConfig) -> Result<Self, RegistryError> {
        let mut instances = Vec::with_capacity(config.targets.len());
        for target in &config.targets {
            let address =
                BackendUrl::new(target).map_err(|message| RegistryError::InvalidTarget {
                    group: config.name.clone(),
                    message,
                })?;
            instances.push(Arc::new(ServiceInstance::new(address)));
        }

        let cache = config
            .cache
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| CacheSettings {
                ttl: Duration::from_secs(c.ttl_secs),
            });

        Ok(Self {
            name: config.name.clone(),
            prefix: config.prefix.clone(),
            auth_required: config.auth_required,
            cache,
            instances,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn auth_required(&self) -> bool {
        self.auth_required
    }

    pub fn cache(&self) -> Option<CacheSettings> {
        self.cache
    }

    /// Instances in original configuration order.
    pub fn instances(&self) -> &[Arc<ServiceInstance>] {
        &self.instances
    }

    /// Per-group round-robin cursor over the full instance list.
    pub fn cursor(&self) -> &AtomicUsize {
        &self.cursor
    }

    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            auth_required: self.auth_required,
            cache_enabled: self.cache.is_some(),
            instances: self.instances.iter().map(|i| i.snapshot()).collect(),
        }
    }
}

/// Ordered collection of service groups, owned by the process for its lifetime.
#[derive(Debug, Default)]
pub struct Registry {
    groups: Vec<Arc<ServiceGroup>>,
}

impl Registry {
    /// Build the registry from configuration, initializing every instance to
    /// alive / closed / zero failures.
    pub fn from_config(services: &[ServiceGroupConfig]) -> Result<Self, RegistryError> {
        let groups = services
            .iter()
            .map(|s| ServiceGroup::from_config(s).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { groups })
    }

    /// First group (in configuration order) whose prefix matches the path.
    pub fn find_group(&self, path: &str) -> Option<&Arc<ServiceGroup>> {
        self.groups.iter().find(|g| path.starts_with(g.prefix()))
    }

    pub fn groups(&self) -> &[Arc<ServiceGroup>] {
        &self.groups
    }

    /// Every instance across all groups, for the health checker's sweep.
    pub fn all_instances(&self) -> impl Iterator<Item = (&Arc<ServiceGroup>, &Arc<ServiceInstance>)> {
        self.groups
            .iter()
            .flat_map(|g| g.instances().iter().map(move |i| (g, i)))
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            groups: self.groups.iter().map(|g| g.snapshot()).collect(),
        }
    }
}

/// Serializable view of one instance for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceSnapshot {
    pub address: String,
    pub alive: bool,
    pub breaker_state: CircuitState,
    pub consecutive_failures: u32,
}

/// Serializable view of one service group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSnapshot {
    pub name: String,
    pub prefix: String,
    pub auth_required: bool,
    pub cache_enabled: bool,
    pub instances: Vec<InstanceSnapshot>,
}

/// Serializable view of the whole registry.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub groups: Vec<GroupSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_config(name: &str, prefix: &str, targets: &[&str]) -> ServiceGroupConfig {
        ServiceGroupConfig {
            name: name.to_string(),
            prefix: prefix.to_string(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
            auth_required: false,
            cache: None,
        }
    }

    #[test]
    fn test_backend_url_valid() {
        let url = BackendUrl::new("http://example.com").expect("valid HTTP URL should parse");
        assert_eq!(url.as_str(), "http://example.com");

        let secure = BackendUrl::new("https://secure.example.com")
            .expect("valid HTTPS URL should parse");
        assert_eq!(secure.as_str(), "https://secure.example.com");
    }

    #[test]
    fn test_backend_url_invalid() {
        assert!(BackendUrl::new("example.com").is_err());
        assert!(BackendUrl::new("ftp://example.com").is_err());
    }

    #[test]
    fn test_backend_url_strips_trailing_slash() {
        let url = BackendUrl::new("http://example.com/").unwrap();
        assert_eq!(url.as_str(), "http://example.com");
    }

    #[test]
    fn test_instance_initial_state() {
        let instance = ServiceInstance::new("http://example.com".parse().unwrap());
        assert!(instance.is_alive());
        assert_eq!(instance.breaker.state(), CircuitState::Closed);
        assert_eq!(instance.breaker.consecutive_failures(), 0);
        assert!(instance.is_eligible(Duration::from_secs(30)));
    }

    #[test]
    fn test_dead_instance_is_not_eligible() {
        let instance = ServiceInstance::new("http://example.com".parse().unwrap());
        instance.set_alive(false);
        assert!(!instance.is_eligible(Duration::from_secs(30)));
    }

    #[test]
    fn test_find_group_first_match_wins() {
        let registry = Registry::from_config(&[
            group_config("users", "/api/users", &["http://localhost:8001"]),
            group_config("api", "/api", &["http://localhost:8002"]),
        ])
        .unwrap();

        assert_eq!(
            registry.find_group("/api/users/42").unwrap().name(),
            "users"
        );
        assert_eq!(registry.find_group("/api/orders").unwrap().name(), "api");
        assert!(registry.find_group("/unknown/x").is_none());
    }

    #[test]
    fn test_find_group_respects_insertion_order_on_overlap() {
        // A broad prefix listed first shadows the narrower one
        let registry = Registry::from_config(&[
            group_config("api", "/api", &["http://localhost:8002"]),
            group_config("users", "/api/users", &["http://localhost:8001"]),
        ])
        .unwrap();

        assert_eq!(registry.find_group("/api/users/42").unwrap().name(), "api");
    }

    #[test]
    fn test_registry_rejects_malformed_target() {
        let result = Registry::from_config(&[group_config("bad", "/x", &["localhost:8001"])]);
        assert!(matches!(
            result,
            Err(RegistryError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_snapshot_shape() {
        let registry = Registry::from_config(&[group_config(
            "users",
            "/api/users",
            &["http://localhost:8001", "http://localhost:8002"],
        )])
        .unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(snapshot.groups[0].instances.len(), 2);
        assert!(snapshot.groups[0].instances[0].alive);
        assert_eq!(
            snapshot.groups[0].instances[0].breaker_state,
            CircuitState::Closed
        );
    }
}
