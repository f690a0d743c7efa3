//! Configuration data structures for Portico.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. They are
//! intentionally serde-friendly and include defaults so that minimal configs remain concise.
//! The builder and enums here are considered part of the public API for embedding.
use serde::{Deserialize, Serialize};

/// Top-level gateway configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Address the gateway listens on, e.g. "127.0.0.1:3000"
    pub listen_addr: String,
    /// Ordered list of service groups. Request paths are matched against
    /// group prefixes in this order; the first match wins.
    pub services: Vec<ServiceGroupConfig>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3000".to_string(),
            services: Vec::new(),
            health_check: HealthCheckConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// One routable service group: a path prefix owning a pool of backend targets.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceGroupConfig {
    /// Display name used in logs and the status endpoint; not used for routing.
    pub name: String,
    /// Path prefix this group serves, e.g. "/api/users". Must start with '/'.
    pub prefix: String,
    /// Backend base URLs traffic is balanced across.
    pub targets: Vec<String>,
    /// Whether requests must pass the configured gatekeeper before proxying.
    #[serde(default)]
    pub auth_required: bool,
    /// Optional response caching for this group.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

/// Response-cache settings for a service group.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Time-to-live for cached responses, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    60
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    services: Vec<ServiceGroupConfig>,
    health_check: Option<HealthCheckConfig>,
    circuit_breaker: Option<CircuitBreakerConfig>,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Append a service group. Order matters: groups are matched first to last.
    pub fn service(mut self, service: ServiceGroupConfig) -> Self {
        self.services.push(service);
        self
    }

    /// Set health check configuration
    pub fn health_check(mut self, config: HealthCheckConfig) -> Self {
        self.health_check = Some(config);
        self
    }

    /// Set circuit breaker configuration
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = Some(config);
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        let listen_addr = self
            .listen_addr
            .ok_or_else(|| "listen_addr is required".to_string())?;

        if self.services.is_empty() {
            return Err("At least one service group must be configured".to_string());
        }

        Ok(GatewayConfig {
            listen_addr,
            services: self.services,
            health_check: self.health_check.unwrap_or_default(),
            circuit_breaker: self.circuit_breaker.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Liveness sub-path probed on every backend, relative to its base URL.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 2,
            path: "/health".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive forwarding failures an instance may accumulate before its
    /// breaker opens. The breaker opens on the failure *after* this count.
    pub failure_threshold: u32,
    /// Seconds an open breaker waits (from the last failure) before the
    /// instance is allowed a half-open trial request.
    pub open_cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            open_cooldown_secs: 30,
        }
    }
}
