//! Core gateway orchestration service.
//!
//! The `GatewayService` aggregates immutable configuration (`GatewayConfig`)
//! with runtime state (the registry of groups and instances, process-wide
//! metrics). It provides:
//! * Route lookup by path prefix (first match in configuration order)
//! * Load-balancing instance selection over the eligible subset
//! * Breaker outcome reporting for forwarded requests
//! * Snapshots for the status endpoint
//!
//! This layer deliberately avoids I/O and only manipulates in-memory data so
//! it remains fast and easily testable in isolation.
use std::{sync::Arc, time::Duration};

use crate::{
    config::{GatewayConfig, HealthCheckConfig},
    core::{
        balancer,
        registry::{Registry, RegistryError, ServiceGroup, ServiceInstance},
    },
    metrics::GatewayMetrics,
};

/// Central orchestrator for routing, instance selection and breaker updates.
/// Constructed once at startup; cheap to share behind an `Arc`.
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    registry: Registry,
    metrics: GatewayMetrics,
}

impl GatewayService {
    /// Build the service and its registry from a (validated) configuration.
    pub fn new(config: Arc<GatewayConfig>) -> Result<Self, RegistryError> {
        let registry = Registry::from_config(&config.services)?;
        Ok(Self {
            config,
            registry,
            metrics: GatewayMetrics::new(),
        })
    }

    /// Resolve the service group for an inbound request path, or `None`
    /// (caller responds "not found").
    pub fn find_group(&self, path: &str) -> Option<Arc<ServiceGroup>> {
        self.registry.find_group(path).cloned()
    }

    /// Pick the next eligible instance of `group` via round-robin.
    pub fn select_instance(&self, group: &ServiceGroup) -> Option<Arc<ServiceInstance>> {
        balancer::select_instance(group, self.breaker_cooldown())
    }

    /// Report a successful round trip to the instance's breaker.
    pub fn report_success(&self, instance: &ServiceInstance) {
        instance.breaker.record_success();
    }

    /// Report a transport-level forwarding failure to the instance's breaker.
    pub fn report_failure(&self, instance: &ServiceInstance) {
        instance
            .breaker
            .record_failure(self.config.circuit_breaker.failure_threshold);
    }

    pub fn health_config(&self) -> &HealthCheckConfig {
        &self.config.health_check
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_secs(self.config.circuit_breaker.open_cooldown_secs)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }
}
