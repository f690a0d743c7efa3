use std::{sync::Arc, time::Duration};

use eyre::Result;
use futures_util::future::join_all;
use tokio::time::sleep;

use crate::{
    core::{GatewayService, ServiceInstance},
    ports::http_client::HttpClient,
};

/// Health checker adapter: the sole writer of instance liveness.
///
/// On a fixed interval it probes every instance of every group and updates
/// the instance's alive flag from the outcome. Probes within a sweep run
/// concurrently so a slow backend cannot delay the others; request handling
/// proceeds concurrently with the sweep and may observe liveness up to one
/// interval stale.
pub struct HealthChecker {
    gateway_service: Arc<GatewayService>,
    http_client: Arc<dyn HttpClient>,
}

impl HealthChecker {
    pub fn new(gateway_service: Arc<GatewayService>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            gateway_service,
            http_client,
        }
    }

    /// Run the health checker loop
    pub async fn run(&self) -> Result<()> {
        let health_config = self.gateway_service.health_config();

        if !health_config.enabled {
            tracing::info!("Health checking is disabled");
            return Ok(());
        }

        let interval = Duration::from_secs(health_config.interval_secs);

        tracing::info!(
            "Starting health checker with interval: {}s, timeout: {}s, probe path: {}",
            health_config.interval_secs,
            health_config.timeout_secs,
            health_config.path
        );

        loop {
            // Sleep at the beginning to allow the server to start up
            sleep(interval).await;
            self.sweep().await;
        }
    }

    /// Probe every instance of every group once, concurrently.
    pub async fn sweep(&self) {
        let health_config = self.gateway_service.health_config();
        let registry = self.gateway_service.registry();

        tracing::debug!("Running health checks on all backends...");

        let probes = registry
            .all_instances()
            .map(|(group, instance)| {
                self.probe_instance(group.name().to_string(), instance.clone(), &health_config.path, health_config.timeout_secs)
            })
            .collect::<Vec<_>>();

        join_all(probes).await;

        tracing::debug!("Health check cycle completed");
    }

    async fn probe_instance(
        &self,
        group_name: String,
        instance: Arc<ServiceInstance>,
        probe_path: &str,
        timeout_secs: u64,
    ) {
        let probe_url = format!("{}{}", instance.address(), probe_path);

        let is_alive = match self.http_client.health_check(&probe_url, timeout_secs).await {
            Ok(healthy) => healthy,
            Err(err) => {
                tracing::debug!("Health probe failed for {}: {}", probe_url, err);
                false
            }
        };

        let was_alive = instance.is_alive();
        instance.set_alive(is_alive);

        if was_alive && !is_alive {
            tracing::warn!(
                "Backend {} (group {}) is now DOWN",
                instance.address(),
                group_name
            );
        } else if !was_alive && is_alive {
            tracing::info!(
                "Backend {} (group {}) is now UP",
                instance.address(),
                group_name
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body as AxumBody;

    use super::*;
    use crate::{
        config::{GatewayConfig, ServiceGroupConfig},
        ports::http_client::{HttpClientError, HttpClientResult},
    };

    // Mock HTTP client for testing
    struct MockHttpClient {
        outcome: MockOutcome,
    }

    enum MockOutcome {
        Healthy,
        Unhealthy,
        Timeout,
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn send_request(
            &self,
            _req: hyper::Request<AxumBody>,
        ) -> HttpClientResult<hyper::Response<AxumBody>> {
            Err(HttpClientError::ConnectionError(
                "not used in tests".to_string(),
            ))
        }

        async fn health_check(
            &self,
            _url: &str,
            timeout_secs: u64,
        ) -> HttpClientResult<bool> {
            match self.outcome {
                MockOutcome::Healthy => Ok(true),
                MockOutcome::Unhealthy => Ok(false),
                MockOutcome::Timeout => Err(HttpClientError::Timeout(timeout_secs)),
            }
        }
    }

    fn test_gateway() -> Arc<GatewayService> {
        let config = GatewayConfig {
            services: vec![ServiceGroupConfig {
                name: "users".to_string(),
                prefix: "/api/users".to_string(),
                targets: vec!["http://s1".to_string(), "http://s2".to_string()],
                auth_required: false,
                cache: None,
            }],
            ..GatewayConfig::default()
        };
        Arc::new(GatewayService::new(Arc::new(config)).unwrap())
    }

    fn checker(gateway: Arc<GatewayService>, outcome: MockOutcome) -> HealthChecker {
        HealthChecker::new(gateway, Arc::new(MockHttpClient { outcome }))
    }

    #[tokio::test]
    async fn test_sweep_marks_unhealthy_backends_down() {
        let gateway = test_gateway();
        checker(gateway.clone(), MockOutcome::Unhealthy).sweep().await;

        for (_, instance) in gateway.registry().all_instances() {
            assert!(!instance.is_alive());
        }
    }

    #[tokio::test]
    async fn test_sweep_treats_timeout_as_down() {
        let gateway = test_gateway();
        checker(gateway.clone(), MockOutcome::Timeout).sweep().await;

        for (_, instance) in gateway.registry().all_instances() {
            assert!(!instance.is_alive());
        }
    }

    #[tokio::test]
    async fn test_sweep_revives_recovered_backends() {
        let gateway = test_gateway();
        for (_, instance) in gateway.registry().all_instances() {
            instance.set_alive(false);
        }

        checker(gateway.clone(), MockOutcome::Healthy).sweep().await;

        for (_, instance) in gateway.registry().all_instances() {
            assert!(instance.is_alive());
        }
    }

    #[tokio::test]
    async fn test_dead_instance_excluded_from_selection_despite_closed_breaker() {
        let gateway = test_gateway();
        checker(gateway.clone(), MockOutcome::Unhealthy).sweep().await;

        let group = gateway.find_group("/api/users/1").unwrap();
        // Breakers are still closed; liveness alone excludes the instances
        for instance in group.instances() {
            assert_eq!(
                instance.breaker.state(),
                crate::core::CircuitState::Closed
            );
        }
        assert!(gateway.select_instance(&group).is_none());
    }
}
