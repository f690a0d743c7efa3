use std::sync::Arc;

use axum::{
    body::Body as AxumBody,
    http::{HeaderValue, StatusCode, header},
};
use eyre::{Result, WrapErr};
use http_body_util::BodyExt;
use hyper::{Request, Response};

use crate::{
    core::{GatewayService, ServiceGroup, ServiceInstance},
    ports::{
        gatekeeper::{GateDecision, RequestGatekeeper},
        http_client::HttpClient,
        response_cache::{CachedResponse, ResponseCache},
    },
};

/// Header carrying the correlation identifier across services.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Diagnostic dump of metrics and registry state; read-only.
pub const STATUS_PATH: &str = "/portico/status";

/// HTTP handler for the Portico gateway: routes each inbound request to a
/// service group, picks an instance, forwards, and feeds the outcome back
/// into the instance's circuit breaker and the process metrics.
///
/// The gatekeeper and response cache are optional collaborators: the handler
/// consults them only when a group's flags enable them and an implementation
/// is installed.
#[derive(Clone)]
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
    http_client: Arc<dyn HttpClient>,
    gatekeeper: Option<Arc<dyn RequestGatekeeper>>,
    response_cache: Option<Arc<dyn ResponseCache>>,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            gateway_service,
            http_client,
            gatekeeper: None,
            response_cache: None,
        }
    }

    /// Install an authentication collaborator.
    pub fn with_gatekeeper(mut self, gatekeeper: Arc<dyn RequestGatekeeper>) -> Self {
        self.gatekeeper = Some(gatekeeper);
        self
    }

    /// Install a response-cache collaborator.
    pub fn with_response_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.response_cache = Some(cache);
        self
    }

    /// Main request handler.
    pub async fn handle_request(&self, req: Request<AxumBody>) -> Result<Response<AxumBody>> {
        let path = req.uri().path();

        // The status endpoint is answered before any metrics side effect
        if path == STATUS_PATH {
            return self.handle_status();
        }

        self.proxy_request(req).await
    }

    /// Status endpoint: current metrics plus the full registry state.
    fn handle_status(&self) -> Result<Response<AxumBody>> {
        let status_data = serde_json::json!({
            "service": "Portico Gateway",
            "version": env!("CARGO_PKG_VERSION"),
            "metrics": self.gateway_service.metrics().snapshot(),
            "services": self.gateway_service.registry().snapshot(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(AxumBody::from(status_data.to_string()))
            .wrap_err("Failed to build status response")
    }

    /// The proxy pipeline: correlate, count, route, gate, cache, select,
    /// rewrite, forward, report.
    async fn proxy_request(&self, mut req: Request<AxumBody>) -> Result<Response<AxumBody>> {
        let correlation_id = correlation_id_for(&req);
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let span = tracing::info_span!(
            "request",
            http.method = %method,
            http.path = %path,
            correlation.id = %correlation_id,
        );
        let _enter = span.enter();

        let metrics = self.gateway_service.metrics();
        metrics.increment_total_requests();

        // Routing miss is "not found", not an error metric
        let Some(group) = self.gateway_service.find_group(&path) else {
            tracing::info!("No service group matches path {}", path);
            return plain_response(StatusCode::NOT_FOUND, "Not Found");
        };

        if group.auth_required()
            && let Some(gatekeeper) = &self.gatekeeper
            && gatekeeper.check(req.headers()).await == GateDecision::Deny
        {
            tracing::info!("Gatekeeper denied request to group {}", group.name());
            return plain_response(StatusCode::UNAUTHORIZED, "Unauthorized");
        }

        let cache_key = cache_key_for(&req);
        if let Some(cached) = self.cache_lookup(&group, &method, &cache_key).await {
            metrics.increment_cache_hits();
            tracing::debug!("Cache hit for {}", cache_key);
            return Ok(cached.into_response());
        }

        let Some(instance) = self.gateway_service.select_instance(&group) else {
            tracing::warn!(
                "No eligible instance in group {} for path {}",
                group.name(),
                path
            );
            return plain_response(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable");
        };

        rewrite_request(&mut req, &group, &instance, &correlation_id)
            .wrap_err("Failed to rewrite request for backend")?;

        match self.http_client.send_request(req).await {
            Ok(response) => {
                self.gateway_service.report_success(&instance);
                let response = self
                    .maybe_cache(&group, &method, &cache_key, response)
                    .await?;
                // Backend responses, error statuses included, pass through verbatim
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(
                    "Forwarding to {} failed: {}",
                    instance.address(),
                    e
                );
                metrics.increment_errors();
                self.gateway_service.report_failure(&instance);
                plain_response(StatusCode::BAD_GATEWAY, "Gateway Error")
            }
        }
    }

    async fn cache_lookup(
        &self,
        group: &ServiceGroup,
        method: &hyper::Method,
        cache_key: &str,
    ) -> Option<CachedResponse> {
        if method != hyper::Method::GET {
            return None;
        }
        group.cache()?;
        self.response_cache.as_ref()?.lookup(cache_key).await
    }

    /// Buffer and store a cacheable response, then rebuild it for the caller.
    /// Non-cacheable responses stream through untouched.
    async fn maybe_cache(
        &self,
        group: &ServiceGroup,
        method: &hyper::Method,
        cache_key: &str,
        response: Response<AxumBody>,
    ) -> Result<Response<AxumBody>> {
        let (Some(settings), Some(cache)) = (group.cache(), self.response_cache.as_ref()) else {
            return Ok(response);
        };
        if method != hyper::Method::GET || !response.status().is_success() {
            return Ok(response);
        }

        let (parts, body) = response.into_parts();
        let bytes = body
            .collect()
            .await
            .wrap_err("Failed to buffer backend response for caching")?
            .to_bytes();

        let cached = CachedResponse {
            status: parts.status,
            headers: parts.headers.clone(),
            body: bytes.clone(),
        };
        cache.store(cache_key, cached, settings.ttl).await;

        Ok(Response::from_parts(parts, AxumBody::from(bytes)))
    }
}

/// Reuse the inbound correlation id or mint a fresh one.
fn correlation_id_for(req: &Request<AxumBody>) -> String {
    req.headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Cache entries are keyed by path plus query string.
fn cache_key_for(req: &Request<AxumBody>) -> String {
    req.uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), |pq| pq.as_str().to_string())
}

/// Point the request at the chosen instance: strip the matched prefix,
/// preserve the query string, and stamp the correlation id.
fn rewrite_request(
    req: &mut Request<AxumBody>,
    group: &ServiceGroup,
    instance: &ServiceInstance,
    correlation_id: &str,
) -> Result<()> {
    let path = req.uri().path();
    let stripped = path.strip_prefix(group.prefix()).unwrap_or(path);
    let query = req
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();

    let backend_uri = format!("{}{}{}", instance.address(), stripped, query);
    *req.uri_mut() = backend_uri
        .parse()
        .wrap_err_with(|| format!("Failed to parse backend URI: {backend_uri}"))?;

    req.headers_mut().insert(
        CORRELATION_HEADER,
        HeaderValue::from_str(correlation_id)
            .wrap_err("Correlation id is not a valid header value")?,
    );
    Ok(())
}

fn plain_response(status: StatusCode, message: &'static str) -> Result<Response<AxumBody>> {
    Response::builder()
        .status(status)
        .body(AxumBody::from(message))
        .wrap_err("Failed to build response")
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        config::{GatewayConfig, ServiceGroupConfig},
        ports::http_client::{HttpClientError, HttpClientResult},
    };

    /// Mock backend client recording forwarded URIs and correlation headers.
    struct MockBackend {
        succeed: bool,
        status: StatusCode,
        seen: std::sync::Mutex<Vec<(String, Option<String>)>>,
    }

    impl MockBackend {
        fn up() -> Self {
            Self {
                succeed: true,
                status: StatusCode::OK,
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn up_with_status(status: StatusCode) -> Self {
            Self {
                succeed: true,
                status,
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn down() -> Self {
            Self {
                succeed: false,
                status: StatusCode::OK,
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn forwarded(&self) -> Vec<(String, Option<String>)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HttpClient for MockBackend {
        async fn send_request(
            &self,
            req: Request<AxumBody>,
        ) -> HttpClientResult<Response<AxumBody>> {
            let correlation = req
                .headers()
                .get(CORRELATION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string());
            self.seen
                .lock()
                .unwrap()
                .push((req.uri().to_string(), correlation));

            if self.succeed {
                Ok(Response::builder()
                    .status(self.status)
                    .body(AxumBody::from("backend says hi"))
                    .unwrap())
            } else {
                Err(HttpClientError::ConnectionError("refused".to_string()))
            }
        }

        async fn health_check(&self, _url: &str, _timeout_secs: u64) -> HttpClientResult<bool> {
            Ok(true)
        }
    }

    fn gateway_with(services: Vec<ServiceGroupConfig>) -> Arc<GatewayService> {
        let config = GatewayConfig {
            services,
            ..GatewayConfig::default()
        };
        Arc::new(GatewayService::new(Arc::new(config)).unwrap())
    }

    fn single_backend_gateway() -> Arc<GatewayService> {
        gateway_with(vec![ServiceGroupConfig {
            name: "users".to_string(),
            prefix: "/api/users".to_string(),
            targets: vec!["http://s1".to_string()],
            auth_required: false,
            cache: None,
        }])
    }

    fn get_request(path: &str) -> Request<AxumBody> {
        Request::builder()
            .method("GET")
            .uri(path)
            .body(AxumBody::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found_without_error_metric() {
        let gateway = single_backend_gateway();
        let handler = HttpHandler::new(gateway.clone(), Arc::new(MockBackend::up()));

        let response = handler.handle_request(get_request("/unknown/x")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(gateway.metrics().total_requests(), 1);
        assert_eq!(gateway.metrics().errors(), 0);
    }

    #[tokio::test]
    async fn test_prefix_stripped_and_query_preserved() {
        let gateway = single_backend_gateway();
        let backend = Arc::new(MockBackend::up());
        let handler = HttpHandler::new(gateway, backend.clone());

        let response = handler
            .handle_request(get_request("/api/users/42?verbose=1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let forwarded = backend.forwarded();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].0, "http://s1/42?verbose=1");
    }

    #[tokio::test]
    async fn test_correlation_id_propagated() {
        let gateway = single_backend_gateway();
        let backend = Arc::new(MockBackend::up());
        let handler = HttpHandler::new(gateway, backend.clone());

        let req = Request::builder()
            .method("GET")
            .uri("/api/users/1")
            .header(CORRELATION_HEADER, "abc-123")
            .body(AxumBody::empty())
            .unwrap();
        handler.handle_request(req).await.unwrap();

        assert_eq!(backend.forwarded()[0].1.as_deref(), Some("abc-123"));
    }

    #[tokio::test]
    async fn test_correlation_id_generated_when_absent() {
        let gateway = single_backend_gateway();
        let backend = Arc::new(MockBackend::up());
        let handler = HttpHandler::new(gateway, backend.clone());

        handler.handle_request(get_request("/api/users/1")).await.unwrap();

        let correlation = backend.forwarded()[0].1.clone().unwrap();
        assert!(uuid::Uuid::parse_str(&correlation).is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_is_bad_gateway_and_counts() {
        let gateway = single_backend_gateway();
        let handler = HttpHandler::new(gateway.clone(), Arc::new(MockBackend::down()));

        let response = handler.handle_request(get_request("/api/users/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(gateway.metrics().errors(), 1);

        let group = gateway.find_group("/api/users/1").unwrap();
        assert_eq!(group.instances()[0].breaker.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_backend_error_status_passes_through_without_breaker_effect() {
        let gateway = single_backend_gateway();
        let handler = HttpHandler::new(
            gateway.clone(),
            Arc::new(MockBackend::up_with_status(StatusCode::INTERNAL_SERVER_ERROR)),
        );

        let response = handler.handle_request(get_request("/api/users/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // A reachable backend's error status is not a forwarding failure
        assert_eq!(gateway.metrics().errors(), 0);

        let group = gateway.find_group("/api/users/1").unwrap();
        assert_eq!(group.instances()[0].breaker.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_then_unavailable() {
        let gateway = single_backend_gateway();
        let handler = HttpHandler::new(gateway.clone(), Arc::new(MockBackend::down()));

        // Default threshold 3: four transport failures open the breaker
        for _ in 0..4 {
            let response = handler.handle_request(get_request("/api/users/1")).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }

        let response = handler.handle_request(get_request("/api/users/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(gateway.metrics().total_requests(), 5);
        assert_eq!(gateway.metrics().errors(), 4);
    }

    #[tokio::test]
    async fn test_status_endpoint_skips_request_metrics() {
        let gateway = single_backend_gateway();
        let handler = HttpHandler::new(gateway.clone(), Arc::new(MockBackend::up()));

        let response = handler.handle_request(get_request(STATUS_PATH)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gateway.metrics().total_requests(), 0);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["metrics"]["total_requests"], 0);
        assert_eq!(json["services"]["groups"][0]["prefix"], "/api/users");
    }

    #[tokio::test]
    async fn test_gatekeeper_denies_when_required() {
        struct DenyAll;
        #[async_trait]
        impl RequestGatekeeper for DenyAll {
            async fn check(&self, _headers: &http::HeaderMap) -> GateDecision {
                GateDecision::Deny
            }
        }

        let gateway = gateway_with(vec![ServiceGroupConfig {
            name: "users".to_string(),
            prefix: "/api/users".to_string(),
            targets: vec!["http://s1".to_string()],
            auth_required: true,
            cache: None,
        }]);
        let backend = Arc::new(MockBackend::up());
        let handler =
            HttpHandler::new(gateway, backend.clone()).with_gatekeeper(Arc::new(DenyAll));

        let response = handler.handle_request(get_request("/api/users/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(backend.forwarded().is_empty());
    }

    #[tokio::test]
    async fn test_gatekeeper_not_consulted_when_group_does_not_require_auth() {
        struct DenyAll;
        #[async_trait]
        impl RequestGatekeeper for DenyAll {
            async fn check(&self, _headers: &http::HeaderMap) -> GateDecision {
                GateDecision::Deny
            }
        }

        let gateway = single_backend_gateway();
        let handler = HttpHandler::new(gateway, Arc::new(MockBackend::up()))
            .with_gatekeeper(Arc::new(DenyAll));

        let response = handler.handle_request(get_request("/api/users/1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cache_hit_short_circuits_and_counts() {
        use std::{collections::HashMap, time::Duration};

        #[derive(Default)]
        struct MemoryCache {
            entries: std::sync::Mutex<HashMap<String, CachedResponse>>,
        }

        #[async_trait]
        impl ResponseCache for MemoryCache {
            async fn lookup(&self, key: &str) -> Option<CachedResponse> {
                self.entries.lock().unwrap().get(key).cloned()
            }

            async fn store(&self, key: &str, response: CachedResponse, _ttl: Duration) {
                self.entries.lock().unwrap().insert(key.to_string(), response);
            }
        }

        let gateway = gateway_with(vec![ServiceGroupConfig {
            name: "products".to_string(),
            prefix: "/api/products".to_string(),
            targets: vec!["http://s1".to_string()],
            auth_required: false,
            cache: Some(crate::config::CacheConfig {
                enabled: true,
                ttl_secs: 60,
            }),
        }]);
        let backend = Arc::new(MockBackend::up());
        let cache = Arc::new(MemoryCache::default());
        let handler = HttpHandler::new(gateway.clone(), backend.clone())
            .with_response_cache(cache.clone());

        // First request forwards and populates the cache
        handler
            .handle_request(get_request("/api/products?id=123"))
            .await
            .unwrap();
        assert_eq!(backend.forwarded().len(), 1);
        assert!(cache.entries.lock().unwrap().contains_key("/api/products?id=123"));

        // Second request is served from cache without touching the backend
        let response = handler
            .handle_request(get_request("/api/products?id=123"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(backend.forwarded().len(), 1);
        assert_eq!(gateway.metrics().cache_hits(), 1);
        assert_eq!(gateway.metrics().total_requests(), 2);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"backend says hi");
    }
}
