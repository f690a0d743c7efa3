pub mod balancer;
pub mod breaker;
pub mod gateway;
pub mod registry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use gateway::GatewayService;
pub use registry::{BackendUrl, Registry, ServiceGroup, ServiceInstance};
