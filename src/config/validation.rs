use std::net::SocketAddr;

use eyre::Result;

use crate::config::models::{
    CircuitBreakerConfig, GatewayConfig, HealthCheckConfig, ServiceGroupConfig,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator. Any error here is fatal at startup:
/// the process must not begin serving with an unusable route table.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.services.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "services".to_string(),
            });
        } else {
            for service in &config.services {
                if let Err(mut service_errors) = Self::validate_service_group(service) {
                    errors.append(&mut service_errors);
                }
            }
        }

        if let Err(mut health_check_errors) =
            Self::validate_health_check_config(&config.health_check)
        {
            errors.append(&mut health_check_errors);
        }

        if let Err(e) = Self::validate_circuit_breaker_config(&config.circuit_breaker) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Groups listed after a broader prefix can never receive traffic, since
    /// matching is first-to-last. Returns the (shadowed, shadowing) name pairs.
    pub fn find_shadowed_groups(config: &GatewayConfig) -> Vec<(String, String)> {
        let mut shadowed = Vec::new();
        for (i, earlier) in config.services.iter().enumerate() {
            for later in config.services.iter().skip(i + 1) {
                if later.prefix.starts_with(&earlier.prefix) {
                    shadowed.push((later.name.clone(), earlier.name.clone()));
                }
            }
        }
        shadowed
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Validate a single service group configuration
    fn validate_service_group(service: &ServiceGroupConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let name = &service.name;

        if name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "service.name".to_string(),
            });
        }

        if !service.prefix.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("service '{name}' prefix"),
                message: "Route prefixes must start with '/'".to_string(),
            });
        }

        if service.targets.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: format!("service '{name}' targets"),
                message: "Service groups must have at least one target".to_string(),
            });
        } else {
            for (i, target) in service.targets.iter().enumerate() {
                if let Err(e) =
                    Self::validate_url(target, &format!("service '{name}' target {}", i + 1))
                {
                    errors.push(e);
                }
            }
        }

        if let Some(cache) = &service.cache {
            if cache.enabled && cache.ttl_secs == 0 {
                errors.push(ValidationError::InvalidField {
                    field: format!("service '{name}' cache.ttl_secs"),
                    message: "Cache TTL must be greater than 0 when caching is enabled"
                        .to_string(),
                });
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    fn validate_health_check_config(
        config: &HealthCheckConfig,
    ) -> Result<(), Vec<ValidationError>> {
        if !config.enabled {
            return Ok(());
        }

        let mut errors = Vec::new();

        if config.interval_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "health_check.interval_secs".to_string(),
                message: "Must be greater than 0 when health checks are enabled".to_string(),
            });
        }

        if config.timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "health_check.timeout_secs".to_string(),
                message: "Must be greater than 0 when health checks are enabled".to_string(),
            });
        }

        if config.path.trim().is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "health_check.path".to_string(),
                message: "Cannot be empty when health checks are enabled".to_string(),
            });
        } else if !config.path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: "health_check.path".to_string(),
                message: "Must start with '/' when health checks are enabled".to_string(),
            });
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn validate_circuit_breaker_config(config: &CircuitBreakerConfig) -> ValidationResult<()> {
        if config.open_cooldown_secs == 0 {
            return Err(ValidationError::InvalidField {
                field: "circuit_breaker.open_cooldown_secs".to_string(),
                message: "Must be greater than 0, or an open breaker can never recover"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
