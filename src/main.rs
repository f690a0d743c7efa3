use std::{convert::Infallible, net::SocketAddr, path::Path, sync::Arc};

use axum::{Router, body::Body, extract::Request, response::Response, routing::any};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use portico::{
    adapters::{HealthChecker, HttpClientAdapter, HttpHandler},
    config::{GatewayConfig, GatewayConfigValidator, loader::load_config},
    core::GatewayService,
    ports::http_client::HttpClient,
    tracing_setup,
};
use tower_http::trace::TraceLayer;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.yaml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.yaml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config), // Default to serve with config from args
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Loading configuration from {config_path}");

    let config: GatewayConfig = load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    GatewayConfigValidator::validate(&config).wrap_err("Configuration validation failed")?;

    for (shadowed, shadowing) in GatewayConfigValidator::find_shadowed_groups(&config) {
        tracing::warn!(
            "Service group '{}' is shadowed by '{}' and will never receive traffic",
            shadowed,
            shadowing
        );
    }

    let config = Arc::new(config);
    let gateway_service = Arc::new(
        GatewayService::new(config.clone()).wrap_err("Failed to build service registry")?,
    );

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().wrap_err("Failed to create HTTP client adapter")?);

    let health_checker_handle = if config.health_check.enabled {
        let health_checker = HealthChecker::new(gateway_service.clone(), http_client.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = health_checker.run().await {
                tracing::error!("Health checker error: {}", e);
            }
        }))
    } else {
        tracing::info!("Health checking is disabled in the configuration.");
        None
    };

    let http_handler = Arc::new(HttpHandler::new(
        gateway_service.clone(),
        http_client.clone(),
    ));

    let make_request_route = |handler: Arc<HttpHandler>| {
        any(move |req: Request| {
            let handler = handler.clone();
            async move {
                match handler.handle_request(req).await {
                    Ok(response) => Ok::<Response<Body>, Infallible>(response),
                    Err(e) => {
                        tracing::error!("Request handling error: {:?}", e);
                        let error_response = Response::builder()
                            .status(500)
                            .body(Body::from("Internal Server Error"))
                            .unwrap_or_else(|_| Response::new(Body::from("Internal Server Error")));
                        Ok(error_response)
                    }
                }
            }
        })
    };

    let app = Router::new()
        .route("/{*path}", make_request_route(http_handler.clone()))
        .route("/", make_request_route(http_handler.clone()))
        .layer(TraceLayer::new_for_http());

    for service in &config.services {
        tracing::info!(
            "Configured service group '{}': {} -> {} instance(s)",
            service.name,
            service.prefix,
            service.targets.len()
        );
    }

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!("Portico gateway listening on {}", addr);
    println!("Portico gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = health_checker_handle {
        tracing::info!("Shutting down health checker...");
        handle.abort();
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("Error: configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("Configuration validation: OK");
            println!();
            println!("Configuration summary:");
            println!("   Listen address: {}", config.listen_addr);
            println!("   Service groups: {}", config.services.len());
            println!("   Health checks:  {}", config.health_check.enabled);
            for (shadowed, shadowing) in GatewayConfigValidator::find_shadowed_groups(&config) {
                println!(
                    "   Warning: group '{shadowed}' is shadowed by '{shadowing}' and will never match"
                );
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("Common fixes:");
            println!("   - Ensure all target URLs start with http:// or https://");
            println!("   - Route prefixes must start with '/'");
            println!("   - Verify listen address format (e.g., '127.0.0.1:3000')");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("Error: configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Portico gateway configuration

# The address to listen on
listen_addr: "127.0.0.1:8080"

# Health check configuration
health_check:
  enabled: true
  interval_secs: 10
  timeout_secs: 2
  path: "/health"

# Circuit breaker configuration
circuit_breaker:
  failure_threshold: 3
  open_cooldown_secs: 30

# Service groups, matched first-to-last by path prefix
services:
  - name: users
    prefix: /api/users
    targets:
      - http://localhost:8001
      - http://localhost:8002

  - name: products
    prefix: /api/products
    targets:
      - http://localhost:8003
    cache:
      enabled: true
      ttl_secs: 60
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("Created default configuration at: {config_path}");
    println!("   Run 'portico serve --config {config_path}' to start the gateway");
    Ok(())
}
