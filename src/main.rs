//! healthgate: a health-check proxy for load balancers.
//!
//! Sits on every service box between the load balancer and the services
//! running there, answering "should this service receive traffic?" without
//! hammering the services themselves.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                    HEALTHGATE                    │
//!                    │                                                  │
//!     LB check ──────┼─▶ http ──▶ handlers ──▶ checker dispatcher       │
//!                    │  listener               │                        │
//!                    │                  ┌──────┴──────┐                 │
//!                    │                  │ spool gate  │ (operator state)│
//!                    │                  │ verdict     │                 │
//!                    │                  │   cache     │                 │
//!                    │                  └──────┬──────┘                 │
//!                    │                         ▼                        │
//!                    │            protocol checkers ────────────────────┼──▶ local
//!                    │            (http/tcp/mysql/redis/haproxy)        │    service
//!                    │                                                  │
//!     LB agent ──────┼─▶ agent listener ──▶ spool                       │
//!                    │                                                  │
//!                    │  cross-cutting: config · cache · tracking ·      │
//!                    │                 lifecycle · tracing              │
//!                    └──────────────────────────────────────────────────┘
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use healthgate::agent::AgentServer;
use healthgate::config::{load_config, validate_config, ConfigError, HealthgateConfig};
use healthgate::lifecycle::{watch_signals, Shutdown};
use healthgate::{AppState, HttpServer};

/// Command-line options. Flags override their config-file counterparts.
#[derive(Debug, Parser)]
#[command(name = "healthgate", about = "Health-check proxy for load balancers")]
struct Options {
    /// Path to a TOML config file.
    #[arg(short = 'c', long = "config-file")]
    config_file: Option<PathBuf>,

    /// Port to listen on. May be repeated; defaults to 3333.
    #[arg(short = 'p', long = "port")]
    ports: Vec<u16>,

    /// Address to bind.
    #[arg(short = 'B', long = "bind-address")]
    bind_address: Option<String>,

    /// Root directory for the service state spool.
    #[arg(long = "spool-root")]
    spool_root: Option<String>,

    /// Also answer HAProxy agent checks on this port.
    #[arg(short = 'A', long = "agent-port")]
    agent_port: Option<u16>,

    /// Log at debug level.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn apply_overrides(config: &mut HealthgateConfig, options: &Options) {
    if !options.ports.is_empty() {
        config.listener.ports = options.ports.clone();
    }
    if let Some(bind_address) = &options.bind_address {
        config.listener.bind_address = bind_address.clone();
    }
    if let Some(spool_root) = &options.spool_root {
        config.spool.root = spool_root.clone();
    }
    if let Some(agent_port) = options.agent_port {
        config.listener.agent_port = Some(agent_port);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let options = Options::parse();

    let mut config = match &options.config_file {
        Some(path) => load_config(path)?,
        None => HealthgateConfig::default(),
    };
    apply_overrides(&mut config, &options);
    validate_config(&config).map_err(ConfigError::Validation)?;

    // Initialize tracing subscriber
    let fallback = if options.verbose {
        "healthgate=debug,tower_http=debug".to_string()
    } else {
        format!("healthgate={}", config.observability.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&fallback)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "healthgate starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        ports = ?config.listener.ports,
        agent_port = ?config.listener.agent_port,
        spool_root = %config.spool.root,
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration loaded"
    );

    let state = AppState::new(&config)?;
    let shutdown = Shutdown::new();
    let bind_ip: IpAddr = config.listener.bind_address.parse()?;

    let mut listeners = Vec::new();
    for port in &config.listener.ports {
        let listener = TcpListener::bind(SocketAddr::new(bind_ip, *port)).await?;
        let server = HttpServer::new(state.clone());
        let rx = shutdown.subscribe();
        listeners.push(tokio::spawn(async move {
            if let Err(e) = server.run(listener, rx).await {
                tracing::error!(error = %e, "HTTP listener failed");
            }
        }));
    }

    if let Some(agent_port) = config.listener.agent_port {
        let listener = TcpListener::bind(SocketAddr::new(bind_ip, agent_port)).await?;
        let agent = AgentServer::new(state.spool.clone());
        let rx = shutdown.subscribe();
        listeners.push(tokio::spawn(async move {
            if let Err(e) = agent.run(listener, rx).await {
                tracing::error!(error = %e, "agent listener failed");
            }
        }));
    }

    tokio::spawn(watch_signals(shutdown));

    for listener in listeners {
        if let Err(e) = listener.await {
            tracing::error!(error = %e, "listener task panicked");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
