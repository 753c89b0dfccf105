//! sandgated — the Sandgate daemon.
//!
//! Single binary that assembles all Sandgate subsystems:
//! - Session store (redb)
//! - Token codec
//! - Target resolver
//! - Health poller
//! - Provisioning client
//! - Host-routed gateway (admin API + sandbox proxy)
//!
//! # Usage
//!
//! ```text
//! AUTH_TOKEN_SECRET=... ADMIN_PASSWORD=... \
//!   sandgated serve --port 8080 --data-dir /var/lib/sandgate
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};

use sandgate_api::{build_router, ApiState, SessionService, SessionServiceConfig};
use sandgate_auth::TokenCodec;
use sandgate_health::{HealthPoller, PollerConfig};
use sandgate_provision::{
    GraphqlProvisioner, ProvisionError, ProvisionSpec, Provisioner,
};
use sandgate_proxy::{HostRouter, ProxyForwarder};
use sandgate_resolver::{ResolverConfig, TargetResolver};
use sandgate_state::StateStore;
use sandgated::config::Config;
use sandgated::gateway::Gateway;

#[derive(Parser)]
#[command(name = "sandgated", about = "Sandgate session broker daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway and health poller in one process.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/sandgate")]
        data_dir: PathBuf,

        /// Health poll interval in seconds.
        #[arg(long, default_value = "10")]
        poll_interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sandgated=debug,sandgate=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            poll_interval,
        } => run_serve(port, data_dir, poll_interval).await,
    }
}

async fn run_serve(port: u16, data_dir: PathBuf, poll_interval: u64) -> anyhow::Result<()> {
    info!("Sandgate daemon starting");

    let config = Config::from_env()?;

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("sandgate.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // Session store.
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "session store opened");

    // Token codec.
    let tokens = Arc::new(TokenCodec::new(&config.auth_token_secret));

    // Target resolver.
    let resolver = Arc::new(TargetResolver::new(ResolverConfig {
        internal_domain: config.internal_domain.clone(),
        sandbox_port: config.sandbox_port,
        local_mode: config.local_mode,
        local_targets: config.local_targets.clone(),
        local_fallback: config.local_fallback.clone(),
    }));
    info!(
        local_mode = config.local_mode,
        domain = %config.internal_domain,
        "target resolver initialized"
    );

    // Provisioning backend.
    let provisioner: Arc<dyn Provisioner> = match &config.provisioner {
        Some(settings) => {
            info!(endpoint = %settings.endpoint, "provisioning backend configured");
            Arc::new(GraphqlProvisioner::new(settings.clone()))
        }
        None => {
            info!("no provisioning backend configured");
            Arc::new(UnconfiguredProvisioner)
        }
    };

    // Session service + admin router.
    let sessions = SessionService::new(
        store.clone(),
        provisioner,
        SessionServiceConfig {
            local_mode: config.local_mode,
            sandbox_image: config.sandbox_image.clone(),
            sandbox_env: config.sandbox_env.clone(),
        },
    );
    let admin = build_router(ApiState {
        sessions,
        tokens: tokens.clone(),
        admin_password: config.admin_password.clone(),
    });

    // Health poller.
    let poller = HealthPoller::new(
        store.clone(),
        resolver.clone(),
        PollerConfig {
            interval: Duration::from_secs(poll_interval),
            ..PollerConfig::default()
        },
    );
    info!(interval = poll_interval, "health poller initialized");

    // Gateway.
    let gateway = Arc::new(Gateway::new(
        HostRouter::new(&config.admin_host, &config.proxy_host),
        admin,
        ProxyForwarder::new(tokens, resolver),
    ));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_shutdown = shutdown_rx.clone();

    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install CTRL+C handler");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Start background tasks ─────────────────────────────────

    let poller_handle = tokio::spawn(async move {
        poller.run(poller_shutdown).await;
    });

    // ── Start gateway ──────────────────────────────────────────

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    gateway.run(listener, shutdown_rx).await?;

    // Wait for background tasks.
    let _ = poller_handle.await;

    info!("Sandgate daemon stopped");
    Ok(())
}

/// Stand-in provisioner for deployments without a backend (local mode).
/// Session creation is already rejected upstream; any call landing here
/// is an error by construction.
struct UnconfiguredProvisioner;

#[async_trait]
impl Provisioner for UnconfiguredProvisioner {
    async fn create(&self, _spec: &ProvisionSpec) -> Result<String, ProvisionError> {
        Err(ProvisionError::Api(
            "no provisioning backend configured".to_string(),
        ))
    }

    async fn destroy(&self, _resource_id: &str) -> Result<(), ProvisionError> {
        Err(ProvisionError::Api(
            "no provisioning backend configured".to_string(),
        ))
    }
}
