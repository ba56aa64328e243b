//! # Consul ZeroConf
//!
//! One-shot provisioning for Consul ACLs. Bootstraps the ACL system once,
//! provisions node and registration credentials, and registers nodes with a
//! ZeroConf registrar (a separate Consul agent used as a join directory).
//!
//! ## Flow
//! ```text
//! Connector → Bootstrap Negotiator → Provisioner → Cluster State   (server)
//!                                              └→ Registration    (node)
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod bootstrap;
mod config;
mod consul;
mod files;
mod registration;
mod templates;
mod workflow;

use config::AppConfig;
use consul::HttpDialer;
use workflow::{Outcome, Workflow};

/// Consul ZeroConf - ACL bootstrap and node registration
#[derive(Parser, Debug)]
#[command(name = "consul-zeroconf")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Bootstrap the ZeroConf server
    #[arg(long)]
    pub bootstrap_server: bool,

    /// Bootstrap a cluster against a ZeroConf server
    #[arg(long)]
    pub bootstrap_cluster: bool,

    /// Register this node with the ZeroConf server
    #[arg(long)]
    pub register_node: bool,

    /// Deregister this node from the ZeroConf server
    #[arg(long)]
    pub deregister_node: bool,

    /// Consul address (e.g. http://localhost:8500). CONSUL_HTTP_ADDRESS overrides.
    #[arg(long)]
    pub address: Option<String>,

    /// ACL token for the local agent. CONSUL_HTTP_TOKEN overrides.
    #[arg(long)]
    pub token: Option<String>,

    /// Consul node name (defaults to the host name). CONSUL_NODE_NAME overrides.
    #[arg(long)]
    pub node_name: Option<String>,

    /// Policy prefix for node names. CONSUL_NODE_PREFIX overrides.
    #[arg(long)]
    pub node_prefix: Option<String>,

    /// Consul config directory. CONSUL_CONFIG_DIR overrides.
    #[arg(long)]
    pub config_dir: Option<String>,

    /// ZeroConf server address. CONSUL_ZEROCONF_ADDRESS overrides.
    #[arg(long)]
    pub zeroconf_address: Option<String>,

    /// ZeroConf server token used for service registration. CONSUL_ZEROCONF_TOKEN overrides.
    #[arg(long)]
    pub zeroconf_token: Option<String>,

    /// Directory for zeroconf.json
    #[arg(long)]
    pub zeroconf_dir: Option<PathBuf>,

    /// Existing management token; skips ACL bootstrap
    #[arg(long)]
    pub bootstrap_token: Option<String>,

    /// Number of times to try connecting to Consul
    #[arg(long)]
    pub connect_retries: Option<u32>,

    /// Seconds to wait between connection attempts
    #[arg(long)]
    pub connect_delay: Option<u64>,

    /// Consul namespace (Enterprise)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Consul datacenter
    #[arg(long)]
    pub datacenter: Option<String>,

    /// Optional settings file (TOML/YAML/JSON) with defaults for the flags above
    #[arg(short, long)]
    pub settings: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    pub json_logs: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // .env is optional
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level, args.json_logs) {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    info!("Starting Consul ZeroConf v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args)?;
    info!(mode = config.mode.flag(), address = %config.local.address, "Configuration loaded");

    let outcome = Workflow::new(&config, HttpDialer)
        .run()
        .await
        .with_context(|| format!("{} failed", config.mode.flag()))?;

    match outcome {
        Outcome::Provisioned => info!("ACL provisioning complete"),
        Outcome::AlreadyBootstrapped => info!("Nothing to do"),
        Outcome::Registered(report) => info!(
            service_id = %report.service_id,
            credential = report.credential.label(),
            "Node registration complete"
        ),
        Outcome::Deregistered(service_id) => info!(service_id = %service_id, "Node deregistration complete"),
    }

    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()?;
    }

    Ok(())
}
