//! Configuration management for ZeroConf.
//!
//! Each value is taken from the first non-empty source: the `CONSUL_*`
//! environment variable (where one exists), then the flag, then the optional
//! settings file, then the built-in default. The result is frozen into one
//! [`AppConfig`] that every component receives explicitly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use zeroconf_common::NodeName;
use zeroconf_common::ZeroconfError;
use zeroconf_common::constants::{
    DEFAULT_CONFIG_DIR, DEFAULT_CONNECT_DELAY_SECS, DEFAULT_CONNECT_RETRIES,
    DEFAULT_CONSUL_ADDRESS, DEFAULT_NODE_PREFIX, DEFAULT_ZEROCONF_DIR, env_vars,
};

/// Top-level operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    BootstrapServer,
    BootstrapCluster,
    RegisterNode,
    DeregisterNode,
}

impl Mode {
    pub fn flag(&self) -> &'static str {
        match self {
            Self::BootstrapServer => "--bootstrap-server",
            Self::BootstrapCluster => "--bootstrap-cluster",
            Self::RegisterNode => "--register-node",
            Self::DeregisterNode => "--deregister-node",
        }
    }

    /// Modes that talk to the ZeroConf registrar
    pub fn needs_registrar(&self) -> bool {
        !matches!(self, Self::BootstrapServer)
    }
}

/// Address and identity for one Consul endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: String,
    pub token: Option<String>,
    pub namespace: Option<String>,
    pub datacenter: Option<String>,
}

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: None,
            namespace: None,
            datacenter: None,
        }
    }
}

/// Fixed-delay retry budget for connecting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Resolved, validated configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: Mode,

    /// Local Consul agent, with the operator's token if one was given
    pub local: Endpoint,

    /// ZeroConf registrar; always set for modes that need it
    pub registrar: Option<Endpoint>,

    pub node_name: NodeName,

    /// Prefix for node policy names
    pub node_prefix: String,

    /// Where acl.hcl and gossip.hcl go
    pub config_dir: PathBuf,

    /// Where zeroconf.json goes
    pub zeroconf_dir: PathBuf,

    /// Pre-existing management token; skips ACL bootstrap when set
    pub bootstrap_token: Option<String>,

    pub retry: RetryPolicy,
}

/// Optional settings file. Every field is a fallback for the matching flag.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    address: Option<String>,
    token: Option<String>,
    node_name: Option<String>,
    node_prefix: Option<String>,
    config_dir: Option<String>,
    zeroconf_address: Option<String>,
    zeroconf_token: Option<String>,
    zeroconf_dir: Option<PathBuf>,
    connect_retries: Option<u32>,
    connect_delay_secs: Option<u64>,
    namespace: Option<String>,
    datacenter: Option<String>,
}

impl FileSettings {
    fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            tracing::warn!(path, "Settings file not found, using flags and defaults only");
            return Ok(Self::default());
        }

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .context("Failed to load settings file")?;

        settings
            .try_deserialize()
            .context("Failed to parse settings file")
    }
}

impl AppConfig {
    /// Build the configuration from parsed arguments, the process
    /// environment and the settings file (if any)
    pub fn load(args: &crate::Args) -> Result<Self> {
        Self::from_sources(args, |name| std::env::var(name).ok())
    }

    /// Same as [`AppConfig::load`] with an explicit environment lookup
    pub fn from_sources(args: &crate::Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = match args.settings {
            Some(ref path) => FileSettings::load(path)?,
            None => FileSettings::default(),
        };

        let mode = select_mode(args)?;

        let node_name = match layered(
            env(env_vars::NODE_NAME),
            args.node_name.clone(),
            file.node_name,
        ) {
            Some(name) => {
                tracing::info!(node = %name, "Node name set");
                name
            }
            None => {
                let name = host_name()?;
                tracing::info!(node = %name, "Defaulting node name to hostname");
                name
            }
        };

        let namespace = layered(None, args.namespace.clone(), file.namespace);
        let datacenter = layered(None, args.datacenter.clone(), file.datacenter);

        let local = Endpoint {
            address: layered(env(env_vars::HTTP_ADDRESS), args.address.clone(), file.address)
                .unwrap_or_else(|| DEFAULT_CONSUL_ADDRESS.to_string()),
            token: layered(env(env_vars::HTTP_TOKEN), args.token.clone(), file.token),
            namespace,
            datacenter,
        };

        let zeroconf_address = layered(
            env(env_vars::ZEROCONF_ADDRESS),
            args.zeroconf_address.clone(),
            file.zeroconf_address,
        );
        let zeroconf_token = layered(
            env(env_vars::ZEROCONF_TOKEN),
            args.zeroconf_token.clone(),
            file.zeroconf_token,
        );

        let registrar = match (zeroconf_address, zeroconf_token) {
            (Some(address), Some(token)) => Some(Endpoint {
                token: Some(token),
                ..Endpoint::new(address)
            }),
            _ => None,
        };

        if mode.needs_registrar() && registrar.is_none() {
            return Err(ZeroconfError::Config(format!(
                "--zeroconf-address and --zeroconf-token are required when using {}. One or both are missing.",
                mode.flag()
            ))
            .into());
        }

        let retry = RetryPolicy {
            max_attempts: args
                .connect_retries
                .or(file.connect_retries)
                .unwrap_or(DEFAULT_CONNECT_RETRIES),
            delay: Duration::from_secs(
                args.connect_delay
                    .or(file.connect_delay_secs)
                    .unwrap_or(DEFAULT_CONNECT_DELAY_SECS),
            ),
        };

        if retry.max_attempts == 0 {
            return Err(ZeroconfError::Config("--connect-retries must be at least 1".into()).into());
        }

        Ok(Self {
            mode,
            local,
            registrar,
            node_name: NodeName::new(node_name),
            node_prefix: layered(
                env(env_vars::NODE_PREFIX),
                args.node_prefix.clone(),
                file.node_prefix,
            )
            .unwrap_or_else(|| DEFAULT_NODE_PREFIX.to_string()),
            config_dir: PathBuf::from(
                layered(env(env_vars::CONFIG_DIR), args.config_dir.clone(), file.config_dir)
                    .unwrap_or_else(|| DEFAULT_CONFIG_DIR.to_string()),
            ),
            zeroconf_dir: args
                .zeroconf_dir
                .clone()
                .or(file.zeroconf_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ZEROCONF_DIR)),
            bootstrap_token: layered(None, args.bootstrap_token.clone(), None),
            retry,
        })
    }

    /// Registrar endpoint, or a config error if this mode was built without one
    pub fn registrar(&self) -> zeroconf_common::Result<&Endpoint> {
        self.registrar.as_ref().ok_or_else(|| {
            ZeroconfError::Config("--zeroconf-address and --zeroconf-token are required".into())
        })
    }
}

/// Exactly one mode flag must be set
fn select_mode(args: &crate::Args) -> Result<Mode> {
    let selected: Vec<Mode> = [
        (args.bootstrap_server, Mode::BootstrapServer),
        (args.bootstrap_cluster, Mode::BootstrapCluster),
        (args.register_node, Mode::RegisterNode),
        (args.deregister_node, Mode::DeregisterNode),
    ]
    .into_iter()
    .filter_map(|(set, mode)| set.then_some(mode))
    .collect();

    match selected.as_slice() {
        [mode] => Ok(*mode),
        [] => Err(ZeroconfError::Config(
            "one of --bootstrap-server, --bootstrap-cluster, --register-node or --deregister-node is required"
                .into(),
        )
        .into()),
        [first, second, ..] => Err(ZeroconfError::Config(format!(
            "Cannot specify both {} and {}",
            first.flag(),
            second.flag()
        ))
        .into()),
    }
}

/// First non-blank value in precedence order: environment, flag, settings file.
/// An empty value counts as unset.
fn layered(env: Option<String>, flag: Option<String>, file: Option<String>) -> Option<String> {
    [env, flag, file]
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
}

/// Kernel host name, used when no node name is configured
fn host_name() -> Result<String> {
    let name = hostname::get().context("Unable to determine node name from host name")?;
    let name = name.to_string_lossy().trim().to_string();

    if name.is_empty() {
        return Err(
            ZeroconfError::Config("no --node-name given and the host name is empty".into()).into(),
        );
    }

    Ok(name)
}
