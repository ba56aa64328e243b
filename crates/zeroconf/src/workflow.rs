//! The four top-level modes.
//!
//! ```text
//! connect ─▶ negotiate ─▶ provision ─▶ cluster state   (bootstrap-server)
//!                                 └──▶ registrar record (bootstrap-cluster)
//! connect local + registrar ─▶ credential ─▶ service     (register-node)
//! connect registrar ─▶ remove service                    (deregister-node)
//! ```
//!
//! Steps run strictly in order; the first failure ends the run.

use zeroconf_common::constants::files;
use zeroconf_common::{AclToken, BootstrapScope, Result};

use crate::bootstrap::{
    ClusterStateInitializer, Negotiated, Negotiator, Provisioner, save_bootstrap_record,
};
use crate::config::{AppConfig, Mode};
use crate::consul::{ConsulApi, Dialer, open};
use crate::files::{save_config, save_zeroconf_file};
use crate::registration::{self, Registration, RegistrationReport};
use crate::templates;

/// Credential the local session ended up with
#[derive(Debug)]
enum Credential {
    /// Minted by this run's ACL bootstrap
    Fresh(AclToken),
    /// Supplied with --bootstrap-token
    Supplied,
    /// Bootstrap done earlier and no token supplied
    None,
}

/// What a run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// ACLs provisioned
    Provisioned,
    /// Endpoint already bootstrapped; no ACL work done
    AlreadyBootstrapped,
    Registered(RegistrationReport),
    Deregistered(String),
}

pub struct Workflow<'a, D> {
    config: &'a AppConfig,
    dialer: D,
}

impl<'a, D: Dialer> Workflow<'a, D> {
    pub fn new(config: &'a AppConfig, dialer: D) -> Self {
        Self { config, dialer }
    }

    pub async fn run(&self) -> Result<Outcome> {
        match self.config.mode {
            Mode::BootstrapServer => self.bootstrap_server().await,
            Mode::BootstrapCluster => self.bootstrap_cluster().await,
            Mode::RegisterNode => self.register_node().await,
            Mode::DeregisterNode => self.deregister_node().await,
        }
    }

    /// Connect to the local agent and settle its credential
    async fn bootstrap_common(&self) -> Result<(D::Session, Credential)> {
        let mut local = open(&self.dialer, &self.config.local, &self.config.retry).await?;

        if let Some(ref token) = self.config.bootstrap_token {
            tracing::info!("Token provided. Skipping ACL bootstrap");
            local.set_token(token);
            return Ok((local, Credential::Supplied));
        }

        match Negotiator::new(self.config.retry.delay)
            .negotiate(&local)
            .await?
        {
            Negotiated::NewCredential(token) => {
                local.set_token(&token.secret_id);
                Ok((local, Credential::Fresh(token)))
            }
            Negotiated::AlreadyBootstrapped => Ok((local, Credential::None)),
        }
    }

    async fn bootstrap_server(&self) -> Result<Outcome> {
        let (local, credential) = self.bootstrap_common().await?;

        match credential {
            Credential::None => {
                tracing::info!("No new ACL work: server was already bootstrapped");
                return Ok(Outcome::AlreadyBootstrapped);
            }
            Credential::Fresh(ref token) => {
                save_bootstrap_record(&local, BootstrapScope::Server, token).await?;
            }
            Credential::Supplied => {}
        }

        let provisioner = Provisioner::new(&local);
        provisioner.setup_anon_policies().await?;

        let node_token = provisioner
            .setup_node_policy(&self.config.node_name, &self.config.node_prefix)
            .await?;
        tracing::info!(dir = %self.config.config_dir.display(), "Updating ACL config");
        save_config(
            &self.config.config_dir,
            files::ACL_CONFIG,
            &templates::acl_config(&node_token.secret_id)?,
        )
        .await?;

        let reg_token = provisioner.setup_register_token().await?;
        tracing::info!(dir = %self.config.zeroconf_dir.display(), "Saving registration token");
        save_zeroconf_file(
            &self.config.zeroconf_dir,
            files::ZEROCONF,
            "",
            &reg_token.secret_id,
        )
        .await?;
        tracing::warn!(secret = %reg_token.secret_id, "(Sensitive) Service registration token");

        ClusterStateInitializer::new(&local)
            .initialize(&self.config.config_dir)
            .await?;

        tracing::info!(
            "ZeroConf server bootstrap finished. A restart may be required for all ACL configurations to work"
        );
        Ok(Outcome::Provisioned)
    }

    async fn bootstrap_cluster(&self) -> Result<Outcome> {
        let (local, credential) = self.bootstrap_common().await?;

        match credential {
            Credential::None => {
                tracing::info!("No new ACL work: cluster was already bootstrapped");
                return Ok(Outcome::AlreadyBootstrapped);
            }
            Credential::Fresh(ref token) => {
                let registrar =
                    open(&self.dialer, self.config.registrar()?, &self.config.retry).await?;
                save_bootstrap_record(&registrar, BootstrapScope::Cluster, token).await?;
            }
            Credential::Supplied => {}
        }

        Provisioner::new(&local).setup_anon_policies().await?;

        tracing::info!(
            "ZeroConf cluster bootstrap finished. A restart may be required for all ACL configurations to work"
        );
        Ok(Outcome::Provisioned)
    }

    async fn register_node(&self) -> Result<Outcome> {
        let registrar_endpoint = self.config.registrar()?;

        let local = open(&self.dialer, &self.config.local, &self.config.retry).await?;
        let registrar = open(&self.dialer, registrar_endpoint, &self.config.retry).await?;

        let report = Registration::new(
            &local,
            &registrar,
            &self.config.node_name,
            &self.config.node_prefix,
        )
        .register()
        .await?;

        Ok(Outcome::Registered(report))
    }

    async fn deregister_node(&self) -> Result<Outcome> {
        let registrar = open(&self.dialer, self.config.registrar()?, &self.config.retry).await?;
        let service_id = registration::deregister(&registrar, &self.config.node_name).await?;

        Ok(Outcome::Deregistered(service_id))
    }
}
