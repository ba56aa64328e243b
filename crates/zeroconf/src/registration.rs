//! Node registration against a ZeroConf registrar.
//!
//! A node is "registered" once its token secret sits at
//! `cluster/nodes/{node}/token` on the registrar. That key is written with a
//! create-if-absent check-and-set, so two processes registering the same
//! node cannot both publish a credential: the loser deletes the token it
//! minted and adopts the stored one.

use zeroconf_common::constants::{CLUSTER_SERVICE_NAME, CLUSTER_SERVICE_PORT, kv_keys};
use zeroconf_common::{NodeName, Result, ServiceRegistration, ZeroconfError};

use crate::bootstrap::Provisioner;
use crate::consul::ConsulApi;

/// How the node credential was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialOutcome {
    /// Node policy already present locally; nothing minted
    AlreadyRegistered,
    /// New credential minted and published
    Published,
    /// Another registrant published first; local credential discarded in
    /// favour of the stored secret
    LostRace { stored: String },
}

impl CredentialOutcome {
    /// Short label for logs; never includes the secret
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered => "already-registered",
            Self::Published => "published",
            Self::LostRace { .. } => "lost-race",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReport {
    pub service_id: String,
    pub credential: CredentialOutcome,
}

pub struct Registration<'a, L, R> {
    local: &'a L,
    registrar: &'a R,
    node: &'a NodeName,
    prefix: &'a str,
}

impl<'a, L: ConsulApi, R: ConsulApi> Registration<'a, L, R> {
    pub fn new(local: &'a L, registrar: &'a R, node: &'a NodeName, prefix: &'a str) -> Self {
        Self {
            local,
            registrar,
            node,
            prefix,
        }
    }

    /// Publish the node credential (once) and advertise the service record
    pub async fn register(&self) -> Result<RegistrationReport> {
        let credential = self.ensure_credential().await?;
        let service_id = register_service(self.registrar, self.node).await?;

        Ok(RegistrationReport {
            service_id,
            credential,
        })
    }

    async fn ensure_credential(&self) -> Result<CredentialOutcome> {
        let policy_name = self.node.policy_name(self.prefix);

        if self
            .local
            .policy_read_by_name(&policy_name)
            .await?
            .is_some()
        {
            tracing::info!(node = %self.node, policy = %policy_name, "Node policy exists, skipping credential");
            return Ok(CredentialOutcome::AlreadyRegistered);
        }

        tracing::info!(node = %self.node, registrar = %self.registrar.address(), "Registering node with ZeroConf server");

        let token = Provisioner::new(self.local)
            .setup_node_policy(self.node, self.prefix)
            .await?;

        let key = kv_keys::node_token(self.node.as_str());
        let published = self
            .registrar
            .kv_put_cas(&key, token.secret_id.as_bytes(), 0)
            .await?;

        if published {
            tracing::info!(node = %self.node, key = %key, "Registered node with ZeroConf server");
            return Ok(CredentialOutcome::Published);
        }

        tracing::warn!(
            node = %self.node,
            key = %key,
            accessor = %token.accessor_id,
            "Node credential already published by another registrant, discarding ours"
        );
        self.local.token_delete(&token.accessor_id).await?;

        let stored = self
            .registrar
            .kv_get(&key)
            .await?
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ZeroconfError::NotFound(format!("{key} on {}", self.registrar.address()))
            })?;
        tracing::info!(node = %self.node, key = %key, "Using credential stored on ZeroConf server");

        Ok(CredentialOutcome::LostRace { stored })
    }
}

/// Advertise `consul-cluster` for this node on the registrar agent
async fn register_service<R: ConsulApi>(registrar: &R, node: &NodeName) -> Result<String> {
    let service = ServiceRegistration {
        id: node.sanitized(),
        name: CLUSTER_SERVICE_NAME.to_string(),
        port: CLUSTER_SERVICE_PORT,
    };

    registrar.service_register(&service).await?;
    tracing::info!(service_id = %service.id, "Registered service with ZeroConf server");

    Ok(service.id)
}

/// Remove this node's service record from the registrar agent
pub async fn deregister<R: ConsulApi>(registrar: &R, node: &NodeName) -> Result<String> {
    let service_id = node.sanitized();

    registrar.service_deregister(&service_id).await?;
    tracing::info!(node = %node, service_id = %service_id, "Node deregistered from ZeroConf server");

    Ok(service_id)
}
