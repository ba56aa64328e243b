//! Policy and token provisioning.
//!
//! Policies are ensured by name: a duplicate-name refusal from Consul is
//! answered by reading the existing policy back. Tokens are never reused;
//! every mint call creates a fresh secret.

use zeroconf_common::constants::{ANON_TOKEN_ID, policies};
use zeroconf_common::{AclPolicy, AclToken, NodeName, PolicyLink, Result, ZeroconfError};

use crate::consul::ConsulApi;
use crate::templates;

pub struct Provisioner<'a, S> {
    session: &'a S,
}

impl<'a, S: ConsulApi> Provisioner<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self { session }
    }

    /// Create the policy, or reuse the one already registered under `name`.
    pub async fn ensure_policy(
        &self,
        name: &str,
        description: &str,
        rules: &str,
    ) -> Result<AclPolicy> {
        let request = AclPolicy::new(name, description, rules);

        match self.session.policy_create(&request).await {
            Ok(policy) => {
                tracing::info!(policy = %policy.name, id = %policy.id, "Policy created");
                Ok(policy)
            }
            Err(e) if e.is_already_exists() => {
                let existing = self
                    .session
                    .policy_read_by_name(name)
                    .await?
                    .ok_or_else(|| ZeroconfError::NotFound(format!("policy {name}")))?;

                if existing.rules.trim() != rules.trim() {
                    tracing::warn!(
                        policy = %name,
                        "Existing policy rules differ from the template; leaving them untouched"
                    );
                }
                tracing::info!(policy = %name, id = %existing.id, "Policy already exists, reusing");
                Ok(existing)
            }
            Err(e) => Err(e),
        }
    }

    /// Mint a new token linked by name to `policy_names`
    pub async fn mint_token(&self, description: &str, policy_names: &[&str]) -> Result<AclToken> {
        let token = self
            .session
            .token_create(&AclToken::linked(description, policy_names))
            .await?;

        tracing::info!(
            accessor = %token.accessor_id,
            policies = ?policy_names,
            "Token created"
        );
        Ok(token)
    }

    /// Append policy links to an existing token, keeping the links it has.
    /// Names already linked are not added twice.
    pub async fn attach_policies_to_token(
        &self,
        accessor_id: &str,
        policy_names: &[&str],
    ) -> Result<AclToken> {
        let mut token = self.session.token_read(accessor_id).await?;

        let missing: Vec<&str> = policy_names
            .iter()
            .copied()
            .filter(|name| !token.has_policy(name))
            .collect();

        if missing.is_empty() {
            tracing::debug!(accessor = %accessor_id, "Token already carries requested policies");
            return Ok(token);
        }

        token
            .policies
            .extend(missing.iter().map(|name| PolicyLink::by_name(*name)));

        let updated = self.session.token_update(&token).await?;
        tracing::info!(accessor = %accessor_id, added = ?missing, "Token policies updated");
        Ok(updated)
    }

    /// Give the anonymous token read-only access to nodes and services
    pub async fn setup_anon_policies(&self) -> Result<AclToken> {
        tracing::info!("Updating anonymous token with sane defaults");

        let policy = self
            .ensure_policy(
                policies::ANON_MANAGEMENT,
                "Anonymous Management Policy that grants read-only access to Services & Nodes.",
                templates::ANON_POLICY,
            )
            .await?;

        self.attach_policies_to_token(ANON_TOKEN_ID, &[policy.name.as_str()])
            .await
    }

    /// Ensure `{prefix}{sanitized node}` and mint an agent token for it
    pub async fn setup_node_policy(&self, node: &NodeName, prefix: &str) -> Result<AclToken> {
        tracing::info!(node = %node, "Creating node policy");

        let rules = templates::node_policy(&node.sanitized())?;
        let policy_name = node.policy_name(prefix);

        let policy = self
            .ensure_policy(&policy_name, &format!("Agent Policy for node {node}"), &rules)
            .await?;

        self.mint_token(
            &format!("Agent Token for policy {}", policy.name),
            &[policy.name.as_str()],
        )
        .await
    }

    /// Ensure the registration policy and mint a token for joining nodes
    pub async fn setup_register_token(&self) -> Result<AclToken> {
        tracing::info!("Creating registration policy & token");

        let policy = self
            .ensure_policy(
                policies::CLUSTER_REGISTRATION,
                "Policy for cluster nodes to register with the ZeroConf server",
                templates::REGISTRATION_POLICY,
            )
            .await?;

        self.mint_token(
            &format!("Registration Token for policy {}", policy.name),
            &[policy.name.as_str()],
        )
        .await
    }
}
