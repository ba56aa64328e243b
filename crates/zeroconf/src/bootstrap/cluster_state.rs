//! Cluster bootstrap markers and shared secrets in the KV store.

use base64::{Engine, engine::general_purpose::STANDARD};
use rand::Rng;
use std::path::{Path, PathBuf};

use zeroconf_common::constants::{GOSSIP_KEY_BYTES, files, kv_keys};
use zeroconf_common::{AclToken, BootstrapScope, Result};

use crate::consul::ConsulApi;
use crate::{files as local_files, templates};

/// Base64 of 32 random bytes. Generated once per run and shared by the KV
/// entry and the local `gossip.hcl`.
#[derive(Clone, PartialEq, Eq)]
pub struct GossipKey(String);

impl GossipKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; GOSSIP_KEY_BYTES];
        rand::rng().fill(&mut bytes);
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8; GOSSIP_KEY_BYTES]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for GossipKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GossipKey(..)")
    }
}

/// Store the bootstrap credential under `bootstrap/{scope}/complete` (token
/// metadata as JSON) and `bootstrap/{scope}/token` (raw secret).
pub async fn save_bootstrap_record<S: ConsulApi>(
    session: &S,
    scope: BootstrapScope,
    token: &AclToken,
) -> Result<()> {
    tracing::info!(scope = scope.as_str(), "Saving bootstrap token to KV store");

    let record = local_files::to_tab_json(token)?;
    session
        .kv_put(&kv_keys::bootstrap_complete(scope.as_str()), record.as_bytes())
        .await?;
    session
        .kv_put(
            &kv_keys::bootstrap_token(scope.as_str()),
            token.secret_id.as_bytes(),
        )
        .await
}

/// Writes the cluster skeleton and gossip key
pub struct ClusterStateInitializer<'a, S> {
    session: &'a S,
}

impl<'a, S: ConsulApi> ClusterStateInitializer<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self { session }
    }

    /// Write the KV skeleton and lock down local gossip with one fresh key.
    pub async fn initialize(&self, config_dir: &Path) -> Result<(GossipKey, PathBuf)> {
        let key = GossipKey::generate();

        self.write_cluster_kv(&key).await?;
        let path = lock_down_node_joining(config_dir, &key).await?;

        Ok((key, path))
    }

    /// The four cluster entries, each a full overwrite
    async fn write_cluster_kv(&self, key: &GossipKey) -> Result<()> {
        tracing::info!("Setting up cluster structure in KV store");

        let cluster = BootstrapScope::Cluster.as_str();
        self.session
            .kv_put(&kv_keys::bootstrap_complete(cluster), b"{}")
            .await?;
        self.session
            .kv_put(&kv_keys::bootstrap_token(cluster), b"")
            .await?;
        self.session
            .kv_put(kv_keys::CLUSTER_NODES_PREFIX, b"")
            .await?;
        self.session
            .kv_put(kv_keys::GOSSIP_KEY, key.as_str().as_bytes())
            .await
    }
}

/// Write `gossip.hcl` enabling membership encryption with `key`
async fn lock_down_node_joining(config_dir: &Path, key: &GossipKey) -> Result<PathBuf> {
    tracing::info!("Locking down the node from (possible) rogue nodes");

    let body = templates::gossip_config(key.as_str())?;
    local_files::save_config(config_dir, files::GOSSIP_CONFIG, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consul::memory::MemoryConsul;

    #[test]
    fn test_gossip_key_is_32_bytes() {
        for _ in 0..8 {
            let key = GossipKey::generate();
            let raw = STANDARD.decode(key.as_str()).unwrap();
            assert_eq!(raw.len(), 32);
        }
    }

    #[test]
    fn test_gossip_keys_differ() {
        assert_ne!(GossipKey::generate(), GossipKey::generate());
    }

    #[tokio::test]
    async fn test_initialize_writes_four_entries_and_matching_local_key() {
        let consul = MemoryConsul::new("http://local:8500");
        let dir = tempfile::tempdir().unwrap();

        let (key, path) = ClusterStateInitializer::new(&consul)
            .initialize(dir.path())
            .await
            .unwrap();

        assert_eq!(
            consul.kv_writes(),
            vec![
                "bootstrap/cluster/complete",
                "bootstrap/cluster/token",
                "cluster/nodes/",
                "cluster/gossip_key",
            ]
        );

        let stored = consul.kv("cluster/gossip_key").unwrap();
        assert_eq!(stored, key.as_str());

        let local = std::fs::read_to_string(path).unwrap();
        assert_eq!(local, format!("encrypt = \"{stored}\""));
    }

    #[tokio::test]
    async fn test_bootstrap_record_layout() {
        let consul = MemoryConsul::new("http://local:8500");
        let token = AclToken {
            accessor_id: "acc".into(),
            secret_id: "sec".into(),
            description: "Bootstrap Token".into(),
            ..Default::default()
        };

        save_bootstrap_record(&consul, BootstrapScope::Server, &token)
            .await
            .unwrap();

        assert_eq!(consul.kv("bootstrap/self/token").unwrap(), "sec");
        let record: AclToken =
            serde_json::from_str(&consul.kv("bootstrap/self/complete").unwrap()).unwrap();
        assert_eq!(record.accessor_id, "acc");
    }
}
