//! Consul client capability.
//!
//! Everything above this module talks to Consul through [`ConsulApi`].
//! The HTTP adapter ([`Session`]) is the only place raw status codes and
//! error bodies are interpreted.

mod connector;
#[cfg(test)]
pub mod memory;
mod session;

pub use connector::{Dialer, HttpDialer, open};
pub use session::Session;

use async_trait::async_trait;
use zeroconf_common::{AclPolicy, AclToken, BootstrapReply, Result, ServiceRegistration};

/// Operations this tool needs from one Consul endpoint.
#[async_trait]
pub trait ConsulApi: Send + Sync {
    /// Address this session talks to (for logs and errors)
    fn address(&self) -> &str;

    /// Replace the credential sent with every request
    fn set_token(&mut self, token: &str);

    /// Liveness check: current Raft leader address
    async fn leader(&self) -> Result<String>;

    /// One ACL bootstrap attempt. Known refusals come back as `Ok`
    /// variants; anything unclassified is an `Err`.
    async fn acl_bootstrap(&self) -> Result<BootstrapReply>;

    /// Create a policy. A duplicate name yields `ZeroconfError::AlreadyExists`.
    async fn policy_create(&self, policy: &AclPolicy) -> Result<AclPolicy>;

    async fn policy_read_by_name(&self, name: &str) -> Result<Option<AclPolicy>>;

    async fn token_create(&self, token: &AclToken) -> Result<AclToken>;

    async fn token_read(&self, accessor_id: &str) -> Result<AclToken>;

    async fn token_update(&self, token: &AclToken) -> Result<AclToken>;

    async fn token_delete(&self, accessor_id: &str) -> Result<()>;

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn kv_put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Check-and-set write. Index 0 means create-if-absent.
    /// Returns false when the index did not match.
    async fn kv_put_cas(&self, key: &str, value: &[u8], index: u64) -> Result<bool>;

    async fn service_register(&self, service: &ServiceRegistration) -> Result<()>;

    async fn service_deregister(&self, service_id: &str) -> Result<()>;
}
