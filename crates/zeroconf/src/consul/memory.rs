//! In-memory Consul stand-in for tests.
//!
//! Clones share one backing store; each clone carries its own token, like
//! two sessions against the same agent.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use zeroconf_common::constants::ANON_TOKEN_ID;
use zeroconf_common::{
    AclPolicy, AclToken, BootstrapReply, PolicyLink, Result, ServiceRegistration, ZeroconfError,
};

use super::{ConsulApi, Dialer};
use crate::config::Endpoint;

#[derive(Default)]
struct Inner {
    acl_enabled: bool,
    bootstrapped: bool,
    leader_failures: u32,
    deny_policy_create: bool,
    required_token: Option<String>,
    bootstrap_script: VecDeque<BootstrapReply>,
    policies: BTreeMap<String, AclPolicy>,
    tokens: BTreeMap<String, AclToken>,
    kv: BTreeMap<String, Vec<u8>>,
    kv_writes: Vec<String>,
    services: BTreeMap<String, ServiceRegistration>,
    calls: Vec<&'static str>,
    next_id: u64,
}

impl Inner {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("id-{}", self.next_id)
    }

    fn mint(&mut self, mut token: AclToken) -> AclToken {
        token.accessor_id = self.next_id();
        token.secret_id = uuid::Uuid::new_v4().to_string();
        token.create_time = Some(chrono::Utc::now());
        self.tokens.insert(token.accessor_id.clone(), token.clone());
        token
    }
}

#[derive(Clone)]
pub struct MemoryConsul {
    address: String,
    token: Option<String>,
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for MemoryConsul {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConsul")
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl MemoryConsul {
    /// Fresh agent with ACLs enabled but not yet bootstrapped
    pub fn new(address: &str) -> Self {
        let mut inner = Inner {
            acl_enabled: true,
            ..Default::default()
        };
        inner.tokens.insert(
            ANON_TOKEN_ID.to_string(),
            AclToken {
                accessor_id: ANON_TOKEN_ID.to_string(),
                secret_id: "anonymous".to_string(),
                description: "Anonymous Token".to_string(),
                ..Default::default()
            },
        );

        Self {
            address: address.to_string(),
            token: None,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn disable_acl(&self) {
        self.lock().acl_enabled = false;
    }

    pub fn mark_bootstrapped(&self) {
        self.lock().bootstrapped = true;
    }

    /// Make the next `n` leader lookups fail
    pub fn fail_leader(&self, n: u32) {
        self.lock().leader_failures = n;
    }

    /// Refuse every policy creation with 403, like a token lacking `acl:write`
    pub fn deny_policy_create(&self) {
        self.lock().deny_policy_create = true;
    }

    /// Refuse ACL calls that do not carry `secret`, like a default-deny agent
    pub fn require_token(&self, secret: &str) {
        self.lock().required_token = Some(secret.to_string());
    }

    fn authorize(&self, inner: &Inner) -> Result<()> {
        match inner.required_token {
            Some(ref secret) if self.token.as_deref() != Some(secret.as_str()) => {
                Err(ZeroconfError::Api {
                    status: 403,
                    message: "Permission denied".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Answer the next bootstrap calls with these replies, in order
    pub fn script_bootstrap(&self, replies: impl IntoIterator<Item = BootstrapReply>) {
        self.lock().bootstrap_script.extend(replies);
    }

    pub fn current_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn policy(&self, name: &str) -> Option<AclPolicy> {
        self.lock().policies.get(name).cloned()
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.lock().policies.keys().cloned().collect()
    }

    /// Tokens minted through `token_create` or bootstrap (excludes anonymous)
    pub fn minted_tokens(&self) -> Vec<AclToken> {
        self.lock()
            .tokens
            .values()
            .filter(|t| t.accessor_id != ANON_TOKEN_ID)
            .cloned()
            .collect()
    }

    pub fn token(&self, accessor_id: &str) -> Option<AclToken> {
        self.lock().tokens.get(accessor_id).cloned()
    }

    pub fn kv(&self, key: &str) -> Option<String> {
        self.lock()
            .kv
            .get(key)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    /// Keys written, in write order (repeats included)
    pub fn kv_writes(&self) -> Vec<String> {
        self.lock().kv_writes.clone()
    }

    /// Seed a KV entry without recording it as a write
    pub fn seed_kv(&self, key: &str, value: &str) {
        self.lock().kv.insert(key.to_string(), value.as_bytes().to_vec());
    }

    /// Seed a policy without recording a call
    pub fn seed_policy(&self, name: &str, rules: &str) {
        let mut inner = self.lock();
        let id = inner.next_id();
        inner.policies.insert(
            name.to_string(),
            AclPolicy {
                id,
                ..AclPolicy::new(name, "seeded", rules)
            },
        );
    }

    pub fn service(&self, id: &str) -> Option<ServiceRegistration> {
        self.lock().services.get(id).cloned()
    }
}

#[async_trait]
impl ConsulApi for MemoryConsul {
    fn address(&self) -> &str {
        &self.address
    }

    fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    async fn leader(&self) -> Result<String> {
        let mut inner = self.lock();
        inner.calls.push("leader");
        if inner.leader_failures > 0 {
            inner.leader_failures -= 1;
            return Err(ZeroconfError::Transport(format!(
                "{}: connection refused",
                self.address
            )));
        }
        Ok("10.0.0.1:8300".to_string())
    }

    async fn acl_bootstrap(&self) -> Result<BootstrapReply> {
        let mut inner = self.lock();
        inner.calls.push("acl_bootstrap");

        if let Some(reply) = inner.bootstrap_script.pop_front() {
            return Ok(reply);
        }
        if !inner.acl_enabled {
            return Ok(BootstrapReply::Disabled);
        }
        if inner.bootstrapped {
            return Ok(BootstrapReply::AlreadyBootstrapped);
        }

        inner.bootstrapped = true;
        let token = inner.mint(AclToken {
            description: "Bootstrap Token (Global Management)".to_string(),
            policies: vec![PolicyLink::by_name("global-management")],
            ..Default::default()
        });
        Ok(BootstrapReply::Issued(token))
    }

    async fn policy_create(&self, policy: &AclPolicy) -> Result<AclPolicy> {
        let mut inner = self.lock();
        inner.calls.push("policy_create");
        self.authorize(&inner)?;

        if inner.deny_policy_create {
            return Err(ZeroconfError::Api {
                status: 403,
                message: "Permission denied: token lacks permission 'acl:write'".to_string(),
            });
        }
        if inner.policies.contains_key(&policy.name) {
            return Err(ZeroconfError::AlreadyExists(format!(
                "Invalid Policy: A Policy with Name {:?} already exists",
                policy.name
            )));
        }

        let mut created = policy.clone();
        created.id = inner.next_id();
        inner.policies.insert(created.name.clone(), created.clone());
        Ok(created)
    }

    async fn policy_read_by_name(&self, name: &str) -> Result<Option<AclPolicy>> {
        let mut inner = self.lock();
        inner.calls.push("policy_read_by_name");
        self.authorize(&inner)?;
        Ok(inner.policies.get(name).cloned())
    }

    async fn token_create(&self, token: &AclToken) -> Result<AclToken> {
        let mut inner = self.lock();
        inner.calls.push("token_create");
        self.authorize(&inner)?;

        if let Some(link) = token
            .policies
            .iter()
            .find(|link| !inner.policies.contains_key(&link.name))
        {
            return Err(ZeroconfError::Api {
                status: 400,
                message: format!("cannot find policy {}", link.name),
            });
        }

        Ok(inner.mint(token.clone()))
    }

    async fn token_read(&self, accessor_id: &str) -> Result<AclToken> {
        let mut inner = self.lock();
        inner.calls.push("token_read");
        self.authorize(&inner)?;
        inner
            .tokens
            .get(accessor_id)
            .cloned()
            .ok_or_else(|| ZeroconfError::NotFound("ACL not found".to_string()))
    }

    async fn token_update(&self, token: &AclToken) -> Result<AclToken> {
        let mut inner = self.lock();
        inner.calls.push("token_update");
        self.authorize(&inner)?;

        if !inner.tokens.contains_key(&token.accessor_id) {
            return Err(ZeroconfError::NotFound("ACL not found".to_string()));
        }
        inner
            .tokens
            .insert(token.accessor_id.clone(), token.clone());
        Ok(token.clone())
    }

    async fn token_delete(&self, accessor_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push("token_delete");
        self.authorize(&inner)?;
        inner.tokens.remove(accessor_id);
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.lock();
        inner.calls.push("kv_get");
        Ok(inner.kv.get(key).cloned())
    }

    async fn kv_put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push("kv_put");
        inner.kv.insert(key.to_string(), value.to_vec());
        inner.kv_writes.push(key.to_string());
        Ok(())
    }

    async fn kv_put_cas(&self, key: &str, value: &[u8], index: u64) -> Result<bool> {
        let mut inner = self.lock();
        inner.calls.push("kv_put_cas");

        // Only create-if-absent is modelled
        if index != 0 || inner.kv.contains_key(key) {
            return Ok(false);
        }
        inner.kv.insert(key.to_string(), value.to_vec());
        inner.kv_writes.push(key.to_string());
        Ok(true)
    }

    async fn service_register(&self, service: &ServiceRegistration) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push("service_register");
        inner.services.insert(service.id.clone(), service.clone());
        Ok(())
    }

    async fn service_deregister(&self, service_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push("service_deregister");
        inner.services.remove(service_id);
        Ok(())
    }
}

/// Hands out clones of pre-registered agents by address
#[derive(Clone, Default)]
pub struct MemoryDialer {
    agents: HashMap<String, MemoryConsul>,
    dials: Arc<Mutex<Vec<String>>>,
}

impl MemoryDialer {
    pub fn with(mut self, agent: &MemoryConsul) -> Self {
        self.agents.insert(agent.address.clone(), agent.clone());
        self
    }

    /// Addresses dialed so far
    pub fn dials(&self) -> Vec<String> {
        self.dials.lock().unwrap().clone()
    }
}

impl Dialer for MemoryDialer {
    type Session = MemoryConsul;

    fn dial(&self, endpoint: &Endpoint) -> Result<MemoryConsul> {
        self.dials.lock().unwrap().push(endpoint.address.clone());

        let mut session = self
            .agents
            .get(&endpoint.address)
            .cloned()
            .ok_or_else(|| ZeroconfError::Transport(format!("{}: no route", endpoint.address)))?;
        session.token = endpoint.token.clone();
        Ok(session)
    }
}
