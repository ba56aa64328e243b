//! HTTP adapter for the Consul API.
//!
//! Consul reports ACL bootstrap refusals and duplicate names only through
//! error message text. Those strings are matched here and nowhere else.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use zeroconf_common::constants::headers::X_CONSUL_TOKEN;
use zeroconf_common::{
    AclPolicy, AclToken, BootstrapReply, Result, ServiceRegistration, ZeroconfError,
};

use super::ConsulApi;
use crate::config::Endpoint;

/// Per-request timeout. Retry pacing is handled by the connector.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authenticated handle to one Consul endpoint
pub struct Session {
    address: String,
    namespace: Option<String>,
    datacenter: Option<String>,
    token: Option<String>,
    http: Client,
}

/// One entry of a `GET /v1/kv/<key>` response
#[derive(Debug, Deserialize)]
struct KvEntry {
    #[serde(rename = "Value")]
    value: Option<String>,
}

impl Session {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ZeroconfError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            address: base_url(&endpoint.address),
            namespace: endpoint.namespace.clone(),
            datacenter: endpoint.datacenter.clone(),
            token: endpoint.token.clone(),
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .http
            .request(method, format!("{}/v1/{}", self.address, path));

        if let Some(ref ns) = self.namespace {
            req = req.query(&[("ns", ns)]);
        }
        if let Some(ref dc) = self.datacenter {
            req = req.query(&[("dc", dc)]);
        }
        if let Some(ref token) = self.token {
            req = req.header(X_CONSUL_TOKEN, token);
        }

        req
    }

    /// Send without interpreting the status code
    async fn send_raw(&self, req: RequestBuilder) -> Result<Response> {
        req.send()
            .await
            .map_err(|e| ZeroconfError::Transport(format!("{}: {e}", self.address)))
    }

    /// Send and turn any non-2xx answer into a classified error
    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = self.send_raw(req).await?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(api_error(status, &body))
    }

    async fn json<T: DeserializeOwned>(&self, resp: Response) -> Result<T> {
        resp.json::<T>()
            .await
            .map_err(|e| ZeroconfError::Transport(format!("{}: invalid response: {e}", self.address)))
    }
}

#[async_trait]
impl ConsulApi for Session {
    fn address(&self) -> &str {
        &self.address
    }

    fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    async fn leader(&self) -> Result<String> {
        let resp = self.send(self.request(Method::GET, "status/leader")).await?;
        let leader: String = self.json(resp).await?;

        // An empty leader means the cluster has no quorum yet
        if leader.is_empty() {
            return Err(ZeroconfError::Transport(format!(
                "{}: no cluster leader elected",
                self.address
            )));
        }

        Ok(leader)
    }

    async fn acl_bootstrap(&self) -> Result<BootstrapReply> {
        let resp = self
            .send_raw(self.request(Method::PUT, "acl/bootstrap"))
            .await?;

        if resp.status().is_success() {
            return Ok(BootstrapReply::Issued(self.json(resp).await?));
        }

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();

        classify_bootstrap_refusal(&body).ok_or_else(|| api_error(status, &body))
    }

    async fn policy_create(&self, policy: &AclPolicy) -> Result<AclPolicy> {
        let resp = self
            .send(self.request(Method::PUT, "acl/policy").json(policy))
            .await?;
        self.json(resp).await
    }

    async fn policy_read_by_name(&self, name: &str) -> Result<Option<AclPolicy>> {
        let path = format!("acl/policy/name/{name}");
        match self.send(self.request(Method::GET, &path)).await {
            Ok(resp) => Ok(Some(self.json(resp).await?)),
            Err(ZeroconfError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn token_create(&self, token: &AclToken) -> Result<AclToken> {
        let resp = self
            .send(self.request(Method::PUT, "acl/token").json(token))
            .await?;
        self.json(resp).await
    }

    async fn token_read(&self, accessor_id: &str) -> Result<AclToken> {
        let path = format!("acl/token/{accessor_id}");
        let resp = self.send(self.request(Method::GET, &path)).await?;
        self.json(resp).await
    }

    async fn token_update(&self, token: &AclToken) -> Result<AclToken> {
        let path = format!("acl/token/{}", token.accessor_id);
        let resp = self
            .send(self.request(Method::PUT, &path).json(token))
            .await?;
        self.json(resp).await
    }

    async fn token_delete(&self, accessor_id: &str) -> Result<()> {
        let path = format!("acl/token/{accessor_id}");
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = format!("kv/{key}");
        let resp = match self.send(self.request(Method::GET, &path)).await {
            Ok(resp) => resp,
            Err(ZeroconfError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let entries: Vec<KvEntry> = self.json(resp).await?;
        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };

        match entry.value {
            Some(encoded) => STANDARD.decode(encoded).map(Some).map_err(|e| {
                ZeroconfError::Transport(format!("{}: bad KV value for {key}: {e}", self.address))
            }),
            None => Ok(Some(Vec::new())),
        }
    }

    async fn kv_put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = format!("kv/{key}");
        let resp = self
            .send(self.request(Method::PUT, &path).body(value.to_vec()))
            .await?;

        if !self.json::<bool>(resp).await? {
            return Err(ZeroconfError::Api {
                status: 200,
                message: format!("KV write to {key} was rejected"),
            });
        }

        Ok(())
    }

    async fn kv_put_cas(&self, key: &str, value: &[u8], index: u64) -> Result<bool> {
        let path = format!("kv/{key}");
        let resp = self
            .send(
                self.request(Method::PUT, &path)
                    .query(&[("cas", index)])
                    .body(value.to_vec()),
            )
            .await?;

        self.json(resp).await
    }

    async fn service_register(&self, service: &ServiceRegistration) -> Result<()> {
        self.send(
            self.request(Method::PUT, "agent/service/register")
                .json(service),
        )
        .await?;
        Ok(())
    }

    async fn service_deregister(&self, service_id: &str) -> Result<()> {
        let path = format!("agent/service/deregister/{service_id}");
        self.send(self.request(Method::PUT, &path)).await?;
        Ok(())
    }
}

/// Base URL for an address given as `host:port` or a full URL.
/// A missing scheme means plain `http`.
fn base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// Map a refused `PUT /v1/acl/bootstrap` body to a known outcome
fn classify_bootstrap_refusal(body: &str) -> Option<BootstrapReply> {
    if body.contains("ACL bootstrap no longer allowed") {
        Some(BootstrapReply::AlreadyBootstrapped)
    } else if body.contains("ACL support disabled") {
        Some(BootstrapReply::Disabled)
    } else if body.contains("ACL system is currently in legacy mode") {
        Some(BootstrapReply::LegacyMode)
    } else {
        None
    }
}

/// Map a non-2xx answer to the error taxonomy
fn api_error(status: u16, body: &str) -> ZeroconfError {
    let message = body.trim().to_string();

    if status == 404 || message.contains("ACL not found") {
        ZeroconfError::NotFound(message)
    } else if message.contains("already exists") {
        ZeroconfError::AlreadyExists(message)
    } else {
        ZeroconfError::Api { status, message }
    }
}
