//! Core types shared across ZeroConf components.
//!
//! Field names follow the Consul HTTP API (PascalCase on the wire).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Node identity as given by the operator (or the host name).
///
/// Consul accepts dots in node names, but policy rule identifiers and
/// service IDs are built from the sanitized form where every `.` is `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Raw name, used in KV paths and log output
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier-safe form used in policy names, rule text and service IDs
    pub fn sanitized(&self) -> String {
        sanitize_node_name(&self.0)
    }

    /// `{prefix}{sanitized}`, e.g. `Node-web_1`
    pub fn policy_name(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.sanitized())
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace every `.` with `_`
pub fn sanitize_node_name(name: &str) -> String {
    name.replace('.', "_")
}

/// Which bootstrap record a credential is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapScope {
    /// The local ZeroConf server (`bootstrap/self/*`)
    Server,
    /// A cluster bootstrapped against a ZeroConf registrar (`bootstrap/cluster/*`)
    Cluster,
}

impl BootstrapScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "self",
            Self::Cluster => "cluster",
        }
    }
}

/// Link from a token to a policy, by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyLink {
    /// Policy ID as reported by Consul (ignored when linking by name)
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "Name")]
    pub name: String,
}

impl PolicyLink {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

/// Named ACL policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclPolicy {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "Rules", default)]
    pub rules: String,
}

impl AclPolicy {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        rules: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description: description.into(),
            rules: rules.into(),
        }
    }
}

/// ACL token (credential)
///
/// Fields this tool does not manage (roles, service identities, ...) are
/// kept in `extra` so a read-modify-write round trip does not drop them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AclToken {
    #[serde(rename = "AccessorID", default, skip_serializing_if = "String::is_empty")]
    pub accessor_id: String,

    #[serde(rename = "SecretID", default, skip_serializing_if = "String::is_empty")]
    pub secret_id: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "Policies", default)]
    pub policies: Vec<PolicyLink>,

    #[serde(rename = "Local", default)]
    pub local: bool,

    #[serde(rename = "CreateTime", default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AclToken {
    /// Request body for minting a token linked to `policies` by name
    pub fn linked(description: impl Into<String>, policies: &[&str]) -> Self {
        Self {
            description: description.into(),
            policies: policies.iter().map(|p| PolicyLink::by_name(*p)).collect(),
            ..Default::default()
        }
    }

    /// Returns true if a link to `policy_name` is already present
    pub fn has_policy(&self, policy_name: &str) -> bool {
        self.policies.iter().any(|link| link.name == policy_name)
    }
}

/// Classified answer of the ACL bootstrap primitive
#[derive(Debug, Clone, PartialEq)]
pub enum BootstrapReply {
    /// A new management token was minted
    Issued(AclToken),
    /// Bootstrap was performed earlier; no new token
    AlreadyBootstrapped,
    /// ACLs are not enabled on the agent
    Disabled,
    /// ACL system still in legacy/transitional mode; try again later
    LegacyMode,
}

/// Agent service registration payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Port")]
    pub port: u16,
}

/// Contents of `zeroconf.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroConfFile {
    #[serde(rename = "Address")]
    pub address: String,

    #[serde(rename = "Token")]
    pub token: String,
}
