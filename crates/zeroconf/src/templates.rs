//! Policy rule bodies and config fragments.
//!
//! Templates use `{{name}}` placeholders. Rendering fails if a placeholder
//! has no value, so a typo never reaches Consul as literal braces.

use zeroconf_common::{Result, ZeroconfError};

/// Read-only access to nodes and services, no KV access.
pub const ANON_POLICY: &str = r#"node_prefix "" {
  policy = "read"
}
service_prefix "" {
  policy = "read"
}
key_prefix "" {
  policy = "deny"
}
"#;

/// Agent grants for a single node. `name` is the sanitized node name.
pub const NODE_POLICY: &str = r#"node "{{name}}" {
  policy = "write"
}
agent "{{name}}" {
  policy = "write"
}
service_prefix "" {
  policy = "read"
}
key_prefix "_rexec" {
  policy = "write"
}
"#;

/// What a joining node needs on the registrar.
pub const REGISTRATION_POLICY: &str = r#"service "consul-cluster" {
  policy = "write"
}
key_prefix "cluster/nodes" {
  policy = "write"
}
service_prefix "" {
  policy = "read"
}
node_prefix "" {
  policy = "read"
}
"#;

/// Agent ACL enablement fragment (`acl.hcl`).
pub const ACL_CONFIG: &str = r#"acl {
  enabled                  = true
  default_policy           = "deny"
  enable_token_persistence = true

  tokens {
    agent = "{{agent_token}}"
  }
}"#;

/// Gossip encryption fragment (`gossip.hcl`).
pub const GOSSIP_CONFIG: &str = r#"encrypt = "{{key}}""#;

/// Substitute `{{key}}` placeholders in `body` with values from `vars`.
pub fn render(name: &str, body: &str, vars: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            ZeroconfError::Template(format!("{name}: unterminated placeholder"))
        })?;

        let key = after[..end].trim();
        let value = vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| ZeroconfError::Template(format!("{name}: no value for '{key}'")))?;

        out.push_str(value);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

pub fn node_policy(sanitized_node: &str) -> Result<String> {
    render("NodePolicy", NODE_POLICY, &[("name", sanitized_node)])
}

pub fn acl_config(agent_token: &str) -> Result<String> {
    render("AclConfig", ACL_CONFIG, &[("agent_token", agent_token)])
}

pub fn gossip_config(key: &str) -> Result<String> {
    render("GossipConfig", GOSSIP_CONFIG, &[("key", key)])
}
