//! Shared constants for ZeroConf components.

/// Default Consul HTTP API address
pub const DEFAULT_CONSUL_ADDRESS: &str = "http://localhost:8500";

/// Default policy prefix for node policies
pub const DEFAULT_NODE_PREFIX: &str = "Node-";

/// Default Consul config directory
pub const DEFAULT_CONFIG_DIR: &str = "/consul/config/";

/// Default directory for the registration token file
pub const DEFAULT_ZEROCONF_DIR: &str = "/consul/zeroconf/";

/// Default number of connection attempts
pub const DEFAULT_CONNECT_RETRIES: u32 = 10;

/// Default pause between connection attempts (seconds)
pub const DEFAULT_CONNECT_DELAY_SECS: u64 = 5;

/// Ceiling on ACL bootstrap attempts while the server reports legacy mode.
/// Independent of the connect retry count.
pub const BOOTSTRAP_MAX_ATTEMPTS: u32 = 10;

/// Accessor ID of Consul's built-in anonymous token
pub const ANON_TOKEN_ID: &str = "00000000-0000-0000-0000-000000000002";

/// Raw gossip key length in bytes (before base64)
pub const GOSSIP_KEY_BYTES: usize = 32;

/// Service record every registered node advertises on the registrar
pub const CLUSTER_SERVICE_NAME: &str = "consul-cluster";

/// Port advertised with the cluster service record
pub const CLUSTER_SERVICE_PORT: u16 = 8500;

/// Well-known ACL policy names
pub mod policies {
    /// Read-only grants attached to the anonymous token
    pub const ANON_MANAGEMENT: &str = "anon-management";

    /// Grants used by joining nodes against the registrar
    pub const CLUSTER_REGISTRATION: &str = "cluster-registration";
}

/// KV layout
pub mod kv_keys {
    /// Bootstrap record root: bootstrap/{scope}/
    pub const BOOTSTRAP_PREFIX: &str = "bootstrap/";

    /// Node namespace placeholder and prefix: cluster/nodes/{node}/token
    pub const CLUSTER_NODES_PREFIX: &str = "cluster/nodes/";

    /// Shared gossip encryption key
    pub const GOSSIP_KEY: &str = "cluster/gossip_key";

    /// bootstrap/{scope}/complete
    pub fn bootstrap_complete(scope: &str) -> String {
        format!("{BOOTSTRAP_PREFIX}{scope}/complete")
    }

    /// bootstrap/{scope}/token
    pub fn bootstrap_token(scope: &str) -> String {
        format!("{BOOTSTRAP_PREFIX}{scope}/token")
    }

    /// cluster/nodes/{node}/token
    pub fn node_token(node_name: &str) -> String {
        format!("{CLUSTER_NODES_PREFIX}{node_name}/token")
    }
}

/// Local file names written into operator directories
pub mod files {
    /// ACL enablement fragment (config dir)
    pub const ACL_CONFIG: &str = "acl.hcl";

    /// Registration address/token (zeroconf dir)
    pub const ZEROCONF: &str = "zeroconf.json";

    /// Gossip encryption lockdown (config dir)
    pub const GOSSIP_CONFIG: &str = "gossip.hcl";
}

/// HTTP header names
pub mod headers {
    /// ACL token header understood by the Consul HTTP API
    pub const X_CONSUL_TOKEN: &str = "X-Consul-Token";
}

/// Environment variables that override their flag when set and non-empty
pub mod env_vars {
    pub const HTTP_ADDRESS: &str = "CONSUL_HTTP_ADDRESS";
    pub const HTTP_TOKEN: &str = "CONSUL_HTTP_TOKEN";
    pub const NODE_NAME: &str = "CONSUL_NODE_NAME";
    pub const NODE_PREFIX: &str = "CONSUL_NODE_PREFIX";
    pub const CONFIG_DIR: &str = "CONSUL_CONFIG_DIR";
    pub const ZEROCONF_ADDRESS: &str = "CONSUL_ZEROCONF_ADDRESS";
    pub const ZEROCONF_TOKEN: &str = "CONSUL_ZEROCONF_TOKEN";
}
