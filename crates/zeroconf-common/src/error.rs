//! Common error types for ZeroConf components.

use thiserror::Error;

/// Result alias used across ZeroConf components
pub type Result<T, E = ZeroconfError> = std::result::Result<T, E>;

/// Common errors across ZeroConf components
#[derive(Debug, Error)]
pub enum ZeroconfError {
    /// Configuration error (missing or conflicting flags)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection-level failure talking to Consul
    #[error("Transport error: {0}")]
    Transport(String),

    /// Consul answered with a non-success status
    #[error("Consul API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object with the same unique name already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// ACL subsystem is not enabled on the target agent
    #[error("ACL support disabled on {0}. Add 'acl {{ enabled = true }}' to the server config and try again")]
    AclDisabled(String),

    /// ACL bootstrap kept reporting legacy mode past the attempt ceiling
    #[error("Unable to bootstrap ACLs on {address} after {attempts} attempts")]
    BootstrapGaveUp { address: String, attempts: u32 },

    /// Liveness check never succeeded
    #[error("Unable to connect to Consul server {address} after {attempts} attempts")]
    ConnectGaveUp { address: String, attempts: u32 },

    /// Template rendering failure
    #[error("Template error: {0}")]
    Template(String),

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ZeroconfError {
    /// Returns true for the "name already taken" outcome of a create call
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_is_distinguished() {
        assert!(ZeroconfError::AlreadyExists("policy p".into()).is_already_exists());
        assert!(
            !ZeroconfError::Api {
                status: 500,
                message: "boom".into()
            }
            .is_already_exists()
        );
    }

    #[test]
    fn test_acl_disabled_message_hints_fix() {
        let msg = ZeroconfError::AclDisabled("http://a:8500".into()).to_string();
        assert!(msg.contains("acl { enabled = true }"));
    }
}
