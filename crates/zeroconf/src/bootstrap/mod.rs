//! ACL bootstrap and provisioning.
//!
//! Implements:
//! - Bootstrap negotiation (one-time ACL activation)
//! - Policy/token provisioning, idempotent by policy name
//! - Cluster KV skeleton and gossip key

mod cluster_state;
mod negotiator;
mod provisioner;

pub use cluster_state::{ClusterStateInitializer, save_bootstrap_record};
pub use negotiator::{Negotiated, Negotiator};
pub use provisioner::Provisioner;
