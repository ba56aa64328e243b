//! # ZeroConf Common
//!
//! Shared types, errors, and well-known names used across the ZeroConf
//! bootstrap tooling.
//!
//! ## Modules
//! - `types` - Consul ACL/KV/agent payloads and node identity
//! - `error` - Common error taxonomy
//! - `constants` - Well-known keys, policy names, and defaults

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Result, ZeroconfError};
pub use types::*;
