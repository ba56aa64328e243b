//! One-time ACL bootstrap negotiation.
//!
//! ```text
//!              ┌──── LegacyMode (attempt < ceiling) ────┐
//!              ▼                                        │
//!   ──▶ Attempting ──┬── Issued ───────────────▶ Success
//!                    ├── AlreadyBootstrapped ──▶ AlreadyBootstrapped
//!                    ├── Disabled ─────────────▶ Disabled      (fatal)
//!                    ├── LegacyMode at ceiling ▶ GivingUp      (fatal)
//!                    └── unclassified error ───▶ GivingUp      (fatal)
//! ```

use std::time::Duration;

use zeroconf_common::constants::BOOTSTRAP_MAX_ATTEMPTS;
use zeroconf_common::{AclToken, BootstrapReply, Result, ZeroconfError};

use crate::consul::ConsulApi;

/// Negotiation states
#[derive(Debug)]
pub enum NegotiationState {
    Attempting { attempt: u32 },
    Success(AclToken),
    AlreadyBootstrapped,
    Disabled,
    GivingUp(ZeroconfError),
}

/// What the caller gets back from a successful negotiation
#[derive(Debug, Clone, PartialEq)]
pub enum Negotiated {
    /// A new management credential was minted
    NewCredential(AclToken),
    /// Bootstrap happened before; nothing was minted
    AlreadyBootstrapped,
}

impl NegotiationState {
    /// Apply one bootstrap reply to the `Attempting { attempt }` state.
    pub fn next(attempt: u32, ceiling: u32, address: &str, reply: Result<BootstrapReply>) -> Self {
        match reply {
            Ok(BootstrapReply::Issued(token)) => Self::Success(token),
            Ok(BootstrapReply::AlreadyBootstrapped) => Self::AlreadyBootstrapped,
            Ok(BootstrapReply::Disabled) => Self::Disabled,
            Ok(BootstrapReply::LegacyMode) if attempt < ceiling => Self::Attempting {
                attempt: attempt + 1,
            },
            Ok(BootstrapReply::LegacyMode) => Self::GivingUp(ZeroconfError::BootstrapGaveUp {
                address: address.to_string(),
                attempts: attempt,
            }),
            Err(e) => Self::GivingUp(e),
        }
    }
}

/// Drives [`NegotiationState`] against one endpoint
#[derive(Debug, Clone)]
pub struct Negotiator {
    ceiling: u32,
    delay: Duration,
}

impl Negotiator {
    /// Legacy-mode retries use `delay` and the fixed attempt ceiling.
    pub fn new(delay: Duration) -> Self {
        Self {
            ceiling: BOOTSTRAP_MAX_ATTEMPTS,
            delay,
        }
    }

    /// Run the negotiation. Disabled and GivingUp come back as errors.
    pub async fn negotiate<S: ConsulApi>(&self, session: &S) -> Result<Negotiated> {
        let address = session.address();
        let mut state = NegotiationState::Attempting { attempt: 1 };

        loop {
            state = match state {
                NegotiationState::Attempting { attempt } => {
                    let reply = session.acl_bootstrap().await;
                    let next = NegotiationState::next(attempt, self.ceiling, address, reply);

                    if let NegotiationState::Attempting { .. } = next {
                        tracing::info!(
                            address,
                            attempt,
                            max_attempts = self.ceiling,
                            delay_secs = self.delay.as_secs(),
                            "Server ACL not ready (legacy mode), waiting"
                        );
                        tokio::time::sleep(self.delay).await;
                    }
                    next
                }
                NegotiationState::Success(token) => {
                    tracing::info!(address, "Consul ACL has been bootstrapped");
                    tracing::warn!(secret = %token.secret_id, "(Sensitive) Bootstrap token");
                    return Ok(Negotiated::NewCredential(token));
                }
                NegotiationState::AlreadyBootstrapped => {
                    tracing::info!(
                        address,
                        "System is already bootstrapped. Pass --bootstrap-token to set up policies instead"
                    );
                    return Ok(Negotiated::AlreadyBootstrapped);
                }
                NegotiationState::Disabled => {
                    return Err(ZeroconfError::AclDisabled(address.to_string()));
                }
                NegotiationState::GivingUp(e) => {
                    tracing::error!(address, error = %e, "Giving up on ACL bootstrap");
                    return Err(e);
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consul::memory::MemoryConsul;

    fn negotiator() -> Negotiator {
        Negotiator::new(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_fresh_endpoint_issues_credential() {
        let consul = MemoryConsul::new("http://local:8500");

        let outcome = negotiator().negotiate(&consul).await.unwrap();

        let Negotiated::NewCredential(token) = outcome else {
            panic!("expected a new credential");
        };
        assert!(!token.secret_id.is_empty());
        assert_eq!(consul.minted_tokens().len(), 1);
    }

    #[tokio::test]
    async fn test_already_bootstrapped_is_stable_and_mints_nothing() {
        let consul = MemoryConsul::new("http://local:8500");
        consul.mark_bootstrapped();

        for _ in 0..2 {
            let outcome = negotiator().negotiate(&consul).await.unwrap();
            assert_eq!(outcome, Negotiated::AlreadyBootstrapped);
        }

        assert!(consul.minted_tokens().is_empty());
        assert_eq!(consul.call_count("acl_bootstrap"), 2);
    }

    #[tokio::test]
    async fn test_second_run_after_success_is_already_bootstrapped() {
        let consul = MemoryConsul::new("http://local:8500");

        negotiator().negotiate(&consul).await.unwrap();
        let again = negotiator().negotiate(&consul).await.unwrap();

        assert_eq!(again, Negotiated::AlreadyBootstrapped);
        assert_eq!(consul.minted_tokens().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_is_fatal_without_retry() {
        let consul = MemoryConsul::new("http://local:8500");
        consul.disable_acl();

        let err = negotiator().negotiate(&consul).await.unwrap_err();

        assert!(matches!(err, ZeroconfError::AclDisabled(_)));
        assert_eq!(consul.call_count("acl_bootstrap"), 1);
    }

    #[tokio::test]
    async fn test_legacy_mode_retries_then_succeeds() {
        let consul = MemoryConsul::new("http://local:8500");
        consul.script_bootstrap([BootstrapReply::LegacyMode, BootstrapReply::LegacyMode]);

        let outcome = negotiator().negotiate(&consul).await.unwrap();

        assert!(matches!(outcome, Negotiated::NewCredential(_)));
        assert_eq!(consul.call_count("acl_bootstrap"), 3);
    }

    #[tokio::test]
    async fn test_legacy_mode_gives_up_at_ceiling() {
        let consul = MemoryConsul::new("http://local:8500");
        consul.script_bootstrap(std::iter::repeat_n(BootstrapReply::LegacyMode, 20));

        let err = negotiator().negotiate(&consul).await.unwrap_err();

        assert!(matches!(
            err,
            ZeroconfError::BootstrapGaveUp { attempts: 10, .. }
        ));
        assert_eq!(consul.call_count("acl_bootstrap"), 10);
    }

    #[test]
    fn test_unclassified_error_gives_up_immediately() {
        let state = NegotiationState::next(
            1,
            10,
            "http://local:8500",
            Err(ZeroconfError::Api {
                status: 500,
                message: "No cluster leader".into(),
            }),
        );
        assert!(matches!(state, NegotiationState::GivingUp(ZeroconfError::Api { .. })));
    }

    #[test]
    fn test_legacy_mode_advances_attempt() {
        let state = NegotiationState::next(3, 10, "a", Ok(BootstrapReply::LegacyMode));
        assert!(matches!(state, NegotiationState::Attempting { attempt: 4 }));
    }
}
