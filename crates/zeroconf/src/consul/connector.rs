//! Session establishment with bounded, fixed-delay retry.

use zeroconf_common::{Result, ZeroconfError};

use super::{ConsulApi, Session};
use crate::config::{Endpoint, RetryPolicy};

/// Builds sessions for endpoints. Production uses [`HttpDialer`].
pub trait Dialer {
    type Session: ConsulApi;

    fn dial(&self, endpoint: &Endpoint) -> Result<Self::Session>;
}

/// Dials real Consul agents over HTTP
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpDialer;

impl Dialer for HttpDialer {
    type Session = Session;

    fn dial(&self, endpoint: &Endpoint) -> Result<Session> {
        Session::new(endpoint)
    }
}

/// Poll `session` until the leader lookup succeeds.
///
/// Sleeps `retry.delay` between attempts and gives up after
/// `retry.max_attempts`. The session is handed back only once it is live.
pub async fn connect<S: ConsulApi>(session: S, retry: &RetryPolicy) -> Result<S> {
    let address = session.address().to_string();

    for attempt in 1..=retry.max_attempts {
        tracing::info!(address = %address, attempt, "Connecting to Consul server");

        match session.leader().await {
            Ok(leader) => {
                tracing::info!(address = %address, leader = %leader, "Consul server reachable");
                return Ok(session);
            }
            Err(e) => {
                tracing::warn!(
                    address = %address,
                    error = %e,
                    attempt,
                    max_attempts = retry.max_attempts,
                    delay_secs = retry.delay.as_secs(),
                    "Unable to connect to Consul server, pausing"
                );
                if attempt < retry.max_attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }

    Err(ZeroconfError::ConnectGaveUp {
        address,
        attempts: retry.max_attempts,
    })
}

/// Dial `endpoint` and wait for it to become live
pub async fn open<D: Dialer>(
    dialer: &D,
    endpoint: &Endpoint,
    retry: &RetryPolicy,
) -> Result<D::Session> {
    let session = dialer.dial(endpoint)?;
    connect(session, retry).await
}
