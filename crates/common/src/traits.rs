//! Trait seam between the worker engine and the socket-level prober.

use crate::types::{Attempt, Endpoint};
use async_trait::async_trait;

/// A prober performs one connect-and-exchange attempt against an endpoint.
///
/// Implementations never surface errors directly; every failure mode is
/// folded into an [`Attempt`] variant so callers classify all outcomes
/// through one path. An implementation holds at most one socket per call and
/// closes it before returning.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Connect to `endpoint` and run one HTTP exchange carrying `host` as
    /// the Host header.
    async fn probe(&self, endpoint: Endpoint, host: &str) -> Attempt;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysComplete;

    #[async_trait]
    impl Prober for AlwaysComplete {
        async fn probe(&self, _endpoint: Endpoint, _host: &str) -> Attempt {
            Attempt::ResponseComplete
        }
    }

    #[tokio::test]
    async fn prober_trait_object() {
        use std::net::{IpAddr, Ipv4Addr};

        let prober: Box<dyn Prober> = Box::new(AlwaysComplete);
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 80);
        assert!(matches!(
            prober.probe(ep, "example.com").await,
            Attempt::ResponseComplete
        ));
    }
}
