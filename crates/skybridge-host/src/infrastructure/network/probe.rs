//! LAN reachability probing.
//!
//! The LAN fallback of transport negotiation builds a small candidate list
//! (the peer's known IP first, then gateway-derived guesses) and probes each
//! with a short-timeout TCP connect.  Timeouts are local and small so one
//! unreachable candidate cannot stall the negotiation chain.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::infrastructure::discovery::ReachabilityProbe;

/// Production reachability probe: a plain TCP connect, round trip measured
/// from connect start to establishment.
pub struct TcpProbe;

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self, addr: SocketAddr, budget: Duration) -> Option<Duration> {
        let started = Instant::now();
        match timeout(budget, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Some(started.elapsed()),
            Ok(Err(e)) => {
                debug!("probe {addr} refused: {e}");
                None
            }
            Err(_) => {
                debug!("probe {addr} timed out after {budget:?}");
                None
            }
        }
    }
}

/// Builds the LAN candidate list for a peer.
///
/// The peer's known IP comes first; `.1` and `.254` on the same /24 follow
/// as gateway-derived guesses.  Two guesses keep the worst-case probe budget
/// bounded at three candidates.
pub fn candidate_ips(peer_ip: Option<IpAddr>) -> Vec<IpAddr> {
    let mut candidates = Vec::new();
    let Some(ip) = peer_ip else {
        return candidates;
    };

    candidates.push(ip);
    if let IpAddr::V4(v4) = ip {
        let octets = v4.octets();
        for last in [1u8, 254] {
            let guess = IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], last));
            if guess != ip {
                candidates.push(guess);
            }
        }
    }
    candidates
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_candidate_ips_peer_first_then_gateway_guesses() {
        let peer: IpAddr = "192.168.1.37".parse().unwrap();
        let candidates = candidate_ips(Some(peer));
        assert_eq!(
            candidates,
            vec![
                "192.168.1.37".parse::<IpAddr>().unwrap(),
                "192.168.1.1".parse().unwrap(),
                "192.168.1.254".parse().unwrap(),
            ]
        );
    }

    #[test]
    fn test_candidate_ips_deduplicates_when_peer_is_the_gateway() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let candidates = candidate_ips(Some(peer));
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], peer);
    }

    #[test]
    fn test_candidate_ips_empty_without_known_peer_ip() {
        assert!(candidate_ips(None).is_empty());
    }

    #[test]
    fn test_candidate_ips_ipv6_peer_has_no_v4_guesses() {
        let peer: IpAddr = "fe80::1".parse().unwrap();
        let candidates = candidate_ips(Some(peer));
        assert_eq!(candidates, vec![peer]);
    }

    #[tokio::test]
    async fn test_probe_measures_rtt_against_live_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let rtt = TcpProbe
            .probe(addr, Duration::from_millis(400))
            .await
            .expect("listener must be reachable");
        assert!(rtt < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_probe_returns_none_for_closed_port() {
        // Bind then drop to obtain a port that actively refuses.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpProbe.probe(addr, Duration::from_millis(400)).await;
        assert!(result.is_none());
    }
}
