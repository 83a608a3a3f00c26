//! Reachability probes.
//!
//! Every probe is a cheap TCP connect bounded by a timeout. A probe answers
//! a single yes/no question and never returns an error to the monitor:
//! failures are logged at debug level and count as "down".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

use crate::discovery::PeerAddr;
use crate::error::{ProbeError, Result};
use crate::peers::SharedPeerTracker;

#[async_trait]
pub trait Probe: Send + Sync {
    /// Whether the probed service is reachable right now.
    async fn check(&self) -> bool;
}

/// Open (and immediately drop) a TCP connection to `target`.
pub async fn tcp_connect(target: &str, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(source)) => Err(ProbeError::Connect {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(ProbeError::Timeout {
            target: target.to_string(),
            timeout,
        }),
    }
}

/// Up when any one of its targets accepts a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    targets: Vec<String>,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(targets: Vec<String>, timeout: Duration) -> Self {
        Self { targets, timeout }
    }

    pub fn single(target: impl Into<String>, timeout: Duration) -> Self {
        Self::new(vec![target.into()], timeout)
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn check(&self) -> bool {
        for target in &self.targets {
            match tcp_connect(target, self.timeout).await {
                Ok(()) => return true,
                Err(e) => debug!(error = %e, "Probe target unreachable"),
            }
        }
        false
    }
}

/// Up when at least one configured peer answers on one of its candidate
/// addresses. Results are written to the shared peer tracker.
#[derive(Debug, Clone)]
pub struct PeerProbe {
    peers: Vec<PeerAddr>,
    timeout: Duration,
    tracker: SharedPeerTracker,
}

impl PeerProbe {
    pub fn new(peers: Vec<PeerAddr>, timeout: Duration, tracker: SharedPeerTracker) -> Self {
        Self {
            peers,
            timeout,
            tracker,
        }
    }
}

async fn first_answering(peer: &PeerAddr, timeout: Duration) -> Option<String> {
    for target in peer.candidates() {
        if tcp_connect(&target, timeout).await.is_ok() {
            return Some(target);
        }
    }
    None
}

#[async_trait]
impl Probe for PeerProbe {
    async fn check(&self) -> bool {
        // Peers are swept concurrently; every one is probed so the tracker
        // stays complete.
        let mut sweep = JoinSet::new();
        for peer in self.peers.iter().cloned() {
            let timeout = self.timeout;
            sweep.spawn(async move {
                let answered = first_answering(&peer, timeout).await;
                (peer, answered)
            });
        }

        let mut any = false;
        while let Some(joined) = sweep.join_next().await {
            let Ok((peer, answered)) = joined else {
                continue;
            };
            let now = Utc::now();
            let Ok(mut tracker) = self.tracker.lock() else {
                continue;
            };
            match answered {
                Some(target) => {
                    tracker.on_reachable(&peer, &target, now);
                    any = true;
                }
                None => tracker.on_unreachable(&peer, now),
            }
        }
        any
    }
}

/// A probe whose answer is set by hand. Useful to force a signal down for
/// maintenance, and as a test double.
#[derive(Debug, Clone, Default)]
pub struct ManualProbe {
    up: Arc<AtomicBool>,
}

impl ManualProbe {
    pub fn new(up: bool) -> Self {
        Self {
            up: Arc::new(AtomicBool::new(up)),
        }
    }

    pub fn set(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

#[async_trait]
impl Probe for ManualProbe {
    async fn check(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::peers::PeerTracker;

    const TIMEOUT: Duration = Duration::from_secs(1);

    /// A local port with nothing listening on it.
    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    #[tokio::test]
    async fn test_tcp_probe_up_and_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().to_string();
        let closed = closed_port().await;

        assert!(TcpProbe::single(open.clone(), TIMEOUT).check().await);
        assert!(!TcpProbe::single(closed.clone(), TIMEOUT).check().await);
        // Any reachable target is enough.
        assert!(TcpProbe::new(vec![closed, open], TIMEOUT).check().await);
    }

    #[tokio::test]
    async fn test_tcp_connect_reports_failure() {
        let closed = closed_port().await;
        let err = tcp_connect(&closed, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ProbeError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_peer_probe_updates_tracker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open: PeerAddr = listener.local_addr().unwrap().to_string().parse().unwrap();
        let closed: PeerAddr = closed_port().await.parse().unwrap();
        let tracker = PeerTracker::shared();

        let probe = PeerProbe::new(vec![closed.clone(), open.clone()], TIMEOUT, tracker.clone());
        assert!(probe.check().await);

        let tracker = tracker.lock().unwrap();
        assert!(tracker.is_reachable(&open));
        assert!(!tracker.is_reachable(&closed));
        assert_eq!(tracker.peer_count(), 2);
    }

    #[tokio::test]
    async fn test_dead_peers_are_swept_in_parallel() {
        let timeout = Duration::from_millis(300);
        let peers: Vec<PeerAddr> = (1..=4)
            .map(|i| format!("10.255.255.{i}:9").parse().unwrap())
            .collect();
        let tracker = PeerTracker::shared();
        let probe = PeerProbe::new(peers, timeout, tracker.clone());

        let started = std::time::Instant::now();
        assert!(!probe.check().await);
        assert!(started.elapsed() < timeout * 3, "{:?}", started.elapsed());
        assert_eq!(tracker.lock().unwrap().peer_count(), 4);
    }

    #[tokio::test]
    async fn test_peer_probe_without_peers_is_down() {
        let probe = PeerProbe::new(Vec::new(), TIMEOUT, PeerTracker::shared());
        assert!(!probe.check().await);
    }

    #[tokio::test]
    async fn test_manual_probe() {
        let probe = ManualProbe::new(false);
        assert!(!probe.check().await);
        probe.clone().set(true);
        assert!(probe.check().await);
    }
}
