//! Peer reachability tracking.
//!
//! Keeps the latest probe result for every configured peer so status
//! reports can say which scanners were seen and when.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::discovery::PeerAddr;

pub type SharedPeerTracker = Arc<Mutex<PeerTracker>>;

/// Latest knowledge about one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerStatus {
    pub address: String,
    pub reachable: bool,
    /// Address that answered, when reachable.
    pub answered_on: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PeerTracker {
    peers: HashMap<PeerAddr, PeerStatus>,
}

impl PeerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedPeerTracker {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Record that `peer` answered on `target`.
    pub fn on_reachable(&mut self, peer: &PeerAddr, target: &str, now: DateTime<Utc>) {
        let status = self.entry(peer, now);
        if !status.reachable {
            debug!(peer = %peer, target, "Peer reachable");
        }
        status.reachable = true;
        status.answered_on = Some(target.to_string());
        status.last_seen = Some(now);
        status.last_checked = now;
    }

    /// Record that no candidate address of `peer` answered.
    pub fn on_unreachable(&mut self, peer: &PeerAddr, now: DateTime<Utc>) {
        let status = self.entry(peer, now);
        if status.reachable {
            debug!(peer = %peer, "Peer no longer reachable");
        }
        status.reachable = false;
        status.answered_on = None;
        status.last_checked = now;
    }

    fn entry(&mut self, peer: &PeerAddr, now: DateTime<Utc>) -> &mut PeerStatus {
        self.peers.entry(peer.clone()).or_insert_with(|| PeerStatus {
            address: peer.to_string(),
            reachable: false,
            answered_on: None,
            last_seen: None,
            last_checked: now,
        })
    }

    pub fn get(&self, peer: &PeerAddr) -> Option<&PeerStatus> {
        self.peers.get(peer)
    }

    pub fn is_reachable(&self, peer: &PeerAddr) -> bool {
        self.peers.get(peer).is_some_and(|s| s.reachable)
    }

    /// Addresses of reachable peers, sorted for stable output.
    pub fn reachable_peers(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .peers
            .values()
            .filter(|s| s.reachable)
            .map(|s| s.address.clone())
            .collect();
        out.sort();
        out
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn reachable_count(&self) -> usize {
        self.peers.values().filter(|s| s.reachable).count()
    }

    /// Snapshot of every tracked peer.
    pub fn all(&self) -> Vec<PeerStatus> {
        let mut out: Vec<PeerStatus> = self.peers.values().cloned().collect();
        out.sort_by(|a, b| a.address.cmp(&b.address));
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn peer(s: &str) -> PeerAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_reachable_then_lost() {
        let mut tracker = PeerTracker::new();
        let p = peer("10.0.0.5");
        let t0 = Utc::now();

        assert!(!tracker.is_reachable(&p));
        tracker.on_reachable(&p, "10.0.0.5:22", t0);
        assert!(tracker.is_reachable(&p));
        assert_eq!(tracker.get(&p).unwrap().answered_on.as_deref(), Some("10.0.0.5:22"));

        let t1 = t0 + Duration::seconds(15);
        tracker.on_unreachable(&p, t1);
        let status = tracker.get(&p).unwrap();
        assert!(!status.reachable);
        assert_eq!(status.last_seen, Some(t0));
        assert_eq!(status.last_checked, t1);
        assert_eq!(tracker.peer_count(), 1);
        assert_eq!(tracker.reachable_count(), 0);
    }

    #[test]
    fn test_reachable_peers_sorted() {
        let mut tracker = PeerTracker::new();
        let now = Utc::now();
        tracker.on_reachable(&peer("10.0.0.9:80"), "10.0.0.9:80", now);
        tracker.on_unreachable(&peer("10.0.0.7:80"), now);
        tracker.on_reachable(&peer("10.0.0.1:80"), "10.0.0.1:80", now);

        assert_eq!(tracker.reachable_peers(), vec!["10.0.0.1:80", "10.0.0.9:80"]);
        assert_eq!(tracker.all().len(), 3);
    }
}
