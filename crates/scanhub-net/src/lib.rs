// Reachability probing for the scan agent: internet, hub, and peer devices.

pub mod discovery;
pub mod monitor;
pub mod peers;
pub mod probe;

mod error;

pub use discovery::{load_peer_addrs, parse_peer_addrs, PeerAddr};
pub use error::{ProbeError, Result};
pub use monitor::{
    ConnectivityEvent, ConnectivityMonitor, ConnectivityState, MonitorConfig, MonitorHandle,
    Probes, SignalState, SignalStatus,
};
pub use peers::{PeerStatus, PeerTracker, SharedPeerTracker};
pub use probe::{ManualProbe, PeerProbe, Probe, TcpProbe};
