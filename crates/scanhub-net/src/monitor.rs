//! Connectivity monitor.
//!
//! Three independent signals (internet, hub, peer) are probed on their own
//! timers, each by its own background task. Results are cached behind a
//! single mutex so [`ConnectivityMonitor::is_up`] never waits on the
//! network. Every change of a signal's state is published as a
//! [`ConnectivityEvent`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use scanhub_shared::constants::{
    DEFAULT_HUB_INTERVAL_SECS, DEFAULT_INTERNET_INTERVAL_SECS, DEFAULT_PEER_INTERVAL_SECS,
    DEFAULT_STATUS_TTL_SECS,
};
use scanhub_shared::Signal;

use crate::probe::Probe;

const EVENT_CAPACITY: usize = 64;
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Monitor tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub internet_interval: Duration,
    pub hub_interval: Duration,
    pub peer_interval: Duration,
    /// How long a measurement stays trustworthy past its signal's next
    /// scheduled probe. Older measurements read as "down".
    pub status_ttl: Duration,
    /// Whether the peer signal is required for [`ConnectivityMonitor::all_up`].
    pub require_peer: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            internet_interval: Duration::from_secs(DEFAULT_INTERNET_INTERVAL_SECS),
            hub_interval: Duration::from_secs(DEFAULT_HUB_INTERVAL_SECS),
            peer_interval: Duration::from_secs(DEFAULT_PEER_INTERVAL_SECS),
            status_ttl: Duration::from_secs(DEFAULT_STATUS_TTL_SECS),
            require_peer: true,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self, signal: Signal) -> Duration {
        match signal {
            Signal::Internet => self.internet_interval,
            Signal::Hub => self.hub_interval,
            Signal::Peer => self.peer_interval,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalState {
    #[default]
    Unknown,
    Up,
    Down,
}

impl SignalState {
    fn from_measurement(up: bool) -> Self {
        if up {
            SignalState::Up
        } else {
            SignalState::Down
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalStatus {
    pub state: SignalState,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Cached view of all three signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
    pub internet: SignalStatus,
    pub hub: SignalStatus,
    pub peer: SignalStatus,
}

impl ConnectivityState {
    pub fn get(&self, signal: Signal) -> SignalStatus {
        match signal {
            Signal::Internet => self.internet,
            Signal::Hub => self.hub,
            Signal::Peer => self.peer,
        }
    }

    fn get_mut(&mut self, signal: Signal) -> &mut SignalStatus {
        match signal {
            Signal::Internet => &mut self.internet,
            Signal::Hub => &mut self.hub,
            Signal::Peer => &mut self.peer,
        }
    }
}

/// A signal changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityEvent {
    pub signal: Signal,
    pub previous: SignalState,
    pub up: bool,
    pub at: DateTime<Utc>,
}

impl ConnectivityEvent {
    /// An up → down transition. The first measurement after startup is
    /// not an outage even when it reads down.
    pub fn is_outage(&self) -> bool {
        !self.up && self.previous == SignalState::Up
    }
}

/// One probe per signal.
#[derive(Clone)]
pub struct Probes {
    pub internet: Arc<dyn Probe>,
    pub hub: Arc<dyn Probe>,
    pub peer: Arc<dyn Probe>,
}

impl Probes {
    fn get(&self, signal: Signal) -> &Arc<dyn Probe> {
        match signal {
            Signal::Internet => &self.internet,
            Signal::Hub => &self.hub,
            Signal::Peer => &self.peer,
        }
    }
}

/// Cheap to clone; clones share the cached state and event channel.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    config: MonitorConfig,
    probes: Probes,
    state: Arc<Mutex<ConnectivityState>>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(config: MonitorConfig, probes: Probes) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            probes,
            state: Arc::new(Mutex::new(ConnectivityState::default())),
            events,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectivityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the cached state.
    pub fn state(&self) -> ConnectivityState {
        *self.lock()
    }

    /// Last measurement for `signal`, without probing. Unknown and stale
    /// measurements read as down.
    pub fn is_up(&self, signal: Signal) -> bool {
        self.is_up_at(signal, Utc::now())
    }

    fn is_up_at(&self, signal: Signal, now: DateTime<Utc>) -> bool {
        let status = self.lock().get(signal);
        let Some(checked) = status.last_checked else {
            return false;
        };
        let max_age = self.config.interval(signal) + self.config.status_ttl;
        let fresh = chrono::Duration::from_std(max_age)
            .map(|max_age| now.signed_duration_since(checked) <= max_age)
            .unwrap_or(true);
        status.state == SignalState::Up && fresh
    }

    /// Required signals that are not currently up, in probe order.
    pub fn down_signals(&self) -> Vec<Signal> {
        Signal::ALL
            .into_iter()
            .filter(|s| *s != Signal::Peer || self.config.require_peer)
            .filter(|s| !self.is_up(*s))
            .collect()
    }

    /// Whether every required signal is up.
    pub fn all_up(&self) -> bool {
        self.down_signals().is_empty()
    }

    /// Store a measurement and publish an event if the state changed.
    pub fn record(&self, signal: Signal, up: bool) -> Option<ConnectivityEvent> {
        self.record_at(signal, up, Utc::now())
    }

    fn record_at(&self, signal: Signal, up: bool, at: DateTime<Utc>) -> Option<ConnectivityEvent> {
        let new_state = SignalState::from_measurement(up);
        let previous = {
            let mut state = self.lock();
            let status = state.get_mut(signal);
            let previous = status.state;
            status.state = new_state;
            status.last_checked = Some(at);
            previous
        };

        if previous == new_state {
            return None;
        }

        let event = ConnectivityEvent {
            signal,
            previous,
            up,
            at,
        };
        if up {
            info!(signal = %signal, "Connectivity restored");
        } else if event.is_outage() {
            warn!(signal = %signal, "Connectivity lost");
        } else {
            debug!(signal = %signal, "Signal initially down");
        }
        // No receivers is fine.
        let _ = self.events.send(event);
        Some(event)
    }

    /// Probe `signal` now and record the result.
    pub async fn refresh(&self, signal: Signal) -> bool {
        let up = self.probes.get(signal).check().await;
        self.record(signal, up);
        up
    }

    /// Probe all three signals in sequence.
    pub async fn refresh_all(&self) {
        for signal in Signal::ALL {
            self.refresh(signal).await;
        }
    }

    /// Run the probe loops in the background, one task per signal so a
    /// slow probe never delays the others.
    pub fn start(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            internet_interval_secs = self.config.internet_interval.as_secs(),
            hub_interval_secs = self.config.hub_interval.as_secs(),
            peer_interval_secs = self.config.peer_interval.as_secs(),
            require_peer = self.config.require_peer,
            "Connectivity monitor started"
        );

        let tasks = Signal::ALL
            .into_iter()
            .map(|signal| tokio::spawn(self.clone().run(signal, shutdown_rx.clone())))
            .collect();
        MonitorHandle { shutdown_tx, tasks }
    }

    async fn run(self, signal: Signal, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval(signal).max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh(signal).await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!(signal = %signal, "Probe loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Handle for stopping the monitor tasks.
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl MonitorHandle {
    /// Ask every loop to stop after its current probe, and wait for them.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Connectivity monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }
}
