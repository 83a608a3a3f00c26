//! Background retry worker.
//!
//! Drains the unsent queue on a fixed cadence while connectivity is up,
//! and reacts to connectivity events: an outage is put on record as a
//! queued alert, and the moment every required signal is back the queue is
//! drained without waiting for the next tick.

use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use scanhub_net::ConnectivityEvent;

use crate::orchestrator::{DrainReport, Orchestrator};

pub struct RetryWorker {
    orchestrator: Orchestrator,
    interval: Duration,
    batch: usize,
}

impl RetryWorker {
    pub fn new(orchestrator: Orchestrator) -> Self {
        let config = &orchestrator.context().config;
        let interval = config.retry_interval.max(Duration::from_millis(1));
        let batch = config.retry_batch.max(1);
        Self {
            orchestrator,
            interval,
            batch,
        }
    }

    /// Spawn the worker loop.
    pub fn start(self) -> RetryWorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // Subscribe before spawning so no event is missed.
        let events = self.orchestrator.context().monitor.subscribe();
        self.orchestrator.context().set_worker_running(true);
        let task = tokio::spawn(self.run(events, shutdown_rx));
        RetryWorkerHandle { shutdown_tx, task }
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<ConnectivityEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        info!(
            interval_secs = self.interval.as_secs(),
            batch = self.batch,
            "Retry worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
                event = events.recv(), if events_open => match event {
                    Ok(event) => self.on_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Retry worker missed connectivity events");
                    }
                    Err(RecvError::Closed) => events_open = false,
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Retry worker shutting down");
                        break;
                    }
                }
            }
        }

        self.orchestrator.context().set_worker_running(false);
    }

    /// One scheduled pass: a bounded batch, only while connectivity is up.
    pub async fn run_cycle(&self) -> Option<DrainReport> {
        if !self.orchestrator.context().monitor.all_up() {
            debug!("Connectivity down; skipping retry cycle");
            return None;
        }
        match self.orchestrator.drain_queue(self.batch, true).await {
            Ok(report) => {
                if report.processed > 0 {
                    info!(
                        processed = report.processed,
                        succeeded = report.succeeded,
                        failed = report.failed,
                        "Retry cycle finished"
                    );
                }
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Retry cycle aborted");
                None
            }
        }
    }

    async fn on_event(&self, event: ConnectivityEvent) {
        if event.is_outage() {
            if let Err(e) = self.orchestrator.queue_alert(&event).await {
                error!(signal = %event.signal, error = %e, "Failed to queue connectivity alert");
            }
        } else if event.up && self.orchestrator.context().monitor.all_up() {
            info!(signal = %event.signal, "All signals up; draining queue");
            self.run_cycle().await;
        }
    }
}

/// Handle for stopping the retry worker.
pub struct RetryWorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl RetryWorkerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
        info!("Retry worker stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use scanhub_shared::{MessageKind, Signal};

    use super::*;
    use crate::testing::{harness, Harness};

    async fn wait_for_queue(h: &Harness, expected: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.store().count_unsent_messages().unwrap() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cycle_skipped_while_down() {
        let h = harness(false);
        h.orchestrator.process_scan("40123456", 1).await.unwrap();

        let worker = RetryWorker::new(h.orchestrator.clone());
        assert!(worker.run_cycle().await.is_none());

        h.set_all(true);
        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.succeeded, 1);
    }

    #[tokio::test]
    async fn test_reconnect_wakes_worker() {
        let h = harness(false);
        h.orchestrator.process_scan("40123456", 1).await.unwrap();

        let handle = RetryWorker::new(h.orchestrator.clone()).start();
        assert!(h.ctx().worker_running());
        assert!(handle.is_running());

        // The tick interval is an hour; only the event can trigger the drain.
        h.set_all(true);
        wait_for_queue(&h, 0).await;
        assert_eq!(h.sender.sent().len(), 1);

        handle.stop().await;
        assert!(!h.ctx().worker_running());
    }

    #[tokio::test]
    async fn test_outage_is_queued_as_alert() {
        let h = harness(false);
        let handle = RetryWorker::new(h.orchestrator.clone()).start();

        h.ctx().monitor.record(Signal::Internet, true);
        h.ctx().monitor.record(Signal::Internet, false);
        wait_for_queue(&h, 1).await;

        let queued = h.store().get_unsent_messages(10).unwrap();
        assert!(matches!(
            queued[0].message,
            MessageKind::ConnectivityAlert { signal: Signal::Internet, up: false, .. }
        ));

        handle.stop().await;
    }
}
