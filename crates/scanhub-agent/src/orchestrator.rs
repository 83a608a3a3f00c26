//! Send-with-retry orchestration.
//!
//! A send goes out immediately only when every required connectivity
//! signal is up; otherwise, or when the attempt fails, the message lands in
//! the durable queue and the retry worker takes over. Network trouble is
//! reported through [`SendOutcome`]; only local storage failures surface as
//! errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use scanhub_net::{ConnectivityEvent, SignalState};
use scanhub_shared::{
    Barcode, ConnectionDescriptor, DeviceId, MessageKind, Signal, ValidationError,
};
use scanhub_store::UnsentMessage;

use crate::context::AgentContext;
use crate::error::{AgentError, Result};

/// Result of a send request, ready to show to an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub success: bool,
    pub status: String,
}

impl SendOutcome {
    fn sent(status: impl Into<String>) -> Self {
        Self {
            success: true,
            status: status.into(),
        }
    }

    fn queued(status: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.into(),
        }
    }

    fn rejected(error: &ValidationError) -> Self {
        Self {
            success: false,
            status: format!("Rejected: {error}"),
        }
    }
}

/// Counters for one pass over the retry queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalReport {
    pub up: bool,
    pub state: SignalState,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Point-in-time view for status screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub internet: SignalReport,
    pub hub: SignalReport,
    pub peer: SignalReport,
    pub peer_required: bool,
    pub all_up: bool,
    pub reachable_peers: Vec<String>,
    pub unsent_messages: u64,
    pub retry_worker_running: bool,
    pub registration_degraded: bool,
}

fn offline_status(signal: Signal) -> &'static str {
    match signal {
        Signal::Internet => "Internet offline - Message saved locally for retry when connected",
        Signal::Hub => "IoT Hub unreachable - Message saved locally for retry when connected",
        Signal::Peer => "Raspberry Pi not connected - Message saved locally for retry when connected",
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<AgentContext>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<AgentContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<AgentContext> {
        &self.ctx
    }

    /// Deliver a barcode scan for `device_id` now, or queue it.
    pub async fn send_message_with_retry(
        &self,
        device_id: &DeviceId,
        barcode: &Barcode,
        quantity: u32,
    ) -> Result<SendOutcome> {
        if quantity == 0 {
            return Ok(SendOutcome::rejected(&ValidationError::InvalidQuantity(0)));
        }
        let message = MessageKind::BarcodeScan {
            device_id: device_id.clone(),
            barcode: barcode.clone(),
            quantity,
            timestamp: Utc::now(),
        };
        self.send_message(&message).await
    }

    /// Deliver any message now, or queue it.
    ///
    /// On `Err` the message was neither delivered nor queued; the caller
    /// still holds it and may try again.
    pub async fn send_message(&self, message: &MessageKind) -> Result<SendOutcome> {
        if let Some(signal) = self.ctx.monitor.down_signals().first().copied() {
            debug!(signal = %signal, device_id = %message.device_id(), "Signal down; queueing message");
            self.enqueue(message).await?;
            return Ok(SendOutcome::queued(offline_status(signal)));
        }

        match self.deliver(message).await {
            Ok(()) => Ok(SendOutcome::sent(format!(
                "Message sent to IoT Hub for device {}",
                message.device_id()
            ))),
            Err(e) if e.is_local() => Err(e),
            Err(e) => {
                warn!(device_id = %message.device_id(), error = %e, "Send failed; queueing message");
                self.enqueue(message).await?;
                Ok(SendOutcome::queued(
                    "Send failed - Message saved locally for retry when connected",
                ))
            }
        }
    }

    /// Full scan pipeline: validate, map, record, notify, send.
    pub async fn process_scan(&self, raw_barcode: &str, quantity: i64) -> Result<SendOutcome> {
        let barcode = match Barcode::parse(raw_barcode) {
            Ok(b) => b,
            Err(e) => {
                info!(input = %raw_barcode, error = %e, "Rejected scan");
                return Ok(SendOutcome::rejected(&e));
            }
        };
        let Some(quantity) = u32::try_from(quantity).ok().filter(|q| *q > 0) else {
            return Ok(SendOutcome::rejected(&ValidationError::InvalidQuantity(quantity)));
        };

        let lookup = barcode.clone();
        let device_id = self
            .ctx
            .with_mapper(move |mapper| mapper.get_device_id_for_barcode(&lookup))
            .await?;

        let (scan_device, scan_barcode) = (device_id.clone(), barcode.clone());
        let timestamp = self
            .ctx
            .with_store(move |store| store.save_scan(&scan_device, &scan_barcode, quantity))
            .await?;
        info!(barcode = %barcode, device_id = %device_id, quantity, "Scan recorded");

        self.notify(&barcode).await;

        let message = MessageKind::BarcodeScan {
            device_id,
            barcode,
            quantity,
            timestamp,
        };
        let outcome = self.send_message(&message).await?;
        if outcome.success {
            self.mark_scan_delivered(&message).await?;
        }
        Ok(outcome)
    }

    async fn notify(&self, barcode: &Barcode) {
        let Some(notifier) = &self.ctx.notifier else {
            return;
        };
        if !self.ctx.monitor.is_up(Signal::Internet) {
            debug!(barcode = %barcode, "Internet down; skipping inventory notification");
            return;
        }
        match notifier.notify_scan(barcode).await {
            Ok(message) => debug!(barcode = %barcode, response = %message, "Inventory notified"),
            Err(e) => warn!(barcode = %barcode, error = %e, "Inventory notification failed"),
        }
    }

    /// Put a connectivity outage on record for the hub.
    pub async fn queue_alert(&self, event: &ConnectivityEvent) -> Result<i64> {
        let alert = MessageKind::ConnectivityAlert {
            device_id: self.ctx.agent_id.clone(),
            signal: event.signal,
            up: event.up,
            timestamp: event.at,
        };
        self.enqueue(&alert).await
    }

    /// Resend up to `limit` queued messages, oldest first, stopping at the
    /// first failure. With `gated`, the pass also stops as soon as any
    /// required signal is down. Concurrent passes run one after the other.
    pub async fn drain_queue(&self, limit: usize, gated: bool) -> Result<DrainReport> {
        let _drain = self.ctx.lock_drain().await;
        let pending = self
            .ctx
            .with_store(move |store| store.get_unsent_messages(limit))
            .await?;

        let mut report = DrainReport::default();
        for item in pending {
            if gated && !self.ctx.monitor.all_up() {
                debug!("Connectivity regressed; pausing retry");
                break;
            }
            report.processed += 1;
            match self.deliver(&item.message).await {
                Ok(()) => {
                    self.mark_delivered(&item).await?;
                    report.succeeded += 1;
                }
                Err(e) if e.is_local() => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    warn!(id = item.id, device_id = %item.device_id, error = %e, "Retry failed; stopping batch");
                    break;
                }
            }
        }
        Ok(report)
    }

    /// Drain the whole queue once, regardless of batch size or cached
    /// connectivity.
    pub async fn force_retry(&self) -> Result<SendOutcome> {
        let report = self.drain_queue(usize::MAX, false).await?;
        let status = format!(
            "Processed {} unsent messages. Success: {}, Failed: {}",
            report.processed, report.succeeded, report.failed
        );
        info!(%status, "Manual retry finished");
        Ok(SendOutcome {
            success: report.failed == 0,
            status,
        })
    }

    pub async fn connection_status(&self) -> Result<ConnectionStatus> {
        let unsent_messages = self
            .ctx
            .with_store(|store| store.count_unsent_messages())
            .await?;
        let monitor = &self.ctx.monitor;
        let state = monitor.state();
        let report = |signal: Signal| {
            let status = state.get(signal);
            SignalReport {
                up: monitor.is_up(signal),
                state: status.state,
                last_checked: status.last_checked,
            }
        };
        let reachable_peers = self
            .ctx
            .peers
            .lock()
            .map(|tracker| tracker.reachable_peers())
            .unwrap_or_default();

        Ok(ConnectionStatus {
            internet: report(Signal::Internet),
            hub: report(Signal::Hub),
            peer: report(Signal::Peer),
            peer_required: monitor.config().require_peer,
            all_up: monitor.all_up(),
            reachable_peers,
            unsent_messages,
            retry_worker_running: self.ctx.worker_running(),
            registration_degraded: self.ctx.registration.is_degraded(),
        })
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    async fn deliver(&self, message: &MessageKind) -> Result<()> {
        let device_id = message.device_id();
        let Some(descriptor) = self.resolve(device_id).await? else {
            return Err(AgentError::Unregistered(device_id.clone()));
        };
        self.send_once(&descriptor, message).await
    }

    async fn send_once(&self, descriptor: &ConnectionDescriptor, message: &MessageKind) -> Result<()> {
        let sender = &self.ctx.sender;
        self.ctx
            .retry
            .run("send message", || sender.send(descriptor, message))
            .await?;
        info!(device_id = %message.device_id(), kind = message.message_type(), "Message delivered");
        Ok(())
    }

    /// Connection descriptor for `device_id`, registering the device on
    /// first use. Barcode-mapped devices go through the mapping table; the
    /// agent's own id is registered directly.
    async fn resolve(&self, device_id: &DeviceId) -> Result<Option<ConnectionDescriptor>> {
        let lookup = device_id.clone();
        let mapping = self
            .ctx
            .with_store(move |store| store.get_mapping_by_device(&lookup))
            .await?;

        let Some(mapping) = mapping else {
            return Ok(self.ctx.registration.register_device_with_cloud(device_id).await);
        };

        let Some(connection) = self
            .ctx
            .registration
            .get_device_connection_for_barcode(&mapping.barcode)
            .await?
        else {
            return Ok(None);
        };

        if connection.first_registration {
            let confirmation = MessageKind::RegistrationConfirmation {
                device_id: connection.device_id.clone(),
                barcode: mapping.barcode,
                registered_at: Utc::now(),
            };
            if let Err(e) = self.send_once(&connection.descriptor, &confirmation).await {
                if e.is_local() {
                    return Err(e);
                }
                warn!(device_id = %connection.device_id, error = %e, "Registration confirmation not delivered; queueing");
                self.enqueue(&confirmation).await?;
            }
        }
        Ok(Some(connection.descriptor))
    }

    async fn enqueue(&self, message: &MessageKind) -> Result<i64> {
        let message = message.clone();
        self.ctx
            .with_store(move |store| store.save_unsent_message(&message))
            .await
    }

    async fn mark_delivered(&self, item: &UnsentMessage) -> Result<()> {
        let id = item.id;
        self.ctx.with_store(move |store| store.mark_sent(id)).await?;
        self.mark_scan_delivered(&item.message).await
    }

    async fn mark_scan_delivered(&self, message: &MessageKind) -> Result<()> {
        if let MessageKind::BarcodeScan {
            device_id,
            barcode,
            timestamp,
            ..
        } = message
        {
            let (device_id, barcode, timestamp) = (device_id.clone(), barcode.clone(), *timestamp);
            self.ctx
                .with_store(move |store| store.mark_scan_sent(&device_id, &barcode, &timestamp))
                .await?;
        }
        Ok(())
    }
}
