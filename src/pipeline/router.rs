//! Outbound delivery to transports.
//!
//! The bridges post at most one PCM payload and one telemetry value per tick.
//! A dispatcher task stamps each message with the time it picked it up and
//! hands a copy to every transport that [accepts](Transport::accepts) it.
//! Each transport drains its own bounded lane, so a stalled network write
//! only costs that transport its backlog:
//!
//! ```text
//! outbound channel → dispatcher ─┬→ lane → uplink transport
//!                                └→ lane → channel transport
//! ```
//!
//! PCM is retried until `retry_attempts` run out or it goes stale, whichever
//! comes first. Telemetry is superseded by the next tick and sent once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::transport::Transport;
use crate::{BridgeError, BridgeEvent, DeliveryConfig, DropReason, EventCallback, OutboundMessage};

/// Command sent to the dispatcher task.
pub enum RouterCommand {
    /// Drain queued messages and stop.
    Stop,
}

/// How one message fared on one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Sent, after this many attempts.
    Sent {
        /// Attempts including the successful one.
        attempts: u32,
    },
    /// Given up on.
    Dropped(DropReason),
}

/// A message and the moment the dispatcher picked it up.
#[derive(Debug, Clone)]
struct Envelope {
    message: OutboundMessage,
    received_at: Instant,
}

/// One transport's queue and the task draining it.
struct Lane {
    transport: Arc<dyn Transport>,
    tx: mpsc::Sender<Envelope>,
    task: JoinHandle<()>,
}

/// Fans outbound messages out to transports, one lane per transport.
pub struct Router {
    transports: Vec<Arc<dyn Transport>>,
    event_callback: Option<EventCallback>,
    config: DeliveryConfig,
}

impl Router {
    /// Creates a router over `transports`.
    pub fn new(transports: Vec<Arc<dyn Transport>>, config: DeliveryConfig) -> Self {
        Self {
            transports,
            event_callback: None,
            config,
        }
    }

    /// Sets the event callback.
    pub fn with_event_callback(mut self, callback: Option<EventCallback>) -> Self {
        self.event_callback = callback;
        self
    }

    /// Spawns one draining task per transport.
    fn open_lanes(&self) -> Vec<Lane> {
        self.transports
            .iter()
            .map(|transport| {
                let (tx, rx) = mpsc::channel(self.config.lane_capacity);
                let task = tokio::spawn(run_lane(
                    transport.clone(),
                    rx,
                    self.config.clone(),
                    self.event_callback.clone(),
                ));
                Lane {
                    transport: transport.clone(),
                    tx,
                    task,
                }
            })
            .collect()
    }

    /// Queues `message` on every lane whose transport accepts it.
    ///
    /// Never waits: a full lane loses the message.
    fn dispatch(&self, lanes: &[Lane], message: &OutboundMessage) {
        let received_at = Instant::now();
        for lane in lanes {
            if !lane.transport.accepts(message) {
                continue;
            }
            let envelope = Envelope {
                message: message.clone(),
                received_at,
            };
            if lane.tx.try_send(envelope).is_err() {
                tracing::debug!(
                    transport = lane.transport.name(),
                    "Transport lagging, dropping message"
                );
                emit(
                    self.event_callback.as_ref(),
                    BridgeEvent::DeliveryDropped {
                        transport_name: lane.transport.name().to_string(),
                        reason: DropReason::Lagging,
                    },
                );
            }
        }
    }

    /// Closes every lane and waits for its backlog to be delivered.
    async fn close_lanes(lanes: Vec<Lane>) {
        let tasks: Vec<_> = lanes
            .into_iter()
            .map(|Lane { tx, task, .. }| {
                drop(tx);
                task
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Delivery lane task failed");
            }
        }
    }

    /// Starts all transports.
    ///
    /// Returns an error if any transport fails to start.
    pub async fn start_transports(&self) -> Result<(), BridgeError> {
        for transport in &self.transports {
            transport
                .on_start()
                .await
                .map_err(|e| BridgeError::TransportStartFailed {
                    transport_name: transport.name().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Stops all transports.
    pub async fn stop_transports(&self) {
        for transport in &self.transports {
            if let Err(e) = transport.on_stop().await {
                emit(
                    self.event_callback.as_ref(),
                    BridgeEvent::TransportError {
                        transport_name: transport.name().to_string(),
                        error: format!("Error during shutdown: {e}"),
                    },
                );
            }
        }
    }

    /// Dispatches messages until stopped, then drains the lanes and stops
    /// the transports.
    pub async fn run(
        self,
        mut message_rx: mpsc::Receiver<OutboundMessage>,
        mut cmd_rx: mpsc::Receiver<RouterCommand>,
    ) {
        let lanes = self.open_lanes();

        loop {
            tokio::select! {
                Some(message) = message_rx.recv() => {
                    self.dispatch(&lanes, &message);
                }
                Some(cmd) = cmd_rx.recv() => {
                    match cmd {
                        RouterCommand::Stop => {
                            while let Ok(message) = message_rx.try_recv() {
                                self.dispatch(&lanes, &message);
                            }
                            break;
                        }
                    }
                }
                else => break,
            }
        }

        Self::close_lanes(lanes).await;
        self.stop_transports().await;
    }
}

fn emit(callback: Option<&EventCallback>, event: BridgeEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}

async fn run_lane(
    transport: Arc<dyn Transport>,
    mut rx: mpsc::Receiver<Envelope>,
    config: DeliveryConfig,
    event_callback: Option<EventCallback>,
) {
    let mut sent: u64 = 0;
    let mut dropped: u64 = 0;

    while let Some(envelope) = rx.recv().await {
        match deliver(transport.as_ref(), &envelope, &config, event_callback.as_ref()).await {
            Delivery::Sent { attempts } => {
                sent += 1;
                if attempts > 1 {
                    tracing::debug!(transport = transport.name(), attempts, "Sent after retry");
                }
            }
            Delivery::Dropped(reason) => {
                dropped += 1;
                tracing::debug!(transport = transport.name(), %reason, "Message dropped");
                emit(
                    event_callback.as_ref(),
                    BridgeEvent::DeliveryDropped {
                        transport_name: transport.name().to_string(),
                        reason,
                    },
                );
            }
        }
    }

    tracing::debug!(transport = transport.name(), sent, dropped, "Delivery lane closed");
}

/// Sends one message, retrying PCM while it is still fresh.
async fn deliver(
    transport: &dyn Transport,
    envelope: &Envelope,
    config: &DeliveryConfig,
    event_callback: Option<&EventCallback>,
) -> Delivery {
    let is_pcm = envelope.message.is_pcm();
    let max_attempts = if is_pcm { config.retry_attempts.max(1) } else { 1 };
    let deadline = envelope.received_at + config.stale_after;

    let mut attempts = 0;
    loop {
        if is_pcm && Instant::now() >= deadline {
            return Delivery::Dropped(DropReason::Stale);
        }

        attempts += 1;
        match transport.send(&envelope.message).await {
            Ok(()) => return Delivery::Sent { attempts },
            Err(e) => {
                tracing::warn!(
                    transport = transport.name(),
                    attempt = attempts,
                    error = %e,
                    "Transport send failed"
                );
                emit(
                    event_callback,
                    BridgeEvent::TransportError {
                        transport_name: transport.name().to_string(),
                        error: e.to_string(),
                    },
                );
                if attempts >= max_attempts {
                    return Delivery::Dropped(DropReason::RetriesExhausted);
                }
                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }
}

/// Handle to a running delivery task.
///
/// Returned by [`VoiceBridge::start_delivery()`]. Messages posted by the
/// bridges are forwarded to the transports until [`stop()`](Self::stop) is
/// called or the handle is dropped.
///
/// [`VoiceBridge::start_delivery()`]: crate::VoiceBridge::start_delivery
pub struct DeliveryHandle {
    running: Arc<AtomicBool>,
    cmd_tx: mpsc::Sender<RouterCommand>,
    router_handle: Option<JoinHandle<()>>,
}

impl DeliveryHandle {
    /// Starts the transports and spawns the dispatcher task.
    pub(crate) async fn spawn(
        router: Router,
        message_rx: mpsc::Receiver<OutboundMessage>,
    ) -> Result<Self, BridgeError> {
        router.start_transports().await?;

        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let router_handle = tokio::spawn(router.run(message_rx, cmd_rx));

        Ok(Self {
            running: Arc::new(AtomicBool::new(true)),
            cmd_tx,
            router_handle: Some(router_handle),
        })
    }

    /// Returns `true` if delivery is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drains queued messages, stops the transports and waits for the
    /// dispatcher task to finish.
    pub async fn stop(mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let _ = self.cmd_tx.send(RouterCommand::Stop).await;
        if let Some(handle) = self.router_handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for DeliveryHandle {
    fn drop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.cmd_tx.try_send(RouterCommand::Stop);
        }
    }
}
