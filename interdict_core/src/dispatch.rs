//! The "DISPATCH" Engine - fire-and-forget delivery to live channels
//!
//! Workers never touch a socket. They call [`EventSink`] methods on a
//! cloned [`DispatchHandle`], which serializes the event and `try_send`s it
//! into a bounded queue. The [`EventDispatcher`] loop, running on the
//! context that owns the channels, drains the queue and performs the sends.
//!
//! ```text
//! worker thread ──try_send──► [bounded mpsc] ──► dispatch loop ──► PushChannel
//!                                                     │
//!                                                     └─ send failed ⇒ evict
//! ```
//!
//! Nothing here ever reports a delivery failure upstream.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use interdict_env::{ChannelTarget, ClientId, InterdictContext, PushChannel};

use crate::config::DispatchConfig;
use crate::events::AlertEvent;

/// Where components publish events.
///
/// Implementations must not block and must never fail the caller.
pub trait EventSink: Send + Sync {
    /// Deliver to one officer's channel; no-op if none is registered.
    fn send_to_officer(&self, officer_id: &str, event: &AlertEvent);

    /// Deliver to every control channel.
    fn broadcast(&self, event: &AlertEvent);
}

// ============================================================================
// CHANNEL REGISTRY
// ============================================================================

/// The two addressable channel sets, owned by the I/O side.
#[derive(Default)]
pub struct ChannelRegistry {
    officers: RwLock<HashMap<String, Arc<dyn PushChannel>>>,
    control: RwLock<HashMap<ClientId, Arc<dyn PushChannel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an officer channel. Returns true if it replaced one.
    pub async fn register_officer(
        &self,
        officer_id: impl Into<String>,
        channel: Arc<dyn PushChannel>,
    ) -> bool {
        let officer_id = officer_id.into();
        let replaced = self
            .officers
            .write()
            .await
            .insert(officer_id.clone(), channel)
            .is_some();
        info!(officer_id = %officer_id, replaced, "Officer channel registered");
        replaced
    }

    pub async fn deregister_officer(&self, officer_id: &str) -> bool {
        let removed = self.officers.write().await.remove(officer_id).is_some();
        if removed {
            info!(officer_id = %officer_id, "Officer channel deregistered");
        }
        removed
    }

    /// Register a control-dashboard channel. Returns true if it replaced one.
    pub async fn register_control(&self, client: ClientId, channel: Arc<dyn PushChannel>) -> bool {
        let replaced = self.control.write().await.insert(client, channel).is_some();
        info!(client = %client, replaced, "Control channel registered");
        replaced
    }

    pub async fn deregister_control(&self, client: ClientId) -> bool {
        let removed = self.control.write().await.remove(&client).is_some();
        if removed {
            info!(client = %client, "Control channel deregistered");
        }
        removed
    }

    pub async fn officer_count(&self) -> usize {
        self.officers.read().await.len()
    }

    pub async fn control_count(&self) -> usize {
        self.control.read().await.len()
    }

    /// Remove `officer_id` only if it still maps to `channel`, so a
    /// reconnect that raced the failed send survives.
    async fn evict_officer(&self, officer_id: &str, channel: &Arc<dyn PushChannel>) -> bool {
        let mut officers = self.officers.write().await;
        match officers.get(officer_id) {
            Some(current) if Arc::ptr_eq(current, channel) => {
                officers.remove(officer_id);
                true
            }
            _ => false,
        }
    }

    async fn evict_control(&self, client: ClientId, channel: &Arc<dyn PushChannel>) -> bool {
        let mut control = self.control.write().await;
        match control.get(&client) {
            Some(current) if Arc::ptr_eq(current, channel) => {
                control.remove(&client);
                true
            }
            _ => false,
        }
    }
}

// ============================================================================
// HANDOFF
// ============================================================================

/// One serialized payload addressed to a channel set.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: ChannelTarget,
    pub payload: String,
}

/// Point-in-time copy of the dispatch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Successful channel sends (a broadcast counts once per channel)
    pub delivered: u64,
    /// Deliveries discarded before reaching the loop
    pub dropped: u64,
    /// Channels removed after a failed send
    pub evicted: u64,
}

#[derive(Default)]
struct Shared {
    active: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

impl Shared {
    fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Clears the active flag however the loop exits.
struct ActiveGuard(Arc<Shared>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.store(false, Ordering::Release);
    }
}

/// Cheap, cloneable, non-blocking entry point for worker threads.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<Delivery>,
    shared: Arc<Shared>,
}

impl DispatchHandle {
    /// Whether a dispatch loop is currently draining the queue.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DispatchStats {
        self.shared.stats()
    }

    /// Read-only view of the counters that does not keep the loop alive.
    pub fn monitor(&self) -> DispatchMonitor {
        DispatchMonitor {
            shared: Arc::clone(&self.shared),
        }
    }

    fn enqueue(&self, target: ChannelTarget, event: &AlertEvent) {
        if !self.is_active() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(channel = %target, event = event.kind(), "Dispatch loop inactive, delivery dropped");
            return;
        }

        let payload = match event.to_json() {
            Ok(p) => p,
            Err(e) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, event = event.kind(), "Failed to serialize event");
                return;
            }
        };

        match self.tx.try_send(Delivery { target, payload }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(d)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(channel = %d.target, event = event.kind(), "Dispatch queue full, delivery dropped");
            }
            Err(mpsc::error::TrySendError::Closed(d)) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(channel = %d.target, event = event.kind(), "Dispatch loop gone, delivery dropped");
            }
        }
    }
}

/// Observes a dispatcher without holding a sender.
///
/// Once every `DispatchHandle` is dropped the loop drains and stops;
/// `is_active` turns false at that point.
#[derive(Clone)]
pub struct DispatchMonitor {
    shared: Arc<Shared>,
}

impl DispatchMonitor {
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DispatchStats {
        self.shared.stats()
    }
}

impl EventSink for DispatchHandle {
    fn send_to_officer(&self, officer_id: &str, event: &AlertEvent) {
        self.enqueue(ChannelTarget::Officer(officer_id.to_string()), event);
    }

    fn broadcast(&self, event: &AlertEvent) {
        self.enqueue(ChannelTarget::Control, event);
    }
}

// ============================================================================
// DISPATCH LOOP
// ============================================================================

/// Drains the handoff queue and performs channel sends.
pub struct EventDispatcher {
    rx: mpsc::Receiver<Delivery>,
    registry: Arc<ChannelRegistry>,
    shared: Arc<Shared>,
}

impl EventDispatcher {
    /// Create the loop and its handle. Nothing is delivered until the loop
    /// is started with [`EventDispatcher::run`] or [`EventDispatcher::spawn`].
    pub fn new(config: &DispatchConfig, registry: Arc<ChannelRegistry>) -> (Self, DispatchHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shared = Arc::new(Shared::default());
        let handle = DispatchHandle {
            tx,
            shared: Arc::clone(&shared),
        };
        (Self { rx, registry, shared }, handle)
    }

    /// Mark the loop active immediately and run it on `ctx`.
    pub fn spawn<Ctx: InterdictContext>(self, ctx: &Ctx) {
        self.shared.active.store(true, Ordering::Release);
        ctx.spawn("event-dispatcher", self.run());
    }

    /// Run until every `DispatchHandle` has been dropped.
    pub async fn run(mut self) {
        self.shared.active.store(true, Ordering::Release);
        let _guard = ActiveGuard(Arc::clone(&self.shared));
        info!("Event dispatcher started");

        while let Some(delivery) = self.rx.recv().await {
            self.deliver(delivery).await;
        }

        info!(stats = ?self.shared.stats(), "Event dispatcher stopped");
    }

    async fn deliver(&self, delivery: Delivery) {
        match &delivery.target {
            ChannelTarget::Officer(officer_id) => {
                // Clone out so the lock isn't held across the send
                let channel = self.registry.officers.read().await.get(officer_id).cloned();
                let Some(channel) = channel else {
                    debug!(officer_id = %officer_id, "No channel for officer, skipping");
                    return;
                };
                match channel.send(&delivery.payload).await {
                    Ok(()) => {
                        self.shared.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        if self.registry.evict_officer(officer_id, &channel).await {
                            self.shared.evicted.fetch_add(1, Ordering::Relaxed);
                        }
                        warn!(officer_id = %officer_id, error = %e, "Officer channel failed, evicted");
                    }
                }
            }
            ChannelTarget::Control => {
                let channels: Vec<(ClientId, Arc<dyn PushChannel>)> = self
                    .registry
                    .control
                    .read()
                    .await
                    .iter()
                    .map(|(id, ch)| (*id, Arc::clone(ch)))
                    .collect();

                for (client, channel) in channels {
                    match channel.send(&delivery.payload).await {
                        Ok(()) => {
                            self.shared.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            if self.registry.evict_control(client, &channel).await {
                                self.shared.evicted.fetch_add(1, Ordering::Relaxed);
                            }
                            warn!(client = %client, error = %e, "Control channel failed, evicted");
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// TEST SUPPORT
// ============================================================================

/// Sink that records every event, for component tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub officer: std::sync::Mutex<Vec<(String, AlertEvent)>>,
    pub control: std::sync::Mutex<Vec<AlertEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn officer_events(&self) -> Vec<(String, AlertEvent)> {
        self.officer.lock().unwrap().clone()
    }

    pub fn control_events(&self) -> Vec<AlertEvent> {
        self.control.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn send_to_officer(&self, officer_id: &str, event: &AlertEvent) {
        self.officer
            .lock()
            .unwrap()
            .push((officer_id.to_string(), event.clone()));
    }

    fn broadcast(&self, event: &AlertEvent) {
        self.control.lock().unwrap().push(event.clone());
    }
}
