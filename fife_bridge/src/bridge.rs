//! Paired, lock-protected event transport between two endpoints.
//!
//! Every [`AsyncBridge`] owns an unshared send buffer and a shared outgoing
//! queue. Once paired it also holds a handle to the peer's outgoing queue,
//! which is where it reads from. An endpoint only ever locks its own
//! outgoing queue (when flushing) or the peer's outgoing queue (when
//! draining); there is no incoming queue to lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, trace};
use serde::Serialize;
use thiserror::Error;

use crate::event::{code, Event, PayloadType};

pub type BridgeId = u64;

static NEXT_BRIDGE_ID: AtomicU64 = AtomicU64::new(1);

type Queue = Mutex<VecDeque<Event>>;

fn lock(queue: &Queue) -> MutexGuard<'_, VecDeque<Event>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("bridge #{endpoint} is already paired with #{peer}")]
    AlreadyPaired { endpoint: BridgeId, peer: BridgeId },
}

/// Transport counters. `dropped` counts events sent while no live peer was
/// linked; `lost` counts events discarded by [`AsyncBridge::clear_queue`]
/// or left behind after a shutdown sentinel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub queued: u64,
    pub flushed: u64,
    pub processed: u64,
    pub dropped: u64,
    pub lost: u64,
}

/// Result of one [`Endpoint::process_events`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drain {
    Processed(usize),
    Shutdown,
}

#[derive(Debug)]
struct Peer {
    id: BridgeId,
    inbox: Arc<Queue>,
    alive: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct AsyncBridge {
    id: BridgeId,
    tick: u32,
    buffer: Vec<Event>,
    outbox: Arc<Queue>,
    alive: Arc<AtomicBool>,
    peer: Option<Peer>,
    shut_down: bool,
    stats: BridgeStats,
}

impl Default for AsyncBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncBridge {
    pub fn new() -> Self {
        AsyncBridge {
            id: NEXT_BRIDGE_ID.fetch_add(1, Ordering::Relaxed),
            tick: 0,
            buffer: Vec::new(),
            outbox: Arc::new(Mutex::new(VecDeque::new())),
            alive: Arc::new(AtomicBool::new(true)),
            peer: None,
            shut_down: false,
            stats: BridgeStats::default(),
        }
    }

    pub fn id(&self) -> BridgeId {
        self.id
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    pub fn peer_id(&self) -> Option<BridgeId> {
        self.live_peer().map(|peer| peer.id)
    }

    pub fn is_paired(&self) -> bool {
        self.live_peer().is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Current value of this endpoint's clock; stamped onto new events.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn set_tick(&mut self, tick: u32) {
        self.tick = tick;
    }

    pub fn event(&self, kind: u8, code: u16) -> Event {
        Event::new(kind, code, self.tick)
    }

    pub fn event_with<T: PayloadType>(&self, kind: u8, code: u16, payload: T) -> Event {
        Event::with_payload(kind, code, self.tick, payload)
    }

    fn live_peer(&self) -> Option<&Peer> {
        self.peer
            .as_ref()
            .filter(|peer| peer.alive.load(Ordering::Acquire))
    }

    fn link_to(&self) -> Peer {
        Peer {
            id: self.id,
            inbox: self.outbox.clone(),
            alive: self.alive.clone(),
        }
    }

    /// Link two endpoints symmetrically. Pairing the same two endpoints
    /// again is a no-op; pairing either of them with a third fails.
    pub fn pair(&mut self, other: &mut AsyncBridge) -> Result<(), BridgeError> {
        for (endpoint, wanted) in [(&*self, other.id), (&*other, self.id)] {
            if let Some(existing) = endpoint.peer_id() {
                if existing != wanted {
                    return Err(BridgeError::AlreadyPaired {
                        endpoint: endpoint.id,
                        peer: existing,
                    });
                }
            }
        }
        self.peer = Some(other.link_to());
        other.peer = Some(self.link_to());
        debug!(target: "async_bridge", "paired bridge #{} with #{}", self.id, other.id);
        Ok(())
    }

    /// Forget the peer. Events sent afterwards are counted as dropped.
    pub fn unlink(&mut self) {
        if let Some(peer) = self.peer.take() {
            debug!(target: "async_bridge", "bridge #{} unlinked from #{}", self.id, peer.id);
        }
    }

    /// Append to the local send buffer. Without a live peer the event is
    /// discarded and only the `dropped` counter records it.
    pub fn send_event(&mut self, event: Event) {
        if !self.is_paired() {
            self.stats.dropped += 1;
            trace!(
                target: "async_bridge",
                "bridge #{} has no peer; dropped event {:#06x}",
                self.id,
                event.code()
            );
            return;
        }
        self.stats.queued += 1;
        self.buffer.push(event);
    }

    /// Move the send buffer into the shared outgoing queue, preserving order.
    pub fn send_events(&mut self) -> usize {
        if self.buffer.is_empty() {
            return 0;
        }
        let count = self.buffer.len();
        lock(&self.outbox).extend(self.buffer.drain(..));
        self.stats.flushed += count as u64;
        count
    }

    pub fn send_shutdown(&mut self) {
        let sentinel = Event::shutdown(self.tick);
        self.send_event(sentinel);
        self.send_events();
    }

    /// Drain the peer's outgoing queue under its lock.
    ///
    /// Returns `None` once the shutdown sentinel has been processed.
    pub fn take_incoming(&mut self) -> Option<Vec<Event>> {
        if self.shut_down {
            return None;
        }
        let Some(peer) = self.peer.as_ref() else {
            return Some(Vec::new());
        };
        let batch: Vec<Event> = lock(&peer.inbox).drain(..).collect();
        if !peer.alive.load(Ordering::Acquire) {
            self.unlink();
        }
        Some(batch)
    }

    /// Handling shared by every endpoint: only the shutdown sentinel is
    /// recognised here.
    pub fn process_base_event(&mut self, event: &Event) {
        if event.code() == code::SHUTDOWN {
            debug!(target: "async_bridge", "bridge #{} received shutdown", self.id);
            self.shut_down = true;
        } else {
            debug!(
                target: "async_bridge",
                "bridge #{} ignored unhandled event {:#06x} (type {})",
                self.id,
                event.code(),
                event.kind()
            );
        }
    }

    fn record_processed(&mut self, count: usize) {
        self.stats.processed += count as u64;
    }

    fn record_lost(&mut self, count: usize) {
        self.stats.lost += count as u64;
    }

    /// Discard everything still buffered or queued in either direction.
    /// Only meaningful once the peer has stopped; returns the count lost.
    pub fn clear_queue(&mut self) -> usize {
        let mut lost = self.buffer.len();
        self.buffer.clear();
        lost += lock(&self.outbox).drain(..).count();
        if let Some(peer) = self.peer.as_ref() {
            lost += lock(&peer.inbox).drain(..).count();
        }
        self.record_lost(lost);
        lost
    }
}

// Flushed events stay in the outgoing queue so the peer can still drain or
// account for them; only the unflushed buffer is lost here.
impl Drop for AsyncBridge {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        if !self.buffer.is_empty() {
            debug!(
                target: "async_bridge",
                "bridge #{} dropped with {} unflushed events",
                self.id,
                self.buffer.len()
            );
        }
    }
}

/// One side of a bridge pairing. Implementors override
/// [`Endpoint::process_event`] for the codes they understand and must hand
/// everything else to [`AsyncBridge::process_base_event`].
pub trait Endpoint {
    fn with_bridge<R>(&mut self, f: impl FnOnce(&mut AsyncBridge) -> R) -> R;

    fn process_event(&mut self, event: &Event) {
        self.with_bridge(|bridge| bridge.process_base_event(event));
    }

    fn send_event(&mut self, event: Event) {
        self.with_bridge(|bridge| bridge.send_event(event));
    }

    fn send_events(&mut self) -> usize {
        self.with_bridge(AsyncBridge::send_events)
    }

    /// Dispatch everything the peer has flushed, in order. Events behind a
    /// shutdown sentinel in the same batch are not dispatched.
    fn process_events(&mut self) -> Drain {
        let Some(batch) = self.with_bridge(AsyncBridge::take_incoming) else {
            return Drain::Shutdown;
        };
        let mut processed = 0;
        let mut pending = batch.into_iter();
        while let Some(event) = pending.next() {
            self.process_event(&event);
            processed += 1;
            if self.with_bridge(|bridge| bridge.is_shut_down()) {
                let skipped = pending.len();
                self.with_bridge(|bridge| {
                    bridge.record_processed(processed);
                    bridge.record_lost(skipped);
                });
                return Drain::Shutdown;
            }
        }
        self.with_bridge(|bridge| bridge.record_processed(processed));
        Drain::Processed(processed)
    }
}

impl Endpoint for AsyncBridge {
    fn with_bridge<R>(&mut self, f: impl FnOnce(&mut AsyncBridge) -> R) -> R {
        f(self)
    }
}
