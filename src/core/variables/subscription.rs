use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::core::errors::PvError;
use crate::core::execution::scheduler::TickObserver;
use crate::core::execution::snapshot::Snapshot;
use crate::core::types::{PortId, Tick};
use crate::core::values::Value;

/// Identifier of one open subscription
pub type SubscriptionId = Uuid;

/// A settled value that differs from the previous tick's value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub pv: String,
    pub tick: Tick,
    pub value: Value,
}

/// Publisher-side state of one subscription
struct Subscriber {
    pv: String,
    port: PortId,
    sender: Sender<ValueChange>,
    /// Receiver clone used to evict the oldest event when the buffer is full
    drain: Receiver<ValueChange>,
    dropped: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
}

impl Subscriber {
    /// Deliver without blocking, evicting the oldest event when full
    fn deliver(&self, mut event: ValueChange) {
        loop {
            match self.sender.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if self.drain.try_recv().is_ok() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Fans settled value changes out to open subscriptions.
///
/// Registered with the scheduler as a tick observer; every published tick is
/// compared port by port against the previous settled snapshot.
pub struct SubscriptionHub {
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber>>,
    capacity: usize,
    closed: AtomicBool,
}

impl SubscriptionHub {
    /// Create a hub buffering up to `capacity` events per subscription
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn open(self: &Arc<Self>, pv: &str, port: PortId) -> Result<Subscription, PvError> {
        let mut subscribers = self.subscribers.lock();
        if self.closed.load(Ordering::Acquire) {
            return Err(PvError::SimulationHalted);
        }

        let id = Uuid::new_v4();
        let (sender, receiver) = bounded(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));
        subscribers.insert(
            id,
            Subscriber {
                pv: pv.to_string(),
                port,
                sender,
                drain: receiver.clone(),
                dropped: dropped.clone(),
                cancelled: cancelled.clone(),
            },
        );
        debug!("subscription {} opened on '{}'", id, pv);

        Ok(Subscription {
            id,
            pv: pv.to_string(),
            receiver,
            dropped,
            cancelled,
            hub: Arc::downgrade(self),
        })
    }

    /// Cancel a subscription by id; returns whether it was open
    pub fn cancel(&self, id: SubscriptionId) -> bool {
        match self.subscribers.lock().remove(&id) {
            Some(subscriber) => {
                subscriber.cancelled.store(true, Ordering::Release);
                debug!("subscription {} on '{}' cancelled", id, subscriber.pv);
                true
            }
            None => false,
        }
    }

    /// End every subscription and refuse new ones
    pub fn close_all(&self) {
        let mut subscribers = self.subscribers.lock();
        self.closed.store(true, Ordering::Release);
        if !subscribers.is_empty() {
            info!("closing {} subscriptions", subscribers.len());
        }
        subscribers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of open subscriptions
    pub fn len(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TickObserver for SubscriptionHub {
    fn on_tick_published(&self, previous: &Snapshot, current: &Snapshot) {
        let subscribers = self.subscribers.lock();
        for subscriber in subscribers.values() {
            let value = current.value(subscriber.port);
            if previous.value(subscriber.port).same_as(value) {
                continue;
            }
            subscriber.deliver(ValueChange {
                pv: subscriber.pv.clone(),
                tick: current.tick(),
                value: value.clone(),
            });
        }
    }

    fn on_halt(&self) {
        self.close_all();
    }
}

/// Client handle of a value-change stream.
///
/// Iterating blocks until the next change; the iterator ends once the
/// subscription is cancelled or the simulation halts or shuts down.
/// Dropping the handle cancels the subscription.
pub struct Subscription {
    id: SubscriptionId,
    pv: String,
    receiver: Receiver<ValueChange>,
    dropped: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
    hub: Weak<SubscriptionHub>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pv(&self) -> &str {
        &self.pv
    }

    /// Events evicted because the buffer was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Stop the stream; no event is returned afterwards
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(hub) = self.hub.upgrade() {
            hub.cancel(self.id);
        }
    }

    /// Next buffered event, without blocking
    pub fn try_next(&self) -> Option<ValueChange> {
        if self.is_cancelled() {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait up to `timeout` for the next event
    pub fn next_timeout(&self, timeout: Duration) -> Option<ValueChange> {
        if self.is_cancelled() {
            return None;
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(event) if !self.is_cancelled() => Some(event),
            Ok(_) | Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Drain every event currently buffered
    pub fn pending(&self) -> Vec<ValueChange> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

impl Iterator for Subscription {
    type Item = ValueChange;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_cancelled() {
            return None;
        }
        match self.receiver.recv() {
            Ok(event) if !self.is_cancelled() => Some(event),
            _ => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pv", &self.pv)
            .field("dropped", &self.dropped())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
