//! Event bus fanning inbound envelopes out to independent subscribers.
//!
//! Each subscriber owns a bounded queue. `dispatch` awaits room in every queue,
//! so a subscriber that stops reading stalls the whole bus instead of losing
//! envelopes. Unsubscribing drops the queue's receiver, which releases a
//! dispatch blocked on it.
//!
//! Lock discipline: the subscriber list sits behind a reader/writer lock.
//! `dispatch` copies the senders out under the read lock and delivers with the
//! lock released; `subscribe` / `unsubscribe` take the write lock.
//!
//! The bus also counts how many streams hold each live channel, so the last
//! one out knows to unsubscribe upstream.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tape_telemetry::Metrics;
use tape_ws::{Envelope, WsError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default per-subscriber queue size.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// One item in a subscriber queue: an envelope, or the transport failure that
/// ended the current connection.
pub type Delivery = Result<Arc<Envelope>, WsError>;

/// Identifier of a registration. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Receiving end of a bus registration, owned by exactly one consumer.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    rx: mpsc::Receiver<Delivery>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next delivery. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Take a delivery if one is queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

/// Lock-guarded subscriber registry with blocking fan-out.
pub struct EventBus {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, mpsc::Sender<Delivery>)>>,
    channels: Mutex<HashMap<String, usize>>,
}

impl EventBus {
    /// Create a bus whose subscriber queues hold `capacity` deliveries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            subscribers: RwLock::new(Vec::new()),
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fresh queue.
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);

        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.push((id, tx));
            subscribers.len()
        };
        Metrics::bus_subscribers_set(count);
        debug!(%id, subscribers = count, "Subscribed");

        Subscription { id, rx }
    }

    /// Remove a registration and drop its queue.
    ///
    /// A dispatch that already copied the sender fails its delivery once the
    /// receiver is gone; no later dispatch targets the queue.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let id = subscription.id;
        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.retain(|(sid, _)| *sid != id);
            subscribers.len()
        };
        drop(subscription);
        Metrics::bus_subscribers_set(count);
        debug!(%id, subscribers = count, "Unsubscribed");
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Record one more stream on `channel`. Returns the number of holders.
    pub fn claim_channel(&self, channel: &str) -> usize {
        let mut channels = self.channels.lock();
        let holders = channels.entry(channel.to_string()).or_insert(0);
        *holders += 1;
        *holders
    }

    /// Drop one holder of `channel`. True when it was the last one.
    pub fn release_channel(&self, channel: &str) -> bool {
        let mut channels = self.channels.lock();
        match channels.get_mut(channel) {
            Some(holders) if *holders > 1 => {
                *holders -= 1;
                false
            }
            Some(_) => {
                channels.remove(channel);
                true
            }
            None => false,
        }
    }

    /// Deliver an envelope to every registered queue, in registration order.
    ///
    /// Returns the number of queues that accepted it.
    pub async fn dispatch(&self, envelope: Envelope) -> usize {
        Metrics::envelope_dispatched(envelope.event());
        self.deliver(Ok(Arc::new(envelope))).await
    }

    /// Deliver a transport failure to every registered queue.
    pub async fn dispatch_error(&self, error: WsError) -> usize {
        self.deliver(Err(error)).await
    }

    async fn deliver(&self, delivery: Delivery) -> usize {
        let targets = self.subscribers.read().clone();

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (id, tx) in targets {
            if tx.send(delivery.clone()).await.is_ok() {
                delivered += 1;
            } else {
                trace!(%id, "Queue closed, skipping");
                gone.push(id);
            }
        }

        // Receivers dropped without unsubscribe
        if !gone.is_empty() {
            let count = {
                let mut subscribers = self.subscribers.write();
                subscribers.retain(|(sid, _)| !gone.contains(sid));
                subscribers.len()
            };
            Metrics::bus_subscribers_set(count);
        }
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn envelope(n: u64) -> Envelope {
        Envelope::from_text(&format!(
            r#"{{"channel":"live_trades_btcusd","event":"trade","data":{{"id":{n}}}}}"#
        ))
        .unwrap()
    }

    fn payload_id(delivery: Delivery) -> String {
        delivery.unwrap().payload().to_string()
    }

    #[tokio::test]
    async fn test_each_subscriber_gets_one_copy_in_order() {
        let bus = EventBus::new(8);
        let mut subs: Vec<Subscription> = (0..3).map(|_| bus.subscribe()).collect();

        assert_eq!(bus.dispatch(envelope(1)).await, 3);
        assert_eq!(bus.dispatch(envelope(2)).await, 3);

        for sub in &mut subs {
            assert_eq!(payload_id(sub.try_recv().unwrap()), r#"{"id":1}"#);
            assert_eq!(payload_id(sub.try_recv().unwrap()), r#"{"id":2}"#);
            assert!(sub.try_recv().is_none());
        }
    }

    #[test]
    fn test_channel_released_by_last_holder() {
        let bus = EventBus::default();
        assert_eq!(bus.claim_channel("live_trades_btcusd"), 1);
        assert_eq!(bus.claim_channel("live_trades_btcusd"), 2);
        assert_eq!(bus.claim_channel("live_trades_etheur"), 1);

        assert!(!bus.release_channel("live_trades_btcusd"));
        assert!(bus.release_channel("live_trades_btcusd"));
        assert!(!bus.release_channel("live_trades_btcusd"));
        assert!(bus.release_channel("live_trades_etheur"));
    }

    #[tokio::test]
    async fn test_unsubscribed_queue_receives_nothing_more() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let b = bus.subscribe();
        let mut c = bus.subscribe();

        bus.unsubscribe(b);
        assert_eq!(bus.subscriber_count(), 2);
        assert_eq!(bus.dispatch(envelope(1)).await, 2);

        assert!(a.try_recv().is_some());
        assert!(c.try_recv().is_some());
    }

    #[tokio::test]
    async fn test_ids_are_not_reused() {
        let bus = EventBus::new(1);
        let a = bus.subscribe();
        let first = a.id();
        bus.unsubscribe(a);
        let b = bus.subscribe();
        assert_ne!(first, b.id());
    }

    #[tokio::test]
    async fn test_full_queue_blocks_dispatch_until_unsubscribe() {
        let bus = Arc::new(EventBus::new(1));
        let stuck = bus.subscribe();
        let mut healthy = bus.subscribe();

        assert_eq!(bus.dispatch(envelope(1)).await, 2);

        let dispatch = tokio::spawn({
            let bus = Arc::clone(&bus);
            async move { bus.dispatch(envelope(2)).await }
        });

        // Stuck queue is full: the second dispatch cannot finish.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!dispatch.is_finished());

        // Make room in the healthy queue; the stuck one still blocks.
        assert_eq!(payload_id(healthy.recv().await.unwrap()), r#"{"id":1}"#);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!dispatch.is_finished());

        bus.unsubscribe(stuck);
        let delivered = tokio::time::timeout(Duration::from_secs(1), dispatch)
            .await
            .expect("dispatch released")
            .unwrap();
        assert_eq!(delivered, 1);

        assert_eq!(payload_id(healthy.try_recv().unwrap()), r#"{"id":2}"#);
        assert!(healthy.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_during_dispatch() {
        let bus = Arc::new(EventBus::new(1));
        let _stuck = bus.subscribe();
        bus.dispatch(envelope(1)).await;

        let dispatch = tokio::spawn({
            let bus = Arc::clone(&bus);
            async move { bus.dispatch(envelope(2)).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Registration does not wait for the blocked dispatch.
        let late = tokio::time::timeout(Duration::from_millis(100), async { bus.subscribe() })
            .await
            .unwrap();
        assert_eq!(bus.subscriber_count(), 2);
        drop(late);
        dispatch.abort();
    }

    #[tokio::test]
    async fn test_error_reaches_every_subscriber() {
        let bus = EventBus::new(4);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let err = WsError::Receive("reset".to_string());
        assert_eq!(bus.dispatch_error(err.clone()).await, 2);
        assert_eq!(a.recv().await.unwrap().unwrap_err(), err);
        assert_eq!(b.recv().await.unwrap().unwrap_err(), err);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let bus = EventBus::new(4);
        let gone = bus.subscribe();
        let _kept = bus.subscribe();
        drop(gone);

        assert_eq!(bus.dispatch(envelope(1)).await, 1);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
