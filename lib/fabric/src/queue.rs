//! The queue itself: per-subscriber FIFOs guarded by one mutex/condvar pair, as spec.md §5's
//! "shared resource policy" prescribes ("a single mutex + condition pair per queue"). Reference
//! counting for `postRef`/`dereference` (invariant 7 in spec.md §8) falls directly out of `Arc`'s
//! own strong count - every subscriber that receives a reference holds a clone, and the
//! underlying buffer is freed exactly once, when the last clone (including the queue's own, once
//! it has fanned the message out) drops.

use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SubscriberKind {
    /// The publisher blocks (up to a timeout) if this subscriber is full; it never drops for it.
    Confidence,
    /// The publisher silently drops the message for this subscriber when it is full.
    Opportunity,
}

/// Return-code vocabulary shared across the core (spec.md §4.1): `Posted` banks the count of
/// subscribers the message actually reached, in place of a bare positive integer.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueStatus {
    Posted(usize),
    Bytes(usize),
    Timeout,
    NoSubscribers,
    Error(String),
}

impl QueueStatus {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, QueueStatus::Posted(_) | QueueStatus::Bytes(_))
    }
}

type SubscriberId = u64;

struct SubscriberState {
    kind: SubscriberKind,
    depth: usize,
    max_size: usize,
    inbox: VecDeque<Arc<[u8]>>,
}

struct QueueInner {
    subscribers: IndexMap<SubscriberId, SubscriberState>,
    next_subscriber_id: SubscriberId,
    publisher_count: usize,
    opportunity_drops: u64,
}

/// A named, bounded, multi-subscriber channel. Created at first publisher or subscriber
/// attachment and torn down (by the directory, see `directory.rs`) once the last attachment
/// releases.
pub struct Queue {
    name: String,
    inner: Mutex<QueueInner>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl Queue {
    pub(crate) fn new(name: impl Into<String>) -> Arc<Queue> {
        Arc::new(Queue {
            name: name.into(),
            inner: Mutex::new(QueueInner {
                subscribers: IndexMap::new(),
                next_subscriber_id: 0,
                publisher_count: 0,
                opportunity_drops: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once no publisher or subscriber remains attached; the directory uses this, not
    /// `Arc::strong_count`, so reaping is correct regardless of the order in which a dropping
    /// handle's own fields are torn down.
    pub(crate) fn is_unused(&self) -> bool {
        let inner = self.inner.lock().expect("queue mutex poisoned");
        inner.publisher_count == 0 && inner.subscribers.is_empty()
    }

    /// Total messages silently dropped for opportunity subscribers since creation.
    pub fn opportunity_drops(&self) -> u64 {
        self.inner.lock().expect("queue mutex poisoned").opportunity_drops
    }

    pub(crate) fn attach_publisher(&self) {
        self.inner.lock().expect("queue mutex poisoned").publisher_count += 1;
    }

    pub(crate) fn detach_publisher(&self) {
        self.inner.lock().expect("queue mutex poisoned").publisher_count -= 1;
    }

    pub(crate) fn attach_subscriber(&self, kind: SubscriberKind, depth: usize, max_size: usize) -> SubscriberId {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        let id = inner.next_subscriber_id;
        inner.next_subscriber_id += 1;
        inner.subscribers.insert(
            id,
            SubscriberState {
                kind,
                depth,
                max_size,
                inbox: VecDeque::new(),
            },
        );
        id
    }

    pub(crate) fn detach_subscriber(&self, id: SubscriberId) {
        let mut inner = self.inner.lock().expect("queue mutex poisoned");
        inner.subscribers.remove(&id);
        drop(inner);
        // Publishers blocked waiting on this subscriber's capacity can now proceed.
        self.not_full.notify_all();
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("queue mutex poisoned").subscribers.len()
    }

    /// `(count, depth)` of the fullest confidence subscriber, used by a cluster-socket READER
    /// (gdf_net) to compute its outgoing meter byte (§4.3.3). Falls back to the fullest
    /// subscriber of any kind if there are no confidence subscribers, and to `(0, 0)` if there
    /// are none at all.
    pub fn meter_sample(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("queue mutex poisoned");

        let worst = inner
            .subscribers
            .values()
            .filter(|s| s.kind == SubscriberKind::Confidence)
            .max_by_key(|s| s.inbox.len());

        let worst = worst.or_else(|| inner.subscribers.values().max_by_key(|s| s.inbox.len()));

        match worst {
            Some(s) => (s.inbox.len(), s.depth),
            None => (0, 0),
        }
    }

    /// Shared implementation for `postCopy`/`postRef`: both produce an `Arc<[u8]>`, the only
    /// difference being whether the caller already owned a boxed buffer (`postRef`, zero extra
    /// copy) or handed over a borrowed slice that must be copied first (`postCopy`).
    fn post(&self, payload: Arc<[u8]>, timeout: Duration) -> QueueStatus {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().expect("queue mutex poisoned");

        if inner.subscribers.is_empty() {
            return QueueStatus::NoSubscribers;
        }

        // Block up to `timeout` while any confidence subscriber is full. Opportunity
        // subscribers never gate the wait.
        loop {
            let blocked = inner
                .subscribers
                .values()
                .any(|s| s.kind == SubscriberKind::Confidence && s.inbox.len() >= s.depth);

            if !blocked {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                return QueueStatus::Timeout;
            }

            let (guard, timeout_result) = self
                .not_full
                .wait_timeout(inner, deadline - now)
                .expect("queue condvar poisoned");
            inner = guard;

            if timeout_result.timed_out() {
                let still_blocked = inner
                    .subscribers
                    .values()
                    .any(|s| s.kind == SubscriberKind::Confidence && s.inbox.len() >= s.depth);
                if still_blocked {
                    return QueueStatus::Timeout;
                }
                break;
            }
        }

        let mut delivered = 0usize;
        for sub in inner.subscribers.values_mut() {
            let exceeds_max = sub.max_size > 0 && payload.len() > sub.max_size;
            let full = sub.inbox.len() >= sub.depth;

            if exceeds_max || full {
                if sub.kind == SubscriberKind::Opportunity {
                    inner.opportunity_drops += 1;
                    continue;
                }
                // A confidence subscriber should never reach here after the wait loop above,
                // but if max_size rejects it, treat it the same as a timeout for this send.
                continue;
            }

            sub.inbox.push_back(payload.clone());
            delivered += 1;
        }

        drop(inner);
        self.not_empty.notify_all();

        QueueStatus::Posted(delivered)
    }

    fn take(&self, id: SubscriberId, timeout: Duration) -> Result<Arc<[u8]>, QueueStatus> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().expect("queue mutex poisoned");

        loop {
            let has_message = inner
                .subscribers
                .get(&id)
                .map(|s| !s.inbox.is_empty())
                .unwrap_or(false);

            if has_message {
                let sub = inner.subscribers.get_mut(&id).expect("subscriber present");
                let payload = sub.inbox.pop_front().expect("checked non-empty above");
                drop(inner);
                self.not_full.notify_all();
                return Ok(payload);
            }

            if !inner.subscribers.contains_key(&id) {
                return Err(QueueStatus::Error("subscriber detached".to_string()));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(QueueStatus::Timeout);
            }

            let (guard, timeout_result) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .expect("queue condvar poisoned");
            inner = guard;

            if timeout_result.timed_out() {
                let has_message = inner
                    .subscribers
                    .get(&id)
                    .map(|s| !s.inbox.is_empty())
                    .unwrap_or(false);
                if !has_message {
                    return Err(QueueStatus::Timeout);
                }
            }
        }
    }

    pub(crate) fn depth_of(&self, id: SubscriberId) -> usize {
        self.inner
            .lock()
            .expect("queue mutex poisoned")
            .subscribers
            .get(&id)
            .map(|s| s.depth)
            .unwrap_or(0)
    }

    pub(crate) fn count_of(&self, id: SubscriberId) -> usize {
        self.inner
            .lock()
            .expect("queue mutex poisoned")
            .subscribers
            .get(&id)
            .map(|s| s.inbox.len())
            .unwrap_or(0)
    }
}

/// Handle to a named queue's publish side. Multiple `Publisher`s may attach to the same queue;
/// the queue lives as long as any publisher or subscriber is attached (`directory.rs` enforces
/// this).
pub struct Publisher {
    queue: Arc<Queue>,
}

impl Publisher {
    pub(crate) fn new(queue: Arc<Queue>) -> Publisher {
        queue.attach_publisher();
        Publisher { queue }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    /// Copies `buf` into an internally owned buffer and enqueues it for every attached
    /// subscriber, per spec.md §4.1.
    pub fn post_copy(&self, buf: &[u8], timeout: Duration) -> QueueStatus {
        let payload: Arc<[u8]> = Arc::from(buf);
        self.queue.post(payload, timeout)
    }

    /// Enqueues a reference to a caller-owned buffer without copying; ownership passes to the
    /// queue on success, so the buffer is freed exactly once, when the last subscriber
    /// dereferences it.
    pub fn post_ref(&self, buf: Box<[u8]>, timeout: Duration) -> QueueStatus {
        let payload: Arc<[u8]> = Arc::from(buf);
        self.queue.post(payload, timeout)
    }

    /// `(count, depth)` of this queue's fullest confidence subscriber; see `Queue::meter_sample`.
    pub fn meter_sample(&self) -> (usize, usize) {
        self.queue.meter_sample()
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.queue.detach_publisher();
        crate::directory::reap_if_unused(self.queue.name());
    }
}

/// Opaque token for a zero-copy receive. Must be consumed via `Subscriber::dereference` exactly
/// once; dropping it without dereferencing still frees the underlying buffer once every clone of
/// it (across every subscriber that received this message) has gone, but does not decrement the
/// refcount early - `dereference` is the documented release point from spec.md §4.1.
pub struct MsgRef {
    data: Arc<[u8]>,
}

impl MsgRef {
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Handle to a named queue's subscribe side.
pub struct Subscriber {
    queue: Arc<Queue>,
    id: SubscriberId,
    kind: SubscriberKind,
}

impl Subscriber {
    pub(crate) fn new(queue: Arc<Queue>, kind: SubscriberKind, depth: usize, max_size: usize) -> Subscriber {
        let id = queue.attach_subscriber(kind, depth, max_size);
        Subscriber { queue, id, kind }
    }

    #[inline]
    pub fn kind(&self) -> SubscriberKind {
        self.kind
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    #[inline]
    pub fn get_depth(&self) -> usize {
        self.queue.depth_of(self.id)
    }

    #[inline]
    pub fn get_count(&self) -> usize {
        self.queue.count_of(self.id)
    }

    /// Copies the next message's bytes into `dst`, returning the byte count, or a status if no
    /// message arrived within `timeout` or `dst` is too small.
    pub fn receive_copy(&self, dst: &mut [u8], timeout: Duration) -> QueueStatus {
        match self.queue.take(self.id, timeout) {
            Ok(payload) => {
                if payload.len() > dst.len() {
                    return QueueStatus::Error("destination buffer too small".to_string());
                }
                dst[..payload.len()].copy_from_slice(&payload);
                QueueStatus::Bytes(payload.len())
            }
            Err(status) => status,
        }
    }

    /// Hands the caller a zero-copy reference to the next message. Must be released via
    /// `dereference`.
    pub fn receive_ref(&self, timeout: Duration) -> Result<MsgRef, QueueStatus> {
        self.queue.take(self.id, timeout).map(|data| MsgRef { data })
    }

    /// Releases a reference obtained via `receive_ref`. The underlying buffer is freed once every
    /// subscriber that received it has done the same (invariant 7, spec.md §8).
    #[inline]
    pub fn dereference(&self, msg_ref: MsgRef) {
        drop(msg_ref);
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.queue.detach_subscriber(self.id);
        crate::directory::reap_if_unused(self.queue.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory;
    use std::thread;

    /// S2: publish/subscribe fan-out scenario from spec.md §8.
    #[test]
    fn s2_fan_out_and_timeout() {
        let name = "test_s2_fanout";
        let publisher = directory::publisher(name, 8);
        let sub_a = directory::subscriber(name, SubscriberKind::Confidence, 4, 0);
        let sub_b = directory::subscriber(name, SubscriberKind::Confidence, 4, 0);

        for _ in 0..4 {
            let status = publisher.post_copy(b"x", Duration::from_millis(0));
            assert_eq!(status, QueueStatus::Posted(2));
        }

        assert_eq!(sub_a.get_count(), 4);
        assert_eq!(sub_b.get_count(), 4);

        for _ in 0..4 {
            let mut buf = [0u8; 1];
            assert_eq!(sub_a.receive_copy(&mut buf, Duration::from_millis(0)), QueueStatus::Bytes(1));
            assert_eq!(&buf, b"x");
        }

        // Both subscribers are now full again after a fifth post; the wait should time out.
        for _ in 0..4 {
            publisher.post_copy(b"y", Duration::from_millis(0));
        }
        let status = publisher.post_copy(b"z", Duration::from_millis(0));
        assert_eq!(status, QueueStatus::Timeout);
    }

    #[test]
    fn opportunity_subscriber_drops_silently_when_full() {
        let name = "test_opportunity_drop";
        let publisher = directory::publisher(name, 8);
        let opportunity = directory::subscriber(name, SubscriberKind::Opportunity, 1, 0);

        publisher.post_copy(b"a", Duration::from_millis(0));
        let status = publisher.post_copy(b"b", Duration::from_millis(0));

        assert_eq!(status, QueueStatus::Posted(1));
        assert_eq!(opportunity.get_count(), 1);
        assert_eq!(publisher.queue.opportunity_drops(), 1);
    }

    #[test]
    fn no_subscribers_is_idempotent_and_free() {
        let name = "test_no_subscribers";
        let publisher = directory::publisher(name, 8);

        for _ in 0..5 {
            assert_eq!(publisher.post_copy(b"noop", Duration::from_millis(0)), QueueStatus::NoSubscribers);
        }
    }

    #[test]
    fn post_ref_and_dereference_free_the_buffer_once() {
        let name = "test_postref";
        let publisher = directory::publisher(name, 8);
        let subscriber = directory::subscriber(name, SubscriberKind::Confidence, 4, 0);

        let buf: Box<[u8]> = vec![1, 2, 3].into_boxed_slice();
        publisher.post_ref(buf, Duration::from_millis(0));

        let msg_ref = subscriber.receive_ref(Duration::from_millis(0)).unwrap();
        assert_eq!(msg_ref.bytes(), &[1, 2, 3]);
        subscriber.dereference(msg_ref);
    }

    #[test]
    fn blocked_confidence_post_wakes_up_after_receive() {
        let name = "test_wakeup";
        let publisher = directory::publisher(name, 8);
        let subscriber = directory::subscriber(name, SubscriberKind::Confidence, 1, 0);

        publisher.post_copy(b"first", Duration::from_millis(0));

        let sub_for_thread = directory::subscriber(name, SubscriberKind::Confidence, 1, 0);
        let _ = sub_for_thread;

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut buf = [0u8; 5];
            subscriber.receive_copy(&mut buf, Duration::from_millis(500));
        });

        let status = publisher.post_copy(b"second", Duration::from_secs(1));
        assert!(status.is_success());

        handle.join().unwrap();
    }
}
