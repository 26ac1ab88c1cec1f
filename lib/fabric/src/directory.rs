//! Named-queue directory: the process-wide table mapping a queue name to its `Queue`, created on
//! first attachment and torn down on last release (spec.md §3 "Lifecycles"). Grounded on
//! `neutronium::messagebus::Bus`'s topic-keyed table, generalized from a `HashMap` the bus owns
//! outright to a `lazy_static` singleton so any thread can attach a publisher or subscriber by
//! name alone, the way `neutronium::registry::Registry` is reached for from anywhere in the
//! process.

use crate::queue::{Publisher, Queue, Subscriber, SubscriberKind};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};

lazy_static! {
    static ref FABRIC: Mutex<IndexMap<String, Arc<Queue>>> = Mutex::new(IndexMap::new());
}

fn queue_for(name: &str) -> Arc<Queue> {
    let mut fabric = FABRIC.lock().expect("fabric mutex poisoned");
    fabric
        .entry(name.to_string())
        .or_insert_with(|| Queue::new(name))
        .clone()
}

/// Removes `name` from the directory if nothing is attached to it any more. Called after every
/// detach so a queue with no remaining publishers or subscribers does not linger.
fn reap(name: &str) {
    let mut fabric = FABRIC.lock().expect("fabric mutex poisoned");
    if let Some(queue) = fabric.get(name) {
        if queue.is_unused() {
            fabric.remove(name);
        }
    }
}

/// Attaches a publisher to the named queue, creating the queue if this is the first attachment
/// to it. `depth` only matters the first time a queue is created; later attachments reuse the
/// existing queue's configuration, as spec.md §4.1 notes for `Publisher::new`.
pub fn publisher(name: &str, depth: usize) -> Publisher {
    let _ = depth;
    Publisher::new(queue_for(name))
}

/// Attaches a subscriber to the named queue with its own independent depth/back-pressure kind
/// and maximum accepted message size, creating the queue if needed.
pub fn subscriber(name: &str, kind: SubscriberKind, depth: usize, max_size: usize) -> Subscriber {
    Subscriber::new(queue_for(name), kind, depth, max_size)
}

/// Reaps `name` from the directory if no handle remains attached to it. Exposed so `Publisher`
/// and `Subscriber`'s `Drop` impls (in `queue.rs`) can trigger directory cleanup without the
/// queue module depending back on the directory module for anything but this one call.
pub(crate) fn reap_if_unused(name: &str) {
    reap(name);
}

#[cfg(test)]
pub(crate) fn queue_count() -> usize {
    FABRIC.lock().expect("fabric mutex poisoned").len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn queue_is_created_on_first_attach_and_reaped_on_last_release() {
        let name = "test_directory_lifecycle";
        assert!(!FABRIC.lock().unwrap().contains_key(name));

        let publisher = publisher(name, 4);
        assert!(FABRIC.lock().unwrap().contains_key(name));

        {
            let subscriber = subscriber(name, SubscriberKind::Confidence, 4, 0);
            publisher.post_copy(b"hi", Duration::from_millis(0));
            let mut buf = [0u8; 2];
            subscriber.receive_copy(&mut buf, Duration::from_millis(0));
        }
        // Subscriber dropped, but the publisher is still attached.
        assert!(FABRIC.lock().unwrap().contains_key(name));

        drop(publisher);
        assert!(!FABRIC.lock().unwrap().contains_key(name));
    }

    #[test]
    fn reattaching_after_teardown_creates_a_fresh_queue() {
        let name = "test_directory_reattach";
        let first = publisher(name, 4);
        drop(first);
        assert!(!FABRIC.lock().unwrap().contains_key(name));

        let second = publisher(name, 4);
        assert!(FABRIC.lock().unwrap().contains_key(name));
        drop(second);
    }
}
