//! Message-Queue Fabric (C5): named publisher/subscriber queues with reference-counted
//! zero-copy payloads, back-pressure, and timed blocking. Grounded on
//! `neutronium::messagebus::Bus` for the named-topic-registry shape, generalized from a
//! single-threaded per-tick swap buffer to a genuinely concurrent, blocking, multi-subscriber
//! queue, and on `neutronium::net::buffer::Buffer`'s ingress/egress discipline for the
//! full/drain bookkeeping.

pub mod directory;
pub mod queue;

pub use directory::{publisher, subscriber};
pub use queue::{MsgRef, Publisher, Queue, QueueStatus, Subscriber, SubscriberKind};

/// Default queue depth used by `Publisher::new` when no explicit depth has been established by
/// an earlier attachment.
pub const STANDARD_DEPTH: usize = 512;
