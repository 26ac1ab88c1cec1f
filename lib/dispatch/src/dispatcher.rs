//! The record dispatcher: type -> handler-list routing over a fabric subscriber, generalized
//! from "objects implementing traits, looked up by a process-assigned id" to "record-type id ->
//! `Vec<Box<dyn Processor>>>`, looked up by the decoded record's `RecordKind`".

use byteorder::{ByteOrder, LittleEndian};
use gdf_dataframe::{GdfRecord, RecordKind};
use gdf_fabric::{QueueStatus, Subscriber};
use gdf_frame::registry::{self, FieldDef, FieldFlags, RecordDef};
use gdf_frame::{BaseType, Encoding};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A handler invoked once per dispatched record of a registered kind. Returns whether it
/// succeeded; a `false` is counted but never stops the dispatcher or the other handlers for that
/// record.
pub trait Processor: Send {
    fn process(&mut self, record: &GdfRecord, key: u64) -> bool;

    fn name(&self) -> &str {
        "processor"
    }
}

/// How the dispatcher computes the routing key handed to each processor alongside a record.
pub enum KeyExtractor {
    /// The record's own header `key` field (the common case: the per-channel key a `FrameReceiver`
    /// groups `EOF_REC`s by).
    Header,
    /// Read a named field. `"key"`/`"num_rows"` resolve to the matching header field directly;
    /// any other name is looked up in the record-type's registered `RecordDef` and read as a
    /// little-endian integer at that field's offset into the record's payload.
    Named(String),
    /// An escape hatch for routing keys the registry cannot express positionally.
    Closure(Box<dyn Fn(&GdfRecord) -> u64 + Send + Sync>),
}

impl KeyExtractor {
    fn extract(&self, record: &GdfRecord, def: Option<&RecordDef>) -> u64 {
        match self {
            KeyExtractor::Header => record.key,
            KeyExtractor::Named(field) => extract_named(field, record, def),
            KeyExtractor::Closure(f) => f(record),
        }
    }
}

fn extract_named(field: &str, record: &GdfRecord, def: Option<&RecordDef>) -> u64 {
    match field {
        "key" => return record.key,
        "num_rows" => return record.num_rows as u64,
        _ => {}
    }

    let field_def = match def.and_then(|d| d.field(field)) {
        Some(f) => f,
        None => return record.key,
    };

    read_uint_field(&record.data, field_def)
}

fn read_uint_field(data: &[u8], field: &FieldDef) -> u64 {
    let size = field.field_type.base.fixed_size().unwrap_or(0);
    let end = field.offset + size;
    if size == 0 || end > data.len() {
        return 0;
    }

    let bytes = &data[field.offset..end];
    match size {
        1 => bytes[0] as u64,
        2 => LittleEndian::read_u16(bytes) as u64,
        4 => LittleEndian::read_u32(bytes) as u64,
        8 => LittleEndian::read_u64(bytes),
        _ => 0,
    }
}

/// The name each `RecordKind` is registered under in the record schema registry, so
/// `KeyExtractor::Named` can resolve a field by offset even though `gdf_dataframe`'s wire format
/// is fixed rather than schema-driven.
pub fn registry_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Column => "gdf_column_rec",
        RecordKind::Meta => "gdf_meta_rec",
        RecordKind::Eof => "gdf_eof_rec",
    }
}

/// Registers the fixed `gdf_column_rec`/`gdf_meta_rec`/`gdf_eof_rec` layouts with the record
/// schema registry. Idempotent; called by `Dispatcher::new` and safe to call again from a
/// standalone tool that only wants to inspect the registry.
pub fn register_builtin_records() {
    for kind in [RecordKind::Column, RecordKind::Meta, RecordKind::Eof] {
        let def = RecordDef {
            name: registry_name(kind).to_string(),
            id_field: Some("key".to_string()),
            size: gdf_dataframe::record::HEADER_LEN,
            fields: vec![FieldDef {
                name: "key".to_string(),
                field_type: Encoding::new(BaseType::Uint64),
                offset: 0,
                count: 1,
                flags: FieldFlags::empty(),
            }],
        };
        // Idempotent; ignore the (impossible, given the fixed definition above) conflict case.
        let _ = registry::register(def);
    }
}

struct Route {
    extractor: KeyExtractor,
    processors: Vec<Box<dyn Processor>>,
}

/// Outcome of a single `dispatch_one` call, returned so a caller (or `drain`) can track progress
/// without the dispatcher needing its own channel back to the caller.
pub enum DispatchOutcome {
    /// A record of `kind` was routed to `ran` processors, `failed` of which returned `false`.
    Dispatched { kind: RecordKind, ran: usize, failed: usize },
    /// No route was registered for the record's kind; it was still dereferenced.
    Unrouted,
    /// The subscriber had nothing within the timeout.
    Idle,
    /// The subscriber reported a terminal error.
    Error(String),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DrainStats {
    pub processed: usize,
    pub failures: u64,
}

/// Owns a subscriber and a `RecordKind` -> handler-list routing table. Not itself threaded; wrap
/// in `DispatcherWorker::spawn` for an owned dispatch thread, or call `drain` synchronously
/// (e.g. at shutdown, to flush whatever is already queued).
pub struct Dispatcher {
    subscriber: Subscriber,
    routes: IndexMap<RecordKind, Route>,
    failures: AtomicU64,
    log: slog::Logger,
}

impl Dispatcher {
    pub fn new(subscriber: Subscriber, log: slog::Logger) -> Dispatcher {
        register_builtin_records();
        Dispatcher { subscriber, routes: IndexMap::new(), failures: AtomicU64::new(0), log }
    }

    /// Registers `processor` to run on every record of `kind`, keyed via `extractor`. Multiple
    /// processors may be registered for the same kind; they run in registration order.
    pub fn register(&mut self, kind: RecordKind, extractor: KeyExtractor, processor: Box<dyn Processor>) {
        self.routes
            .entry(kind)
            .or_insert_with(|| Route { extractor, processors: Vec::new() })
            .processors
            .push(processor);
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    /// Receives at most one record within `timeout` and routes it. The dispatcher owns no
    /// records: it forwards the fabric's reference and dereferences it only once every registered
    /// processor for that record's kind has run.
    pub fn dispatch_one(&mut self, timeout: Duration) -> DispatchOutcome {
        let msg_ref = match self.subscriber.receive_ref(timeout) {
            Ok(msg_ref) => msg_ref,
            Err(QueueStatus::Timeout) => return DispatchOutcome::Idle,
            Err(other) => return DispatchOutcome::Error(format!("{:?}", other)),
        };

        let record = match GdfRecord::decode(msg_ref.bytes()) {
            Ok(record) => record,
            Err(err) => {
                self.subscriber.dereference(msg_ref);
                return DispatchOutcome::Error(err.to_string());
            }
        };

        let outcome = match self.routes.get_mut(&record.kind) {
            Some(route) => {
                let def = registry::lookup(registry_name(record.kind));
                let key = route.extractor.extract(&record, def.as_ref());

                let mut failed = 0usize;
                for processor in route.processors.iter_mut() {
                    if !processor.process(&record, key) {
                        failed += 1;
                        slog::warn!(self.log, "dispatch handler failed";
                            "kind" => ?record.kind, "handler" => processor.name());
                    }
                }
                if failed > 0 {
                    self.failures.fetch_add(failed as u64, Ordering::Release);
                }

                DispatchOutcome::Dispatched { kind: record.kind, ran: route.processors.len(), failed }
            }
            None => DispatchOutcome::Unrouted,
        };

        self.subscriber.dereference(msg_ref);
        outcome
    }

    /// Flushes whatever is already queued, running every registered handler to completion for
    /// each record, then returns - it does not wait for further records to arrive.
    pub fn drain(&mut self, idle_timeout: Duration) -> DrainStats {
        let mut stats = DrainStats::default();
        loop {
            match self.dispatch_one(idle_timeout) {
                DispatchOutcome::Dispatched { failed, .. } => {
                    stats.processed += 1;
                    stats.failures += failed as u64;
                }
                DispatchOutcome::Unrouted => stats.processed += 1,
                DispatchOutcome::Idle | DispatchOutcome::Error(_) => return stats,
            }
        }
    }
}

/// Owns the dispatcher's worker thread. Dropping it flips the cooperative cancel flag and joins
/// the thread.
pub struct DispatcherWorker {
    active: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl DispatcherWorker {
    pub fn spawn(mut dispatcher: Dispatcher, poll_timeout: Duration) -> DispatcherWorker {
        let active = Arc::new(AtomicBool::new(true));
        let thread_active = active.clone();

        let join = thread::spawn(move || {
            while thread_active.load(Ordering::Acquire) {
                dispatcher.dispatch_one(poll_timeout);
            }
        });

        DispatcherWorker { active, join: Some(join) }
    }

    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for DispatcherWorker {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdf_fabric::{directory, SubscriberKind};
    use gdf_frame::{BaseType, Encoding};
    use std::sync::atomic::AtomicUsize;

    struct CountingProcessor {
        count: Arc<AtomicUsize>,
        succeed: bool,
    }

    impl Processor for CountingProcessor {
        fn process(&mut self, _record: &GdfRecord, _key: u64) -> bool {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    #[test]
    fn dispatches_to_every_registered_processor_for_the_matching_kind() {
        let queue_name = "test_dispatch_routes_by_kind";
        let publisher = directory::publisher(queue_name, 8);
        let subscriber = directory::subscriber(queue_name, SubscriberKind::Confidence, 8, 0);

        let mut dispatcher = Dispatcher::new(subscriber, gdf_kernel::logging::discard());
        let hits = Arc::new(AtomicUsize::new(0));
        dispatcher.register(
            RecordKind::Column,
            KeyExtractor::Header,
            Box::new(CountingProcessor { count: hits.clone(), succeed: true }),
        );
        dispatcher.register(
            RecordKind::Column,
            KeyExtractor::Header,
            Box::new(CountingProcessor { count: hits.clone(), succeed: false }),
        );

        let record = GdfRecord::column(42, "lat", Encoding::new(BaseType::Float64), 1, vec![0; 8]);
        publisher.post_copy(&record.encode(), Duration::from_millis(100));

        let outcome = dispatcher.dispatch_one(Duration::from_millis(200));
        match outcome {
            DispatchOutcome::Dispatched { kind, ran, failed } => {
                assert_eq!(kind, RecordKind::Column);
                assert_eq!(ran, 2);
                assert_eq!(failed, 1);
            }
            _ => panic!("expected a dispatched record"),
        }

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.failure_count(), 1);
    }

    #[test]
    fn an_unrouted_kind_is_still_dereferenced_and_does_not_panic() {
        let queue_name = "test_dispatch_unrouted";
        let publisher = directory::publisher(queue_name, 8);
        let subscriber = directory::subscriber(queue_name, SubscriberKind::Confidence, 8, 0);

        let mut dispatcher = Dispatcher::new(subscriber, gdf_kernel::logging::discard());
        let record = GdfRecord::eof(1, 0);
        publisher.post_copy(&record.encode(), Duration::from_millis(100));

        assert!(matches!(dispatcher.dispatch_one(Duration::from_millis(200)), DispatchOutcome::Unrouted));
    }

    #[test]
    fn drain_flushes_everything_already_queued_then_returns() {
        let queue_name = "test_dispatch_drain";
        let publisher = directory::publisher(queue_name, 8);
        let subscriber = directory::subscriber(queue_name, SubscriberKind::Confidence, 8, 0);

        let mut dispatcher = Dispatcher::new(subscriber, gdf_kernel::logging::discard());
        let hits = Arc::new(AtomicUsize::new(0));
        dispatcher.register(
            RecordKind::Column,
            KeyExtractor::Header,
            Box::new(CountingProcessor { count: hits.clone(), succeed: true }),
        );

        for i in 0..3u64 {
            let record = GdfRecord::column(i, "v", Encoding::new(BaseType::Uint8), 1, vec![1]);
            publisher.post_copy(&record.encode(), Duration::from_millis(100));
        }

        let stats = dispatcher.drain(Duration::from_millis(50));
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.failures, 0);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
