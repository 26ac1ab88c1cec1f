//! GeoDataFrame: a columnar frame with metadata, an ingest thread consuming the record stream,
//! and post-processing runners. Built on a keyed, type-erased-column store with an `ingest`
//! method appending per-type column vecs in lockstep with a row count, generalized from a fixed,
//! statically-registered component set to a dynamically-typed, name-keyed column set built from
//! records arriving off a fabric queue. The `populate_dataframe` consistency pass (name-caches
//! for the semantic time/x/y/z columns, `in_error` on length mismatch) layers a cross-column
//! length invariant on top of that store.

use crate::error::{FrameError, FrameResult};
use gdf_frame::{Dictionary, Encoding, Field, RoleFlags, UntypedColumn};
use indexmap::IndexMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

struct ColumnEntry {
    encoding: Encoding,
    data: UntypedColumn,
}

/// Name caches for the four semantic columns (time, x, y, z); populated by `populate_dataframe`
/// from each column's `RoleFlags`.
#[derive(Debug, Default, Clone)]
pub struct SemanticColumns {
    pub time: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub z: Option<String>,
}

/// `{active, run_complete, in_error}` from spec.md §4.4.1, guarding ingest and post-processing.
#[derive(Debug, Default)]
struct FrameState {
    active: AtomicBool,
    run_complete: AtomicBool,
    in_error: AtomicBool,
}

/// A signal a waiter can block on with a bounded timeout, used for "ingest complete" and
/// "run complete" (spec.md §3 "Frame lifetimes span ingest-begin -> ingest-complete ->
/// run-complete -> release").
#[derive(Default)]
pub(crate) struct Latch {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub(crate) fn signal(&self) {
        *self.done.lock().expect("latch mutex poisoned") = true;
        self.cond.notify_all();
    }

    fn wait(&self, timeout: std::time::Duration) -> bool {
        let guard = self.done.lock().expect("latch mutex poisoned");
        if *guard {
            return true;
        }
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |done| !*done)
            .expect("latch condvar poisoned");
        *guard
    }

    fn is_signaled(&self) -> bool {
        *self.done.lock().expect("latch mutex poisoned")
    }
}

/// A columnar frame: `columnFields` (a name-keyed, type-erased column set), `metaFields`, a row
/// count, the four semantic column names, a CRS string, and the ingest/run state machine from
/// spec.md §4.4.1. Held behind `Arc` by every caller (`GeoDataFrame::new` returns one directly)
/// since the ingest and runner worker threads this frame owns need to share its identity with
/// whoever constructed it.
pub struct GeoDataFrame {
    name: String,
    columns: Mutex<IndexMap<String, ColumnEntry>>,
    meta: Mutex<Dictionary>,
    num_rows: AtomicUsize,
    semantic: Mutex<SemanticColumns>,
    crs: Mutex<Option<String>>,
    state: FrameState,
    pub(crate) ingest_complete: Latch,
    pub(crate) run_complete_latch: Latch,
    /// Per-`(key, name)` row-arrival bookkeeping for fragmented `COLUMN_REC` sequences
    /// (spec.md §9's open question: both single- and multi-record encodings are accepted).
    arrival_counts: Mutex<IndexMap<(u64, String), usize>>,
}

impl GeoDataFrame {
    pub fn new(name: impl Into<String>) -> std::sync::Arc<GeoDataFrame> {
        std::sync::Arc::new(GeoDataFrame {
            name: name.into(),
            columns: Mutex::new(IndexMap::new()),
            meta: Mutex::new(Dictionary::new()),
            num_rows: AtomicUsize::new(0),
            semantic: Mutex::new(SemanticColumns::default()),
            crs: Mutex::new(None),
            state: FrameState {
                active: AtomicBool::new(true),
                run_complete: AtomicBool::new(false),
                in_error: AtomicBool::new(false),
            },
            ingest_complete: Latch::default(),
            run_complete_latch: Latch::default(),
            arrival_counts: Mutex::new(IndexMap::new()),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.num_rows.load(Ordering::Acquire)
    }

    #[inline]
    pub fn in_error(&self) -> bool {
        self.state.in_error.load(Ordering::Acquire)
    }

    pub(crate) fn mark_in_error(&self) {
        self.state.in_error.store(true, Ordering::Release);
    }

    #[inline]
    pub fn run_complete(&self) -> bool {
        self.state.run_complete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_run_complete(&self) {
        self.state.run_complete.store(true, Ordering::Release);
        self.run_complete_latch.signal();
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    /// Cooperative cancel flag from spec.md §5; flipped by `Drop` so owned worker threads unwind
    /// within a bounded timeout.
    pub(crate) fn deactivate(&self) {
        self.state.active.store(false, Ordering::Release);
        self.ingest_complete.signal();
        self.run_complete_latch.signal();
    }

    /// Flips the frame inactive, unblocking its ingest and runner worker threads at their next
    /// poll so the caller can tear them down without waiting out `idle_timeout`. Safe to call more
    /// than once; a frame held by several `Arc` owners only goes away once the last is dropped, so
    /// shutdown is a method rather than `Drop` on `GeoDataFrame` itself.
    pub fn shutdown(&self) {
        self.deactivate();
    }

    pub fn wait_ingest_complete(&self, timeout: std::time::Duration) -> bool {
        self.ingest_complete.wait(timeout)
    }

    pub fn ingest_is_complete(&self) -> bool {
        self.ingest_complete.is_signaled()
    }

    pub fn wait_run_complete(&self, timeout: std::time::Duration) -> bool {
        self.run_complete_latch.wait(timeout)
    }

    pub fn set_crs(&self, crs: impl Into<String>) {
        *self.crs.lock().expect("crs mutex poisoned") = Some(crs.into());
    }

    pub fn crs(&self) -> Option<String> {
        self.crs.lock().expect("crs mutex poisoned").clone()
    }

    pub fn semantic_columns(&self) -> SemanticColumns {
        self.semantic.lock().expect("semantic mutex poisoned").clone()
    }

    /// Creates an empty chunked column of the given encoding. Fails if `name` is already used,
    /// per spec.md §4.4.2.
    pub fn add_column(&self, name: &str, encoding: Encoding) -> FrameResult<()> {
        let mut columns = self.columns.lock().expect("columns mutex poisoned");
        if columns.contains_key(name) {
            return Err(FrameError::DuplicateColumn(name.to_string()));
        }
        columns.insert(
            name.to_string(),
            ColumnEntry {
                encoding,
                data: UntypedColumn::new(encoding.base, encoding.role.contains(RoleFlags::TIME_COLUMN)),
            },
        );
        Ok(())
    }

    /// Creates the column on first use with the advertised encoding; idempotent for an already
    /// -present name with a matching encoding, per the receive protocol's tolerance for
    /// fragmented `COLUMN_REC` sequences (spec.md §9).
    fn ensure_column(&self, name: &str, encoding: Encoding) {
        let mut columns = self.columns.lock().expect("columns mutex poisoned");
        columns.entry(name.to_string()).or_insert_with(|| ColumnEntry {
            encoding,
            data: UntypedColumn::new(encoding.base, encoding.role.contains(RoleFlags::TIME_COLUMN)),
        });
    }

    /// Delegates to the named column's `appendBuffer`; returns the new length. Fails if the
    /// column does not exist or `bytes` is misaligned with the column's element size.
    pub fn append_from_buffer(&self, name: &str, bytes: &[u8]) -> FrameResult<usize> {
        let mut columns = self.columns.lock().expect("columns mutex poisoned");
        let entry = columns
            .get_mut(name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_string()))?;
        entry
            .data
            .append_buffer(bytes)
            .ok_or_else(|| FrameError::Protocol(format!("column '{}': buffer misaligned with element size", name)))
    }

    /// Appends to the named column, creating it first with `encoding` if this is the first
    /// `COLUMN_REC` seen for that name. Used by the receive protocol (spec.md §4.4.3); also
    /// increments the `(key, name)` row-arrival counter that tracks fragmentation.
    pub(crate) fn ingest_column_record(&self, key: u64, name: &str, encoding: Encoding, bytes: &[u8]) -> FrameResult<()> {
        self.ensure_column(name, encoding);
        self.append_from_buffer(name, bytes)?;

        let mut arrivals = self.arrival_counts.lock().expect("arrival counter mutex poisoned");
        *arrivals.entry((key, name.to_string())).or_insert(0) += 1;
        Ok(())
    }

    /// Attaches a typed field as metadata. Last writer wins by name, per spec.md §3.
    pub fn add_meta_data(&self, name: &str, field: Box<dyn Field>, free_on_delete: bool) {
        self.meta.lock().expect("meta mutex poisoned").add(name, field, free_on_delete);
    }

    pub fn meta_names(&self) -> Vec<String> {
        self.meta.lock().expect("meta mutex poisoned").names().map(str::to_string).collect()
    }

    pub fn with_meta<R>(&self, name: &str, f: impl FnOnce(&dyn Field) -> R) -> Option<R> {
        let meta = self.meta.lock().expect("meta mutex poisoned");
        meta.get(name).map(f)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.lock().expect("columns mutex poisoned").keys().cloned().collect()
    }

    pub fn column_len(&self, name: &str) -> Option<usize> {
        self.columns
            .lock()
            .expect("columns mutex poisoned")
            .get(name)
            .map(|e| e.data.len())
    }

    pub fn with_column<R>(&self, name: &str, f: impl FnOnce(&UntypedColumn, Encoding) -> R) -> Option<R> {
        let columns = self.columns.lock().expect("columns mutex poisoned");
        columns.get(name).map(|e| f(&e.data, e.encoding))
    }

    /// Post-ingest consistency pass (spec.md §4.4.2): recomputes `num_rows`, identifies the
    /// time/x/y/z columns from their `RoleFlags`, and marks `in_error` if column lengths disagree.
    pub fn populate_dataframe(&self) {
        let columns = self.columns.lock().expect("columns mutex poisoned");

        let mut lengths = columns.values().map(|e| e.data.len());
        let first_len = lengths.next().unwrap_or(0);
        let consistent = lengths.all(|len| len == first_len);

        if !consistent {
            drop(columns);
            self.mark_in_error();
            return;
        }

        self.num_rows.store(first_len, Ordering::Release);

        let mut semantic = SemanticColumns::default();
        for (name, entry) in columns.iter() {
            let role = entry.encoding.role;
            if role.contains(RoleFlags::TIME_COLUMN) && semantic.time.is_none() {
                semantic.time = Some(name.clone());
            }
            if role.contains(RoleFlags::X_COLUMN) && semantic.x.is_none() {
                semantic.x = Some(name.clone());
            }
            if role.contains(RoleFlags::Y_COLUMN) && semantic.y.is_none() {
                semantic.y = Some(name.clone());
            }
            if role.contains(RoleFlags::Z_COLUMN) && semantic.z.is_none() {
                semantic.z = Some(name.clone());
            }
        }
        drop(columns);

        *self.semantic.lock().expect("semantic mutex poisoned") = semantic;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdf_frame::BaseType;

    #[test]
    fn add_column_rejects_duplicate_names() {
        let frame = GeoDataFrame::new("test");
        frame.add_column("lat", Encoding::new(BaseType::Float64)).unwrap();
        assert!(matches!(
            frame.add_column("lat", Encoding::new(BaseType::Float64)),
            Err(FrameError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn append_from_buffer_rejects_unknown_column() {
        let frame = GeoDataFrame::new("test");
        assert!(matches!(
            frame.append_from_buffer("missing", &[0u8; 8]),
            Err(FrameError::UnknownColumn(_))
        ));
    }

    #[test]
    fn populate_dataframe_recomputes_num_rows_and_semantic_columns() {
        let frame = GeoDataFrame::new("test");
        frame
            .add_column("time", Encoding::with_role(BaseType::Time64, RoleFlags::TIME_COLUMN))
            .unwrap();
        frame.add_column("lat", Encoding::new(BaseType::Float64)).unwrap();

        let time_bytes: Vec<u8> = (0..3i64).flat_map(|v| v.to_le_bytes()).collect();
        let lat_bytes: Vec<u8> = (0..3u32).flat_map(|v| (v as f64).to_le_bytes()).collect();
        frame.append_from_buffer("time", &time_bytes).unwrap();
        frame.append_from_buffer("lat", &lat_bytes).unwrap();

        frame.populate_dataframe();

        assert_eq!(frame.num_rows(), 3);
        assert!(!frame.in_error());
        assert_eq!(frame.semantic_columns().time.as_deref(), Some("time"));
    }

    #[test]
    fn populate_dataframe_flags_length_mismatch() {
        let frame = GeoDataFrame::new("test");
        frame.add_column("a", Encoding::new(BaseType::Uint8)).unwrap();
        frame.add_column("b", Encoding::new(BaseType::Uint8)).unwrap();

        frame.append_from_buffer("a", &[1, 2, 3]).unwrap();
        frame.append_from_buffer("b", &[1, 2]).unwrap();

        frame.populate_dataframe();
        assert!(frame.in_error());
    }
}
