//! Runners (spec.md §4.4.5): small `run(frame) -> bool` units that execute, in order, on a
//! single worker thread owned by the frame. `runComplete` is signaled once the chain drains.
//! `FrameSender` is the distinguished runner that is the glue between the emit protocol (§4.4.4)
//! and a `ClusterSocket` WRITER (§4.3): it encodes the frame into a named publisher and ends.
//! Grounded on the same owning-thread idiom as `ingest::FrameReceiver` and
//! `gdf_net::ClusterSocket`'s connector thread.

use crate::emit;
use crate::frame::GeoDataFrame;
use gdf_fabric::Publisher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A post-ingest processing unit attached to a frame. Per spec.md §6 "Runner boundary": a runner
/// must not mutate the frame's column/metadata *schema* (it may append rows via the frame's own
/// ingest API, or merely read) and must be idempotent with respect to cancellation - if the
/// worker thread is torn down mid-chain, a runner that already ran must not be re-run.
pub trait Runner: Send {
    fn run(&mut self, frame: &Arc<GeoDataFrame>) -> bool;

    fn name(&self) -> &str {
        "runner"
    }
}

/// The distinguished runner from spec.md §4.4.5: encodes `frame` via the emit protocol into
/// `publisher`, tagged with `key_space`, and ends. This is the producer-side half of the closed
/// loop described in spec.md §2 - a `ClusterSocket` WRITER (`gdf_net`) drains the same publisher
/// on the other side.
pub struct FrameSender {
    publisher: Publisher,
    key_space: u64,
    timeout: Duration,
}

impl FrameSender {
    pub fn new(publisher: Publisher, key_space: u64, timeout: Duration) -> FrameSender {
        FrameSender { publisher, key_space, timeout }
    }
}

impl Runner for FrameSender {
    fn run(&mut self, frame: &Arc<GeoDataFrame>) -> bool {
        emit::emit(frame, &self.publisher, self.key_space, self.timeout).is_ok()
    }

    fn name(&self) -> &str {
        "frame_sender"
    }
}

/// Owns the runner worker thread. Dropping it (or calling `stop`) flips the cooperative cancel
/// flag and joins the thread, per spec.md §5.
pub struct RunnerChain {
    active: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RunnerChain {
    /// Spawns the worker thread that drains `runners` in order against `frame`. Failures are
    /// counted and mark the frame `in_error` but do not stop the chain early, mirroring the
    /// dispatcher's failure-counting policy (spec.md §4.5) - a runner's failure is local to it.
    pub fn spawn(frame: Arc<GeoDataFrame>, runners: Vec<Box<dyn Runner>>, log: slog::Logger) -> RunnerChain {
        let active = Arc::new(AtomicBool::new(true));
        let thread_active = active.clone();

        let join = thread::spawn(move || {
            run_chain(&frame, runners, &thread_active, &log);
        });

        RunnerChain { active, join: Some(join) }
    }

    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for RunnerChain {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop();
        }
    }
}

fn run_chain(frame: &Arc<GeoDataFrame>, mut runners: Vec<Box<dyn Runner>>, active: &Arc<AtomicBool>, log: &slog::Logger) {
    let mut failures = 0u32;

    for mut runner in runners.drain(..) {
        if !active.load(Ordering::Acquire) || !frame.is_active() {
            slog::debug!(log, "runner chain cancelled before draining"; "remaining" => runners.len());
            break;
        }

        if !runner.run(frame) {
            failures += 1;
            slog::warn!(log, "runner reported failure"; "runner" => runner.name());
        }
    }

    if failures > 0 {
        frame.mark_in_error();
    }
    frame.mark_run_complete();
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdf_fabric::{directory, SubscriberKind};
    use gdf_frame::{BaseType, Encoding};

    struct CountingRunner {
        calls: Arc<std::sync::atomic::AtomicUsize>,
        succeed: bool,
    }

    impl Runner for CountingRunner {
        fn run(&mut self, _frame: &Arc<GeoDataFrame>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.succeed
        }
    }

    #[test]
    fn runner_chain_runs_in_order_and_signals_completion() {
        let frame = GeoDataFrame::new("f");
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let runners: Vec<Box<dyn Runner>> = vec![
            Box::new(CountingRunner { calls: calls.clone(), succeed: true }),
            Box::new(CountingRunner { calls: calls.clone(), succeed: true }),
        ];

        let chain = RunnerChain::spawn(frame.clone(), runners, gdf_kernel::logging::discard());
        assert!(frame.wait_run_complete(Duration::from_secs(2)));
        drop(chain);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!frame.in_error());
    }

    #[test]
    fn a_failing_runner_marks_the_frame_in_error_but_the_chain_still_drains() {
        let frame = GeoDataFrame::new("f");
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let runners: Vec<Box<dyn Runner>> = vec![
            Box::new(CountingRunner { calls: calls.clone(), succeed: false }),
            Box::new(CountingRunner { calls: calls.clone(), succeed: true }),
        ];

        let chain = RunnerChain::spawn(frame.clone(), runners, gdf_kernel::logging::discard());
        assert!(frame.wait_run_complete(Duration::from_secs(2)));
        drop(chain);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(frame.in_error());
    }

    #[test]
    fn frame_sender_emits_onto_its_publisher() {
        let queue_name = "test_frame_sender_runner";
        let frame = GeoDataFrame::new("f");
        frame.add_column("v", Encoding::new(BaseType::Uint8)).unwrap();
        frame.append_from_buffer("v", &[9]).unwrap();
        frame.populate_dataframe();

        let publisher = directory::publisher(queue_name, 8);
        let subscriber = directory::subscriber(queue_name, SubscriberKind::Confidence, 8, 0);

        let sender = FrameSender::new(publisher, 1, Duration::from_secs(1));
        let runners: Vec<Box<dyn Runner>> = vec![Box::new(sender)];
        let chain = RunnerChain::spawn(frame.clone(), runners, gdf_kernel::logging::discard());

        assert!(frame.wait_run_complete(Duration::from_secs(2)));
        drop(chain);

        let mut buf = [0u8; 4096];
        // First record is the column (no metadata was attached), second is EOF.
        let len = match subscriber.receive_copy(&mut buf, Duration::from_millis(200)) {
            gdf_fabric::QueueStatus::Bytes(n) => n,
            other => panic!("expected a record, got {:?}", other),
        };
        let record = crate::record::GdfRecord::decode(&buf[..len]).unwrap();
        assert_eq!(record.name, "v");
    }
}
