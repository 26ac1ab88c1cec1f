//! Receive protocol (spec.md §4.4.3): a worker thread that drains a fabric subscriber of
//! `gdf_rec_t` records (as produced by another frame's emit side, possibly relayed across a
//! `ClusterSocket`) and builds up a `GeoDataFrame` in place. Grounded on the same "owning object
//! spawns a bounded worker thread, joined by `Drop`" idiom as `gdf_net::ClusterSocket`'s
//! connector thread.

use crate::frame::GeoDataFrame;
use crate::record::{GdfRecord, RecordKind};
use gdf_fabric::{QueueStatus, Subscriber};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Owns the receive-thread half of a `GeoDataFrame`'s lifecycle. Dropping it (or calling `stop`)
/// flips the cooperative cancel flag and joins the thread, per spec.md §5.
pub struct FrameReceiver {
    active: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl FrameReceiver {
    /// Spawns the receive thread. `num_channels` is the number of distinct source keys this
    /// frame expects one `EOF_REC` from before ingest is considered complete; `idle_timeout`
    /// bounds how long the thread waits for the *next* record before marking the frame `in_error`
    /// and exiting (spec.md §4.4.3 "a bounded wait then an error, never silent success").
    pub fn spawn(
        frame: Arc<GeoDataFrame>,
        subscriber: Subscriber,
        num_channels: usize,
        idle_timeout: Duration,
        log: slog::Logger,
    ) -> FrameReceiver {
        let active = Arc::new(AtomicBool::new(true));
        let thread_active = active.clone();

        let join = thread::spawn(move || {
            receive_loop(&frame, subscriber, num_channels, idle_timeout, &thread_active, &log);
        });

        FrameReceiver { active, join: Some(join) }
    }

    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop();
        }
    }
}

/// Poll granularity for the receive-side `receive_ref` wait: short enough that the cooperative
/// cancel flag is checked responsively, per spec.md §8 invariant 8.
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

fn receive_loop(
    frame: &Arc<GeoDataFrame>,
    subscriber: Subscriber,
    num_channels: usize,
    idle_timeout: Duration,
    active: &Arc<AtomicBool>,
    log: &slog::Logger,
) {
    let mut expected_eofs = num_channels;
    let mut last_progress = Instant::now();

    while active.load(Ordering::Acquire) && frame.is_active() {
        match subscriber.receive_ref(POLL_TIMEOUT) {
            Ok(msg_ref) => {
                let record = GdfRecord::decode(msg_ref.bytes());
                subscriber.dereference(msg_ref);
                last_progress = Instant::now();

                let record = match record {
                    Ok(r) => r,
                    Err(err) => {
                        slog::warn!(log, "dropping malformed dataframe record"; "error" => %err);
                        frame.mark_in_error();
                        frame.ingest_complete.signal();
                        return;
                    }
                };

                match record.kind {
                    RecordKind::Column => {
                        if let Err(err) = frame.ingest_column_record(record.key, &record.name, record.encoding, &record.data) {
                            slog::warn!(log, "column ingest failed"; "name" => %record.name, "error" => %err);
                            frame.mark_in_error();
                            frame.ingest_complete.signal();
                            return;
                        }
                    }
                    RecordKind::Meta => match gdf_frame::Value::from_bytes(record.encoding.base, &record.data) {
                        Ok(value) => frame.add_meta_data(&record.name, Box::new(value), true),
                        Err(err) => {
                            slog::warn!(log, "meta ingest failed"; "name" => %record.name, "error" => %err);
                            frame.mark_in_error();
                            frame.ingest_complete.signal();
                            return;
                        }
                    },
                    RecordKind::Eof => {
                        expected_eofs = expected_eofs.saturating_sub(1);
                        if expected_eofs == 0 {
                            frame.populate_dataframe();
                            frame.ingest_complete.signal();
                            return;
                        }
                    }
                }
            }
            Err(QueueStatus::Timeout) => {
                if Instant::now().duration_since(last_progress) > idle_timeout {
                    slog::warn!(log, "dataframe ingest timed out waiting for EOF_REC";
                        "still_expected" => expected_eofs);
                    frame.mark_in_error();
                    frame.ingest_complete.signal();
                    return;
                }
            }
            Err(status) => {
                slog::warn!(log, "dataframe ingest subscriber error"; "status" => ?status);
                frame.mark_in_error();
                frame.ingest_complete.signal();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::frame::GeoDataFrame;
    use gdf_fabric::{directory, SubscriberKind};
    use gdf_frame::{BaseType, Encoding};

    /// S5: dataframe receive scenario from spec.md §8 - two channels, each emitting one frame
    /// with the same two columns plus a metadata entry, last-writer-wins on the metadata name.
    #[test]
    fn s5_two_channel_receive_merges_columns_and_metadata() {
        let queue_name = "test_s5_dataframe_receive";

        let sender_a = GeoDataFrame::new("a");
        sender_a.add_column("lat", Encoding::new(BaseType::Float64)).unwrap();
        sender_a.add_column("lon", Encoding::new(BaseType::Float64)).unwrap();
        sender_a
            .append_from_buffer("lat", &[1.0f64, 2.0, 3.0].iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>())
            .unwrap();
        sender_a
            .append_from_buffer("lon", &[10.0f64, 20.0, 30.0].iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>())
            .unwrap();
        sender_a.add_meta_data("source", Box::new(gdf_frame::Value::String("A".into())), true);
        sender_a.populate_dataframe();

        let sender_b = GeoDataFrame::new("b");
        sender_b.add_column("lat", Encoding::new(BaseType::Float64)).unwrap();
        sender_b.add_column("lon", Encoding::new(BaseType::Float64)).unwrap();
        sender_b
            .append_from_buffer("lat", &[4.0f64, 5.0, 6.0].iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>())
            .unwrap();
        sender_b
            .append_from_buffer("lon", &[40.0f64, 50.0, 60.0].iter().flat_map(|v| v.to_le_bytes()).collect::<Vec<_>>())
            .unwrap();
        sender_b.add_meta_data("source", Box::new(gdf_frame::Value::String("B".into())), true);
        sender_b.populate_dataframe();

        let publisher = directory::publisher(queue_name, 64);
        let subscriber = directory::subscriber(queue_name, SubscriberKind::Confidence, 64, 0);

        let receiver_frame = GeoDataFrame::new("merged");
        let log = gdf_kernel::logging::discard();
        let receiver = FrameReceiver::spawn(receiver_frame.clone(), subscriber, 2, Duration::from_secs(2), log);

        emit::emit(&sender_a, &publisher, 100, Duration::from_secs(1)).unwrap();
        emit::emit(&sender_b, &publisher, 200, Duration::from_secs(1)).unwrap();

        assert!(receiver_frame.wait_ingest_complete(Duration::from_secs(2)));
        drop(receiver);

        assert!(!receiver_frame.in_error());
        assert_eq!(receiver_frame.num_rows(), 6);
        assert_eq!(receiver_frame.column_len("lat"), Some(6));
        assert_eq!(receiver_frame.column_len("lon"), Some(6));

        let source = receiver_frame.with_meta("source", |f| f.to_json()).unwrap();
        assert_eq!(source, serde_json::Value::String("B".to_string()));

        drop(publisher);
    }
}
