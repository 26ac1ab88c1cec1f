//! Emit protocol: encodes a `GeoDataFrame`'s metadata, columns, and a trailing `EOF_REC` into the
//! `gdf_rec_t` record stream and posts each onto a target publisher. This is the synchronous half
//! the `FrameSender` runner (`runner.rs`) drives from the frame's worker thread.

use crate::error::{FrameError, FrameResult};
use crate::record::GdfRecord;
use gdf_fabric::{Publisher, QueueStatus};
use gdf_frame::Field;
use std::time::Duration;

use crate::frame::GeoDataFrame;

/// Serializes `frame` via the emit protocol and posts each record to `publisher`, tagged with
/// `key_space`. Metadata is emitted first, then one `COLUMN_REC` per column, then a single
/// `EOF_REC` carrying `num_rows` as its authoritative row count.
pub fn emit(frame: &GeoDataFrame, publisher: &Publisher, key_space: u64, timeout: Duration) -> FrameResult<()> {
    for name in frame.meta_names() {
        let (encoding, data) = frame
            .with_meta(&name, |field| {
                let mut buf = vec![0u8; field.byte_len()];
                let written = field.serialize(&mut buf);
                buf.truncate(written);
                (field.encoding(), buf)
            })
            .expect("name came from meta_names() the line before");

        post(publisher, GdfRecord::meta(key_space, &name, encoding, data), timeout)?;
    }

    for name in frame.column_names() {
        let (encoding, data) = frame
            .with_column(&name, |col, encoding| {
                let mut buf = vec![0u8; col.byte_len()];
                let written = col.serialize(&mut buf);
                buf.truncate(written);
                (encoding, buf)
            })
            .expect("name came from column_names() the line before");

        let num_rows = data.len() / encoding.base.fixed_size().unwrap_or(1).max(1);
        post(publisher, GdfRecord::column(key_space, &name, encoding, num_rows as u32, data), timeout)?;
    }

    post(publisher, GdfRecord::eof(key_space, frame.num_rows() as u32), timeout)
}

fn post(publisher: &Publisher, record: GdfRecord, timeout: Duration) -> FrameResult<()> {
    let encoded = record.encode();
    match publisher.post_copy(&encoded, timeout) {
        status if status.is_success() => Ok(()),
        QueueStatus::NoSubscribers => Ok(()),
        QueueStatus::Timeout => Err(FrameError::Timeout),
        other => Err(FrameError::Protocol(format!("emit post failed: {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdf_fabric::{directory, SubscriberKind};
    use gdf_frame::{BaseType, Encoding};

    #[test]
    fn emit_posts_metadata_columns_then_eof_in_order() {
        let queue_name = "test_emit_order";
        let frame = GeoDataFrame::new("f");
        frame.add_column("v", Encoding::new(BaseType::Uint8)).unwrap();
        frame.append_from_buffer("v", &[1, 2, 3]).unwrap();
        frame.add_meta_data("note", Box::new(gdf_frame::Value::String("hi".into())), true);
        frame.populate_dataframe();

        let publisher = directory::publisher(queue_name, 8);
        let subscriber = directory::subscriber(queue_name, SubscriberKind::Confidence, 8, 0);

        emit(&frame, &publisher, 7, Duration::from_secs(1)).unwrap();

        let mut buf = [0u8; 4096];
        let meta_bytes = subscriber.receive_copy(&mut buf, Duration::from_millis(100));
        let meta_len = match meta_bytes {
            QueueStatus::Bytes(n) => n,
            other => panic!("expected meta record, got {:?}", other),
        };
        let meta = GdfRecord::decode(&buf[..meta_len]).unwrap();
        assert_eq!(meta.name, "note");
        assert_eq!(meta.key, 7);

        let col_len = match subscriber.receive_copy(&mut buf, Duration::from_millis(100)) {
            QueueStatus::Bytes(n) => n,
            other => panic!("expected column record, got {:?}", other),
        };
        let col = GdfRecord::decode(&buf[..col_len]).unwrap();
        assert_eq!(col.name, "v");
        assert_eq!(col.num_rows, 3);
        assert_eq!(col.data, vec![1, 2, 3]);

        let eof_len = match subscriber.receive_copy(&mut buf, Duration::from_millis(100)) {
            QueueStatus::Bytes(n) => n,
            other => panic!("expected eof record, got {:?}", other),
        };
        let eof = GdfRecord::decode(&buf[..eof_len]).unwrap();
        assert_eq!(eof.kind, crate::record::RecordKind::Eof);
        assert_eq!(eof.num_rows, 3);
        assert!(eof.data.is_empty());
    }
}
