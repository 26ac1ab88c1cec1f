//! The dataframe record stream wire format (spec.md §3/§6):
//! `u64 key | u32 type | u32 size | u32 encoding | u32 num_rows | char[128] name | u8 data[size]`,
//! little-endian host scalars. This is the logical unit exchanged on fabric queues and, once
//! framed by `gdf_net`'s length prefix, on the wire between cluster sockets.

use crate::error::{FrameError, FrameResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use gdf_frame::Encoding;
use std::io::{Cursor, Read, Write};

pub const NAME_FIELD_LEN: usize = 128;
/// 2×u64/u32 fields: key(8) + type(4) + size(4) + encoding(4) + num_rows(4) + name(128).
pub const HEADER_LEN: usize = 8 + 4 + 4 + 4 + 4 + NAME_FIELD_LEN;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordKind {
    Column = 0,
    Meta = 1,
    Eof = 2,
}

impl RecordKind {
    pub fn from_u32(v: u32) -> FrameResult<RecordKind> {
        match v {
            0 => Ok(RecordKind::Column),
            1 => Ok(RecordKind::Meta),
            2 => Ok(RecordKind::Eof),
            other => Err(FrameError::Protocol(format!("unknown record type tag {}", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GdfRecord {
    pub key: u64,
    pub kind: RecordKind,
    pub encoding: Encoding,
    pub num_rows: u32,
    pub name: String,
    pub data: Vec<u8>,
}

impl GdfRecord {
    pub fn column(key: u64, name: &str, encoding: Encoding, num_rows: u32, data: Vec<u8>) -> GdfRecord {
        GdfRecord { key, kind: RecordKind::Column, encoding, num_rows, name: name.to_string(), data }
    }

    pub fn meta(key: u64, name: &str, encoding: Encoding, data: Vec<u8>) -> GdfRecord {
        GdfRecord { key, kind: RecordKind::Meta, encoding, num_rows: 1, name: name.to_string(), data: data }
    }

    pub fn eof(key: u64, num_rows: u32) -> GdfRecord {
        GdfRecord {
            key,
            kind: RecordKind::Eof,
            encoding: Encoding::new(gdf_frame::BaseType::Uint8),
            num_rows,
            name: String::new(),
            data: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.write_u64::<LittleEndian>(self.key).expect("writing to a Vec never fails");
        out.write_u32::<LittleEndian>(self.kind as u32).expect("writing to a Vec never fails");
        out.write_u32::<LittleEndian>(self.data.len() as u32).expect("writing to a Vec never fails");
        out.write_u32::<LittleEndian>(self.encoding.to_u32()).expect("writing to a Vec never fails");
        out.write_u32::<LittleEndian>(self.num_rows).expect("writing to a Vec never fails");

        let mut name_field = [0u8; NAME_FIELD_LEN];
        let name_bytes = self.name.as_bytes();
        let copy_len = name_bytes.len().min(NAME_FIELD_LEN);
        name_field[..copy_len].copy_from_slice(&name_bytes[..copy_len]);
        out.write_all(&name_field).expect("writing to a Vec never fails");

        out.write_all(&self.data).expect("writing to a Vec never fails");
        out
    }

    pub fn decode(bytes: &[u8]) -> FrameResult<GdfRecord> {
        if bytes.len() < HEADER_LEN {
            return Err(FrameError::Protocol(format!(
                "record header truncated: got {} bytes, need {}",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let key = cursor.read_u64::<LittleEndian>()?;
        let kind = RecordKind::from_u32(cursor.read_u32::<LittleEndian>()?)?;
        let size = cursor.read_u32::<LittleEndian>()? as usize;
        let raw_encoding = cursor.read_u32::<LittleEndian>()?;
        let encoding = Encoding::from_u32(raw_encoding)
            .ok_or_else(|| FrameError::Protocol(format!("unknown encoding tag {}", raw_encoding)))?;
        let num_rows = cursor.read_u32::<LittleEndian>()?;

        let mut name_field = [0u8; NAME_FIELD_LEN];
        cursor.read_exact(&mut name_field)?;
        let nul = name_field.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_LEN);
        let name = String::from_utf8_lossy(&name_field[..nul]).into_owned();

        if bytes.len() - HEADER_LEN < size {
            return Err(FrameError::Protocol(format!(
                "record payload truncated: declared {} bytes, got {}",
                size,
                bytes.len() - HEADER_LEN
            )));
        }

        let data = bytes[HEADER_LEN..HEADER_LEN + size].to_vec();

        Ok(GdfRecord { key, kind, encoding, num_rows, name, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdf_frame::BaseType;

    #[test]
    fn column_record_round_trips() {
        let record = GdfRecord::column(100, "lat", Encoding::new(BaseType::Float64), 3, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        let encoded = record.encode();
        let decoded = GdfRecord::decode(&encoded).unwrap();

        assert_eq!(decoded.key, 100);
        assert_eq!(decoded.name, "lat");
        assert_eq!(decoded.num_rows, 3);
        assert_eq!(decoded.data, vec![1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decoded.encoding.base, BaseType::Float64);
    }

    #[test]
    fn eof_record_has_empty_data_and_authoritative_num_rows() {
        let record = GdfRecord::eof(200, 42);
        let encoded = record.encode();
        let decoded = GdfRecord::decode(&encoded).unwrap();

        assert!(decoded.data.is_empty());
        assert_eq!(decoded.num_rows, 42);
        assert_eq!(decoded.name, "");
    }

    #[test]
    fn decode_rejects_truncated_header() {
        let err = GdfRecord::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, FrameError::Protocol(_)));
    }
}
