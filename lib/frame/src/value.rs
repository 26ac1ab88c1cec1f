//! The typed value kernel: a sum type over the primitive types, with the operations every typed
//! field exposes. Uses a type-erasure idiom (a trait implemented once per concrete `T`, boxed for
//! heterogeneous storage), generalized from "one vec type per component" to "one scalar kernel
//! type plus the containers built on top of it".

use crate::encoding::Encoding;
use byteorder::{LittleEndian, WriteBytesExt};
use gdf_kernel::error::{CoreError, CoreResult};
use serde_json::Value as Json;
use std::io::Write;

/// The abstract `Lua` value family from the scripting-host contract. Kept here, rather than
/// in `gdf_script`, because `Field::to_lua`/`from_lua` need to name it and `gdf_frame` must not
/// depend on `gdf_script` (the dependency runs the other way: `gdf_script` is the consumer-facing
/// contract crate, `gdf_frame` is a leaf).
#[derive(Debug, Clone, PartialEq)]
pub enum LuaValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
}

/// Host state passed to `to_lua`/`from_lua`. The scripting host itself is out of scope; this is
/// the minimal surface `gdf_script::ScriptHost` implementations must provide.
pub trait LuaHost {
    fn push(&mut self, value: LuaValue);
    fn arg(&self, index: usize) -> Option<&LuaValue>;
}

/// Operations every typed field in this kernel exposes. `Send` is a supertrait rather than an
/// incidental bound: a `Dictionary`/column set must be movable into a `GeoDataFrame`'s ingest
/// thread and read back from the owning thread once ingest completes, so every `Box<dyn Field>`
/// has to cross that boundary.
pub trait Field: std::fmt::Debug + Send {
    fn encoding(&self) -> Encoding;
    fn to_json(&self) -> Json;
    fn to_lua(&self, host: &mut dyn LuaHost);
    /// On type mismatch, leaves the field untouched and returns `Ok(false)` rather than erroring -
    /// the scripting bridge is error-tolerant.
    fn from_lua(&mut self, host: &dyn LuaHost, index: usize) -> CoreResult<bool>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Serializes into `buffer`, returning the number of bytes written, or 0 if `buffer` is too
    /// small to hold the full serialization.
    fn serialize(&self, buffer: &mut [u8]) -> usize;
    /// Exact byte length a full `serialize` call needs, used by emit paths to size their scratch
    /// buffer precisely without a trial serialize.
    fn byte_len(&self) -> usize;
    fn clear(&mut self);
}

/// A single scalar value, tagged by which primitive it holds. Used for metadata entries
/// (`META_REC` payloads) and anywhere a bare typed value rather than a column is needed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    Time64(i64),
    String(String),
}

impl Value {
    #[inline]
    pub fn base_type(&self) -> crate::encoding::BaseType {
        use crate::encoding::BaseType;
        match self {
            Value::Bool(_) => BaseType::Bool,
            Value::Int8(_) => BaseType::Int8,
            Value::Int16(_) => BaseType::Int16,
            Value::Int32(_) => BaseType::Int32,
            Value::Int64(_) => BaseType::Int64,
            Value::Uint8(_) => BaseType::Uint8,
            Value::Uint16(_) => BaseType::Uint16,
            Value::Uint32(_) => BaseType::Uint32,
            Value::Uint64(_) => BaseType::Uint64,
            Value::Float32(_) => BaseType::Float32,
            Value::Float64(_) => BaseType::Float64,
            Value::Time64(_) => BaseType::Time64,
            Value::String(_) => BaseType::String,
        }
    }

    /// Deserializes a single value of the given base type from a tightly-packed little-endian
    /// byte slice (as carried in a `META_REC` payload).
    pub fn from_bytes(base: crate::encoding::BaseType, bytes: &[u8]) -> CoreResult<Value> {
        use crate::encoding::BaseType;
        use byteorder::ReadBytesExt;
        let mut cur = bytes;

        Ok(match base {
            BaseType::Bool => Value::Bool(cur.read_u8().map_err(wrap)? != 0),
            BaseType::Int8 => Value::Int8(cur.read_i8().map_err(wrap)?),
            BaseType::Int16 => Value::Int16(cur.read_i16::<LittleEndian>().map_err(wrap)?),
            BaseType::Int32 => Value::Int32(cur.read_i32::<LittleEndian>().map_err(wrap)?),
            BaseType::Int64 => Value::Int64(cur.read_i64::<LittleEndian>().map_err(wrap)?),
            BaseType::Uint8 => Value::Uint8(cur.read_u8().map_err(wrap)?),
            BaseType::Uint16 => Value::Uint16(cur.read_u16::<LittleEndian>().map_err(wrap)?),
            BaseType::Uint32 => Value::Uint32(cur.read_u32::<LittleEndian>().map_err(wrap)?),
            BaseType::Uint64 => Value::Uint64(cur.read_u64::<LittleEndian>().map_err(wrap)?),
            BaseType::Float32 => Value::Float32(cur.read_f32::<LittleEndian>().map_err(wrap)?),
            BaseType::Float64 => Value::Float64(cur.read_f64::<LittleEndian>().map_err(wrap)?),
            BaseType::Time64 => Value::Time64(cur.read_i64::<LittleEndian>().map_err(wrap)?),
            BaseType::String => Value::String(
                String::from_utf8(bytes.to_vec()).map_err(|e| CoreError::protocol(e.to_string()))?,
            ),
        })
    }
}

#[inline]
fn wrap(e: std::io::Error) -> CoreError {
    CoreError::protocol(format!("truncated value payload: {}", e))
}

impl Field for Value {
    #[inline]
    fn encoding(&self) -> Encoding {
        Encoding::new(self.base_type())
    }

    fn to_json(&self) -> Json {
        match self {
            Value::Bool(v) => Json::from(*v),
            Value::Int8(v) => Json::from(*v),
            Value::Int16(v) => Json::from(*v),
            Value::Int32(v) => Json::from(*v),
            Value::Int64(v) => Json::from(*v),
            Value::Uint8(v) => Json::from(*v),
            Value::Uint16(v) => Json::from(*v),
            Value::Uint32(v) => Json::from(*v),
            Value::Uint64(v) => Json::from(*v),
            Value::Float32(v) => Json::from(*v),
            Value::Float64(v) => Json::from(*v),
            Value::Time64(v) => Json::from(*v),
            Value::String(v) => Json::from(v.clone()),
        }
    }

    fn to_lua(&self, host: &mut dyn LuaHost) {
        let lua = match self {
            Value::Bool(v) => LuaValue::Bool(*v),
            Value::Int8(v) => LuaValue::Int(*v as i64),
            Value::Int16(v) => LuaValue::Int(*v as i64),
            Value::Int32(v) => LuaValue::Int(*v as i64),
            Value::Int64(v) => LuaValue::Int(*v),
            Value::Uint8(v) => LuaValue::Int(*v as i64),
            Value::Uint16(v) => LuaValue::Int(*v as i64),
            Value::Uint32(v) => LuaValue::Int(*v as i64),
            Value::Uint64(v) => LuaValue::Int(*v as i64),
            Value::Float32(v) => LuaValue::Float(*v as f64),
            Value::Float64(v) => LuaValue::Float(*v),
            Value::Time64(v) => LuaValue::Int(*v),
            Value::String(v) => LuaValue::Str(v.clone()),
        };
        host.push(lua);
    }

    fn from_lua(&mut self, host: &dyn LuaHost, index: usize) -> CoreResult<bool> {
        let arg = match host.arg(index) {
            Some(arg) => arg,
            None => return Ok(false),
        };

        let applied = match (&mut *self, arg) {
            (Value::Bool(v), LuaValue::Bool(n)) => {
                *v = *n;
                true
            }
            (Value::Int8(v), LuaValue::Int(n)) => {
                *v = *n as i8;
                true
            }
            (Value::Int16(v), LuaValue::Int(n)) => {
                *v = *n as i16;
                true
            }
            (Value::Int32(v), LuaValue::Int(n)) => {
                *v = *n as i32;
                true
            }
            (Value::Int64(v), LuaValue::Int(n)) => {
                *v = *n;
                true
            }
            (Value::Float32(v), LuaValue::Float(n)) => {
                *v = *n as f32;
                true
            }
            (Value::Float64(v), LuaValue::Float(n)) => {
                *v = *n;
                true
            }
            (Value::String(v), LuaValue::Str(n)) => {
                *v = n.clone();
                true
            }
            _ => false,
        };

        Ok(applied)
    }

    #[inline]
    fn len(&self) -> usize {
        1
    }

    fn serialize(&self, buffer: &mut [u8]) -> usize {
        let mut cursor = buffer;
        let result: std::io::Result<()> = match self {
            Value::Bool(v) => cursor.write_u8(*v as u8),
            Value::Int8(v) => cursor.write_i8(*v),
            Value::Int16(v) => cursor.write_i16::<LittleEndian>(*v),
            Value::Int32(v) => cursor.write_i32::<LittleEndian>(*v),
            Value::Int64(v) => cursor.write_i64::<LittleEndian>(*v),
            Value::Uint8(v) => cursor.write_u8(*v),
            Value::Uint16(v) => cursor.write_u16::<LittleEndian>(*v),
            Value::Uint32(v) => cursor.write_u32::<LittleEndian>(*v),
            Value::Uint64(v) => cursor.write_u64::<LittleEndian>(*v),
            Value::Float32(v) => cursor.write_f32::<LittleEndian>(*v),
            Value::Float64(v) => cursor.write_f64::<LittleEndian>(*v),
            Value::Time64(v) => cursor.write_i64::<LittleEndian>(*v),
            Value::String(v) => cursor.write_all(v.as_bytes()),
        };

        match result {
            Ok(()) => self.byte_len(),
            Err(_) => 0,
        }
    }

    fn byte_len(&self) -> usize {
        self.byte_len()
    }

    fn clear(&mut self) {
        *self = match self {
            Value::Bool(_) => Value::Bool(false),
            Value::Int8(_) => Value::Int8(0),
            Value::Int16(_) => Value::Int16(0),
            Value::Int32(_) => Value::Int32(0),
            Value::Int64(_) => Value::Int64(0),
            Value::Uint8(_) => Value::Uint8(0),
            Value::Uint16(_) => Value::Uint16(0),
            Value::Uint32(_) => Value::Uint32(0),
            Value::Uint64(_) => Value::Uint64(0),
            Value::Float32(_) => Value::Float32(0.0),
            Value::Float64(_) => Value::Float64(0.0),
            Value::Time64(_) => Value::Time64(0),
            Value::String(_) => Value::String(String::new()),
        };
    }
}

impl Value {
    /// Exact byte length this value serializes to.
    #[inline]
    pub fn byte_len(&self) -> usize {
        match self {
            Value::String(s) => s.len(),
            other => other
                .base_type()
                .fixed_size()
                .expect("non-string base types are fixed size"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fixed_width_values() {
        let v = Value::Float64(3.125);
        let mut buf = [0u8; 8];
        let written = v.serialize(&mut buf);
        assert_eq!(written, 8);

        let back = Value::from_bytes(crate::encoding::BaseType::Float64, &buf).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn serialize_fails_on_undersized_buffer() {
        let v = Value::Int64(42);
        let mut buf = [0u8; 4];
        assert_eq!(v.serialize(&mut buf), 0);
    }

    #[test]
    fn clear_resets_to_type_default() {
        let mut v = Value::String("hi".to_string());
        v.clear();
        assert_eq!(v, Value::String(String::new()));
    }
}
