//! Type-erased column storage: a `Dictionary`-compatible `Field` wrapper around `ChunkedColumn<T>`
//! for each primitive type, so a `GeoDataFrame`'s column set can hold columns of differing element
//! types behind one `Box<dyn Field>` seam. Uses the same type-erasure idiom as
//! `container::Dictionary`, specialized to columns rather than scalars.

use crate::column::{AppendBuffer, ChunkedColumn};
use crate::encoding::{BaseType, Encoding};
use crate::value::{Field, LuaHost, LuaValue};
use gdf_kernel::error::CoreResult;
use serde_json::Value as Json;

macro_rules! untyped_variant {
    ($variant:ident, $t:ty) => {
        impl From<ChunkedColumn<$t>> for UntypedColumn {
            fn from(col: ChunkedColumn<$t>) -> Self {
                UntypedColumn::$variant(col)
            }
        }
    };
}

/// A chunked column of any supported primitive type, type-erased behind one enum so it can live
/// in a `Dictionary` alongside columns of other element types.
#[derive(Debug, Clone)]
pub enum UntypedColumn {
    Bool(ChunkedColumn<bool>),
    Int8(ChunkedColumn<i8>),
    Int16(ChunkedColumn<i16>),
    Int32(ChunkedColumn<i32>),
    Int64(ChunkedColumn<i64>),
    Uint8(ChunkedColumn<u8>),
    Uint16(ChunkedColumn<u16>),
    Uint32(ChunkedColumn<u32>),
    Uint64(ChunkedColumn<u64>),
    Float32(ChunkedColumn<f32>),
    Float64(ChunkedColumn<f64>),
    Time64(ChunkedColumn<i64>),
}

untyped_variant!(Bool, bool);
untyped_variant!(Int8, i8);
untyped_variant!(Int16, i16);
untyped_variant!(Int32, i32);
untyped_variant!(Int64, i64);
untyped_variant!(Uint8, u8);
untyped_variant!(Uint16, u16);
untyped_variant!(Uint32, u32);
untyped_variant!(Uint64, u64);
untyped_variant!(Float32, f32);
untyped_variant!(Float64, f64);

impl UntypedColumn {
    pub fn new(base: BaseType, time_column: bool) -> UntypedColumn {
        match base {
            BaseType::Bool => UntypedColumn::Bool(ChunkedColumn::new()),
            BaseType::Int8 => UntypedColumn::Int8(ChunkedColumn::new()),
            BaseType::Int16 => UntypedColumn::Int16(ChunkedColumn::new()),
            BaseType::Int32 => UntypedColumn::Int32(ChunkedColumn::new()),
            BaseType::Int64 => UntypedColumn::Int64(ChunkedColumn::new()),
            BaseType::Uint8 => UntypedColumn::Uint8(ChunkedColumn::new()),
            BaseType::Uint16 => UntypedColumn::Uint16(ChunkedColumn::new()),
            BaseType::Uint32 => UntypedColumn::Uint32(ChunkedColumn::new()),
            BaseType::Uint64 => UntypedColumn::Uint64(ChunkedColumn::new()),
            BaseType::Float32 => UntypedColumn::Float32(ChunkedColumn::new()),
            BaseType::Float64 => UntypedColumn::Float64(ChunkedColumn::new()),
            BaseType::Time64 => UntypedColumn::Time64(ChunkedColumn::new()),
            BaseType::String => {
                // Strings are not stored chunked-fixed-width; represented as Uint8 byte columns of
                // their UTF-8 encoding is out of scope for a column (only scalar metadata carries
                // strings in this kernel) - treat as an empty byte column placeholder.
                let _ = time_column;
                UntypedColumn::Uint8(ChunkedColumn::new())
            }
        }
    }

    pub fn base_type(&self) -> BaseType {
        match self {
            UntypedColumn::Bool(_) => BaseType::Bool,
            UntypedColumn::Int8(_) => BaseType::Int8,
            UntypedColumn::Int16(_) => BaseType::Int16,
            UntypedColumn::Int32(_) => BaseType::Int32,
            UntypedColumn::Int64(_) => BaseType::Int64,
            UntypedColumn::Uint8(_) => BaseType::Uint8,
            UntypedColumn::Uint16(_) => BaseType::Uint16,
            UntypedColumn::Uint32(_) => BaseType::Uint32,
            UntypedColumn::Uint64(_) => BaseType::Uint64,
            UntypedColumn::Float32(_) => BaseType::Float32,
            UntypedColumn::Float64(_) => BaseType::Float64,
            UntypedColumn::Time64(_) => BaseType::Time64,
        }
    }

    pub fn append_buffer(&mut self, bytes: &[u8]) -> Option<usize> {
        match self {
            UntypedColumn::Bool(c) => c.append_buffer(bytes),
            UntypedColumn::Int8(c) => c.append_buffer(bytes),
            UntypedColumn::Int16(c) => c.append_buffer(bytes),
            UntypedColumn::Int32(c) => c.append_buffer(bytes),
            UntypedColumn::Int64(c) => c.append_buffer(bytes),
            UntypedColumn::Uint8(c) => c.append_buffer(bytes),
            UntypedColumn::Uint16(c) => c.append_buffer(bytes),
            UntypedColumn::Uint32(c) => c.append_buffer(bytes),
            UntypedColumn::Uint64(c) => c.append_buffer(bytes),
            UntypedColumn::Float32(c) => c.append_buffer(bytes),
            UntypedColumn::Float64(c) => c.append_buffer(bytes),
            UntypedColumn::Time64(c) => c.append_buffer(bytes),
        }
    }

    fn column_len(&self) -> usize {
        match self {
            UntypedColumn::Bool(c) => c.len(),
            UntypedColumn::Int8(c) => c.len(),
            UntypedColumn::Int16(c) => c.len(),
            UntypedColumn::Int32(c) => c.len(),
            UntypedColumn::Int64(c) => c.len(),
            UntypedColumn::Uint8(c) => c.len(),
            UntypedColumn::Uint16(c) => c.len(),
            UntypedColumn::Uint32(c) => c.len(),
            UntypedColumn::Uint64(c) => c.len(),
            UntypedColumn::Float32(c) => c.len(),
            UntypedColumn::Float64(c) => c.len(),
            UntypedColumn::Time64(c) => c.len(),
        }
    }

    fn elem_size(&self) -> usize {
        self.base_type().fixed_size().expect("columns are always fixed-width")
    }
}

impl Field for UntypedColumn {
    fn encoding(&self) -> Encoding {
        Encoding::new(self.base_type())
    }

    fn to_json(&self) -> Json {
        macro_rules! arr {
            ($c:expr) => {
                Json::Array($c.iter().map(|v| Json::from(*v)).collect())
            };
        }

        match self {
            UntypedColumn::Bool(c) => arr!(c),
            UntypedColumn::Int8(c) => arr!(c),
            UntypedColumn::Int16(c) => arr!(c),
            UntypedColumn::Int32(c) => arr!(c),
            UntypedColumn::Int64(c) => arr!(c),
            UntypedColumn::Uint8(c) => arr!(c),
            UntypedColumn::Uint16(c) => arr!(c),
            UntypedColumn::Uint32(c) => arr!(c),
            UntypedColumn::Uint64(c) => arr!(c),
            UntypedColumn::Float32(c) => arr!(c),
            UntypedColumn::Float64(c) => arr!(c),
            UntypedColumn::Time64(c) => arr!(c),
        }
    }

    fn to_lua(&self, _host: &mut dyn LuaHost) {
        // Columns are not pushed wholesale to the scripting host - only scalar metadata is, per
        // the `gdf_script` contract. Bulk column access happens through the dataframe API.
    }

    fn from_lua(&mut self, _host: &dyn LuaHost, _index: usize) -> CoreResult<bool> {
        Ok(false)
    }

    fn len(&self) -> usize {
        self.column_len()
    }

    fn byte_len(&self) -> usize {
        self.byte_len()
    }

    fn serialize(&self, buffer: &mut [u8]) -> usize {
        match self {
            UntypedColumn::Bool(c) => c.serialize(buffer),
            UntypedColumn::Int8(c) => c.serialize(buffer),
            UntypedColumn::Int16(c) => c.serialize(buffer),
            UntypedColumn::Int32(c) => c.serialize(buffer),
            UntypedColumn::Int64(c) => c.serialize(buffer),
            UntypedColumn::Uint8(c) => c.serialize(buffer),
            UntypedColumn::Uint16(c) => c.serialize(buffer),
            UntypedColumn::Uint32(c) => c.serialize(buffer),
            UntypedColumn::Uint64(c) => c.serialize(buffer),
            UntypedColumn::Float32(c) => c.serialize(buffer),
            UntypedColumn::Float64(c) => c.serialize(buffer),
            UntypedColumn::Time64(c) => c.serialize(buffer),
        }
    }

    fn clear(&mut self) {
        match self {
            UntypedColumn::Bool(c) => c.clear(),
            UntypedColumn::Int8(c) => c.clear(),
            UntypedColumn::Int16(c) => c.clear(),
            UntypedColumn::Int32(c) => c.clear(),
            UntypedColumn::Int64(c) => c.clear(),
            UntypedColumn::Uint8(c) => c.clear(),
            UntypedColumn::Uint16(c) => c.clear(),
            UntypedColumn::Uint32(c) => c.clear(),
            UntypedColumn::Uint64(c) => c.clear(),
            UntypedColumn::Float32(c) => c.clear(),
            UntypedColumn::Float64(c) => c.clear(),
            UntypedColumn::Time64(c) => c.clear(),
        }
    }
}

impl UntypedColumn {
    /// Exact byte length of a full serialization, used by the emit path to size its scratch
    /// buffer precisely without a trial serialize.
    pub fn byte_len(&self) -> usize {
        self.column_len() * self.elem_size()
    }
}
