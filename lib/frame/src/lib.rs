#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod column;
pub mod container;
pub mod encoding;
pub mod registry;
pub mod untyped;
pub mod value;

pub use column::ChunkedColumn;
pub use container::{Array, Dictionary, Enumeration, List, Map};
pub use encoding::{BaseType, Encoding, RoleFlags};
pub use untyped::UntypedColumn;
pub use value::{Field, LuaHost, LuaValue, Value};
