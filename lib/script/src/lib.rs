//! Scripting-host bridge contract (C10): the seam every factory/lifecycle object in this
//! workspace is specified against, without embedding a real scripting VM (spec.md §1 Non-goals).

pub mod error;
pub mod host;

pub use error::ConfigError;
pub use host::{Handle, HandleAllocator, LuaFactory, LuaMethodTable, ScriptHost};
