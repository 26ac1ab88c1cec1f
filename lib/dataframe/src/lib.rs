//! GeoDataFrame (C8, spec.md §4.4): the columnar frame type, its wire record format, and the
//! receive/emit/runner protocols that move records between a frame and the fabric.

pub mod emit;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod record;
pub mod runner;

pub use emit::emit;
pub use error::{FrameError, FrameResult};
pub use frame::{GeoDataFrame, SemanticColumns};
pub use ingest::FrameReceiver;
pub use record::{GdfRecord, RecordKind};
pub use runner::{FrameSender, Runner, RunnerChain};
