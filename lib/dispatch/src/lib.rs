//! Record dispatcher: routes decoded dataframe records to registered processors by
//! `RecordKind`, with pluggable key extraction and drain semantics.

pub mod dispatcher;

pub use dispatcher::{
    register_builtin_records, registry_name, DispatchOutcome, Dispatcher, DispatcherWorker, DrainStats, KeyExtractor,
    Processor,
};
