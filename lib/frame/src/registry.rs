//! Record schema registry: a process-wide registry of named record layouts, keyed and
//! interior-mutable like an `IndexMap<K, Bundle>` registry but simplified down to what's actually
//! needed here: "register a flat named layout once, look it up by name repeatedly". A
//! `lazy_static` `Mutex<IndexMap<String, RecordDef>>` is the idiomatic stable-Rust form of a
//! process-wide registry behind a coarse mutex.

use crate::encoding::Encoding;
use gdf_kernel::error::{CoreError, CoreResult};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use std::sync::Mutex;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct FieldFlags: u32 {
        const BIG_ENDIAN = 0b0001;
        const POINTER    = 0b0010;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: Encoding,
    pub offset: usize,
    pub count: usize,
    pub flags: FieldFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordDef {
    pub name: String,
    pub id_field: Option<String>,
    pub size: usize,
    pub fields: Vec<FieldDef>,
}

impl RecordDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

lazy_static! {
    static ref RECORDS: Mutex<IndexMap<String, RecordDef>> = Mutex::new(IndexMap::new());
}

/// Registers a record layout. Idempotent: re-registering an identical definition under the same
/// name is a no-op; registering a conflicting definition under an existing name is a
/// `CoreError::Config`.
pub fn register(def: RecordDef) -> CoreResult<()> {
    let mut records = RECORDS.lock().expect("record registry mutex poisoned");

    match records.get(&def.name) {
        Some(existing) if *existing == def => Ok(()),
        Some(_) => Err(CoreError::config(format!(
            "record '{}' already registered with a different definition",
            def.name
        ))),
        None => {
            records.insert(def.name.clone(), def);
            Ok(())
        }
    }
}

/// Looks up a previously registered record definition by name.
pub fn lookup(name: &str) -> Option<RecordDef> {
    RECORDS.lock().expect("record registry mutex poisoned").get(name).cloned()
}

/// Removes every registered definition. Exposed only for test isolation between cases that each
/// expect a clean registry.
#[cfg(test)]
pub fn clear() {
    RECORDS.lock().expect("record registry mutex poisoned").clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::BaseType;

    fn sample(name: &str) -> RecordDef {
        RecordDef {
            name: name.to_string(),
            id_field: Some("id".to_string()),
            size: 16,
            fields: vec![FieldDef {
                name: "id".to_string(),
                field_type: Encoding::new(BaseType::Uint64),
                offset: 0,
                count: 1,
                flags: FieldFlags::empty(),
            }],
        }
    }

    // Run as a single test: the registry is a process-wide singleton, so exercising it from
    // several parallel #[test] fns would race on the same state.
    #[test]
    fn registry_lifecycle() {
        clear();

        register(sample("atl06_rec")).unwrap();
        register(sample("atl06_rec")).unwrap();
        assert!(lookup("atl06_rec").is_some());

        register(sample("gedi03_rec")).unwrap();
        let mut conflicting = sample("gedi03_rec");
        conflicting.size = 32;
        assert!(register(conflicting).is_err());

        assert!(lookup("does_not_exist").is_none());
    }
}
