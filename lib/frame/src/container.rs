//! Field containers: List, Array<T,N>, Enumeration<E,N>, Map<T>, Dictionary, built on top of the
//! typed value kernel. `Dictionary` follows a keyed, type-erased-field store shape; the
//! `FieldMap`/`FieldList` containers preserve insertion order with last-writer-wins semantics.

use crate::value::{Field, LuaHost};
use indexmap::IndexMap;
use serde_json::Value as Json;

/// Order-preserving, dynamically sized sequence of `T`.
#[derive(Debug, Clone, Default)]
pub struct List<T> {
    items: Vec<T>,
}

impl<T> List<T> {
    #[inline]
    pub fn new() -> List<T> {
        List { items: Vec::new() }
    }

    #[inline]
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

/// Fixed-size array of exactly `N` elements of `T`.
#[derive(Debug, Clone)]
pub struct Array<T, const N: usize> {
    items: [T; N],
}

impl<T: Copy + Default, const N: usize> Array<T, N> {
    #[inline]
    pub fn new() -> Array<T, N> {
        Array { items: [T::default(); N] }
    }

    #[inline]
    pub const fn len(&self) -> usize {
        N
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        N == 0
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: T) {
        self.items[index] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }
}

impl<T: Copy + Default, const N: usize> Default for Array<T, N> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Bitmap of `N` booleans indexed by an enum value `E: Into<usize>`. Tracks whether the value was
/// supplied as a single scalar (`provided_as_single`) vs a set.
#[derive(Debug, Clone)]
pub struct Enumeration<E, const N: usize> {
    bits: [bool; N],
    provided_as_single: bool,
    _marker: std::marker::PhantomData<E>,
}

impl<E: Copy + Into<usize>, const N: usize> Enumeration<E, N> {
    #[inline]
    pub fn new() -> Enumeration<E, N> {
        Enumeration {
            bits: [false; N],
            provided_as_single: false,
            _marker: std::marker::PhantomData,
        }
    }

    /// Sets exactly one member, as if constructed from a single scalar value.
    pub fn set_single(&mut self, value: E) {
        self.bits = [false; N];
        self.bits[value.into()] = true;
        self.provided_as_single = true;
    }

    /// Adds a member to the set, without affecting `provided_as_single`'s prior value unless this
    /// is the first member added.
    pub fn set(&mut self, value: E) {
        if self.bits.iter().all(|b| !*b) {
            self.provided_as_single = false;
        }
        self.bits[value.into()] = true;
    }

    #[inline]
    pub fn is_set(&self, value: E) -> bool {
        self.bits[value.into()]
    }

    #[inline]
    pub fn provided_as_single(&self) -> bool {
        self.provided_as_single
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }
}

impl<E: Copy + Into<usize>, const N: usize> Default for Enumeration<E, N> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Insertion-order-preserving mapping from string key to `T`.
#[derive(Debug, Clone, Default)]
pub struct Map<T> {
    entries: IndexMap<String, T>,
}

impl<T> Map<T> {
    #[inline]
    pub fn new() -> Map<T> {
        Map {
            entries: IndexMap::new(),
        }
    }

    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: T) -> Option<T> {
        self.entries.insert(key.into(), value)
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.entries.get_mut(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, T> {
        self.entries.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, T> {
        self.entries.keys()
    }
}

struct DictEntry {
    field: Box<dyn Field>,
    free_on_delete: bool,
}

/// Named heterogeneous map from string to a type-erased field, used to model both a frame's
/// column set and its metadata. Generalized from a fixed statically-registered component set to
/// an arbitrary, dynamically-growable, name-keyed set with insertion order preserved
/// (last-writer-wins metadata semantics depend on stable iteration order for deterministic
/// JSON/Lua emission).
#[derive(Default)]
pub struct Dictionary {
    entries: IndexMap<String, DictEntry>,
}

impl Dictionary {
    #[inline]
    pub fn new() -> Dictionary {
        Dictionary {
            entries: IndexMap::new(),
        }
    }

    /// Adds a field under `name`. If `name` is already present, it is replaced - last writer wins,
    /// as metadata semantics require.
    pub fn add(&mut self, name: impl Into<String>, field: Box<dyn Field>, free_on_delete: bool) {
        self.entries.insert(
            name.into(),
            DictEntry {
                field,
                free_on_delete,
            },
        );
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&dyn Field> {
        self.entries.get(name).map(|e| e.field.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Field + 'static)> {
        self.entries.get_mut(name).map(|e| e.field.as_mut())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Removes a field. Returns whether it had `free_on_delete` set (informational - in Rust the
    /// `Box<dyn Field>` is always dropped either way; the flag is preserved for parity with the
    /// source's explicit-ownership model and is surfaced to callers that mirror it into a host
    /// language where it matters).
    pub fn remove(&mut self, name: &str) -> Option<bool> {
        self.entries.remove(name).map(|e| e.free_on_delete)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Field)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.field.as_ref()))
    }

    pub fn to_json(&self) -> Json {
        let map: serde_json::Map<String, Json> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.field.to_json()))
            .collect();
        Json::Object(map)
    }
}

impl std::fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (k, &v.field))).finish()
    }
}

/// No-op `LuaHost` used by tests and by code paths that only need the error-tolerant shape of
/// `Field::from_lua` without an actual scripting host attached.
pub struct NullLuaHost;

impl LuaHost for NullLuaHost {
    fn push(&mut self, _value: crate::value::LuaValue) {}
    fn arg(&self, _index: usize) -> Option<&crate::value::LuaValue> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn dictionary_last_writer_wins() {
        let mut dict = Dictionary::new();
        dict.add("source", Box::new(Value::String("A".into())), true);
        dict.add("source", Box::new(Value::String("B".into())), true);

        assert_eq!(dict.len(), 1);
        match dict.get("source").unwrap().to_json() {
            Json::String(s) => assert_eq!(s, "B"),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn map_preserves_insertion_order() {
        let mut m: Map<i32> = Map::new();
        m.insert("z", 1);
        m.insert("a", 2);
        let keys: Vec<&str> = m.keys().map(|s| s.as_str()).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[derive(Copy, Clone)]
    enum Beam {
        Strong = 0,
        Weak = 1,
    }

    impl From<Beam> for usize {
        fn from(b: Beam) -> usize {
            b as usize
        }
    }

    #[test]
    fn enumeration_tracks_single_vs_set() {
        let mut e: Enumeration<Beam, 2> = Enumeration::new();
        e.set_single(Beam::Strong);
        assert!(e.provided_as_single());
        assert!(e.is_set(Beam::Strong));

        e.set(Beam::Weak);
        assert_eq!(e.count(), 2);
    }
}
