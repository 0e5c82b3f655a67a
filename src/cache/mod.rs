//! Reference cache: opaque integer handles for captured values.
//!
//! Handles live in two generations. Persistent handles (`1..EPHEMERAL_BASE`)
//! are tied to namespace bindings and survive for as long as the binding
//! does. Ephemeral handles (`EPHEMERAL_BASE..`) name anonymous results and
//! member expansions; [`ReferenceCache::clear`] retires all of them at the
//! start of every top-level turn. Ephemeral numbering never restarts, so a
//! retired handle can not come back to life naming a different value.

/// Display descriptors, hooks and truncation.
pub mod display;

use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub use display::{DisplayHook, DisplayInfo, DisplayItem, JsonDisplayHook, Projection, truncate};

use crate::error::CacheError;
use crate::script::Value;

/// Handle meaning "no reference".
pub const NO_REFERENCE: i64 = 0;
/// Request argument meaning "the persistent collection as a whole".
pub const GLOBALS_REFERENCE: i64 = -1;
/// First ephemeral handle; everything below it (and above zero) is persistent.
pub const EPHEMERAL_BASE: i64 = 0x1000_0000;
/// Bindings never mirrored into the persistent generation.
pub const EXCLUDED_BINDINGS: &[&str] = &["__builtins__", "__displayhooks", "__output_special"];

#[derive(Debug)]
struct CapturedValue {
    value: Value,
    info: DisplayInfo,
    members: Option<Vec<i64>>,
}

/// Handle-addressed store of captured values.
pub struct ReferenceCache {
    hooks: Vec<Box<dyn DisplayHook>>,
    persistent: BTreeMap<i64, CapturedValue>,
    persistent_names: BTreeMap<String, i64>,
    next_persistent: i64,
    ephemeral: Vec<CapturedValue>,
    ephemeral_start: i64,
    ephemeral_names: BTreeMap<String, i64>,
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReferenceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceCache")
            .field("hooks", &self.hooks.len())
            .field("persistent", &self.persistent_names)
            .field("ephemeral", &self.ephemeral.len())
            .field("ephemeral_start", &self.ephemeral_start)
            .finish()
    }
}

/// Whether `handle` belongs to the ephemeral generation.
pub fn is_ephemeral(handle: i64) -> bool {
    handle >= EPHEMERAL_BASE
}

impl ReferenceCache {
    /// Empty cache without display hooks.
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            persistent: BTreeMap::new(),
            persistent_names: BTreeMap::new(),
            next_persistent: 1,
            ephemeral: Vec::new(),
            ephemeral_start: 0,
            ephemeral_names: BTreeMap::new(),
        }
    }

    /// Append a display hook; earlier hooks take precedence.
    pub fn add_hook(&mut self, hook: Box<dyn DisplayHook>) {
        self.hooks.push(hook);
    }

    /// Describe a value with this cache's hooks, without capturing it.
    pub fn describe(&self, value: &Value, name: Option<&str>) -> DisplayInfo {
        DisplayInfo::describe(value, name, &self.hooks)
    }

    /// Capture `value` in the ephemeral generation.
    pub fn capture(&mut self, value: Value, name: Option<&str>) -> i64 {
        let info = self.describe(&value, name);
        let handle = EPHEMERAL_BASE + self.ephemeral_start + self.ephemeral.len() as i64;
        self.ephemeral.push(CapturedValue {
            value,
            info,
            members: None,
        });
        if let Some(name) = name {
            self.ephemeral_names.insert(name.to_string(), handle);
        }
        handle
    }

    /// Capture the members of the value behind `handle`, sorted by name.
    ///
    /// Member handles are memoized per owner, so expanding the same value
    /// twice yields the same handles.
    pub fn capture_members(&mut self, handle: i64) -> Result<Vec<i64>, CacheError> {
        let entry = self.entry(handle)?;
        if let Some(members) = &entry.members {
            return Ok(members.clone());
        }
        let members = entry.value.members();
        let handles: Vec<i64> = members
            .into_iter()
            .map(|(name, value)| self.capture(value, Some(&name)))
            .collect();
        debug!(handle, members = handles.len(), "expanded members");
        self.entry_mut(handle)?.members = Some(handles.clone());
        Ok(handles)
    }

    /// Descriptor of the value behind `handle`.
    pub fn resolve(&self, handle: i64, projection: &Projection) -> Result<JsonValue, CacheError> {
        Ok(self.entry(handle)?.info.project(handle, projection))
    }

    /// Untruncated description of the value behind `handle`.
    pub fn info(&self, handle: i64) -> Result<&DisplayInfo, CacheError> {
        Ok(&self.entry(handle)?.info)
    }

    /// The value behind `handle`.
    pub fn value(&self, handle: i64) -> Result<&Value, CacheError> {
        Ok(&self.entry(handle)?.value)
    }

    /// Retire the whole ephemeral generation.
    pub fn clear(&mut self) {
        self.ephemeral_start += self.ephemeral.len() as i64;
        self.ephemeral.clear();
        self.ephemeral_names.clear();
        for captured in self.persistent.values_mut() {
            captured.members = None;
        }
    }

    /// Mirror namespace bindings into the persistent generation.
    ///
    /// Surviving names keep their handle, new names get a fresh one, and
    /// names that disappeared lose theirs. A binding whose value and
    /// rendering are unchanged keeps its expanded members.
    pub fn sync_persistent(&mut self, bindings: Vec<(String, Value)>) {
        let mut live = BTreeSet::new();
        for (name, value) in bindings {
            if EXCLUDED_BINDINGS.contains(&name.as_str()) {
                continue;
            }
            let handle = match self.persistent_names.get(&name) {
                Some(handle) => *handle,
                None => {
                    let handle = self.next_persistent;
                    self.next_persistent += 1;
                    self.persistent_names.insert(name.clone(), handle);
                    handle
                }
            };
            let info = self.describe(&value, Some(&name));
            let unchanged = self
                .persistent
                .get(&handle)
                .is_some_and(|existing| existing.value.same(&value) && existing.info == info);
            if !unchanged {
                self.persistent.insert(
                    handle,
                    CapturedValue {
                        value,
                        info,
                        members: None,
                    },
                );
            }
            live.insert(name);
        }

        let removed: Vec<String> = self
            .persistent_names
            .keys()
            .filter(|name| !live.contains(*name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(handle) = self.persistent_names.remove(&name) {
                self.persistent.remove(&handle);
            }
        }
    }

    /// Persistent handle of a binding.
    pub fn persistent_handle(&self, name: &str) -> Option<i64> {
        self.persistent_names.get(name).copied()
    }

    /// Handle most recently captured under `name` in either generation.
    pub fn handle_for_name(&self, name: &str) -> Option<i64> {
        self.ephemeral_names
            .get(name)
            .or_else(|| self.persistent_names.get(name))
            .copied()
    }

    /// Descriptors of every persistent binding, sorted by name.
    pub fn persistent(&self, projection: &Projection) -> Vec<JsonValue> {
        self.persistent_names
            .values()
            .filter_map(|handle| self.resolve(*handle, projection).ok())
            .collect()
    }

    /// Number of live ephemeral entries.
    pub fn ephemeral_len(&self) -> usize {
        self.ephemeral.len()
    }

    fn entry(&self, handle: i64) -> Result<&CapturedValue, CacheError> {
        match handle {
            NO_REFERENCE | GLOBALS_REFERENCE => Err(CacheError::Sentinel(handle)),
            _ if is_ephemeral(handle) => usize::try_from(handle - EPHEMERAL_BASE - self.ephemeral_start)
                .ok()
                .and_then(|index| self.ephemeral.get(index))
                .ok_or(CacheError::UnknownHandle(handle)),
            _ => self
                .persistent
                .get(&handle)
                .ok_or(CacheError::UnknownHandle(handle)),
        }
    }

    fn entry_mut(&mut self, handle: i64) -> Result<&mut CapturedValue, CacheError> {
        if is_ephemeral(handle) {
            let start = self.ephemeral_start;
            usize::try_from(handle - EPHEMERAL_BASE - start)
                .ok()
                .and_then(|index| self.ephemeral.get_mut(index))
                .ok_or(CacheError::UnknownHandle(handle))
        } else {
            self.persistent
                .get_mut(&handle)
                .ok_or(CacheError::UnknownHandle(handle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn ephemeral_handles_are_offset_and_sequential() {
        let mut cache = ReferenceCache::new();
        let a = cache.capture(Value::Int(1), None);
        let b = cache.capture(Value::Int(2), Some("b"));
        assert_eq!(a, EPHEMERAL_BASE);
        assert_eq!(b, EPHEMERAL_BASE + 1);
        assert!(is_ephemeral(a));
        assert_eq!(cache.handle_for_name("b"), Some(b));
    }

    #[test]
    fn clear_retires_ephemeral_handles_forever() {
        let mut cache = ReferenceCache::new();
        let old = cache.capture(Value::Int(1), None);
        cache.clear();
        assert_eq!(
            cache.resolve(old, &Projection::full(0)),
            Err(CacheError::UnknownHandle(old))
        );
        let new = cache.capture(Value::Int(2), None);
        assert_ne!(old, new);
        assert!(cache.resolve(old, &Projection::full(0)).is_err());
        assert!(cache.resolve(new, &Projection::full(0)).is_ok());
    }

    #[test]
    fn persistent_handles_survive_rebinding_and_die_with_the_name() {
        let mut cache = ReferenceCache::new();
        cache.sync_persistent(bindings(&[("x", Value::Int(1)), ("y", Value::Int(2))]));
        let x = cache.persistent_handle("x").unwrap();
        let y = cache.persistent_handle("y").unwrap();
        assert_eq!((x, y), (1, 2));

        cache.clear();
        cache.sync_persistent(bindings(&[("x", Value::from("changed")), ("z", Value::Int(3))]));
        assert_eq!(cache.persistent_handle("x"), Some(x));
        assert_eq!(cache.persistent_handle("y"), None);
        assert_eq!(cache.persistent_handle("z"), Some(3));
        assert_eq!(cache.info(x).unwrap().value, "'changed'");
        assert_eq!(cache.resolve(y, &Projection::values(0)), Err(CacheError::UnknownHandle(y)));
    }

    #[test]
    fn excluded_bindings_are_not_mirrored() {
        let mut cache = ReferenceCache::new();
        cache.sync_persistent(bindings(&[("__builtins__", Value::None), ("a", Value::Int(1))]));
        assert_eq!(cache.persistent_handle("__builtins__"), None);
        let listed = cache.persistent(&Projection::values(0));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["name"], "a");
    }

    #[test]
    fn member_expansion_is_memoized_and_sorted() {
        let mut cache = ReferenceCache::new();
        let owner = cache.capture(Value::Int(5), None);
        let first = cache.capture_members(owner).unwrap();
        let second = cache.capture_members(owner).unwrap();
        assert_eq!(first, second);
        let names: Vec<String> = first
            .iter()
            .map(|handle| cache.info(*handle).unwrap().name.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["denominator", "imag", "numerator", "real"]);
    }

    #[test]
    fn resync_keeps_member_expansion_of_unchanged_bindings() {
        let mut cache = ReferenceCache::new();
        let list = Value::list(vec![Value::Int(10), Value::Int(20)]);
        cache.sync_persistent(bindings(&[("x", list.clone())]));
        let x = cache.persistent_handle("x").unwrap();
        let first = cache.capture_members(x).unwrap();

        cache.sync_persistent(bindings(&[("x", list.clone())]));
        assert_eq!(cache.capture_members(x).unwrap(), first);

        if let Value::List(items) = &list {
            items.borrow_mut().push(Value::Int(30));
        }
        cache.sync_persistent(bindings(&[("x", list)]));
        let grown = cache.capture_members(x).unwrap();
        assert_eq!(grown.len(), 3);
        assert!(grown.iter().all(|handle| !first.contains(handle)));
    }

    #[test]
    fn sentinels_do_not_resolve() {
        let cache = ReferenceCache::new();
        assert_eq!(cache.resolve(0, &Projection::full(0)), Err(CacheError::Sentinel(0)));
        assert_eq!(cache.resolve(-1, &Projection::full(0)), Err(CacheError::Sentinel(-1)));
        assert_eq!(cache.resolve(42, &Projection::full(0)), Err(CacheError::UnknownHandle(42)));
    }

    #[test]
    fn persistent_listing_is_sorted_by_name() {
        let mut cache = ReferenceCache::new();
        cache.sync_persistent(bindings(&[("zeta", Value::Int(1))]));
        cache.sync_persistent(bindings(&[("zeta", Value::Int(1)), ("alpha", Value::Int(2))]));
        let names: Vec<JsonValue> = cache
            .persistent(&Projection::values(0))
            .into_iter()
            .map(|entry| entry["name"].clone())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
