//! Client-visible handles for engine values and lexical scopes.
//!
//! Ids minted for a backtrace are released in one go when execution
//! resumes. Ids in any other group stay valid for the life of the
//! handler, since only the backtrace group is ever released.

use std::collections::HashMap;

use lookout_engine::Value;

/// Group holding handles minted for call frames of the current pause.
pub const BACKTRACE_GROUP: &str = "backtrace";

/// Group holding handles for console message arguments. Never released.
pub const CONSOLE_GROUP: &str = "ConsoleObjectGroup";

/// Group of handles minted for requests that name no `objectGroup`.
/// Never released.
pub const DEFAULT_GROUP: &str = "";

#[derive(Debug, Clone)]
enum Entry {
    Value(Value),
    Scope { frame: u32, scope: u32 },
}

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    group: String,
}

/// Maps opaque string ids to values or `(frame, scope)` pairs.
#[derive(Debug, Default)]
pub struct RemoteObjectsTable {
    next_id: u64,
    slots: HashMap<String, Slot>,
    groups: HashMap<String, Vec<String>>,
}

impl RemoteObjectsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `group` and return its new id.
    pub fn add_value(&mut self, value: Value, group: &str) -> String {
        self.insert(Entry::Value(value), group)
    }

    /// Register lexical scope `scope` of frame `frame` under `group`.
    pub fn add_scope(&mut self, frame: u32, scope: u32, group: &str) -> String {
        self.insert(Entry::Scope { frame, scope }, group)
    }

    fn insert(&mut self, entry: Entry, group: &str) -> String {
        self.next_id += 1;
        let id = self.next_id.to_string();
        self.slots.insert(
            id.clone(),
            Slot {
                entry,
                group: group.to_string(),
            },
        );
        self.groups
            .entry(group.to_string())
            .or_default()
            .push(id.clone());
        id
    }

    pub fn get_value(&self, id: &str) -> Option<&Value> {
        match self.slots.get(id).map(|s| &s.entry) {
            Some(Entry::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// `(frame, scope)` behind a scope id.
    pub fn get_scope(&self, id: &str) -> Option<(u32, u32)> {
        match self.slots.get(id).map(|s| &s.entry) {
            Some(Entry::Scope { frame, scope }) => Some((*frame, *scope)),
            _ => None,
        }
    }

    /// Group the id was minted under; empty for unknown ids.
    pub fn object_group(&self, id: &str) -> &str {
        self.slots.get(id).map_or("", |s| s.group.as_str())
    }

    /// Invalidate every id minted under `group`.
    pub fn release_object_group(&mut self, group: &str) {
        if let Some(ids) = self.groups.remove(group) {
            tracing::trace!(group, count = ids.len(), "releasing remote objects");
            for id in ids {
                self.slots.remove(&id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_objects_ids_are_unique_and_resolve() {
        let mut table = RemoteObjectsTable::new();
        let a = table.add_value(Value::Number(1.0), BACKTRACE_GROUP);
        let b = table.add_scope(0, 1, BACKTRACE_GROUP);
        assert_ne!(a, b);
        assert_eq!(table.get_value(&a), Some(&Value::Number(1.0)));
        assert_eq!(table.get_scope(&b), Some((0, 1)));
        assert_eq!(table.get_scope(&a), None);
        assert_eq!(table.get_value(&b), None);
    }

    #[test]
    fn remote_objects_release_only_named_group() {
        let mut table = RemoteObjectsTable::new();
        let frame = table.add_value(Value::Bool(true), BACKTRACE_GROUP);
        let console = table.add_value(Value::String("x".into()), CONSOLE_GROUP);

        table.release_object_group(BACKTRACE_GROUP);

        assert!(table.get_value(&frame).is_none());
        assert_eq!(table.object_group(&frame), "");
        assert!(table.get_value(&console).is_some());
        assert_eq!(table.object_group(&console), CONSOLE_GROUP);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn remote_objects_ids_not_reused_after_release() {
        let mut table = RemoteObjectsTable::new();
        let first = table.add_value(Value::Null, "g");
        table.release_object_group("g");
        let second = table.add_value(Value::Null, "g");
        assert_ne!(first, second);
        assert!(table.get_value(&first).is_none());
    }

    #[test]
    fn remote_objects_release_unknown_group_is_noop() {
        let mut table = RemoteObjectsTable::new();
        table.add_value(Value::Null, "g");
        table.release_object_group("other");
        assert!(!table.is_empty());
    }
}
