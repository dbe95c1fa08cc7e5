//! FILENAME: interpreter/src/scope.rs
//! PURPOSE: Name-to-object scope for one interpretation session.
//! CONTEXT: Two layers, local then global; lookups fall through to the
//! global layer, definitions always land in the local layer. A dotted
//! `object.property` path resolves against the named object's property
//! table. The scope also answers the dispatcher's "is this left-hand side
//! a settable property path" question through `find_property_path`.

use mathparser::{ObjectScope, Value};
use std::collections::HashMap;

/// What a scope name is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// A plain value binding: variable, array, or string.
    Value(Value),

    /// A domain object with a property table.
    Object {
        type_name: String,
        properties: HashMap<String, Value>,
    },

    /// A user-defined script function. Not a value; calls route through
    /// the function catalog and runner.
    Function,
}

/// Declared type of a settable property, as far as assignment dispatch
/// cares: textual properties never flip the session into command mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Numeric,
    Textual,
}

#[derive(Debug, Default)]
pub struct SessionScope {
    local: HashMap<String, Entry>,
    global: HashMap<String, Entry>,
}

impl SessionScope {
    pub fn new() -> Self {
        SessionScope::default()
    }

    /// Installs a binding in the outer/global layer, typically done by the
    /// embedder before the run (constants, pre-existing objects).
    pub fn insert_global(&mut self, name: impl Into<String>, entry: Entry) {
        self.global.insert(name.into(), entry);
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: Entry) {
        self.local.insert(name.into(), entry);
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.local.get(name).or_else(|| self.global.get(name))
    }

    fn entry_mut(&mut self, name: &str) -> Option<&mut Entry> {
        if self.local.contains_key(name) {
            self.local.get_mut(name)
        } else {
            self.global.get_mut(name)
        }
    }

    /// True if the name is bound at all, in either layer.
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn contains_object(&self, name: &str) -> bool {
        matches!(self.entry(name), Some(Entry::Object { .. }))
    }

    /// Overwrites a plain value binding. `None` means the name is not
    /// bound to a value anywhere, which the dispatcher treats as an
    /// unresolved reference.
    pub fn set_value(&mut self, name: &str, value: Value) -> Option<()> {
        match self.entry_mut(name) {
            Some(Entry::Value(slot)) => {
                *slot = value;
                Some(())
            }
            _ => None,
        }
    }

    /// Sets a property on an existing object, creating the property slot
    /// on first assignment. `None` means the object is not bound.
    pub fn set_property(&mut self, object: &str, path: &str, value: Value) -> Option<()> {
        match self.entry_mut(object) {
            Some(Entry::Object { properties, .. }) => {
                properties.insert(path.to_string(), value);
                Some(())
            }
            _ => None,
        }
    }

    /// Resolves `object` + dotted `path` to the declared kind of a
    /// settable property. An existing object with no such property yet
    /// reports `Numeric`: the property slot is created numeric on first
    /// assignment. `None` means the path is not settable (no such object).
    pub fn find_property_path(&self, object: &str, path: &str) -> Option<PropertyKind> {
        match self.entry(object)? {
            Entry::Object { properties, .. } => match properties.get(path) {
                Some(value) if value.is_textual() => Some(PropertyKind::Textual),
                _ => Some(PropertyKind::Numeric),
            },
            _ => None,
        }
    }
}

impl ObjectScope for SessionScope {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some((object, path)) = name.split_once('.') {
            return match self.entry(object)? {
                Entry::Object { properties, .. } => properties.get(path).cloned(),
                _ => None,
            };
        }
        match self.entry(name)? {
            Entry::Value(value) => Some(value.clone()),
            _ => None,
        }
    }
}
