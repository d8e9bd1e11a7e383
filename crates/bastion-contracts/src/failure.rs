//! The resolver side channel.
//!
//! When an annotation with RESOLVER policy fails, the failure is not an
//! error. It is written into a `FailureInfo` that travels with the
//! resolution info to the field's resolver, which decides how to degrade
//! its answer. Each annotation family owns a named slot holding a JSON
//! list (`missingPermissions`, `validationErrors`, ...).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FieldError, FieldResult};
use crate::response::PathSegment;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    slots: Map<String, Value>,
    failed_paths: Vec<Vec<PathSegment>>,
}

impl FailureInfo {
    /// True when no slot was written and no input path failed.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.failed_paths.is_empty()
    }

    /// The raw content of `slot`, whatever its shape.
    pub fn get(&self, slot: &str) -> Option<&Value> {
        self.slots.get(slot)
    }

    /// Overwrite `slot` with an arbitrary value.
    ///
    /// Host middlewares may write here; enforcement wrappers only ever
    /// append lists through [`merge`](Self::merge).
    pub fn set(&mut self, slot: impl Into<String>, value: Value) {
        self.slots.insert(slot.into(), value);
    }

    /// The list stored in `slot`.
    ///
    /// Fails with `FieldError::Configuration` when the slot holds something
    /// other than a list.
    pub fn list(&self, slot: &str) -> FieldResult<Option<&Vec<Value>>> {
        match self.slots.get(slot) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(_) => Err(not_an_array(slot)),
        }
    }

    /// Append `entries` to the list in `slot`, skipping entries already
    /// present.
    pub fn merge(&mut self, slot: &str, entries: impl IntoIterator<Item = Value>) -> FieldResult<()> {
        match self.slots.get(slot) {
            Some(Value::Array(_)) => {}
            None | Some(Value::Null) => {
                self.slots.insert(slot.to_string(), Value::Array(Vec::new()));
            }
            Some(_) => return Err(not_an_array(slot)),
        }
        let Some(Value::Array(current)) = self.slots.get_mut(slot) else {
            return Err(not_an_array(slot));
        };
        for entry in entries {
            if !current.contains(&entry) {
                current.push(entry);
            }
        }
        Ok(())
    }

    /// Record an input path whose value failed a deferred check.
    pub fn record_path(&mut self, path: Vec<PathSegment>) {
        if !self.failed_paths.contains(&path) {
            self.failed_paths.push(path);
        }
    }

    /// Input paths whose values failed deferred checks, in walk order.
    pub fn failed_paths(&self) -> &[Vec<PathSegment>] {
        &self.failed_paths
    }

    /// Fold `other` into `self`, merging every slot.
    pub fn absorb(&mut self, other: FailureInfo) -> FieldResult<()> {
        for (slot, value) in other.slots {
            match value {
                Value::Array(items) => self.merge(&slot, items)?,
                Value::Null => {}
                _ => return Err(not_an_array(&slot)),
            }
        }
        for path in other.failed_paths {
            self.record_path(path);
        }
        Ok(())
    }
}

fn not_an_array(slot: &str) -> FieldError {
    FieldError::Configuration(format!("The {slot} field is not an array!"))
}
