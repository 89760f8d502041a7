//! Normalized records and change detection between two versions of a record.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::key::CacheKey;

/// Section name reported when either side is not a JSON object.
pub const ROOT_SECTION: &str = "$root";

/// A resource as produced by the origin after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub key: CacheKey,
    pub data: Value,
    /// Resources whose cached copy goes stale when this record changes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<CacheKey>,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

impl NormalizedRecord {
    pub fn new(key: CacheKey, data: Value) -> Self {
        Self {
            key,
            data,
            dependencies: Vec::new(),
            fetched_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<CacheKey>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Top-level sections that differ between two versions of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changed: BTreeSet<String>,
}

impl ChangeSet {
    /// Compares two record bodies section by section.
    ///
    /// A section counts as changed when it was added, removed, or its value differs
    /// structurally. Object members compare regardless of order; arrays compare
    /// element-wise in order; numbers compare by value (`1` equals `1.0`).
    pub fn between(old: &Value, new: &Value) -> Self {
        let mut changed = BTreeSet::new();
        match (old, new) {
            (Value::Object(old), Value::Object(new)) => {
                for (name, old_value) in old {
                    match new.get(name) {
                        Some(new_value) if values_equal(old_value, new_value) => {}
                        _ => {
                            changed.insert(name.clone());
                        }
                    }
                }
                for name in new.keys() {
                    if !old.contains_key(name) {
                        changed.insert(name.clone());
                    }
                }
            }
            (old, new) => {
                if !values_equal(old, new) {
                    changed.insert(ROOT_SECTION.to_string());
                }
            }
        }
        Self { changed }
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn contains(&self, section: &str) -> bool {
        self.changed.contains(section)
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => {
            if a == b {
                return true;
            }
            match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(name, value)| b.get(name).is_some_and(|other| values_equal(value, other)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identical_records_have_no_changes() {
        let old = json!({"profile": {"name": "Ayla", "level": 90}, "gear": [1, 2, 3]});
        let new = json!({"gear": [1, 2, 3], "profile": {"level": 90, "name": "Ayla"}});
        assert!(ChangeSet::between(&old, &new).is_empty());
    }

    #[test]
    fn test_changed_added_and_removed_sections() {
        let old = json!({"profile": {"level": 89}, "gear": [1, 2], "title": "Hero"});
        let new = json!({"profile": {"level": 90}, "gear": [1, 2], "mounts": []});
        let changes = ChangeSet::between(&old, &new);
        let sections: Vec<&str> = changes.sections().collect();
        assert_eq!(sections, vec!["mounts", "profile", "title"]);
        assert!(!changes.contains("gear"));
    }

    #[test]
    fn test_array_order_matters() {
        let old = json!({"gear": [1, 2]});
        let new = json!({"gear": [2, 1]});
        assert!(ChangeSet::between(&old, &new).contains("gear"));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let old = json!({"price": 10});
        let new = json!({"price": 10.0});
        assert!(ChangeSet::between(&old, &new).is_empty());
    }

    #[test]
    fn test_non_object_bodies() {
        let changes = ChangeSet::between(&json!([1]), &json!([2]));
        assert!(changes.contains(ROOT_SECTION));
        assert!(ChangeSet::between(&json!("a"), &json!("a")).is_empty());
        assert!(ChangeSet::between(&json!({"a": 1}), &json!([1])).contains(ROOT_SECTION));
    }
}
