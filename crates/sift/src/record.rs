//! Host-record reflection boundary.
//!
//! A record is the read-only object one `run`/`execute` call filters. The
//! core never inspects host types directly; it calls the two capability
//! methods of [`Record`] and caches the fields for the remainder of that
//! execution. Supported field values are whatever the implementation can
//! express as a [`Value`]: 64-bit integers, floats, strings, booleans, time
//! values (via [`Value::from_datetime`]) and arrays of those; anything else
//! should be reported as `Value::Null`.

use std::collections::HashMap;

use ahash::AHashMap;

use crate::value::Value;

/// Capability trait giving the VM reflective access to a host record.
pub trait Record {
    /// Names of every field, used lazily on the first unresolved lookup.
    fn field_names(&self) -> Vec<String>;

    /// Reads one field by name; `None` when the record has no such field.
    fn field(&self, name: &str) -> Option<Value>;
}

/// The empty record: scripts that reference fields see `Null`.
impl Record for () {
    fn field_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn field(&self, _name: &str) -> Option<Value> {
        None
    }
}

impl Record for AHashMap<String, Value> {
    fn field_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Record for HashMap<String, Value> {
    fn field_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_record_is_empty() {
        assert!(().field_names().is_empty());
        assert_eq!(().field("anything"), None);
    }

    #[test]
    fn map_record_exposes_its_entries() {
        let mut record: AHashMap<String, Value> = AHashMap::new();
        record.insert("Country".into(), Value::Str("RU".into()));
        record.insert("Adults".into(), Value::Int(1));
        let mut names = record.field_names();
        names.sort();
        assert_eq!(names, vec!["Adults", "Country"]);
        assert_eq!(record.field("Country"), Some(Value::Str("RU".into())));
        assert_eq!(record.field("Missing"), None);
    }
}
