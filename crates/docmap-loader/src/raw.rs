//! Raw record sets: the loader's input.
//!
//! A raw record set maps type names to keyed raw records:
//!
//! ```json
//! {
//!   "Author":  { "pablo": { "name": "Pablo" } },
//!   "Article": { "a1": { "title": "Hi", "author": "pablo" } }
//! }
//! ```
//!
//! Both levels keep the order they were inserted (or deserialized) in;
//! the loader builds records in that order.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LoaderError, LoaderResult};

/// One raw record: field name to raw value.
pub type RawRecord = Map<String, Value>;

/// Ordered `type -> key -> record` input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecordSet {
    types: IndexMap<String, IndexMap<String, RawRecord>>,
}

impl RawRecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON raw record set, keeping document order.
    pub fn from_json_str(source: &str) -> LoaderResult<Self> {
        serde_json::from_str(source).map_err(|e| LoaderError::Input(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json_str(&source)
    }

    /// Insert a record. Replacing an existing key keeps its position.
    pub fn insert(
        &mut self,
        type_name: impl Into<String>,
        key: impl Into<String>,
        record: RawRecord,
    ) -> Option<RawRecord> {
        self.types
            .entry(type_name.into())
            .or_default()
            .insert(key.into(), record)
    }

    pub fn get(&self, type_name: &str, key: &str) -> Option<&RawRecord> {
        self.types.get(type_name)?.get(key)
    }

    pub fn contains(&self, type_name: &str, key: &str) -> bool {
        self.get(type_name, key).is_some()
    }

    /// Remove a record, keeping the order of the rest. The type entry
    /// stays, even when emptied.
    pub fn remove(&mut self, type_name: &str, key: &str) -> Option<RawRecord> {
        self.types.get_mut(type_name)?.shift_remove(key)
    }

    /// Remove a record in constant time. The last record of the type takes
    /// its position.
    pub fn take(&mut self, type_name: &str, key: &str) -> Option<RawRecord> {
        self.types.get_mut(type_name)?.swap_remove(key)
    }

    /// Type names in input order.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Keys of `type_name` in input order.
    pub fn keys(&self, type_name: &str) -> Vec<String> {
        self.types
            .get(type_name)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.types.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn json_order_is_kept() {
        let set = RawRecordSet::from_json_str(
            r#"{
                "Zebra": {"z2": {}, "z1": {}},
                "Apple": {"b": {"n": 1}, "a": {"n": 2}}
            }"#,
        )
        .unwrap();
        assert_eq!(set.type_names().collect::<Vec<_>>(), vec!["Zebra", "Apple"]);
        assert_eq!(set.keys("Apple"), vec!["b", "a"]);
        assert_eq!(set.keys("Zebra"), vec!["z2", "z1"]);
        assert_eq!(set.get("Apple", "a"), Some(&record(json!({"n": 2}))));
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn empty_types_are_kept() {
        let set = RawRecordSet::from_json_str(r#"{"Author": {}}"#).unwrap();
        assert_eq!(set.type_names().collect::<Vec<_>>(), vec!["Author"]);
        assert!(set.is_empty());
    }

    #[test]
    fn records_must_be_objects() {
        let err = RawRecordSet::from_json_str(r#"{"Author": {"a": 3}}"#).unwrap_err();
        assert!(matches!(err, LoaderError::Input(_)));
    }

    #[test]
    fn insert_replace_and_remove() {
        let mut set = RawRecordSet::new();
        assert!(set.insert("Author", "a", record(json!({"n": 1}))).is_none());
        set.insert("Author", "b", record(json!({})));
        let previous = set.insert("Author", "a", record(json!({"n": 2})));
        assert_eq!(previous, Some(record(json!({"n": 1}))));
        assert_eq!(set.keys("Author"), vec!["a", "b"]);

        assert!(set.remove("Author", "a").is_some());
        assert!(!set.contains("Author", "a"));
        assert!(set.remove("Author", "a").is_none());
        assert!(set.remove("Nope", "a").is_none());
        assert_eq!(set.keys("Author"), vec!["b"]);
    }

    #[test]
    fn take_moves_the_last_record_into_place() {
        let mut set = RawRecordSet::from_json_str(
            r#"{"Author": {"a": {"n": 1}, "b": {}, "c": {}}}"#,
        )
        .unwrap();
        assert_eq!(set.take("Author", "a"), Some(record(json!({"n": 1}))));
        assert_eq!(set.keys("Author"), vec!["c", "b"]);
        assert!(set.take("Author", "a").is_none());
        assert!(set.take("Nope", "a").is_none());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn large_inputs_keep_their_order() {
        let mut source = serde_json::Map::new();
        for n in 0..20_000 {
            source.insert(format!("k{n:05}"), json!({"n": n}));
        }
        let set = RawRecordSet::from_json_str(&json!({"Item": source}).to_string()).unwrap();
        assert_eq!(set.len(), 20_000);
        let keys = set.keys("Item");
        assert_eq!(keys.first().map(String::as_str), Some("k00000"));
        assert_eq!(keys.last().map(String::as_str), Some("k19999"));
        assert_eq!(set.get("Item", "k12345"), Some(&record(json!({"n": 12345}))));
    }

    #[test]
    fn from_path_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixtures.json");
        std::fs::write(&path, r#"{"Author": {"a": {"name": "x"}}}"#).unwrap();
        let set = RawRecordSet::from_path(&path).unwrap();
        assert!(set.contains("Author", "a"));
    }
}
