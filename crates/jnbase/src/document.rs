//! The persisted data model: a document of named collections of records.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{constants::ID_FIELD, JnbaseError, Result};

/// A single record: a map from field name to arbitrary JSON value.
///
/// Fields keep the order they were written in. The reserved `id` field holds the record
/// identifier once assigned.
pub type Record = Map<String, Value>;

/// An equality-conjunction filter: a record matches when every field listed here is present on
/// the record with an equal value. An empty condition matches every record.
pub type Condition = Map<String, Value>;

/// A partial field map merged into matched records. Patch fields overwrite, others are retained.
pub type Patch = Map<String, Value>;

/// An ordered sequence of records. Order is insertion order and survives load/save cycles.
pub type Collection = Vec<Record>;

/// The whole persisted value: a mapping from collection name to collection.
///
/// Collections keep the order they appear in the file; new ones are appended.
///
/// Serializes transparently as a JSON object whose values are arrays of record objects:
///
/// ```json
/// {
///     "users": [ { "id": "a1b2...", "name": "Ann" } ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    collections: IndexMap<String, Collection>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self { Self::default() }

    /// Converts an arbitrary JSON value into a document.
    ///
    /// Fails with [`JnbaseError::Json`] unless the value is an object of arrays of objects.
    pub fn from_value(value: Value) -> Result<Self> { Ok(serde_json::from_value(value)?) }

    /// Converts the document into a JSON value.
    pub fn to_value(&self) -> Result<Value> { Ok(serde_json::to_value(self)?) }

    /// Returns the collection with the given name, if present.
    pub fn collection(&self, key: &str) -> Option<&Collection> { self.collections.get(key) }

    /// Returns a mutable reference to the collection with the given name, if present.
    pub fn collection_mut(&mut self, key: &str) -> Option<&mut Collection> { self.collections.get_mut(key) }

    /// Returns `true` if a collection with the given name exists.
    pub fn contains(&self, key: &str) -> bool { self.collections.contains_key(key) }

    /// Inserts or replaces a collection, returning the previous records if any.
    ///
    /// A replaced collection keeps its position; a new one is appended.
    pub fn insert_collection(&mut self, key: &str, records: Collection) -> Option<Collection> {
        self.collections.insert(key.to_owned(), records)
    }

    /// Removes a collection, returning its records if it existed. The others keep their order.
    pub fn remove_collection(&mut self, key: &str) -> Option<Collection> { self.collections.shift_remove(key) }

    /// Iterates over the collection names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> { self.collections.keys().map(String::as_str) }

    /// Returns the number of collections.
    pub fn len(&self) -> usize { self.collections.len() }

    /// Returns `true` if the document holds no collections.
    pub fn is_empty(&self) -> bool { self.collections.is_empty() }

    /// Returns the total number of records across all collections.
    pub fn record_count(&self) -> usize { self.collections.values().map(Vec::len).sum() }
}

impl FromIterator<(String, Collection)> for Document {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = (String, Collection)>,
    {
        Self {
            collections: iter.into_iter().collect(),
        }
    }
}

/// Converts a JSON value into a [`Record`] (also usable for conditions and patches).
///
/// ```rust
/// use jnbase::document::into_record;
/// use serde_json::json;
///
/// let record = into_record(json!({"name": "Ann"})).unwrap();
/// assert_eq!(record["name"], "Ann");
/// assert!(into_record(json!([1, 2])).is_err());
/// ```
pub fn into_record(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Array(_) => {
            Err(JnbaseError::InvalidRecord {
                reason: format!("expected a JSON object, got {}", value),
            })
        },
    }
}

/// Returns the string id of a record, `None` if the field is absent.
///
/// Fails with [`JnbaseError::InvalidRecordId`] when the field exists but is not a string.
pub fn record_id<'a>(record: &'a Record, collection: &str) -> Result<Option<&'a str>> {
    match record.get(ID_FIELD) {
        None => Ok(None),
        Some(&Value::String(ref id)) => Ok(Some(id.as_str())),
        Some(other) => {
            Err(JnbaseError::InvalidRecordId {
                collection: collection.to_owned(),
                value:      other.clone(),
            })
        },
    }
}
