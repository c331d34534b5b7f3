//! Record-level transformations over a single collection.
//!
//! Everything here is synchronous and free of I/O. The [`crate::Store`] runs the mutating
//! functions inside [`crate::PersistentCache::with_mutation`] against a working copy of the
//! document, so an error returned half way through never reaches the cache or the file.

use std::collections::HashSet;

use serde_json::Value;
use tracing::trace;

use crate::{
    constants::ID_FIELD,
    document::record_id,
    matching::matches_condition,
    Collection,
    Condition,
    Document,
    IdGenerator,
    JnbaseError,
    Patch,
    Record,
    Result,
};

/// Returns the named collection or [`JnbaseError::CollectionNotFound`].
pub fn resolve<'a>(document: &'a Document, key: &str) -> Result<&'a Collection> {
    document.collection(key).ok_or_else(|| {
        JnbaseError::CollectionNotFound {
            name: key.to_owned(),
        }
    })
}

/// Mutable counterpart of [`resolve`].
pub fn resolve_mut<'a>(document: &'a mut Document, key: &str) -> Result<&'a mut Collection> {
    document.collection_mut(key).ok_or_else(|| {
        JnbaseError::CollectionNotFound {
            name: key.to_owned(),
        }
    })
}

fn has_id(record: &Record, id: &str) -> bool { record.get(ID_FIELD).and_then(Value::as_str) == Some(id) }

/// Returns the first record whose `id` equals the argument.
pub fn find_by_id<'a>(records: &'a [Record], id: &str) -> Option<&'a Record> {
    records.iter().find(|record| has_id(record, id))
}

/// Returns clones of all records matching the condition, in collection order.
pub fn find_by_condition(records: &[Record], condition: &Condition) -> Vec<Record> {
    records
        .iter()
        .filter(|record| matches_condition(record, condition))
        .cloned()
        .collect()
}

/// Returns `true` if any record matches the condition.
pub fn any_match(records: &[Record], condition: &Condition) -> bool {
    records
        .iter()
        .any(|record| matches_condition(record, condition))
}

/// Appends one record, assigning a generated id when it has none.
///
/// Fails with [`JnbaseError::RecordAlreadyExists`] when the supplied id is already taken.
pub fn insert_one(records: &mut Collection, key: &str, mut record: Record, ids: &dyn IdGenerator) -> Result<String> {
    let id = if let Some(id) = record_id(&record, key)? {
        if find_by_id(records, id).is_some() {
            return Err(JnbaseError::RecordAlreadyExists {
                id:         id.to_owned(),
                collection: key.to_owned(),
            });
        }
        id.to_owned()
    }
    else {
        let id = ids.generate();
        trace!("Assigned generated id {} in collection {}", id, key);
        record.insert(ID_FIELD.to_owned(), Value::String(id.clone()));
        id
    };

    records.push(record);
    Ok(id)
}

/// Appends a batch of records in input order, all or nothing.
///
/// Supplied ids are checked against the collection and against each other before anything is
/// appended, so a conflict anywhere in the batch leaves `records` untouched.
pub fn insert_many(records: &mut Collection, key: &str, batch: Vec<Record>, ids: &dyn IdGenerator) -> Result<Vec<String>> {
    let mut taken: HashSet<String> = records
        .iter()
        .filter_map(|record| record.get(ID_FIELD).and_then(Value::as_str))
        .map(str::to_owned)
        .collect();

    for record in &batch {
        if let Some(id) = record_id(record, key)? &&
            !taken.insert(id.to_owned())
        {
            return Err(JnbaseError::RecordAlreadyExists {
                id:         id.to_owned(),
                collection: key.to_owned(),
            });
        }
    }

    let mut prepared = Vec::with_capacity(batch.len());
    let mut assigned = Vec::with_capacity(batch.len());
    for mut record in batch {
        let id = if let Some(id) = record.get(ID_FIELD).and_then(Value::as_str) {
            id.to_owned()
        }
        else {
            let id = ids.generate();
            if !taken.insert(id.clone()) {
                return Err(JnbaseError::RecordAlreadyExists {
                    id,
                    collection: key.to_owned(),
                });
            }
            record.insert(ID_FIELD.to_owned(), Value::String(id.clone()));
            id
        };
        assigned.push(id);
        prepared.push(record);
    }

    records.append(&mut prepared);
    Ok(assigned)
}

/// Builds fresh collection content from `batch`, applying the same id rules as [`insert_many`].
///
/// Returns the records together with their ids in input order.
pub fn build_collection(key: &str, batch: Vec<Record>, ids: &dyn IdGenerator) -> Result<(Collection, Vec<String>)> {
    let mut records = Collection::with_capacity(batch.len());
    let assigned = insert_many(&mut records, key, batch, ids)?;
    Ok((records, assigned))
}

fn merge(target: &mut Record, patch: &Patch) {
    for (field, value) in patch {
        target.insert(field.clone(), value.clone());
    }
}

/// Checks that `id`, just written by a patch, is carried by at most one record.
///
/// Only the patched id is checked; duplicates elsewhere in the collection are not this patch's
/// doing and do not block it.
fn ensure_id_unique(records: &[Record], key: &str, id: &str) -> Result<()> {
    if records.iter().filter(|record| has_id(record, id)).nth(1).is_some() {
        return Err(JnbaseError::RecordAlreadyExists {
            id:         id.to_owned(),
            collection: key.to_owned(),
        });
    }
    Ok(())
}

/// Merges `patch` into the record with the given id, in place.
///
/// Returns `false` when no record has that id. A patch that rewrites `id` must keep ids unique.
pub fn update_by_id(records: &mut Collection, key: &str, id: &str, patch: &Patch) -> Result<bool> {
    let new_id = record_id(patch, key)?;
    let Some(target) = records.iter_mut().find(|record| has_id(record, id))
    else {
        return Ok(false);
    };

    merge(target, patch);
    if let Some(new_id) = new_id {
        ensure_id_unique(records, key, new_id)?;
    }
    Ok(true)
}

/// Merges `patch` into every record matching the condition, preserving order and position.
///
/// Returns the number of records updated.
pub fn update_by_condition(records: &mut Collection, key: &str, condition: &Condition, patch: &Patch) -> Result<usize> {
    let new_id = record_id(patch, key)?;
    let mut updated: usize = 0;
    for record in records
        .iter_mut()
        .filter(|record| matches_condition(record, condition))
    {
        merge(record, patch);
        updated = updated.saturating_add(1);
    }

    if let Some(new_id) = new_id &&
        updated > 0
    {
        ensure_id_unique(records, key, new_id)?;
    }
    Ok(updated)
}

/// Removes every record with the given id. Returns whether anything was removed.
pub fn delete_by_id(records: &mut Collection, id: &str) -> bool {
    let before = records.len();
    records.retain(|record| !has_id(record, id));
    records.len() != before
}

/// Removes every record matching the condition, keeping survivors in order.
///
/// Returns whether anything was removed.
pub fn delete_by_condition(records: &mut Collection, condition: &Condition) -> bool {
    let before = records.len();
    records.retain(|record| !matches_condition(record, condition));
    records.len() != before
}
