use tracing::{debug, trace};

use crate::{
    cache::Change,
    collection::{self, any_match, find_by_condition, find_by_id, resolve, resolve_mut},
    Condition,
    Patch,
    Record,
    Result,
};
use super::stor::Store;

#[allow(
    clippy::multiple_inherent_impl,
    reason = "multiple impl blocks for Store are intentional for organization"
)]
impl Store {
    /// Returns the first record in `key` whose `id` equals `id`.
    ///
    /// Fails with [`crate::JnbaseError::CollectionNotFound`] if the collection does not exist.
    pub async fn get_by_id(&self, key: &str, id: &str) -> Result<Option<Record>> {
        trace!("Getting record {} from collection {}", id, key);
        self.cache
            .read(|doc| resolve(doc, key).map(|records| find_by_id(records, id).cloned()))
            .await?
    }

    /// Returns every record in `key` matching all fields of `condition`, in collection order.
    ///
    /// An empty condition matches every record.
    pub async fn query(&self, key: &str, condition: &Condition) -> Result<Vec<Record>> {
        trace!("Querying collection {} on {} field(s)", key, condition.len());
        let found = self
            .cache
            .read(|doc| resolve(doc, key).map(|records| find_by_condition(records, condition)))
            .await??;
        debug!("Query on {} matched {} record(s)", key, found.len());
        Ok(found)
    }

    /// Returns `true` if `key` holds a record with the given id.
    pub async fn exists_by_id(&self, key: &str, id: &str) -> Result<bool> {
        self.cache
            .read(|doc| resolve(doc, key).map(|records| find_by_id(records, id).is_some()))
            .await?
    }

    /// Returns `true` if any record in `key` matches `condition`.
    pub async fn exists_by_condition(&self, key: &str, condition: &Condition) -> Result<bool> {
        self.cache
            .read(|doc| resolve(doc, key).map(|records| any_match(records, condition)))
            .await?
    }

    /// Appends a record to `key` and returns its id.
    ///
    /// A record without an `id` field gets a generated one. A supplied id that is already taken
    /// fails with [`crate::JnbaseError::RecordAlreadyExists`].
    pub async fn insert_one(&self, key: &str, record: Record) -> Result<String> {
        trace!("Inserting one record into collection {}", key);
        let ids = &*self.ids;
        self.cache
            .with_mutation(|doc| {
                let records = resolve_mut(doc, key)?;
                collection::insert_one(records, key, record, ids).map(Change::Applied)
            })
            .await
    }

    /// Appends a batch of records to `key` in input order and returns their ids.
    ///
    /// The batch is all or nothing: one conflicting id, against the collection or within the
    /// batch, rejects it entirely. An empty batch writes nothing.
    pub async fn insert_many(&self, key: &str, records: Vec<Record>) -> Result<Vec<String>> {
        trace!(
            "Inserting {} record(s) into collection {}",
            records.len(),
            key
        );
        let ids = &*self.ids;
        self.cache
            .with_mutation(|doc| {
                let target = resolve_mut(doc, key)?;
                if records.is_empty() {
                    return Ok(Change::Unchanged(Vec::new()));
                }
                collection::insert_many(target, key, records, ids).map(Change::Applied)
            })
            .await
    }

    /// Merges `patch` into the record with the given id. Returns `false`, without writing, if
    /// no record has that id.
    pub async fn update_by_id(&self, key: &str, id: &str, patch: &Patch) -> Result<bool> {
        trace!("Updating record {} in collection {}", id, key);
        self.cache
            .with_mutation(|doc| {
                let records = resolve_mut(doc, key)?;
                if collection::update_by_id(records, key, id, patch)? {
                    Ok(Change::Applied(true))
                }
                else {
                    debug!("No record {} in collection {} to update", id, key);
                    Ok(Change::Unchanged(false))
                }
            })
            .await
    }

    /// Merges `patch` into every record matching `condition` and returns how many were updated.
    pub async fn update_by_condition(&self, key: &str, condition: &Condition, patch: &Patch) -> Result<usize> {
        trace!("Updating records by condition in collection {}", key);
        let updated = self
            .cache
            .with_mutation(|doc| {
                let records = resolve_mut(doc, key)?;
                let updated = collection::update_by_condition(records, key, condition, patch)?;
                Ok(if updated > 0 {
                    Change::Applied(updated)
                }
                else {
                    Change::Unchanged(0)
                })
            })
            .await?;
        debug!("Updated {} record(s) in collection {}", updated, key);
        Ok(updated)
    }

    /// Removes every record with the given id. Returns whether anything was removed.
    pub async fn delete_by_id(&self, key: &str, id: &str) -> Result<bool> {
        trace!("Deleting record {} from collection {}", id, key);
        self.cache
            .with_mutation(|doc| {
                let records = resolve_mut(doc, key)?;
                Ok(if collection::delete_by_id(records, id) {
                    Change::Applied(true)
                }
                else {
                    Change::Unchanged(false)
                })
            })
            .await
    }

    /// Removes every record matching `condition`. Returns whether anything was removed.
    pub async fn delete_by_condition(&self, key: &str, condition: &Condition) -> Result<bool> {
        trace!("Deleting records by condition from collection {}", key);
        self.cache
            .with_mutation(|doc| {
                let records = resolve_mut(doc, key)?;
                Ok(if collection::delete_by_condition(records, condition) {
                    Change::Applied(true)
                }
                else {
                    Change::Unchanged(false)
                })
            })
            .await
    }
}
