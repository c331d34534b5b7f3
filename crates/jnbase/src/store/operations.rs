use tracing::{debug, trace, warn};

use crate::{
    cache::Change,
    collection::{build_collection, resolve_mut},
    Collection,
    Document,
    JnbaseError,
    Record,
    Result,
};
use super::stor::Store;

#[allow(
    clippy::multiple_inherent_impl,
    reason = "multiple impl blocks for Store are intentional for organization"
)]
impl Store {
    /// Returns a copy of the whole document.
    pub async fn get_document(&self) -> Result<Document> {
        trace!("Reading whole document");
        self.cache.read(Document::clone).await
    }

    /// Atomically replaces the entire document.
    ///
    /// Record ids in `document` are taken as they are; no uniqueness check is performed.
    pub async fn replace_document(&self, document: Document) -> Result<()> {
        trace!(
            "Replacing whole document with {} collection(s)",
            document.len()
        );
        self.cache
            .with_mutation(move |doc| {
                *doc = document;
                Ok(Change::Applied(()))
            })
            .await
    }

    /// Returns a copy of the named collection, or `None` if it does not exist.
    pub async fn get_collection_raw(&self, key: &str) -> Result<Option<Collection>> {
        self.cache
            .read(|doc| doc.collection(key).cloned())
            .await
    }

    /// Returns `true` if the named collection exists.
    pub async fn collection_exists(&self, key: &str) -> Result<bool> { self.cache.read(|doc| doc.contains(key)).await }

    /// Returns the names of all collections in order.
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        self.cache
            .read(|doc| doc.names().map(str::to_owned).collect())
            .await
    }

    /// Creates an empty collection. Does nothing, and writes nothing, if it already exists.
    pub async fn create_collection(&self, key: &str) -> Result<()> {
        trace!("Creating collection {}", key);
        self.cache
            .with_mutation(|doc| {
                if doc.contains(key) {
                    debug!("Collection {} already exists", key);
                    return Ok(Change::Unchanged(()));
                }
                doc.insert_collection(key, Collection::new());
                Ok(Change::Applied(()))
            })
            .await
    }

    /// Moves the records of `key` to `new_key` and removes `key`.
    ///
    /// Fails with [`JnbaseError::CollectionNotFound`] if `key` does not exist. An existing
    /// `new_key` collection is overwritten. Renaming a collection to its own name is a no-op.
    pub async fn rename_collection(&self, key: &str, new_key: &str) -> Result<()> {
        trace!("Renaming collection {} to {}", key, new_key);
        self.cache
            .with_mutation(|doc| {
                let Some(records) = doc.remove_collection(key)
                else {
                    return Err(JnbaseError::CollectionNotFound {
                        name: key.to_owned(),
                    });
                };
                if key == new_key {
                    return Ok(Change::Unchanged(()));
                }
                if doc.insert_collection(new_key, records).is_some() {
                    warn!(
                        "Renaming {} overwrote existing collection {}",
                        key, new_key
                    );
                }
                Ok(Change::Applied(()))
            })
            .await
    }

    /// Removes the named collection and all its records.
    ///
    /// Fails with [`JnbaseError::CollectionNotFound`] if it does not exist.
    pub async fn delete_collection(&self, key: &str) -> Result<()> {
        trace!("Deleting collection {}", key);
        self.cache
            .with_mutation(|doc| {
                doc.remove_collection(key).ok_or_else(|| {
                    JnbaseError::CollectionNotFound {
                        name: key.to_owned(),
                    }
                })?;
                Ok(Change::Applied(()))
            })
            .await
    }

    /// Removes every record of the named collection, keeping the collection itself.
    ///
    /// Fails with [`JnbaseError::CollectionNotFound`] if it does not exist.
    pub async fn clear_collection(&self, key: &str) -> Result<()> {
        trace!("Clearing collection {}", key);
        self.cache
            .with_mutation(|doc| {
                let records = resolve_mut(doc, key)?;
                if records.is_empty() {
                    return Ok(Change::Unchanged(()));
                }
                records.clear();
                Ok(Change::Applied(()))
            })
            .await
    }

    /// Replaces the records of an existing collection wholesale.
    ///
    /// Records without an `id` get a generated one; duplicate ids within `records` fail with
    /// [`JnbaseError::RecordAlreadyExists`]. Returns the ids in input order.
    pub async fn set_collection(&self, key: &str, records: Vec<Record>) -> Result<Vec<String>> {
        trace!(
            "Replacing collection {} with {} record(s)",
            key,
            records.len()
        );
        let ids = &*self.ids;
        self.cache
            .with_mutation(|doc| {
                let target = resolve_mut(doc, key)?;
                let (fresh, assigned) = build_collection(key, records, ids)?;
                *target = fresh;
                Ok(Change::Applied(assigned))
            })
            .await
    }
}
