use std::path::Path;

use tracing::{debug, trace};

use crate::{
    cache::PersistentCache,
    IdGenerator,
    Result,
    StoreConfig,
    StoreStats,
    UuidV4Generator,
};

/// An embedded document store backed by a single JSON file.
///
/// `Store` owns the cached document and the lock serializing its mutations, so every instance
/// is independent: tests can open isolated stores on distinct paths. Two instances, or two
/// processes, pointing at the same file are not coordinated and will overwrite each other.
///
/// # Architecture
///
/// - Read-only operations load the document on first use and read the cache directly.
/// - Mutating operations run a synchronous transformation inside
///   [`PersistentCache::with_mutation`]: lock, load, transform a working copy, persist with
///   write-temp-then-rename, publish, unlock.
///
/// # Examples
///
/// ```no_run
/// use jnbase::{document::into_record, Store};
/// use serde_json::json;
///
/// # async fn example() -> jnbase::Result<()> {
/// let store = Store::open("/var/lib/app/jnbase.json").await?;
/// store.create_collection("users").await?;
///
/// let id = store
///     .insert_one("users", into_record(json!({"name": "Ann"}))?)
///     .await?;
/// let ann = store.get_by_id("users", &id).await?;
/// assert_eq!(ann.unwrap()["name"], "Ann");
/// # Ok(())
/// # }
/// ```
///
/// # Thread Safety
///
/// `Store` is `Send + Sync`. Share it behind an `Arc` across tasks or threads; mutations are
/// granted the lock in arrival order.
#[allow(clippy::field_scoped_visibility_modifiers, reason = "fields are shared with the operation modules")]
#[derive(Debug)]
pub struct Store {
    /// The cached document and its backing file.
    pub(crate) cache: PersistentCache,
    /// Source of ids for records inserted without one.
    pub(crate) ids:   Box<dyn IdGenerator>,
}

impl Store {
    /// Creates a store for the configured file without touching the disk.
    ///
    /// The file is read, or created empty, on the first operation.
    pub fn new(config: StoreConfig) -> Self {
        trace!("Creating store for {:?}", config.path);
        Self {
            cache: PersistentCache::new(config),
            ids:   Box::new(UuidV4Generator),
        }
    }

    /// Opens the store at `path` with default settings and loads it eagerly.
    ///
    /// Creates the file (and missing parent directories) holding an empty document when it
    /// does not exist yet. Fails if the file cannot be read or is not a valid document.
    pub async fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        Self::open_with_config(StoreConfig::new(path)).await
    }

    /// Opens the store with a custom configuration and loads it eagerly.
    pub async fn open_with_config(config: StoreConfig) -> Result<Self> {
        let store = Self::new(config);
        store.cache.load().await?;
        debug!("Store opened at {:?}", store.path());
        Ok(store)
    }

    /// Replaces the identifier generator used for records inserted without an `id`.
    #[must_use]
    pub fn with_id_generator<G>(mut self, ids: G) -> Self
    where
        G: IdGenerator + 'static,
    {
        self.ids = Box::new(ids);
        self
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path { &self.cache.config().path }

    /// Returns the store configuration.
    pub const fn config(&self) -> &StoreConfig { self.cache.config() }

    /// Returns the underlying cache.
    pub const fn cache(&self) -> &PersistentCache { &self.cache }

    /// Writes the cached document to disk, waiting for in-flight mutations first.
    pub async fn flush(&self) -> Result<()> { self.cache.persist().await }

    /// Returns a snapshot of the store statistics.
    pub async fn stats(&self) -> Result<StoreStats> {
        let (collections, records) = self
            .cache
            .read(|doc| (doc.len(), doc.record_count()))
            .await?;
        Ok(StoreStats {
            collections,
            records,
            persist_count: self.cache.persist_count(),
            last_persisted_at: self.cache.last_persisted_at(),
        })
    }
}
