//! Lazily loaded in-memory copy of the backing file, persisted with write-temp-then-rename.

use std::{
    io::ErrorKind,
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        PoisonError,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize as _;
use serde_json::ser::{PrettyFormatter, Serializer};
use tokio::{
    fs as tokio_fs,
    io::AsyncWriteExt as _,
    sync::{OnceCell, RwLock},
};
use tracing::{debug, error, trace, warn};

use crate::{Document, ExclusiveLock, Result, StoreConfig};

/// Outcome of a mutation passed to [`PersistentCache::with_mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<T> {
    /// The document was modified and must be persisted.
    Applied(T),
    /// Nothing changed; persistence is skipped and the working copy discarded.
    Unchanged(T),
}

impl<T> Change<T> {
    /// Returns the carried result value.
    pub fn into_inner(self) -> T {
        match self {
            Self::Applied(value) | Self::Unchanged(value) => value,
        }
    }

    /// Returns `true` for [`Change::Applied`].
    pub const fn is_applied(&self) -> bool { matches!(*self, Self::Applied(_)) }
}

/// Bridge between the in-memory [`Document`] and its backing file.
///
/// # Loading
///
/// The file is read on first access only. A missing file yields an empty document that is
/// persisted immediately, establishing the file. Any other read failure, including corrupt JSON,
/// is returned to the caller and nothing is cached, so the next access retries. Once loaded, the
/// file is never re-read: edits made to it by another process are not observed.
///
/// # Persisting
///
/// The whole document is serialized, written to the temporary path (the real path plus the
/// configured suffix), optionally fsynced, then renamed over the real path. A crash before the
/// rename leaves the old file intact; a crash after it leaves the new one. A partially written
/// file is never observable at the real path.
///
/// # Mutating
///
/// [`PersistentCache::with_mutation`] is the unit of atomicity. It holds the
/// [`ExclusiveLock`] while it loads, transforms a working copy, persists it and finally swaps it
/// into the cache. Readers therefore only ever see persisted content, and a failed transformation
/// or a failed write leaves both cache and file exactly as they were.
#[derive(Debug)]
pub struct PersistentCache {
    /// File locations and serialization options.
    config:            StoreConfig,
    /// Serializes mutations and explicit persists.
    lock:              ExclusiveLock,
    /// The loaded document, initialized exactly once.
    state:             OnceCell<RwLock<Document>>,
    /// Number of successful atomic replaces.
    persist_count:     AtomicU64,
    /// Time of the last successful atomic replace.
    last_persisted_at: std::sync::RwLock<Option<DateTime<Utc>>>,
}

impl PersistentCache {
    /// Creates an unloaded cache for the configured file. No I/O happens until first access.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            lock: ExclusiveLock::new(),
            state: OnceCell::new(),
            persist_count: AtomicU64::new(0),
            last_persisted_at: std::sync::RwLock::new(None),
        }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &StoreConfig { &self.config }

    /// Returns the lock serializing mutations.
    pub const fn lock(&self) -> &ExclusiveLock { &self.lock }

    /// Returns `true` once the document has been loaded.
    pub fn is_loaded(&self) -> bool { self.state.initialized() }

    /// Returns the number of successful atomic replaces since creation.
    pub fn persist_count(&self) -> u64 { self.persist_count.load(Ordering::SeqCst) }

    /// Returns when the file was last replaced, if ever.
    pub fn last_persisted_at(&self) -> Option<DateTime<Utc>> {
        *self
            .last_persisted_at
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached document, loading it from disk on first call.
    ///
    /// Concurrent first calls are coalesced: exactly one of them reads (or creates) the file and
    /// the others wait for its result.
    pub async fn load(&self) -> Result<&RwLock<Document>> {
        self.state
            .get_or_try_init(|| self.read_or_create())
            .await
    }

    /// Runs `f` against the loaded document without taking the exclusive lock.
    pub async fn read<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Document) -> R,
    {
        let state = self.load().await?;
        let document = state.read().await;
        Ok(f(&document))
    }

    /// Applies `f` under the exclusive lock and persists the result unless it reports
    /// [`Change::Unchanged`].
    ///
    /// `f` receives a working copy of the document. The copy replaces the cached document only
    /// after it was durably written; if `f` fails or persisting fails, the copy is dropped.
    pub async fn with_mutation<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<Change<T>>,
    {
        let guard = self.lock.acquire().await;
        let state = self.load().await?;
        let mut working = state.read().await.clone();

        let value = match f(&mut working)? {
            Change::Unchanged(value) => {
                trace!("Mutation made no change, skipping persist");
                value
            },
            Change::Applied(value) => {
                self.write_atomically(&working).await?;
                *state.write().await = working;
                value
            },
        };

        guard.release();
        Ok(value)
    }

    /// Writes the current cached document to disk under the exclusive lock.
    ///
    /// Mutations persist on their own; this is an explicit durability point, and it recreates
    /// the file if it was removed behind the store's back.
    pub async fn persist(&self) -> Result<()> {
        let guard = self.lock.acquire().await;
        let state = self.load().await?;
        {
            let document = state.read().await;
            self.write_atomically(&document).await?;
        }
        guard.release();
        Ok(())
    }

    async fn read_or_create(&self) -> Result<RwLock<Document>> {
        let path = &self.config.path;
        trace!("Loading document from {:?}", path);
        self.config.validate().map_err(|e| {
            error!("Refusing to open {:?}: {}", path, e);
            e
        })?;
        self.discard_stale_temp().await?;

        match tokio_fs::read(path).await {
            Ok(bytes) => {
                let document: Document = serde_json::from_slice(&bytes).map_err(|e| {
                    error!("Failed to parse backing file {:?}: {}", path, e);
                    e
                })?;
                debug!(
                    "Loaded {} collection(s) from {:?}",
                    document.len(),
                    path
                );
                Ok(RwLock::new(document))
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Backing file {:?} not found, creating empty document", path);
                if let Some(parent) = path.parent() &&
                    !parent.as_os_str().is_empty()
                {
                    tokio_fs::create_dir_all(parent).await.map_err(|e| {
                        error!("Failed to create directory {:?}: {}", parent, e);
                        e
                    })?;
                }
                let document = Document::new();
                self.write_atomically(&document).await?;
                Ok(RwLock::new(document))
            },
            Err(e) => {
                error!("Failed to read backing file {:?}: {}", path, e);
                Err(e.into())
            },
        }
    }

    /// Removes a temporary file left behind by a crash between write and rename.
    async fn discard_stale_temp(&self) -> Result<()> {
        let temp_path = self.config.temp_path();
        match tokio_fs::symlink_metadata(&temp_path).await {
            Ok(meta) if meta.is_file() => {
                warn!(
                    "Removing stale temporary file {:?} left by an interrupted write",
                    temp_path
                );
                tokio_fs::remove_file(&temp_path).await?;
                Ok(())
            },
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn serialize(&self, document: &Document) -> Result<Vec<u8>> {
        let Some(width) = self.config.indent
        else {
            return Ok(serde_json::to_vec(document)?);
        };

        let indent = " ".repeat(width);
        let mut buffer = Vec::new();
        let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(indent.as_bytes()));
        document.serialize(&mut serializer)?;
        Ok(buffer)
    }

    /// Serializes `document` and atomically replaces the backing file with it.
    ///
    /// Any failure up to and including the rename leaves the real file untouched. Once the rename
    /// succeeded the write counts as done: a failed directory sync is logged, not returned, so the
    /// caller publishes what is now on disk.
    async fn write_atomically(&self, document: &Document) -> Result<()> {
        let path = &self.config.path;
        let temp_path = self.config.temp_path();
        let bytes = self.serialize(document)?;

        let mut file = tokio_fs::File::create(&temp_path).await.map_err(|e| {
            error!("Failed to create temporary file {:?}: {}", temp_path, e);
            e
        })?;
        file.write_all(&bytes).await.map_err(|e| {
            error!("Failed to write temporary file {:?}: {}", temp_path, e);
            e
        })?;
        file.flush().await?;
        if self.config.sync_on_persist {
            file.sync_all().await?;
        }
        drop(file);

        tokio_fs::rename(&temp_path, path).await.map_err(|e| {
            error!(
                "Failed to replace {:?} with {:?}: {}",
                path, temp_path, e
            );
            e
        })?;

        // The new content is in place from here on; the caller must publish it.
        if self.config.sync_on_persist &&
            let Err(e) = sync_parent_dir(path).await
        {
            warn!(
                "Replaced {:?} but could not sync its directory: {}",
                path, e
            );
        }

        self.persist_count.fetch_add(1, Ordering::SeqCst);
        *self
            .last_persisted_at
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        debug!("Persisted {} bytes to {:?}", bytes.len(), path);
        Ok(())
    }
}

/// Makes the rename itself durable by syncing the directory entry.
#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio_fs::File::open(parent).await?.sync_all().await?;
    }
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unused_async, reason = "mirrors the unix signature")]
async fn sync_parent_dir(_path: &Path) -> Result<()> { Ok(()) }

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::{document::into_record, JnbaseError};

    fn cache_at(dir: &tempfile::TempDir) -> PersistentCache {
        PersistentCache::new(StoreConfig::new(dir.path().join("db.json")))
    }

    async fn file_json(cache: &PersistentCache) -> serde_json::Value {
        let content = tokio_fs::read_to_string(&cache.config().path).await.unwrap();
        serde_json::from_str(&content).unwrap()
    }

    fn add_collection(key: &'static str) -> impl FnOnce(&mut Document) -> Result<Change<()>> {
        move |doc| {
            doc.insert_collection(key, Vec::new());
            Ok(Change::Applied(()))
        }
    }

    #[tokio::test]
    async fn test_load_creates_missing_file() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        assert!(!cache.is_loaded());
        assert!(!cache.config().path.exists());

        let state = cache.load().await.unwrap();
        assert!(state.read().await.is_empty());
        assert!(cache.is_loaded());
        assert_eq!(file_json(&cache).await, json!({}));
        assert_eq!(cache.persist_count(), 1);
        assert!(cache.last_persisted_at().is_some());
    }

    #[tokio::test]
    async fn test_load_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("db.json");
        let cache = PersistentCache::new(StoreConfig::new(&path));

        cache.load().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_load_reads_existing_file() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        tokio_fs::write(
            &cache.config().path,
            r#"{"users": [{"id": "1", "name": "Ann"}]}"#,
        )
        .await
        .unwrap();

        let state = cache.load().await.unwrap();
        let document = state.read().await;
        assert_eq!(document.collection("users").unwrap().len(), 1);
        assert_eq!(cache.persist_count(), 0);
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_io_failure() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        tokio_fs::write(&cache.config().path, "{ not json").await.unwrap();

        let err = cache.load().await.unwrap_err();
        assert!(err.is_io());
        assert!(matches!(err, JnbaseError::Json { .. }));
        assert!(!cache.is_loaded());
        // The corrupt file is left untouched for inspection.
        assert_eq!(
            tokio_fs::read_to_string(&cache.config().path).await.unwrap(),
            "{ not json"
        );
    }

    #[tokio::test]
    async fn test_load_empty_file_is_io_failure() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        tokio_fs::write(&cache.config().path, "").await.unwrap();

        assert!(cache.load().await.unwrap_err().is_io());
    }

    #[tokio::test]
    async fn test_load_wrong_shape_is_io_failure() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        tokio_fs::write(&cache.config().path, r#"{"users": 3}"#).await.unwrap();

        assert!(cache.load().await.unwrap_err().is_io());
    }

    #[tokio::test]
    async fn test_load_is_cached() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        cache.load().await.unwrap();

        tokio_fs::write(&cache.config().path, r#"{"external": []}"#).await.unwrap();
        let state = cache.load().await.unwrap();
        assert!(!state.read().await.contains("external"));
    }

    #[tokio::test]
    async fn test_concurrent_first_loads_initialize_once() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);

        let results = join_all((0 .. 16).map(|_| cache.load())).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(cache.persist_count(), 1);
    }

    #[tokio::test]
    async fn test_load_removes_stale_temp_file() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        tokio_fs::write(&cache.config().path, r#"{"a": []}"#).await.unwrap();
        tokio_fs::write(cache.config().temp_path(), r#"{"half"#).await.unwrap();

        let state = cache.load().await.unwrap();
        assert!(state.read().await.contains("a"));
        assert!(!cache.config().temp_path().exists());
    }

    #[tokio::test]
    async fn test_with_mutation_persists_applied_change() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);

        cache.with_mutation(add_collection("users")).await.unwrap();

        assert_eq!(file_json(&cache).await, json!({"users": []}));
        assert!(cache.read(|doc| doc.contains("users")).await.unwrap());
        assert_eq!(cache.persist_count(), 2);
        assert!(!cache.config().temp_path().exists());
    }

    #[tokio::test]
    async fn test_with_mutation_skips_persist_when_unchanged() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        cache.load().await.unwrap();
        let before = cache.persist_count();

        let value = cache
            .with_mutation(|doc| {
                doc.insert_collection("scratch", Vec::new());
                Ok(Change::Unchanged(7))
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(cache.persist_count(), before);
        assert!(!cache.read(|doc| doc.contains("scratch")).await.unwrap());
        assert!(!cache.lock().is_locked());
    }

    #[tokio::test]
    async fn test_with_mutation_error_discards_working_copy() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        cache.with_mutation(add_collection("users")).await.unwrap();

        let err = cache
            .with_mutation::<(), _>(|doc| {
                doc.remove_collection("users");
                Err(JnbaseError::CollectionNotFound {
                    name: "other".to_owned(),
                })
            })
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(cache.read(|doc| doc.contains("users")).await.unwrap());
        assert_eq!(file_json(&cache).await, json!({"users": []}));
        assert!(!cache.lock().is_locked());
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_file_and_cache_intact() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        cache.with_mutation(add_collection("users")).await.unwrap();

        // A directory squatting on the temporary path makes the write step fail.
        tokio_fs::create_dir(cache.config().temp_path()).await.unwrap();
        let err = cache.with_mutation(add_collection("orders")).await.unwrap_err();

        assert!(err.is_io());
        assert_eq!(file_json(&cache).await, json!({"users": []}));
        assert!(!cache.read(|doc| doc.contains("orders")).await.unwrap());
        assert!(!cache.lock().is_locked());

        tokio_fs::remove_dir(cache.config().temp_path()).await.unwrap();
        cache.with_mutation(add_collection("orders")).await.unwrap();
        assert_eq!(file_json(&cache).await, json!({"orders": [], "users": []}));
    }

    #[tokio::test]
    async fn test_load_rejects_temp_path_equal_to_real_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        let original = r#"{"users":[{"id":"u1","name":"Ann"}]}"#;
        tokio_fs::write(&path, original).await.unwrap();

        let cache = PersistentCache::new(StoreConfig::new(&path).with_temp_suffix(""));
        let err = cache.load().await.unwrap_err();

        assert!(matches!(err, JnbaseError::InvalidConfig { .. }));
        assert!(!cache.is_loaded());
        assert_eq!(tokio_fs::read_to_string(&path).await.unwrap(), original);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_sync_failure_still_publishes_replaced_file() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("data");
        let cache = PersistentCache::new(StoreConfig::new(data_dir.join("db.json")));
        cache.load().await.unwrap();
        let writes = cache.persist_count();

        // Write and search only: the temp file and the rename still work, opening the directory
        // for its sync does not (unless running with elevated privileges).
        tokio_fs::set_permissions(&data_dir, std::fs::Permissions::from_mode(0o300))
            .await
            .unwrap();
        let result = cache.with_mutation(add_collection("users")).await;
        tokio_fs::set_permissions(&data_dir, std::fs::Permissions::from_mode(0o700))
            .await
            .unwrap();

        result.unwrap();
        assert_eq!(cache.persist_count(), writes + 1);
        assert_eq!(file_json(&cache).await, json!({"users": []}));
        assert!(cache.read(|doc| doc.contains("users")).await.unwrap());
    }

    #[tokio::test]
    async fn test_persist_recreates_removed_file() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        cache.with_mutation(add_collection("users")).await.unwrap();

        tokio_fs::remove_file(&cache.config().path).await.unwrap();
        cache.persist().await.unwrap();
        assert_eq!(file_json(&cache).await, json!({"users": []}));
    }

    #[tokio::test]
    async fn test_pretty_output_uses_configured_indent() {
        let dir = tempdir().unwrap();
        let cache = cache_at(&dir);
        cache
            .with_mutation(|doc| {
                doc.insert_collection("users", vec![into_record(json!({"id": "1"})).unwrap()]);
                Ok(Change::Applied(()))
            })
            .await
            .unwrap();

        let content = tokio_fs::read_to_string(&cache.config().path).await.unwrap();
        assert_eq!(
            content,
            "{\n    \"users\": [\n        {\n            \"id\": \"1\"\n        }\n    ]\n}"
        );
    }

    #[tokio::test]
    async fn test_compact_output() {
        let dir = tempdir().unwrap();
        let cache = PersistentCache::new(
            StoreConfig::new(dir.path().join("db.json"))
                .with_indent(None)
                .with_sync_on_persist(false),
        );
        cache.with_mutation(add_collection("users")).await.unwrap();

        let content = tokio_fs::read_to_string(&cache.config().path).await.unwrap();
        assert_eq!(content, r#"{"users":[]}"#);
    }

    #[test]
    fn test_change_accessors() {
        assert!(Change::Applied(1).is_applied());
        assert!(!Change::Unchanged(1).is_applied());
        assert_eq!(Change::Unchanged("x").into_inner(), "x");
    }
}
