//! An embedded document store persisted as a single JSON file.
//!
//! The file holds one object mapping collection names to arrays of records. A [`Store`] loads it
//! lazily, answers reads from memory, and serializes every mutation through one FIFO lock,
//! atomically replacing the file before the new state becomes visible.

pub mod cache;
pub mod collection;
pub mod config;
pub mod constants;
pub mod document;
pub mod error;
pub mod id;
pub mod lock;
pub mod matching;
pub mod stats;
pub mod store;

pub use cache::{Change, PersistentCache};
pub use config::StoreConfig;
pub use document::{Collection, Condition, Document, Patch, Record};
pub use error::{JnbaseError, Result};
pub use id::{IdGenerator, SequentialIdGenerator, UuidV4Generator};
pub use lock::{ExclusiveLock, LockGuard};
pub use stats::StoreStats;
pub use store::Store;
