//! Record identifier generation.

use std::{
    fmt::Debug,
    sync::atomic::{AtomicU64, Ordering},
};

use uuid::Uuid;

/// Source of record identifiers assigned to records inserted without an `id`.
///
/// Implementations must return identifiers that are unique, with overwhelming probability,
/// across all calls for the lifetime of a store.
pub trait IdGenerator: Send + Sync + Debug {
    /// Produces a fresh identifier.
    fn generate(&self) -> String;
}

/// Generates random version 4 UUIDs in canonical lowercase hyphenated form
/// (`xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn generate(&self) -> String { Uuid::new_v4().to_string() }
}

/// Generates predictable identifiers `{prefix}{n}` with `n` counting up from 1.
///
/// Meant for tests and fixtures where assigned ids must be known in advance; uniqueness only
/// holds within one generator instance.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next:   AtomicU64,
}

impl SequentialIdGenerator {
    /// Creates a generator producing `{prefix}1`, `{prefix}2`, ...
    pub fn new<S>(prefix: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            next:   AtomicU64::new(1),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self { Self::new("id-") }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.prefix, n)
    }
}
