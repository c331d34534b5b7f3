use thiserror::Error;

/// jnbase-wide error type for the document store.
///
/// Variants fall into three must-handle classes: a missing collection
/// ([`JnbaseError::is_not_found`]), an identifier collision ([`JnbaseError::is_conflict`]) and
/// failures of the backing file ([`JnbaseError::is_io`]). An update or delete that matches
/// nothing is not an error and never surfaces here.
#[derive(Error, Debug)]
pub enum JnbaseError {
    /// I/O operations on the backing file failed (read, write, fsync, rename)
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// The backing file is not valid JSON of the expected shape, or serialization failed
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Collection not found in the document
    #[error("Collection '{name}' not found")]
    CollectionNotFound {
        name: String,
    },

    /// A record with the same id already exists in the collection
    #[error("Record '{id}' already exists in collection '{collection}'")]
    RecordAlreadyExists {
        id:         String,
        collection: String,
    },

    /// The `id` field of a record or patch is not a string
    #[error("Invalid record id {value} in collection '{collection}'")]
    InvalidRecordId {
        collection: String,
        value:      serde_json::Value,
    },

    /// A JSON value offered as a record, condition or patch is not an object
    #[error("Invalid record: {reason}")]
    InvalidRecord {
        reason: String,
    },

    /// The store configuration cannot be used safely
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

impl JnbaseError {
    /// Returns `true` when the operation referenced a collection that does not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(
            *self,
            Self::CollectionNotFound {
                ..
            }
        )
    }

    /// Returns `true` when an insertion or patch would break id uniqueness.
    pub const fn is_conflict(&self) -> bool {
        matches!(
            *self,
            Self::RecordAlreadyExists {
                ..
            }
        )
    }

    /// Returns `true` for failures of the backing file, including corrupt content.
    pub const fn is_io(&self) -> bool {
        matches!(
            *self,
            Self::Io {
                ..
            } | Self::Json {
                ..
            }
        )
    }
}

/// Result type alias for jnbase operations.
pub type Result<T> = std::result::Result<T, JnbaseError>;
