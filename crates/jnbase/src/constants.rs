//! Constants for file names and reserved record fields used throughout jnbase.
//!
//! This module centralizes special names to prevent typos and ensure consistency.

/// Default file name of the backing JSON document.
pub const DEFAULT_FILE_NAME: &str = "jnbase.json";

/// Suffix appended to the real path to build the temporary write path.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Reserved record field holding the record identifier.
pub const ID_FIELD: &str = "id";

/// Default indentation width (in spaces) of the persisted JSON.
pub const DEFAULT_INDENT: usize = 4;
