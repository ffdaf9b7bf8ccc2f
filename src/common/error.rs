use thiserror::Error;

use super::types::{PageIndex, PageNumber};

/// Storage engine error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table '{table}' declares attribute '{attribute}' more than once")]
    DuplicateAttribute { table: String, attribute: String },

    #[error("Table '{0}' has no primary key")]
    MissingPrimaryKey(String),

    #[error("Table '{table}' has {count} primary keys, expected exactly one")]
    MultiplePrimaryKeys { table: String, count: usize },

    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Duplicate value {value} for attribute '{attribute}' in table '{table}'")]
    DuplicateKey {
        table: String,
        attribute: String,
        value: String,
    },

    #[error("Record has {actual} values, table '{table}' expects {expected}")]
    ArityMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("Attribute '{attribute}' expects {expected}, got {actual}")]
    TypeMismatch {
        attribute: String,
        expected: String,
        actual: String,
    },

    #[error("Attribute '{0}' does not allow NULL")]
    NullViolation(String),

    #[error("Value for attribute '{attribute}' exceeds length {max}")]
    ValueTooLong { attribute: String, max: u32 },

    #[error("Attribute index {index} out of range for table '{table}'")]
    AttributeOutOfRange { table: String, index: usize },

    #[error("Encoded page is {size} bytes, page size is {page_size}")]
    PageOverflow { size: usize, page_size: usize },

    #[error("Record of {size} bytes cannot fit a page with {capacity} bytes of payload")]
    RecordTooLarge { size: usize, capacity: usize },

    #[error("Corrupted page {page_index} of table '{table}': {reason}")]
    CorruptPage {
        table: String,
        page_index: PageIndex,
        reason: String,
    },

    #[error("Unknown type tag {0}")]
    UnknownTypeTag(u8),

    #[error("Corrupted catalog: {0}")]
    CorruptCatalog(String),

    #[error("Page index {0} out of range")]
    IndexOutOfRange(i64),

    #[error("Page {page_number} of table '{table}' not found")]
    PageNotFound {
        table: String,
        page_number: PageNumber,
    },

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),
}

pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Returns true for the conflict kind: the operation was rejected and
    /// nothing was mutated.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StorageError::TableAlreadyExists(_) | StorageError::DuplicateKey { .. }
        )
    }

    /// Returns true when a page or catalog failed to decode.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::CorruptPage { .. }
                | StorageError::UnknownTypeTag(_)
                | StorageError::CorruptCatalog(_)
        )
    }
}
