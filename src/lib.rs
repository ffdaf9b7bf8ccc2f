//! pagedb - a single-user paged relational storage engine
//!
//! Tables are stored as chains of fixed-size pages in per-table files,
//! cached in a bounded buffer pool, and optionally indexed by an in-memory
//! B+ tree on their primary key.
//!
//! # Architecture
//!
//! - **Tuples** (`tuple`): attribute types, values, schemas and records
//! - **Storage Layer** (`storage`): disk I/O and page organization
//!   - `DiskManager`: reads and writes page slots of `<table>.bin` files
//!   - `codec`: converts pages to and from fixed-size blocks
//!   - `StorageManager`: table lifecycle, ordered insertion, page splits
//! - **Buffer Pool** (`buffer`): LRU cache of pages with write-back
//! - **Catalog** (`catalog`): the persistent registry of table schemas
//! - **Index** (`index`): B+ tree mapping keys to record locations
//!
//! # Example
//!
//! ```rust,no_run
//! use pagedb::tuple::{Attribute, DataType, Value};
//! use pagedb::{record, StorageConfig, StorageManager};
//!
//! let mut storage = StorageManager::open(StorageConfig::new("./db")).unwrap();
//! storage
//!     .create_table(
//!         "users",
//!         vec![
//!             Attribute::new("id", DataType::Integer).primary_key(),
//!             Attribute::new("name", DataType::VarChar(32)),
//!         ],
//!     )
//!     .unwrap();
//!
//! storage.insert("users", record![2, "bob"]).unwrap();
//! storage.insert("users", record![1, "ann"]).unwrap();
//!
//! let ann = storage.find_record("users", &Value::Integer(1)).unwrap();
//! assert_eq!(ann, Some(record![1, "ann"]));
//! storage.close().unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod index;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{PageIndex, PageNumber, RecordId, Result, StorageConfig, StorageError};
pub use storage::StorageManager;
