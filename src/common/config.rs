use std::path::PathBuf;

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size a catalog may declare. A page must at least hold its
/// header, its link trailer and a small record.
pub const MIN_PAGE_SIZE: usize = 32;

/// Default buffer pool size (number of cached pages)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Default B+ tree order (max entries per node)
pub const DEFAULT_BTREE_ORDER: usize = 64;

/// Name of the catalog file inside the database directory
pub const CATALOG_FILE_NAME: &str = "catalog.bin";

/// Extension of table data files
pub const TABLE_FILE_EXTENSION: &str = "bin";

/// Leading bytes of a table file holding the allocated slot count
pub const TABLE_FILE_HEADER_SIZE: usize = 4;

/// Page number (4 bytes) + record count (4 bytes)
pub const PAGE_HEADER_SIZE: usize = 8;

/// Previous page index (4 bytes) + next page index (4 bytes), stored in the
/// last bytes of every page block
pub const PAGE_TRAILER_SIZE: usize = 8;

/// On-disk link value meaning "no page"
pub const NO_PAGE_LINK: i32 = -1;

/// Page number written into a slot released by a dropped page
pub const FREE_SLOT_MARKER: i32 = -1;

/// Session configuration for a [`StorageManager`](crate::storage::StorageManager).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the catalog and table files.
    pub db_dir: PathBuf,
    /// Page size used when a new catalog is created. An existing catalog
    /// keeps its own.
    pub page_size: usize,
    /// Buffer pool capacity in pages.
    pub buffer_size: usize,
    /// Maintain a primary-key index for every table.
    pub index_enabled: bool,
    /// Fan-out of index nodes.
    pub btree_order: usize,
    /// Delete every file in `db_dir` on close instead of saving.
    pub nuke_on_close: bool,
}

impl StorageConfig {
    pub fn new(db_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_dir: db_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_index(mut self, enabled: bool) -> Self {
        self.index_enabled = enabled;
        self
    }

    pub fn with_btree_order(mut self, order: usize) -> Self {
        self.btree_order = order;
        self
    }

    pub fn with_nuke_on_close(mut self, nuke: bool) -> Self {
        self.nuke_on_close = nuke;
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from("./db"),
            page_size: DEFAULT_PAGE_SIZE,
            buffer_size: DEFAULT_BUFFER_POOL_SIZE,
            index_enabled: false,
            btree_order: DEFAULT_BTREE_ORDER,
            nuke_on_close: false,
        }
    }
}
