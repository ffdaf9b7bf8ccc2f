use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{
    PageIndex, Result, StorageError, CATALOG_FILE_NAME, TABLE_FILE_EXTENSION,
    TABLE_FILE_HEADER_SIZE,
};

/// An open table data file and its allocated slot count.
struct TableFile {
    file: File,
    slot_count: u32,
}

/// DiskManager is responsible for reading and writing pages of table files.
///
/// Every table lives in `<db_dir>/<table>.bin`: a 4-byte big-endian count of
/// allocated page slots followed by `page_size` byte slots. Files are opened
/// on first use and kept open until the table is dropped or renamed.
pub struct DiskManager {
    /// Database directory
    db_dir: PathBuf,
    /// Size of a page slot in bytes
    page_size: usize,
    /// Open table files
    files: Mutex<HashMap<String, TableFile>>,
    /// Upper bound on slots per table file, None for unbounded
    slot_limit: Mutex<Option<u32>>,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Creates a DiskManager over `db_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(db_dir: P, page_size: usize) -> Result<Self> {
        let db_dir = db_dir.as_ref().to_path_buf();
        fs::create_dir_all(&db_dir)?;

        Ok(Self {
            db_dir,
            page_size,
            files: Mutex::new(HashMap::new()),
            slot_limit: Mutex::new(None),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Path of a table's data file.
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.db_dir
            .join(format!("{}.{}", table, TABLE_FILE_EXTENSION))
    }

    /// Returns true if the table has a data file on disk.
    pub fn table_exists(&self, table: &str) -> bool {
        self.files.lock().contains_key(table) || self.table_path(table).exists()
    }

    /// Caps the number of slots a table file may grow to. Allocation past
    /// the cap fails as an I/O error.
    pub fn set_slot_limit(&self, limit: Option<u32>) {
        *self.slot_limit.lock() = limit;
    }

    /// Runs `f` against the open file of `table`, opening (and if needed
    /// creating) it first.
    fn with_file<T>(&self, table: &str, f: impl FnOnce(&mut TableFile) -> Result<T>) -> Result<T> {
        let mut files = self.files.lock();
        if !files.contains_key(table) {
            let handle = self.open_table_file(table)?;
            files.insert(table.to_string(), handle);
        }
        match files.get_mut(table) {
            Some(handle) => f(handle),
            None => Err(StorageError::TableNotFound(table.to_string())),
        }
    }

    fn open_table_file(&self, table: &str) -> Result<TableFile> {
        let path = self.table_path(table);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        let slot_count = if len < TABLE_FILE_HEADER_SIZE as u64 {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&0i32.to_be_bytes())?;
            file.flush()?;
            0
        } else {
            let mut header = [0u8; TABLE_FILE_HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            let declared = i32::from_be_bytes(header).max(0) as u32;
            // Never trust a header claiming more slots than the file holds
            let present = (len - TABLE_FILE_HEADER_SIZE as u64) / self.page_size as u64;
            declared.min(present as u32)
        };

        debug!(table, slot_count, "opened table file");
        Ok(TableFile { file, slot_count })
    }

    fn slot_offset(&self, index: PageIndex) -> u64 {
        TABLE_FILE_HEADER_SIZE as u64 + index.as_u64() * self.page_size as u64
    }

    /// Number of page slots allocated in the table file.
    pub fn slot_count(&self, table: &str) -> Result<u32> {
        self.with_file(table, |handle| Ok(handle.slot_count))
    }

    /// Reads the block in slot `index`. Returns None if the slot lies beyond
    /// the file's extent.
    pub fn read_page(&self, table: &str, index: PageIndex) -> Result<Option<Vec<u8>>> {
        let offset = self.slot_offset(index);
        let page_size = self.page_size;

        let data = self.with_file(table, |handle| {
            if index.as_u32() >= handle.slot_count {
                return Ok(None);
            }
            let mut data = vec![0u8; page_size];
            handle.file.seek(SeekFrom::Start(offset))?;
            handle.file.read_exact(&mut data)?;
            Ok(Some(data))
        })?;

        if data.is_some() {
            self.num_reads.fetch_add(1, Ordering::Relaxed);
        }
        Ok(data)
    }

    /// Writes a block into slot `index`. The block must be exactly
    /// `page_size` bytes and the slot must already be allocated.
    pub fn write_page(&self, table: &str, index: PageIndex, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(StorageError::InvalidPageSize(data.len()));
        }
        let offset = self.slot_offset(index);

        self.with_file(table, |handle| {
            if index.as_u32() >= handle.slot_count {
                return Err(StorageError::IndexOutOfRange(index.as_u32() as i64));
            }
            handle.file.seek(SeekFrom::Start(offset))?;
            handle.file.write_all(data)?;
            handle.file.flush()?;
            Ok(())
        })?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Grows the table file by `count` zeroed slots and returns the index
    /// of the first new slot. On failure the file keeps its old extent.
    pub fn allocate_pages(&self, table: &str, count: u32) -> Result<PageIndex> {
        let limit = *self.slot_limit.lock();
        let page_size = self.page_size as u64;

        self.with_file(table, |handle| {
            let first = handle.slot_count;
            let new_count = first + count;
            if let Some(limit) = limit {
                if new_count > limit {
                    return Err(io::Error::new(
                        io::ErrorKind::Other,
                        format!("table '{}' cannot grow past {} pages", table, limit),
                    )
                    .into());
                }
            }

            let new_len = TABLE_FILE_HEADER_SIZE as u64 + new_count as u64 * page_size;
            handle.file.set_len(new_len)?;
            handle.file.seek(SeekFrom::Start(0))?;
            if let Err(e) = handle.file.write_all(&(new_count as i32).to_be_bytes()) {
                let old_len = TABLE_FILE_HEADER_SIZE as u64 + first as u64 * page_size;
                let _ = handle.file.set_len(old_len);
                return Err(e.into());
            }
            handle.file.flush()?;
            handle.slot_count = new_count;

            debug!(table, first, count, "allocated page slots");
            Ok(PageIndex::new(first))
        })
    }

    /// Closes the table's file handle if it is open.
    pub fn close_table(&self, table: &str) {
        if let Some(handle) = self.files.lock().remove(table) {
            let _ = handle.file.sync_all();
        }
    }

    /// Deletes the table's data file. Missing files are not an error.
    pub fn delete_table(&self, table: &str) -> Result<()> {
        self.files.lock().remove(table);
        match fs::remove_file(self.table_path(table)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Renames a table's data file, replacing any file of the target name.
    pub fn rename_table(&self, from: &str, to: &str) -> Result<()> {
        self.close_table(from);
        self.close_table(to);
        fs::rename(self.table_path(from), self.table_path(to))?;
        Ok(())
    }

    /// Names of all tables that have a data file in the directory.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut tables = Vec::new();
        for entry in fs::read_dir(&self.db_dir)? {
            let path = entry?.path();
            if !path.is_file() || path.file_name().and_then(|n| n.to_str()) == Some(CATALOG_FILE_NAME) {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(TABLE_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tables.push(stem.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }

    /// Closes every handle and deletes every file in the database directory.
    pub fn remove_all_files(&self) -> Result<()> {
        self.files.lock().clear();
        for entry in fs::read_dir(&self.db_dir)? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Returns the number of page reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Flushes every open table file to disk.
    pub fn sync(&self) -> Result<()> {
        for handle in self.files.lock().values() {
            handle.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        for handle in self.files.get_mut().values() {
            let _ = handle.file.sync_all();
        }
    }
}
