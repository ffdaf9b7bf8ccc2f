use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, info};

use crate::common::{Result, StorageError, CATALOG_FILE_NAME, MIN_PAGE_SIZE};
use crate::tuple::{get_i32, get_string, put_string, Attribute, TableSchema};

/// Owns `catalog.bin` and the in-memory map of table schemas.
///
/// ## File Format
///
/// ```text
/// page_size: i32
/// repeated until EOF:
///     table_name: u16 length + UTF-8
///     attribute_count: i32
///     attribute_count x Attribute (see Attribute::write_to)
/// ```
///
/// Mutations stay in memory until [`CatalogStore::save`] rewrites the file.
pub struct CatalogStore {
    path: PathBuf,
    page_size: usize,
    tables: BTreeMap<String, TableSchema>,
}

impl CatalogStore {
    /// Opens the catalog in `db_dir`. If no catalog exists one is created
    /// holding only `page_size`; otherwise the stored page size wins.
    pub fn open<P: AsRef<Path>>(db_dir: P, page_size: usize) -> Result<Self> {
        fs::create_dir_all(db_dir.as_ref())?;
        let path = db_dir.as_ref().join(CATALOG_FILE_NAME);

        if !path.exists() {
            if page_size < MIN_PAGE_SIZE || page_size > i32::MAX as usize {
                return Err(StorageError::InvalidPageSize(page_size));
            }
            let store = Self {
                path,
                page_size,
                tables: BTreeMap::new(),
            };
            store.save()?;
            info!(path = %store.path.display(), page_size, "created catalog");
            return Ok(store);
        }

        let bytes = fs::read(&path)?;
        let (page_size, tables) = Self::decode(&bytes)?;
        debug!(path = %path.display(), page_size, tables = tables.len(), "loaded catalog");
        Ok(Self {
            path,
            page_size,
            tables,
        })
    }

    fn decode(bytes: &[u8]) -> Result<(usize, BTreeMap<String, TableSchema>)> {
        let mut buf = bytes;
        let raw_page_size = get_i32(&mut buf)?;
        if raw_page_size < MIN_PAGE_SIZE as i32 {
            return Err(StorageError::InvalidPageSize(raw_page_size.max(0) as usize));
        }

        let mut tables = BTreeMap::new();
        while buf.has_remaining() {
            let name = get_string(&mut buf)?;
            let count = get_i32(&mut buf)?;
            if count < 0 {
                return Err(StorageError::CorruptCatalog(format!(
                    "table '{}' has negative attribute count {}",
                    name, count
                )));
            }
            let mut attributes = Vec::with_capacity(count as usize);
            for _ in 0..count {
                attributes.push(Attribute::read_from(&mut buf)?);
            }
            let schema = TableSchema::new(name.clone(), attributes)?;
            if tables.insert(name.clone(), schema).is_some() {
                return Err(StorageError::CorruptCatalog(format!(
                    "table '{}' listed twice",
                    name
                )));
            }
        }
        Ok((raw_page_size as usize, tables))
    }

    fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_i32(self.page_size as i32);
        for schema in self.tables.values() {
            put_string(&mut buf, schema.name());
            buf.put_i32(schema.attribute_count() as i32);
            for attribute in schema.attributes() {
                attribute.write_to(&mut buf);
            }
        }
        buf
    }

    /// Rewrites the catalog file from scratch.
    pub fn save(&self) -> Result<()> {
        let mut file = File::create(&self.path)?;
        file.write_all(&self.encode())?;
        file.sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Database-wide page size.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Registers a schema. Fails if a table of the same name exists.
    pub fn add_table_schema(&mut self, schema: TableSchema) -> Result<()> {
        if self.tables.contains_key(schema.name()) {
            return Err(StorageError::TableAlreadyExists(schema.name().to_string()));
        }
        self.tables.insert(schema.name().to_string(), schema);
        Ok(())
    }

    /// Removes a schema, returning it if it was registered.
    pub fn remove_table_schema(&mut self, name: &str) -> Option<TableSchema> {
        self.tables.remove(name)
    }

    /// Inserts or replaces the schema registered under its name.
    pub fn set_table_schema(&mut self, schema: TableSchema) {
        self.tables.insert(schema.name().to_string(), schema);
    }

    /// Moves the schema of `from` to the name `to`, replacing any schema
    /// already bound to `to`.
    pub fn rename_table_schema(&mut self, from: &str, to: &str) -> Result<()> {
        let mut schema = self
            .tables
            .remove(from)
            .ok_or_else(|| StorageError::TableNotFound(from.to_string()))?;
        schema.rename(to);
        self.tables.insert(to.to_string(), schema);
        Ok(())
    }

    pub fn get_table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn get_table_schema_mut(&mut self, name: &str) -> Option<&mut TableSchema> {
        self.tables.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn schemas(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::DataType;
    use tempfile::TempDir;

    fn users() -> TableSchema {
        TableSchema::builder("users")
            .primary_key("id", DataType::Integer)
            .column("name", DataType::VarChar(32))
            .build()
            .unwrap()
    }

    #[test]
    fn test_new_catalog_holds_page_size_only() {
        let dir = TempDir::new().unwrap();
        let store = CatalogStore::open(dir.path(), 128).unwrap();

        assert_eq!(store.page_size(), 128);
        assert!(store.is_empty());
        assert_eq!(fs::read(store.path()).unwrap(), 128i32.to_be_bytes().to_vec());
    }

    #[test]
    fn test_existing_page_size_wins() {
        let dir = TempDir::new().unwrap();
        CatalogStore::open(dir.path(), 256).unwrap();

        let store = CatalogStore::open(dir.path(), 4096).unwrap();
        assert_eq!(store.page_size(), 256);
    }

    #[test]
    fn test_rejects_tiny_page_size() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            CatalogStore::open(dir.path(), 8),
            Err(StorageError::InvalidPageSize(8))
        ));
    }

    #[test]
    fn test_add_duplicate_table() {
        let dir = TempDir::new().unwrap();
        let mut store = CatalogStore::open(dir.path(), 128).unwrap();

        store.add_table_schema(users()).unwrap();
        let err = store.add_table_schema(users()).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mutations_need_save() {
        let dir = TempDir::new().unwrap();
        let mut store = CatalogStore::open(dir.path(), 128).unwrap();
        store.add_table_schema(users()).unwrap();

        let reopened = CatalogStore::open(dir.path(), 128).unwrap();
        assert!(reopened.is_empty());

        store.save().unwrap();
        let reopened = CatalogStore::open(dir.path(), 128).unwrap();
        assert_eq!(reopened.get_table_schema("users"), Some(&users()));
    }

    #[test]
    fn test_rename_table_schema() {
        let dir = TempDir::new().unwrap();
        let mut store = CatalogStore::open(dir.path(), 128).unwrap();
        store.add_table_schema(users()).unwrap();

        store.rename_table_schema("users", "people").unwrap();
        assert!(!store.contains("users"));
        assert_eq!(store.get_table_schema("people").unwrap().name(), "people");
        assert!(matches!(
            store.rename_table_schema("ghost", "x"),
            Err(StorageError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_truncated_catalog_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let mut store = CatalogStore::open(dir.path(), 128).unwrap();
        store.add_table_schema(users()).unwrap();
        store.save().unwrap();

        let bytes = fs::read(store.path()).unwrap();
        fs::write(store.path(), &bytes[..bytes.len() - 3]).unwrap();

        let err = CatalogStore::open(dir.path(), 128).err().unwrap();
        assert!(err.is_corruption());
    }
}
