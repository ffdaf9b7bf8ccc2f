use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::buffer::BufferPool;
use crate::catalog::CatalogStore;
use crate::common::{PageIndex, PageNumber, Result, StorageConfig, StorageError};
use crate::index::{BTreeIndex, RecordPointer};
use crate::storage::disk::DiskManager;
use crate::storage::page::{codec, Page};
use crate::tuple::{Attribute, Record, TableSchema, Value};

/// StorageManager owns the catalog, the buffer pool and the per-table
/// indexes of one database directory, and implements every table and
/// record operation on top of them.
///
/// It is meant for a single caller issuing one operation at a time.
/// Changes reach disk when pages are evicted, on [`StorageManager::save`]
/// and on [`StorageManager::close`].
pub struct StorageManager {
    config: StorageConfig,
    catalog: CatalogStore,
    buffer_pool: BufferPool,
    disk_manager: Arc<DiskManager>,
    indexes: HashMap<String, BTreeIndex>,
    next_temp_id: u64,
}

impl StorageManager {
    /// Opens (or creates) the database in `config.db_dir`.
    ///
    /// Temporary tables left by an earlier session are deleted, and the
    /// extent of every remaining table is recovered from its data file.
    /// With indexing enabled, a table whose primary keys are no longer
    /// unique (see [`StorageManager::fast_insert`]) is left unindexed.
    pub fn open(config: StorageConfig) -> Result<Self> {
        let catalog = CatalogStore::open(&config.db_dir, config.page_size)?;
        let disk_manager = Arc::new(DiskManager::new(&config.db_dir, catalog.page_size())?);
        let buffer_pool = BufferPool::new(config.buffer_size, Arc::clone(&disk_manager));

        let mut storage = Self {
            config,
            catalog,
            buffer_pool,
            disk_manager,
            indexes: HashMap::new(),
            next_temp_id: 0,
        };

        storage.wipe_temp_tables()?;
        storage.recover_extents()?;
        if storage.config.index_enabled {
            for name in storage.catalog.table_names() {
                match storage.create_index(&name) {
                    Ok(()) => {}
                    Err(e @ StorageError::DuplicateKey { .. }) => {
                        warn!(table = %name, error = %e, "table left unindexed");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        info!(
            db_dir = %storage.config.db_dir.display(),
            page_size = storage.page_size(),
            tables = storage.catalog.len(),
            "opened database"
        );
        Ok(storage)
    }

    /// Deletes every table whose name starts with a digit, together with
    /// its data file. Returns the number of tables removed.
    pub fn wipe_temp_tables(&mut self) -> Result<usize> {
        let mut names: HashSet<String> = self.disk_manager.list_tables()?.into_iter().collect();
        names.extend(self.catalog.table_names());

        let mut removed = 0;
        for name in names.iter().filter(|n| n.starts_with(|c: char| c.is_ascii_digit())) {
            self.buffer_pool.remove_table(name);
            self.disk_manager.delete_table(name)?;
            self.catalog.remove_table_schema(name);
            self.indexes.remove(name);
            removed += 1;
        }

        if removed > 0 {
            self.catalog.save()?;
            info!(removed, "wiped temporary tables");
        }
        Ok(removed)
    }

    fn recover_extents(&mut self) -> Result<()> {
        for name in self.catalog.table_names() {
            let schema = self.schema(&name)?;
            let (root, page_count, record_count) = self.recover_extent(&schema)?;
            if let Some(schema) = self.catalog.get_table_schema_mut(&name) {
                schema.set_extent(root, page_count, record_count);
            }
            debug!(table = %name, page_count, record_count, "recovered table extent");
        }
        Ok(())
    }

    /// Reads every slot of the table file and walks the page chain from the
    /// page without a predecessor.
    fn recover_extent(&self, schema: &TableSchema) -> Result<(Option<PageIndex>, u32, u64)> {
        let table = schema.name();
        if !self.disk_manager.table_exists(table) {
            return Ok((None, 0, 0));
        }

        let mut pages = HashMap::new();
        for slot in 0..self.disk_manager.slot_count(table)? {
            let index = PageIndex::new(slot);
            let bytes = match self.disk_manager.read_page(table, index)? {
                Some(bytes) => bytes,
                None => continue,
            };
            match codec::decode(table, index, &bytes, schema.attributes(), self.page_size()) {
                Ok(Some(page)) => {
                    pages.insert(index, page);
                }
                Ok(None) => {}
                Err(e) => warn!(table, slot, error = %e, "skipping unreadable page"),
            }
        }

        let root = pages
            .values()
            .filter(|p| p.prev_page_index().is_none())
            .min_by_key(|p| (p.page_number(), p.page_index()))
            .map(|p| p.page_index());

        let mut visited = HashSet::new();
        let mut record_count = 0u64;
        let mut current = root;
        while let Some(index) = current {
            if !visited.insert(index) {
                warn!(table, page_index = index.as_u32(), "reference loop in page chain");
                break;
            }
            match pages.get(&index) {
                Some(page) => {
                    record_count += page.record_count() as u64;
                    current = page.next_page_index();
                }
                None => {
                    warn!(table, page_index = index.as_u32(), "page chain points at a missing page");
                    visited.remove(&index);
                    break;
                }
            }
        }

        Ok((root, visited.len() as u32, record_count))
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Database-wide page size, as stored in the catalog.
    pub fn page_size(&self) -> usize {
        self.catalog.page_size()
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog.table_names()
    }

    pub fn get_table_schema(&self, name: &str) -> Option<&TableSchema> {
        self.catalog.get_table_schema(name)
    }

    fn schema(&self, name: &str) -> Result<TableSchema> {
        self.catalog
            .get_table_schema(name)
            .cloned()
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    /// Creates a table. Names must start with an ASCII letter and contain
    /// only letters, digits and underscores. No page is allocated until the
    /// first insert.
    pub fn create_table(&mut self, name: &str, attributes: Vec<Attribute>) -> Result<TableSchema> {
        let mut chars = name.chars();
        let valid = chars.next().map_or(false, |c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(StorageError::InvalidTableName(name.to_string()));
        }
        self.register(TableSchema::new(name, attributes)?)
    }

    /// Creates a table under the next temporary name.
    pub fn create_temp_table(&mut self, attributes: Vec<Attribute>) -> Result<TableSchema> {
        let name = self.get_temp_table_name();
        self.register(TableSchema::new(name, attributes)?)
    }

    fn register(&mut self, schema: TableSchema) -> Result<TableSchema> {
        if self.catalog.contains(schema.name()) {
            return Err(StorageError::TableAlreadyExists(schema.name().to_string()));
        }
        // A leftover file of an earlier table must not leak into this one
        self.buffer_pool.remove_table(schema.name());
        self.disk_manager.delete_table(schema.name())?;

        self.catalog.add_table_schema(schema.clone())?;
        if self.config.index_enabled {
            self.indexes.insert(
                schema.name().to_string(),
                BTreeIndex::new(self.config.btree_order),
            );
        }
        info!(table = schema.name(), attributes = schema.attribute_count(), "created table");
        Ok(schema)
    }

    /// Returns a fresh purely numeric table name. Names increase
    /// monotonically over the session.
    pub fn get_temp_table_name(&mut self) -> String {
        loop {
            self.next_temp_id += 1;
            let name = self.next_temp_id.to_string();
            if !self.catalog.contains(&name) && !self.disk_manager.table_exists(&name) {
                return name;
            }
        }
    }

    /// Drops a table, discarding its cached pages without writing them
    /// back. Returns false if no such table exists.
    pub fn drop_table(&mut self, name: &str) -> Result<bool> {
        if !self.catalog.contains(name) {
            return Ok(false);
        }
        self.buffer_pool.remove_table(name);
        self.disk_manager.delete_table(name)?;
        self.catalog.remove_table_schema(name);
        self.indexes.remove(name);
        info!(table = name, "dropped table");
        Ok(true)
    }

    /// Moves `source` into the identity of `target`: the schema binding,
    /// the data file and the index of `source` replace those of `target`.
    pub fn replace_table(&mut self, target: &str, source: &str) -> Result<()> {
        if !self.catalog.contains(source) {
            return Err(StorageError::TableNotFound(source.to_string()));
        }

        self.buffer_pool.flush_table(source)?;
        self.buffer_pool.remove_table(source);
        self.buffer_pool.remove_table(target);

        self.catalog.remove_table_schema(target);
        self.catalog.rename_table_schema(source, target)?;

        self.disk_manager.delete_table(target)?;
        if self.disk_manager.table_exists(source) {
            self.disk_manager.rename_table(source, target)?;
        }

        self.indexes.remove(target);
        if let Some(index) = self.indexes.remove(source) {
            self.indexes.insert(target.to_string(), index);
        }
        info!(target, source, "replaced table");
        Ok(())
    }

    /// Returns logical page `page_number` of the table.
    pub fn get_page(&mut self, table: &str, page_number: PageNumber) -> Result<Option<&Page>> {
        let schema = self
            .catalog
            .get_table_schema(table)
            .ok_or_else(|| StorageError::TableNotFound(table.to_string()))?;
        Ok(self.buffer_pool.get_page(schema, page_number)?.map(|page| &*page))
    }

    fn fetch_page<'a>(
        buffer_pool: &'a mut BufferPool,
        schema: &TableSchema,
        page_number: PageNumber,
    ) -> Result<&'a mut Page> {
        buffer_pool
            .get_page(schema, page_number)?
            .ok_or_else(|| StorageError::PageNotFound {
                table: schema.name().to_string(),
                page_number,
            })
    }

    /// Validates the record and checks that it can fit a page on its own.
    fn prepare(&self, schema: &TableSchema, record: Record) -> Result<Record> {
        let record = schema.conform(record)?;
        let capacity = codec::payload_capacity(self.page_size());
        if record.encoded_len() > capacity {
            return Err(StorageError::RecordTooLarge {
                size: record.encoded_len(),
                capacity,
            });
        }
        Ok(record)
    }

    /// Allocates and persists the first page of an empty table.
    fn ensure_first_page(&mut self, schema: &mut TableSchema) -> Result<()> {
        if schema.page_count() > 0 {
            return Ok(());
        }
        let table = schema.name().to_string();
        let index = self.disk_manager.allocate_pages(&table, 1)?;
        let page = Page::new(table.as_str(), index, 0);
        self.disk_manager
            .write_page(&table, index, &codec::encode(&page, self.page_size())?)?;
        self.buffer_pool.insert_page(page)?;

        schema.set_extent(Some(index), 1, schema.record_count());
        self.catalog.set_table_schema(schema.clone());
        debug!(table = %table, page_index = index.as_u32(), "allocated first page");
        Ok(())
    }

    /// Inserts a record ordered by its primary key.
    pub fn insert(&mut self, table: &str, record: Record) -> Result<()> {
        let ordering = self.schema(table)?.primary_key_index();
        self.insert_record(table, record, ordering)
    }

    /// Inserts a record before the first record whose value at
    /// `ordering_index` is not less than the new record's.
    ///
    /// Fails with [`StorageError::DuplicateKey`] if any primary key or
    /// unique attribute collides with an existing record. On any failure
    /// the table is left as it was.
    pub fn insert_record(&mut self, table: &str, record: Record, ordering_index: usize) -> Result<()> {
        let mut schema = self.schema(table)?;
        if ordering_index >= schema.attribute_count() {
            return Err(StorageError::AttributeOutOfRange {
                table: table.to_string(),
                index: ordering_index,
            });
        }
        let record = self.prepare(&schema, record)?;
        self.ensure_first_page(&mut schema)?;

        let ordering_value = record.value(ordering_index).cloned().unwrap_or(Value::Null);
        let mut insertion_point = None;
        for number in 0..schema.page_count() {
            let page = Self::fetch_page(&mut self.buffer_pool, &schema, number)?;
            for (slot, existing) in page.records().iter().enumerate() {
                for (i, attribute) in schema.key_attributes() {
                    if let (Some(old), Some(new)) = (existing.value(i), record.value(i)) {
                        if old.same_key(new) {
                            return Err(StorageError::DuplicateKey {
                                table: table.to_string(),
                                attribute: attribute.name().to_string(),
                                value: new.to_string(),
                            });
                        }
                    }
                }
                if insertion_point.is_none() {
                    let existing_value = existing.value(ordering_index).unwrap_or(&Value::Null);
                    if existing_value.total_cmp(&ordering_value) != Ordering::Less {
                        insertion_point = Some((number, slot));
                    }
                }
            }
        }

        let (number, slot) = match insertion_point {
            Some(point) => point,
            None => {
                let last = schema.page_count() - 1;
                let page = Self::fetch_page(&mut self.buffer_pool, &schema, last)?;
                (last, page.record_count())
            }
        };

        let touched = self.place_record(&mut schema, number, slot, record)?;
        self.reindex_pages(&schema, &touched)?;
        self.catalog.set_table_schema(schema);
        Ok(())
    }

    /// Appends a record to the last page without uniqueness checks or
    /// ordering. The table's index, if any, is discarded.
    pub fn fast_insert(&mut self, table: &str, record: Record) -> Result<()> {
        let mut schema = self.schema(table)?;
        let record = self.prepare(&schema, record)?;
        self.ensure_first_page(&mut schema)?;

        let last = schema.page_count() - 1;
        let slot = Self::fetch_page(&mut self.buffer_pool, &schema, last)?.record_count();
        self.place_record(&mut schema, last, slot, record)?;

        if self.indexes.remove(table).is_some() {
            debug!(table, "discarded index after unordered insert");
        }
        self.catalog.set_table_schema(schema);
        Ok(())
    }

    /// Puts the record at `slot` of page `number` and splits the page if it
    /// no longer fits. If the split fails the record is taken out again and
    /// the page is left as it was. Returns the physical indices of pages
    /// whose records moved.
    fn place_record(
        &mut self,
        schema: &mut TableSchema,
        number: PageNumber,
        slot: usize,
        record: Record,
    ) -> Result<Vec<PageIndex>> {
        let page_size = self.page_size();
        let page = Self::fetch_page(&mut self.buffer_pool, schema, number)?;
        page.records_mut().insert(slot, record);
        let host = page.page_index();
        let overflow = !codec::fits(page.records(), page_size);

        let mut touched = vec![host];
        if overflow {
            match self.split_page(schema, number) {
                Ok(new_pages) => touched.extend(new_pages),
                Err(e) => {
                    if let Some(page) = self.buffer_pool.cached_page_mut(schema.name(), host) {
                        page.records_mut().remove(slot);
                    }
                    warn!(table = schema.name(), error = %e, "insert rolled back");
                    return Err(e);
                }
            }
        }

        schema.set_record_count(schema.record_count() + 1);
        Ok(touched)
    }

    /// Splits an overflowing page. Its records are cut at the midpoint
    /// until every part fits; the first part stays in place and the others
    /// go to pages allocated in one file growth and linked in after it.
    ///
    /// All disk I/O happens before the cached chain is changed. On failure
    /// the grown slots are freed and the overflowing page is untouched.
    fn split_page(&mut self, schema: &mut TableSchema, number: PageNumber) -> Result<Vec<PageIndex>> {
        let page_size = self.page_size();
        let table = schema.name().to_string();

        let page = Self::fetch_page(&mut self.buffer_pool, schema, number)?;
        let (page_index, old_next) = (page.page_index(), page.next_page_index());
        let mut parts = partition_records(page.records().to_vec(), page_size).into_iter();
        let head = parts.next().unwrap_or_default();
        let tail: Vec<Vec<Record>> = parts.collect();
        let added = tail.len() as u32;
        if added == 0 {
            return Ok(Vec::new());
        }

        let first = self.disk_manager.allocate_pages(&table, added)?;
        let new_indices: Vec<PageIndex> = (0..added).map(|i| first.offset(i)).collect();
        let last_new = new_indices[new_indices.len() - 1];

        let new_pages: Vec<Page> = tail
            .into_iter()
            .enumerate()
            .map(|(i, records)| {
                let prev = if i == 0 { page_index } else { new_indices[i - 1] };
                let next = new_indices.get(i + 1).copied().or(old_next);
                Page::new(table.as_str(), new_indices[i], number + 1 + i as u32)
                    .with_records(records)
                    .with_links(Some(prev), next)
            })
            .collect();

        if let Err(e) = self.write_split_pages(schema, &new_pages, old_next, last_new) {
            self.release_slots(&table, &new_indices);
            return Err(e);
        }

        match self.buffer_pool.cached_page_mut(&table, page_index) {
            Some(page) => {
                *page.records_mut() = head;
                page.set_next_page_index(Some(first));
            }
            None => {
                self.release_slots(&table, &new_indices);
                return Err(StorageError::PageNotFound { table, page_number: number });
            }
        }

        for _ in 0..added {
            self.buffer_pool.increment_page_numbers(&table, number + 1);
        }
        if let Some(next) = old_next {
            if let Some(next_page) = self.buffer_pool.cached_page_mut(&table, next) {
                next_page.set_prev_page_index(Some(last_new));
            }
        }
        schema.set_page_count(schema.page_count() + added);

        let mut cached = 0;
        for page in new_pages {
            if !self.buffer_pool.admit_if_room(page) {
                break;
            }
            cached += 1;
        }

        debug!(
            table = %table,
            page_number = number,
            new_pages = added,
            cached,
            "split page"
        );
        Ok(new_indices)
    }

    /// Writes the pages produced by a split straight to their slots and
    /// points the page that used to follow the split page back at the last
    /// of them. A cached follower is relinked later, in memory.
    fn write_split_pages(
        &self,
        schema: &TableSchema,
        pages: &[Page],
        old_next: Option<PageIndex>,
        last_new: PageIndex,
    ) -> Result<()> {
        let page_size = self.page_size();
        for page in pages {
            let bytes = codec::encode(page, page_size)?;
            self.disk_manager.write_page(schema.name(), page.page_index(), &bytes)?;
        }

        let next = match old_next {
            Some(next) if !self.buffer_pool.is_cached_index(schema.name(), next) => next,
            _ => return Ok(()),
        };
        match self.buffer_pool.read_detached(schema, next)? {
            Some(mut next_page) => {
                next_page.set_prev_page_index(Some(last_new));
                let bytes = codec::encode(&next_page, page_size)?;
                self.disk_manager.write_page(schema.name(), next, &bytes)?;
            }
            None => warn!(
                table = schema.name(),
                page_index = next.as_u32(),
                "split could not relink next page"
            ),
        }
        Ok(())
    }

    /// Marks slots grown for a failed split as free.
    fn release_slots(&self, table: &str, slots: &[PageIndex]) {
        let block = codec::free_block(self.page_size());
        for &slot in slots {
            if let Err(e) = self.disk_manager.write_page(table, slot, &block) {
                warn!(table, page_index = slot.as_u32(), error = %e, "could not free page slot");
            }
        }
    }

    /// Unlinks page `number` from the table's chain and frees its slot.
    pub fn drop_page(&mut self, table: &str, number: PageNumber) -> Result<()> {
        let mut schema = self.schema(table)?;
        self.unlink_page(&mut schema, number)?;
        self.catalog.set_table_schema(schema);
        Ok(())
    }

    fn unlink_page(&mut self, schema: &mut TableSchema, number: PageNumber) -> Result<()> {
        let table = schema.name().to_string();
        let page = Self::fetch_page(&mut self.buffer_pool, schema, number)?;
        let (index, prev, next) = (page.page_index(), page.prev_page_index(), page.next_page_index());
        let dropped = page.record_count() as u64;
        self.buffer_pool.remove_page(&table, index);

        match prev {
            Some(prev) => match self.buffer_pool.page_at(schema, prev, number.saturating_sub(1))? {
                Some(prev_page) => prev_page.set_next_page_index(next),
                None => warn!(table = %table, page_index = prev.as_u32(), "missing previous page"),
            },
            None => schema.set_root_page_index(next),
        }
        if let Some(next) = next {
            match self.buffer_pool.page_at(schema, next, number + 1)? {
                Some(next_page) => next_page.set_prev_page_index(prev),
                None => warn!(table = %table, page_index = next.as_u32(), "missing next page"),
            }
        }

        self.buffer_pool.decrement_page_numbers(&table, number + 1);
        schema.set_page_count(schema.page_count() - 1);
        schema.set_record_count(schema.record_count().saturating_sub(dropped));
        self.disk_manager
            .write_page(&table, index, &codec::free_block(self.page_size()))?;

        if let Some(tree) = self.indexes.get_mut(&table) {
            tree.delete_page_entries(index);
        }
        debug!(table = %table, page_number = number, page_index = index.as_u32(), "dropped page");
        Ok(())
    }

    /// Deletes the record whose primary key equals `key`. A page left
    /// empty is dropped. Returns false if no record matched.
    pub fn delete_record(&mut self, table: &str, key: &Value) -> Result<bool> {
        let mut schema = self.schema(table)?;
        let pk = schema.primary_key_index();

        let mut found = None;
        for number in 0..schema.page_count() {
            let page = Self::fetch_page(&mut self.buffer_pool, &schema, number)?;
            let position = page
                .records()
                .iter()
                .position(|r| r.value(pk).map_or(false, |v| v.same_key(key)));
            if let Some(slot) = position {
                page.records_mut().remove(slot);
                found = Some((number, page.page_index(), page.is_empty()));
                break;
            }
        }

        let (number, index, empty) = match found {
            Some(found) => found,
            None => return Ok(false),
        };
        schema.set_record_count(schema.record_count() - 1);
        if let Some(tree) = self.indexes.get_mut(table) {
            tree.delete(key);
        }

        if empty {
            self.unlink_page(&mut schema, number)?;
        } else {
            self.reindex_pages(&schema, &[index])?;
        }
        self.catalog.set_table_schema(schema);
        Ok(true)
    }

    /// All records of the table in page order.
    pub fn scan_table(&mut self, table: &str) -> Result<Vec<Record>> {
        let schema = self.schema(table)?;
        let mut records = Vec::with_capacity(schema.record_count() as usize);
        for number in 0..schema.page_count() {
            let page = Self::fetch_page(&mut self.buffer_pool, &schema, number)?;
            records.extend(page.records().iter().cloned());
        }
        Ok(records)
    }

    /// Looks a record up by primary key, through the index when the table
    /// has one.
    pub fn find_record(&mut self, table: &str, key: &Value) -> Result<Option<Record>> {
        let schema = self.schema(table)?;
        let pk = schema.primary_key_index();

        if let Some(tree) = self.indexes.get(table) {
            let pointer = match tree.get(key) {
                Some(pointer) => pointer,
                None => return Ok(None),
            };
            let page = self.buffer_pool.read_detached(&schema, pointer.page_index)?;
            let record = page.and_then(|p| p.record(pointer.record_index).cloned());
            return Ok(record.filter(|r| r.value(pk).map_or(false, |v| v.same_key(key))));
        }

        Ok(self
            .scan_table(table)?
            .into_iter()
            .find(|r| r.value(pk).map_or(false, |v| v.same_key(key))))
    }

    /// Records whose primary key lies in `low..=high`, in key order.
    pub fn range_scan(&mut self, table: &str, low: &Value, high: &Value) -> Result<Vec<Record>> {
        let schema = self.schema(table)?;
        let pk = schema.primary_key_index();

        if let Some(tree) = self.indexes.get(table) {
            let mut pages: HashMap<PageIndex, Option<Page>> = HashMap::new();
            let mut records = Vec::new();
            for pointer in tree.range(low, high) {
                if !pages.contains_key(&pointer.page_index) {
                    let page = self.buffer_pool.read_detached(&schema, pointer.page_index)?;
                    pages.insert(pointer.page_index, page);
                }
                let record = pages
                    .get(&pointer.page_index)
                    .and_then(|p| p.as_ref())
                    .and_then(|p| p.record(pointer.record_index));
                if let Some(record) = record {
                    records.push(record.clone());
                }
            }
            return Ok(records);
        }

        let key = |r: &Record| r.value(pk).cloned().unwrap_or(Value::Null);
        let mut records: Vec<Record> = self
            .scan_table(table)?
            .into_iter()
            .filter(|r| {
                let k = key(r);
                k.total_cmp(low) != Ordering::Less && k.total_cmp(high) != Ordering::Greater
            })
            .collect();
        records.sort_by(|a, b| key(a).total_cmp(&key(b)));
        Ok(records)
    }

    /// Builds the primary-key index of a table from its pages.
    pub fn create_index(&mut self, table: &str) -> Result<()> {
        let schema = self.schema(table)?;
        let pk = schema.primary_key_index();
        let mut tree = BTreeIndex::new(self.config.btree_order);

        for number in 0..schema.page_count() {
            let page = Self::fetch_page(&mut self.buffer_pool, &schema, number)?;
            let index = page.page_index();
            for (slot, record) in page.records().iter().enumerate() {
                let key = record.value(pk).cloned().unwrap_or(Value::Null);
                if !tree.insert(RecordPointer::new(key.clone(), index, slot)) {
                    return Err(StorageError::DuplicateKey {
                        table: table.to_string(),
                        attribute: schema.primary_key().name().to_string(),
                        value: key.to_string(),
                    });
                }
            }
        }

        debug!(table, entries = tree.len(), height = tree.height(), "built index");
        self.indexes.insert(table.to_string(), tree);
        Ok(())
    }

    pub fn drop_index(&mut self, table: &str) -> bool {
        self.indexes.remove(table).is_some()
    }

    pub fn has_index(&self, table: &str) -> bool {
        self.indexes.contains_key(table)
    }

    pub fn index(&self, table: &str) -> Option<&BTreeIndex> {
        self.indexes.get(table)
    }

    /// Re-points the index entries of every record in the given pages.
    fn reindex_pages(&mut self, schema: &TableSchema, pages: &[PageIndex]) -> Result<()> {
        let tree = match self.indexes.get_mut(schema.name()) {
            Some(tree) => tree,
            None => return Ok(()),
        };
        let pk = schema.primary_key_index();
        for &index in pages {
            if let Some(page) = self.buffer_pool.read_detached(schema, index)? {
                for (slot, record) in page.records().iter().enumerate() {
                    if let Some(key) = record.value(pk) {
                        tree.upsert(RecordPointer::new(key.clone(), index, slot));
                    }
                }
            }
        }
        Ok(())
    }

    /// Renders the table's records as text, one row per line.
    pub fn display_table(&mut self, table: &str) -> Result<String> {
        let schema = self.schema(table)?;
        let records = self.scan_table(table)?;

        let mut out = String::new();
        let header: Vec<&str> = schema.attributes().iter().map(|a| a.name()).collect();
        let _ = writeln!(out, "{}", header.join(" | "));
        for record in &records {
            let row: Vec<String> = record.values().iter().map(|v| v.to_string()).collect();
            let _ = writeln!(out, "{}", row.join(" | "));
        }
        let _ = writeln!(
            out,
            "({} records in {} pages)",
            schema.record_count(),
            schema.page_count()
        );
        Ok(out)
    }

    /// Renders the catalog as text.
    pub fn display_schema(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "DB location: {}", self.config.db_dir.display());
        let _ = writeln!(out, "Page size: {}", self.page_size());
        let _ = writeln!(out, "Buffer size: {}", self.buffer_pool.capacity());

        for schema in self.catalog.schemas() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Table name: {}", schema.name());
            for attribute in schema.attributes() {
                let mut line = format!("    {}: {}", attribute.name(), attribute.data_type());
                if attribute.is_primary_key() {
                    line.push_str(" primarykey");
                } else {
                    if attribute.is_unique() {
                        line.push_str(" unique");
                    }
                    if attribute.is_not_null() {
                        line.push_str(" notnull");
                    }
                }
                if let Some(default) = attribute.default_value() {
                    let _ = write!(line, " default {}", default);
                }
                let _ = writeln!(out, "{}", line);
            }
            let _ = writeln!(out, "Pages: {}", schema.page_count());
            let _ = writeln!(out, "Records: {}", schema.record_count());
            if self.indexes.contains_key(schema.name()) {
                let _ = writeln!(out, "Indexed: yes");
            }
        }
        out
    }

    /// Flushes every cached page and rewrites the catalog.
    pub fn save(&mut self) -> Result<()> {
        self.buffer_pool.save()?;
        self.catalog.save()
    }

    pub fn set_nuke_on_close(&mut self, nuke: bool) {
        self.config.nuke_on_close = nuke;
    }

    /// Ends the session: saves everything, or with `nuke_on_close` set,
    /// deletes every file in the database directory.
    pub fn close(mut self) -> Result<()> {
        if self.config.nuke_on_close {
            for name in self.catalog.table_names() {
                self.buffer_pool.remove_table(&name);
            }
            self.disk_manager.remove_all_files()?;
            info!(db_dir = %self.config.db_dir.display(), "nuked database");
            return Ok(());
        }
        self.save()?;
        info!(db_dir = %self.config.db_dir.display(), "closed database");
        Ok(())
    }
}

/// Cuts `records` at the midpoint, recursively, until every part fits a
/// page. A part of a single record is never cut further.
fn partition_records(records: Vec<Record>, page_size: usize) -> Vec<Vec<Record>> {
    if records.len() <= 1 || codec::fits(&records, page_size) {
        return vec![records];
    }
    let mut head = records;
    let tail = head.split_off(head.len() / 2);
    let mut parts = partition_records(head, page_size);
    parts.extend(partition_records(tail, page_size));
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::tuple::DataType;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> StorageManager {
        StorageManager::open(StorageConfig::new(dir.path()).with_page_size(64)).unwrap()
    }

    fn attributes() -> Vec<Attribute> {
        vec![
            Attribute::new("id", DataType::Integer).primary_key(),
            Attribute::new("name", DataType::VarChar(10)),
        ]
    }

    #[test]
    fn test_partition_records() {
        let records: Vec<Record> = (0..10).map(|i| record![i, "abcdefgh"]).collect();
        let parts = partition_records(records.clone(), 64);

        assert!(parts.len() >= 2);
        assert!(parts.iter().all(|p| codec::fits(p, 64)));
        assert_eq!(parts.concat(), records);
    }

    #[test]
    fn test_table_name_rules() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir);

        for bad in ["", "1abc", "_x", "a-b", "a b"] {
            assert!(matches!(
                storage.create_table(bad, attributes()),
                Err(StorageError::InvalidTableName(_))
            ));
        }
        storage.create_table("a_1", attributes()).unwrap();
    }

    #[test]
    fn test_temp_names_are_numeric_and_increasing() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir);

        let first = storage.create_temp_table(attributes()).unwrap();
        let second = storage.get_temp_table_name();
        assert!(first.is_temp());
        assert!(second.parse::<u64>().unwrap() > first.name().parse::<u64>().unwrap());
    }

    #[test]
    fn test_insert_rejects_oversized_record() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir);
        storage
            .create_table(
                "t",
                vec![
                    Attribute::new("id", DataType::Integer).primary_key(),
                    Attribute::new("blob", DataType::VarChar(200)),
                ],
            )
            .unwrap();

        let long = "x".repeat(60);
        assert!(matches!(
            storage.insert("t", record![1, long.as_str()]),
            Err(StorageError::RecordTooLarge { .. })
        ));
        assert_eq!(storage.get_table_schema("t").unwrap().record_count(), 0);
    }

    #[test]
    fn test_drop_page_relinks_neighbours() {
        let dir = TempDir::new().unwrap();
        let mut storage = open(&dir);
        storage.create_table("t", attributes()).unwrap();
        for i in 0..12 {
            storage.insert("t", record![i, "abcdefgh"]).unwrap();
        }
        let pages = storage.get_table_schema("t").unwrap().page_count();
        assert!(pages >= 3);

        let middle: Vec<Record> = storage.get_page("t", 1).unwrap().unwrap().records().to_vec();
        storage.drop_page("t", 1).unwrap();

        let schema = storage.get_table_schema("t").unwrap();
        assert_eq!(schema.page_count(), pages - 1);
        assert_eq!(schema.record_count(), 12 - middle.len() as u64);
        let remaining = storage.scan_table("t").unwrap();
        assert_eq!(remaining.len(), 12 - middle.len());
        assert!(middle.iter().all(|r| !remaining.contains(r)));
    }

    #[test]
    fn test_split_failure_after_growth_restores_page() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig::new(dir.path()).with_page_size(64).with_buffer_size(1);
        let mut storage = StorageManager::open(config).unwrap();
        storage.create_table("t", attributes()).unwrap();
        for i in 0..6 {
            storage.insert("t", record![i * 10, "abcdefgh"]).unwrap();
        }
        let mut schema = storage.schema("t").unwrap();
        let pages = schema.page_count();
        assert!(pages >= 2);

        // Fill logical page 0 until one more record would overflow it.
        let mut id = -1;
        loop {
            let page = StorageManager::fetch_page(&mut storage.buffer_pool, &schema, 0).unwrap();
            let mut grown = page.records().to_vec();
            grown.insert(0, record![id, "abcdefgh"]);
            if !codec::fits(&grown, 64) {
                break;
            }
            storage.place_record(&mut schema, 0, 0, record![id, "abcdefgh"]).unwrap();
            id -= 1;
        }

        let page = StorageManager::fetch_page(&mut storage.buffer_pool, &schema, 0).unwrap();
        let host = page.page_index();
        let follower = page.next_page_index().unwrap();
        let before = page.records().to_vec();

        let mut block = vec![0u8; 64];
        block[..4].copy_from_slice(&(-5i32).to_be_bytes());
        storage.disk_manager.write_page("t", follower, &block).unwrap();
        let slots = storage.disk_manager.slot_count("t").unwrap();
        let count = schema.record_count();

        let err = storage
            .place_record(&mut schema, 0, 0, record![id, "abcdefgh"])
            .unwrap_err();
        assert!(err.is_corruption());
        assert_eq!(schema.record_count(), count);
        assert_eq!(schema.page_count(), pages);

        let page = storage.buffer_pool.cached_page_mut("t", host).unwrap();
        assert_eq!(page.records(), before.as_slice());
        assert_eq!(page.next_page_index(), Some(follower));

        let grown = storage.disk_manager.slot_count("t").unwrap();
        assert!(grown > slots);
        for slot in slots..grown {
            let bytes = storage.disk_manager.read_page("t", PageIndex::new(slot)).unwrap().unwrap();
            assert!(codec::is_free_block(&bytes));
        }
    }
}
