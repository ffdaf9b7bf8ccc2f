use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::common::{PageIndex, PageNumber, Result};
use crate::storage::disk::DiskManager;
use crate::storage::page::{codec, Page};
use crate::tuple::TableSchema;

/// BufferPool caches table pages in memory, bounded by `capacity`.
///
/// Frames are kept in recency order: the front of the queue is the least
/// recently used page and the back the most recently used. Admitting a page
/// into a full pool evicts the front frame, which is always written back to
/// its table file first.
pub struct BufferPool {
    /// Maximum number of cached pages
    capacity: usize,
    /// Cached pages, least recently used first
    frames: VecDeque<Page>,
    /// Backing table files
    disk_manager: Arc<DiskManager>,
}

impl BufferPool {
    /// Creates a BufferPool holding at most `capacity` pages (at least one).
    pub fn new(capacity: usize, disk_manager: Arc<DiskManager>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            frames: VecDeque::with_capacity(capacity),
            disk_manager,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of pages currently cached.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn page_size(&self) -> usize {
        self.disk_manager.page_size()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    /// Returns true if logical page `page_number` of `table` is cached.
    pub fn is_cached(&self, table: &str, page_number: PageNumber) -> bool {
        self.position(table, page_number).is_some()
    }

    /// Returns true if slot `page_index` of `table` is cached.
    pub fn is_cached_index(&self, table: &str, page_index: PageIndex) -> bool {
        self.position_by_index(table, page_index).is_some()
    }

    /// Returns the cached page in slot `page_index` without touching the
    /// disk or the recency order.
    pub fn cached_page_mut(&mut self, table: &str, page_index: PageIndex) -> Option<&mut Page> {
        let pos = self.position_by_index(table, page_index)?;
        self.frames.get_mut(pos)
    }

    fn position(&self, table: &str, page_number: PageNumber) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.table() == table && f.page_number() == page_number)
    }

    fn position_by_index(&self, table: &str, page_index: PageIndex) -> Option<usize> {
        self.frames
            .iter()
            .position(|f| f.table() == table && f.page_index() == page_index)
    }

    /// Moves the page at `pos` to the most recently used position.
    fn touch(&mut self, pos: usize) -> Option<&mut Page> {
        let page = self.frames.remove(pos)?;
        self.frames.push_back(page);
        self.frames.back_mut()
    }

    /// Returns logical page `page_number` of the table.
    ///
    /// On a miss the page chain is walked one hop at a time from the closest
    /// cached page of the table (or from the root page), loading every hop
    /// on demand. Returns `Ok(None)` when the table has no such page or the
    /// chain revisits a slot.
    pub fn get_page(
        &mut self,
        schema: &TableSchema,
        page_number: PageNumber,
    ) -> Result<Option<&mut Page>> {
        if page_number >= schema.page_count() {
            return Ok(None);
        }
        if let Some(pos) = self.position(schema.name(), page_number) {
            return Ok(self.touch(pos));
        }

        let closest = self
            .frames
            .iter()
            .filter(|f| f.table() == schema.name())
            .min_by_key(|f| f.page_number().abs_diff(page_number))
            .map(|f| (f.page_index(), f.page_number()));
        let (mut index, mut number) = match closest.or_else(|| schema.root_page_index().map(|root| (root, 0))) {
            Some(start) => start,
            None => return Ok(None),
        };

        let mut visited = HashSet::new();
        loop {
            if !visited.insert(index) {
                warn!(
                    table = schema.name(),
                    page_index = index.as_u32(),
                    target = page_number,
                    "reference loop in page chain"
                );
                return Ok(None);
            }

            let (prev, next) = match self.page_at(schema, index, number)? {
                Some(page) => (page.prev_page_index(), page.next_page_index()),
                None => return Ok(None),
            };
            if number == page_number {
                return Ok(self.frames.back_mut());
            }

            let hop = if page_number > number { next } else { prev };
            index = match hop {
                Some(index) => index,
                None => {
                    warn!(
                        table = schema.name(),
                        at = number,
                        target = page_number,
                        "page chain ends before target page"
                    );
                    return Ok(None);
                }
            };
            number = if page_number > number { number + 1 } else { number - 1 };
        }
    }

    /// Returns the page stored in slot `page_index`, from the cache or from
    /// disk. A page loaded from disk takes `page_number` as its logical
    /// number.
    pub fn page_at(
        &mut self,
        schema: &TableSchema,
        page_index: PageIndex,
        page_number: PageNumber,
    ) -> Result<Option<&mut Page>> {
        if let Some(pos) = self.position_by_index(schema.name(), page_index) {
            return Ok(self.touch(pos));
        }
        self.load_page(schema, page_index, page_number)
    }

    /// Reads slot `page_index` from the table file, decodes it and admits
    /// it. Returns `Ok(None)` if the slot lies beyond the file's extent or
    /// holds a dropped page.
    pub fn load_page(
        &mut self,
        schema: &TableSchema,
        page_index: PageIndex,
        page_number: PageNumber,
    ) -> Result<Option<&mut Page>> {
        let mut page = match self.read_page(schema, page_index)? {
            Some(page) => page,
            None => return Ok(None),
        };
        if page.page_number() != page_number {
            debug!(
                table = schema.name(),
                page_index = page_index.as_u32(),
                stored = page.page_number(),
                page_number,
                "renumbering loaded page"
            );
            page.set_page_number(page_number);
        }

        self.insert_page(page)?;
        Ok(self.frames.back_mut())
    }

    fn read_page(&self, schema: &TableSchema, page_index: PageIndex) -> Result<Option<Page>> {
        let bytes = match self.disk_manager.read_page(schema.name(), page_index)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        codec::decode(
            schema.name(),
            page_index,
            &bytes,
            schema.attributes(),
            self.page_size(),
        )
    }

    /// Returns a copy of the page in slot `page_index` without changing the
    /// pool: the cached copy if present, else a freshly decoded one.
    pub fn read_detached(&self, schema: &TableSchema, page_index: PageIndex) -> Result<Option<Page>> {
        if let Some(pos) = self.position_by_index(schema.name(), page_index) {
            return Ok(self.frames.get(pos).cloned());
        }
        self.read_page(schema, page_index)
    }

    /// Admits a page at the most recently used position.
    ///
    /// A full pool first evicts its least recently used page. If writing the
    /// victim back fails the error is returned, but the new page is admitted
    /// regardless. A cached copy of the same slot is replaced without
    /// eviction.
    pub fn insert_page(&mut self, page: Page) -> Result<()> {
        if let Some(pos) = self.position_by_index(page.table(), page.page_index()) {
            self.frames.remove(pos);
        }

        let write_back = if self.frames.len() >= self.capacity {
            self.evict()
        } else {
            Ok(())
        };

        debug!(
            table = page.table(),
            page_index = page.page_index().as_u32(),
            page_number = page.page_number(),
            "admitted page"
        );
        self.frames.push_back(page);
        write_back
    }

    /// Admits a page only if that needs no eviction: a cached copy of the
    /// same slot is replaced, otherwise a free frame is used. Returns false
    /// and drops the page when the pool is full.
    pub fn admit_if_room(&mut self, page: Page) -> bool {
        if let Some(pos) = self.position_by_index(page.table(), page.page_index()) {
            self.frames.remove(pos);
        } else if self.frames.len() >= self.capacity {
            return false;
        }
        self.frames.push_back(page);
        true
    }

    /// Evicts the least recently used page, writing it back first.
    fn evict(&mut self) -> Result<()> {
        let victim = match self.frames.pop_front() {
            Some(page) => page,
            None => return Ok(()),
        };
        debug!(
            table = victim.table(),
            page_index = victim.page_index().as_u32(),
            page_number = victim.page_number(),
            "evicting page"
        );
        self.write_back(&victim)
    }

    fn write_back(&self, page: &Page) -> Result<()> {
        let bytes = codec::encode(page, self.page_size())?;
        self.disk_manager
            .write_page(page.table(), page.page_index(), &bytes)
    }

    /// Writes a cached page back without evicting it. Returns false if the
    /// page is not cached.
    pub fn flush_page(&self, table: &str, page_index: PageIndex) -> Result<bool> {
        match self.position_by_index(table, page_index) {
            Some(pos) => {
                self.write_back(&self.frames[pos])?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes back every cached page of the table.
    pub fn flush_table(&self, table: &str) -> Result<()> {
        for page in self.frames.iter().filter(|p| p.table() == table) {
            self.write_back(page)?;
        }
        Ok(())
    }

    /// Drops a cached page without writing it back.
    pub fn remove_page(&mut self, table: &str, page_index: PageIndex) -> Option<Page> {
        let pos = self.position_by_index(table, page_index)?;
        self.frames.remove(pos)
    }

    /// Drops every cached page of the table without writing it back.
    pub fn remove_table(&mut self, table: &str) {
        let before = self.frames.len();
        self.frames.retain(|f| f.table() != table);
        debug!(table, removed = before - self.frames.len(), "removed table pages");
    }

    /// Shifts every cached page of the table numbered `above` or higher up
    /// by one.
    pub fn increment_page_numbers(&mut self, table: &str, above: PageNumber) {
        for page in self.frames.iter_mut() {
            if page.table() == table && page.page_number() >= above {
                page.set_page_number(page.page_number() + 1);
            }
        }
    }

    /// Shifts every cached page of the table numbered `above` or higher down
    /// by one.
    pub fn decrement_page_numbers(&mut self, table: &str, above: PageNumber) {
        for page in self.frames.iter_mut() {
            if page.table() == table && page.page_number() >= above && page.page_number() > 0 {
                page.set_page_number(page.page_number() - 1);
            }
        }
    }

    /// Logical numbers of the table's cached pages, least recently used
    /// first.
    pub fn cached_page_numbers(&self, table: &str) -> Vec<PageNumber> {
        self.frames
            .iter()
            .filter(|f| f.table() == table)
            .map(|f| f.page_number())
            .collect()
    }

    /// Flushes and empties the pool.
    pub fn save(&mut self) -> Result<()> {
        for page in self.frames.iter() {
            self.write_back(page)?;
        }
        self.frames.clear();
        self.disk_manager.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;
    use crate::tuple::DataType;
    use tempfile::TempDir;

    const PAGE: usize = 64;

    fn schema() -> TableSchema {
        TableSchema::builder("t")
            .primary_key("id", DataType::Integer)
            .build()
            .unwrap()
    }

    /// Writes a chain of `count` pages stored in reverse slot order, so
    /// logical page `n` lives in slot `count - 1 - n`.
    fn create_pool(capacity: usize, count: u32) -> (BufferPool, TableSchema, TempDir) {
        let dir = TempDir::new().unwrap();
        let dm = Arc::new(DiskManager::new(dir.path(), PAGE).unwrap());
        dm.allocate_pages("t", count).unwrap();

        let slot = |n: u32| PageIndex::new(count - 1 - n);
        for n in 0..count {
            let prev = n.checked_sub(1).map(slot);
            let next = if n + 1 < count { Some(slot(n + 1)) } else { None };
            let page = Page::new("t", slot(n), n)
                .with_records(vec![record![n as i32]])
                .with_links(prev, next);
            dm.write_page("t", slot(n), &codec::encode(&page, PAGE).unwrap())
                .unwrap();
        }

        let mut schema = schema();
        schema.set_extent(Some(slot(0)), count, count as u64);
        (BufferPool::new(capacity, dm), schema, dir)
    }

    #[test]
    fn test_get_page_walks_chain() {
        let (mut pool, schema, _dir) = create_pool(10, 4);

        let page = pool.get_page(&schema, 3).unwrap().unwrap();
        assert_eq!(page.page_index(), PageIndex::new(0));
        assert_eq!(page.records(), &[record![3]]);
        assert_eq!(pool.len(), 4);

        let page = pool.get_page(&schema, 1).unwrap().unwrap();
        assert_eq!(page.page_index(), PageIndex::new(2));
        assert!(pool.get_page(&schema, 4).unwrap().is_none());
    }

    #[test]
    fn test_lru_eviction_writes_back() {
        let (mut pool, schema, _dir) = create_pool(2, 3);

        pool.get_page(&schema, 0).unwrap().unwrap().records_mut()[0] = record![100];
        pool.get_page(&schema, 1).unwrap();
        let writes = pool.disk_manager().get_num_writes();

        pool.get_page(&schema, 2).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(!pool.is_cached("t", 0));
        assert_eq!(pool.disk_manager().get_num_writes(), writes + 1);

        let evicted = pool.read_detached(&schema, PageIndex::new(2)).unwrap().unwrap();
        assert_eq!(evicted.records(), &[record![100]]);
    }

    #[test]
    fn test_reference_loop_detected() {
        let (mut pool, schema, _dir) = create_pool(10, 3);

        // Make the last page point back at the first
        let last = pool.get_page(&schema, 2).unwrap().unwrap();
        last.set_next_page_index(Some(PageIndex::new(2)));
        pool.save().unwrap();

        let mut longer = schema.clone();
        longer.set_page_count(5);
        assert!(pool.get_page(&longer, 4).unwrap().is_none());
    }

    #[test]
    fn test_insert_replaces_same_slot() {
        let (mut pool, schema, _dir) = create_pool(2, 2);

        pool.get_page(&schema, 0).unwrap();
        let page = Page::new("t", PageIndex::new(1), 0).with_records(vec![record![9]]);
        pool.insert_page(page).unwrap();

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.get_page(&schema, 0).unwrap().unwrap().records(), &[record![9]]);
    }

    #[test]
    fn test_admit_if_room_never_evicts() {
        let (mut pool, schema, _dir) = create_pool(2, 3);
        pool.get_page(&schema, 0).unwrap();
        let writes = pool.disk_manager().get_num_writes();

        let extra = Page::new("t", PageIndex::new(1), 1).with_records(vec![record![7]]);
        assert!(pool.admit_if_room(extra));
        let full = Page::new("t", PageIndex::new(0), 2).with_records(vec![record![8]]);
        assert!(!pool.admit_if_room(full));
        assert_eq!(pool.len(), 2);
        assert!(!pool.is_cached_index("t", PageIndex::new(0)));

        let replaced = Page::new("t", PageIndex::new(1), 1).with_records(vec![record![9]]);
        assert!(pool.admit_if_room(replaced));
        assert_eq!(
            pool.cached_page_mut("t", PageIndex::new(1)).unwrap().records(),
            &[record![9]]
        );
        assert_eq!(pool.disk_manager().get_num_writes(), writes);
    }

    #[test]
    fn test_flush_page_keeps_page_cached() {
        let (mut pool, schema, _dir) = create_pool(4, 2);
        pool.get_page(&schema, 1).unwrap().unwrap().records_mut()[0] = record![42];

        assert!(pool.flush_page("t", PageIndex::new(0)).unwrap());
        assert!(!pool.flush_page("other", PageIndex::new(0)).unwrap());
        assert!(pool.is_cached("t", 1));

        let bytes = pool.disk_manager().read_page("t", PageIndex::new(0)).unwrap().unwrap();
        let on_disk = codec::decode("t", PageIndex::new(0), &bytes, schema.attributes(), PAGE)
            .unwrap()
            .unwrap();
        assert_eq!(on_disk.records(), &[record![42]]);
    }

    #[test]
    fn test_page_number_shifts() {
        let (mut pool, schema, _dir) = create_pool(10, 3);
        for n in 0..3 {
            pool.get_page(&schema, n).unwrap();
        }

        pool.increment_page_numbers("t", 1);
        let mut numbers = pool.cached_page_numbers("t");
        numbers.sort();
        assert_eq!(numbers, vec![0, 2, 3]);

        pool.decrement_page_numbers("t", 2);
        let mut numbers = pool.cached_page_numbers("t");
        numbers.sort();
        assert_eq!(numbers, vec![0, 1, 2]);
    }

    #[test]
    fn test_remove_table_skips_write_back() {
        let (mut pool, schema, _dir) = create_pool(10, 2);
        pool.get_page(&schema, 0).unwrap().unwrap().records_mut().clear();
        let writes = pool.disk_manager().get_num_writes();

        pool.remove_table("t");
        assert!(pool.is_empty());
        assert_eq!(pool.disk_manager().get_num_writes(), writes);
        let page = pool.read_detached(&schema, PageIndex::new(1)).unwrap().unwrap();
        assert_eq!(page.record_count(), 1);
    }

    #[test]
    fn test_read_detached_does_not_admit() {
        let (pool, schema, _dir) = create_pool(10, 2);
        let page = pool.read_detached(&schema, PageIndex::new(0)).unwrap().unwrap();
        assert_eq!(page.page_number(), 1);
        assert!(pool.is_empty());
        assert!(pool.read_detached(&schema, PageIndex::new(9)).unwrap().is_none());
    }
}
