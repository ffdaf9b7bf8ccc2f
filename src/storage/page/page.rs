use crate::common::{PageIndex, PageNumber};
use crate::tuple::Record;

/// In-memory image of one page of a table.
///
/// Pages of a table form a doubly linked list ordered by logical page
/// number. Links are physical slot indices into the table file, never
/// references, so a page can be evicted and reloaded as a new object
/// without invalidating its neighbours.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Owning table
    table: String,
    /// Physical slot in the table file
    page_index: PageIndex,
    /// Logical position in the table's page sequence
    page_number: PageNumber,
    /// Records in slot order
    records: Vec<Record>,
    prev_page_index: Option<PageIndex>,
    next_page_index: Option<PageIndex>,
}

impl Page {
    /// Creates an empty, unlinked page.
    pub fn new(table: impl Into<String>, page_index: PageIndex, page_number: PageNumber) -> Self {
        Self {
            table: table.into(),
            page_index,
            page_number,
            records: Vec::new(),
            prev_page_index: None,
            next_page_index: None,
        }
    }

    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = records;
        self
    }

    pub fn with_links(mut self, prev: Option<PageIndex>, next: Option<PageIndex>) -> Self {
        self.prev_page_index = prev;
        self.next_page_index = next;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn page_index(&self) -> PageIndex {
        self.page_index
    }

    pub fn page_number(&self) -> PageNumber {
        self.page_number
    }

    pub fn set_page_number(&mut self, page_number: PageNumber) {
        self.page_number = page_number;
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    pub fn record(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn prev_page_index(&self) -> Option<PageIndex> {
        self.prev_page_index
    }

    pub fn set_prev_page_index(&mut self, prev: Option<PageIndex>) {
        self.prev_page_index = prev;
    }

    pub fn next_page_index(&self) -> Option<PageIndex> {
        self.next_page_index
    }

    pub fn set_next_page_index(&mut self, next: Option<PageIndex>) {
        self.next_page_index = next;
    }
}
