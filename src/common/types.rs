use std::fmt;

/// Physical slot of a page inside its table file.
///
/// Byte offset of the slot is `TABLE_FILE_HEADER_SIZE + index * page_size`.
/// A page keeps its physical index for its whole life, while its logical
/// [`PageNumber`] shifts as neighbouring pages are split or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageIndex(pub u32);

impl PageIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Offset of this slot from the first slot, in pages.
    pub fn as_u64(&self) -> u64 {
        self.0 as u64
    }

    /// Returns the slot `n` positions after this one.
    pub fn offset(&self, n: u32) -> Self {
        Self(self.0 + n)
    }

    /// Converts an on-disk link value, where `-1` means "no page".
    pub fn from_link(raw: i32) -> Option<Self> {
        if raw < 0 {
            None
        } else {
            Some(Self(raw as u32))
        }
    }

    /// Converts an optional index to its on-disk link value.
    pub fn to_link(index: Option<Self>) -> i32 {
        index.map(|i| i.0 as i32).unwrap_or(-1)
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageIndex({})", self.0)
    }
}

/// Logical position of a page in its table's linked sequence (0-based).
pub type PageNumber = u32;

/// Location of a record: the physical page that holds it and its slot in
/// that page's record list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_index: PageIndex,
    pub record_index: usize,
}

impl RecordId {
    pub fn new(page_index: PageIndex, record_index: usize) -> Self {
        Self {
            page_index,
            record_index,
        }
    }
}
