//! Conversion between pages and fixed-size disk blocks.
//!
//! ## Block Format
//!
//! ```text
//! +-------------+--------------+-----------+---------+------------+------------+
//! | page_number | record_count | records   | padding | prev_index | next_index |
//! | i32         | i32          | ...       | zeros   | i32        | i32        |
//! +-------------+--------------+-----------+---------+------------+------------+
//! ```
//!
//! All integers are big-endian. The link trailer sits in the last
//! [`PAGE_TRAILER_SIZE`] bytes of the block; `-1` means no page. A block
//! whose page number is [`FREE_SLOT_MARKER`] belongs to a dropped page.

use bytes::{Buf, BufMut, BytesMut};

use super::Page;
use crate::common::{
    PageIndex, Result, StorageError, FREE_SLOT_MARKER, NO_PAGE_LINK, PAGE_HEADER_SIZE,
    PAGE_TRAILER_SIZE,
};
use crate::tuple::{Attribute, Record};

/// Bytes a page holding `records` needs, header and trailer included.
pub fn encoded_size(records: &[Record]) -> usize {
    PAGE_HEADER_SIZE + records.iter().map(Record::encoded_len).sum::<usize>() + PAGE_TRAILER_SIZE
}

/// Room left for records in a page of the given size.
pub fn payload_capacity(page_size: usize) -> usize {
    page_size.saturating_sub(PAGE_HEADER_SIZE + PAGE_TRAILER_SIZE)
}

/// True if the records fit a single page.
pub fn fits(records: &[Record], page_size: usize) -> bool {
    encoded_size(records) <= page_size
}

/// Encodes a page into a block of exactly `page_size` bytes.
///
/// Fails with [`StorageError::PageOverflow`] when the records do not fit;
/// the caller must split the page and encode the halves.
pub fn encode(page: &Page, page_size: usize) -> Result<BytesMut> {
    let size = encoded_size(page.records());
    if size > page_size {
        return Err(StorageError::PageOverflow { size, page_size });
    }

    let mut buf = BytesMut::with_capacity(page_size);
    buf.put_i32(page.page_number() as i32);
    buf.put_i32(page.record_count() as i32);
    for record in page.records() {
        record.write_to(&mut buf);
    }
    buf.resize(page_size - PAGE_TRAILER_SIZE, 0);
    buf.put_i32(PageIndex::to_link(page.prev_page_index()));
    buf.put_i32(PageIndex::to_link(page.next_page_index()));
    Ok(buf)
}

/// Block written over the slot of a dropped page.
pub fn free_block(page_size: usize) -> BytesMut {
    let mut buf = BytesMut::with_capacity(page_size);
    buf.put_i32(FREE_SLOT_MARKER);
    buf.put_i32(0);
    buf.resize(page_size - PAGE_TRAILER_SIZE, 0);
    buf.put_i32(NO_PAGE_LINK);
    buf.put_i32(NO_PAGE_LINK);
    buf
}

/// True if the block belongs to a dropped page.
pub fn is_free_block(bytes: &[u8]) -> bool {
    bytes.len() >= 4
        && i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) == FREE_SLOT_MARKER
}

/// Decodes the block stored in slot `page_index` of `table`.
///
/// Returns `Ok(None)` for a freed slot. Fails with
/// [`StorageError::CorruptPage`] when the block length differs from
/// `page_size` or the records cannot be read with the given attributes.
pub fn decode(
    table: &str,
    page_index: PageIndex,
    bytes: &[u8],
    attributes: &[Attribute],
    page_size: usize,
) -> Result<Option<Page>> {
    let corrupt = |reason: String| StorageError::CorruptPage {
        table: table.to_string(),
        page_index,
        reason,
    };

    if bytes.len() != page_size {
        return Err(corrupt(format!(
            "read {} bytes, page size is {}",
            bytes.len(),
            page_size
        )));
    }
    if is_free_block(bytes) {
        return Ok(None);
    }

    let mut header = &bytes[..PAGE_HEADER_SIZE];
    let page_number = header.get_i32();
    let record_count = header.get_i32();
    if page_number < 0 {
        return Err(corrupt(format!("negative page number {}", page_number)));
    }
    if record_count < 0 {
        return Err(corrupt(format!("negative record count {}", record_count)));
    }

    let mut body = &bytes[PAGE_HEADER_SIZE..page_size - PAGE_TRAILER_SIZE];
    let mut records = Vec::with_capacity(record_count as usize);
    for i in 0..record_count {
        let record = Record::read_from(&mut body, attributes)
            .ok_or_else(|| corrupt(format!("record {} of {} is malformed", i, record_count)))?;
        records.push(record);
    }

    let mut trailer = &bytes[page_size - PAGE_TRAILER_SIZE..];
    let prev_raw = trailer.get_i32();
    let next_raw = trailer.get_i32();
    for raw in [prev_raw, next_raw] {
        if raw < NO_PAGE_LINK {
            return Err(StorageError::IndexOutOfRange(raw as i64));
        }
    }

    let page = Page::new(table, page_index, page_number as u32)
        .with_records(records)
        .with_links(PageIndex::from_link(prev_raw), PageIndex::from_link(next_raw));
    Ok(Some(page))
}
