//! INDEX page header parsing.
//!
//! INDEX pages (page type 17855 / `FIL_PAGE_INDEX`) are the B+Tree nodes that
//! store table rows. Each INDEX page carries a 36-byte [`IndexHeader`] at
//! `FIL_PAGE_DATA` (byte 38), followed by two 10-byte file segment headers and
//! the infimum/supremum system records at `PAGE_DATA` (byte 94).

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use crate::innodb::constants::*;
use crate::innodb::schema::RowFormat;
use crate::IbdError;

/// Parsed INDEX page header (36 bytes at FIL_PAGE_DATA).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexHeader {
    /// Number of directory slots in the page directory.
    pub n_dir_slots: u16,
    /// Pointer to record heap top.
    pub heap_top: u16,
    /// Number of records in the heap. Bit 15 is the compact format flag.
    pub n_heap_raw: u16,
    /// Pointer to start of free record list (0 if none).
    pub free: u16,
    /// Number of bytes in deleted records.
    pub garbage: u16,
    /// Pointer to the last inserted record (0 if reset).
    pub last_insert: u16,
    /// Number of user records on the page.
    pub n_recs: u16,
    /// Highest trx id that may have modified a record (secondary indexes only).
    pub max_trx_id: u64,
    /// Level in the B+Tree (0 = leaf).
    pub level: u16,
    /// Index ID the page belongs to.
    pub index_id: u64,
}

impl IndexHeader {
    /// Parse an INDEX page header from a full page buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use ibread::innodb::index::IndexHeader;
    /// use ibread::innodb::constants::*;
    /// use byteorder::{BigEndian, ByteOrder};
    ///
    /// let mut page = vec![0u8; 256];
    /// let base = FIL_PAGE_DATA;
    /// BigEndian::write_u16(&mut page[base + PAGE_N_HEAP..], 0x8003); // compact + 3 records
    /// BigEndian::write_u16(&mut page[base + PAGE_N_RECS..], 1);
    /// BigEndian::write_u16(&mut page[base + PAGE_LEVEL..], 0);
    /// BigEndian::write_u64(&mut page[base + PAGE_INDEX_ID..], 100);
    ///
    /// let hdr = IndexHeader::parse(&page).unwrap();
    /// assert!(hdr.is_compact());
    /// assert_eq!(hdr.n_heap(), 3);
    /// assert_eq!(hdr.n_recs, 1);
    /// assert!(hdr.is_leaf());
    /// assert_eq!(hdr.index_id, 100);
    /// ```
    pub fn parse(page_data: &[u8]) -> Option<Self> {
        let base = FIL_PAGE_DATA;
        if page_data.len() < base + PAGE_INDEX_HEADER_SIZE {
            return None;
        }
        let d = &page_data[base..];

        Some(IndexHeader {
            n_dir_slots: BigEndian::read_u16(&d[PAGE_N_DIR_SLOTS..]),
            heap_top: BigEndian::read_u16(&d[PAGE_HEAP_TOP..]),
            n_heap_raw: BigEndian::read_u16(&d[PAGE_N_HEAP..]),
            free: BigEndian::read_u16(&d[PAGE_FREE..]),
            garbage: BigEndian::read_u16(&d[PAGE_GARBAGE..]),
            last_insert: BigEndian::read_u16(&d[PAGE_LAST_INSERT..]),
            n_recs: BigEndian::read_u16(&d[PAGE_N_RECS..]),
            max_trx_id: BigEndian::read_u64(&d[PAGE_MAX_TRX_ID..]),
            level: BigEndian::read_u16(&d[PAGE_LEVEL..]),
            index_id: BigEndian::read_u64(&d[PAGE_INDEX_ID..]),
        })
    }

    /// Number of records in the heap (compact flag masked out).
    pub fn n_heap(&self) -> u16 {
        self.n_heap_raw & 0x7FFF
    }

    /// Returns true if this page uses the new-style compact record layout.
    pub fn is_compact(&self) -> bool {
        (self.n_heap_raw & 0x8000) != 0
    }

    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Offset of the infimum record origin for this page's layout.
    pub fn infimum_offset(&self) -> usize {
        if self.is_compact() {
            PAGE_NEW_INFIMUM
        } else {
            PAGE_OLD_INFIMUM
        }
    }

    /// Offset of the supremum record origin for this page's layout.
    pub fn supremum_offset(&self) -> usize {
        if self.is_compact() {
            PAGE_NEW_SUPREMUM
        } else {
            PAGE_OLD_SUPREMUM
        }
    }

    /// Check the page layout flag against the table's row format.
    ///
    /// A mismatch means the schema was paired with the wrong tablespace.
    pub fn check_row_format(&self, page_no: u32, row_format: RowFormat) -> Result<(), IbdError> {
        if self.is_compact() != row_format.is_compact_layout() {
            return Err(IbdError::UnsupportedFormat {
                page_no: Some(page_no),
                detail: format!(
                    "page uses the {} record layout but the table is {}",
                    if self.is_compact() { "compact" } else { "redundant" },
                    row_format
                ),
            });
        }
        Ok(())
    }
}
