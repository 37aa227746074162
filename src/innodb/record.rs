//! Record headers and record list traversal.
//!
//! Records on an INDEX page form a singly linked list in key order, from the
//! infimum system record to the supremum. Each record is addressed by its
//! *origin*, the offset where field data begins; the record header sits in the
//! bytes just before the origin and the variable header (null bitmap and
//! length array, or the end-offset array) grows further backwards from there.
//!
//! Two header layouts exist:
//!
//! - **Compact** (5 bytes, COMPACT/DYNAMIC/COMPRESSED): info bits and n_owned,
//!   13-bit heap number with a 3-bit record type, and a signed *relative*
//!   next-record offset.
//! - **Redundant** (6 bytes, REDUNDANT): info bits and n_owned, heap number,
//!   10-bit field count with a one-byte-offsets flag, and an *absolute*
//!   next-record offset. The record type is implied by the page level.
//!
//! [`walk_records`] follows the list on one page and returns user records only.

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use crate::innodb::constants::*;
use crate::innodb::page::Page;
use crate::IbdError;

/// Record type extracted from the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordType {
    /// Ordinary user record (leaf page).
    Ordinary,
    /// Node pointer record (non-leaf page).
    NodePtr,
    /// Infimum system record.
    Infimum,
    /// Supremum system record.
    Supremum,
}

impl RecordType {
    /// Convert the 3-bit status value of a compact header.
    ///
    /// # Examples
    ///
    /// ```
    /// use ibread::innodb::record::RecordType;
    ///
    /// assert_eq!(RecordType::from_u8(0), Some(RecordType::Ordinary));
    /// assert_eq!(RecordType::from_u8(1), Some(RecordType::NodePtr));
    /// assert_eq!(RecordType::from_u8(3), Some(RecordType::Supremum));
    /// assert_eq!(RecordType::from_u8(5), None);
    /// ```
    pub fn from_u8(val: u8) -> Option<Self> {
        match val & 0x07 {
            0 => Some(RecordType::Ordinary),
            1 => Some(RecordType::NodePtr),
            2 => Some(RecordType::Infimum),
            3 => Some(RecordType::Supremum),
            _ => None,
        }
    }

    /// MySQL source-style name (e.g. `"REC_STATUS_ORDINARY"`).
    pub fn name(&self) -> &'static str {
        match self {
            RecordType::Ordinary => "REC_STATUS_ORDINARY",
            RecordType::NodePtr => "REC_STATUS_NODE_PTR",
            RecordType::Infimum => "REC_STATUS_INFIMUM",
            RecordType::Supremum => "REC_STATUS_SUPREMUM",
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, RecordType::Infimum | RecordType::Supremum)
    }
}

/// Which header layout a page uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordLayout {
    Compact,
    Redundant,
}

impl RecordLayout {
    /// Size of the fixed record header preceding the origin.
    pub fn extra_bytes(&self) -> usize {
        match self {
            RecordLayout::Compact => REC_N_NEW_EXTRA_BYTES,
            RecordLayout::Redundant => REC_N_OLD_EXTRA_BYTES,
        }
    }
}

/// Parsed record header, either layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordHeader {
    /// Info bits (upper nibble of the first header byte).
    pub info_bits: u8,
    /// Number of records owned by this record in the page directory.
    pub n_owned: u8,
    /// Position in the page heap.
    pub heap_no: u16,
    pub rec_type: RecordType,
    /// Absolute origin of the next record, `None` at the end of the list.
    pub next_origin: Option<usize>,
    /// Stored field count (redundant layout only).
    pub n_fields: Option<u16>,
    /// Redundant layout: end offsets are one byte each.
    pub short_offsets: bool,
}

impl RecordHeader {
    /// Parse a compact header for the record at `origin`.
    ///
    /// # Examples
    ///
    /// ```
    /// use ibread::innodb::record::{RecordHeader, RecordType};
    /// use byteorder::{BigEndian, ByteOrder};
    ///
    /// let mut page = vec![0u8; 1024];
    /// let origin = 200;
    /// page[origin - 5] = 0x22; // delete mark, n_owned = 2
    /// BigEndian::write_u16(&mut page[origin - 4..], 7 << 3); // heap 7, ordinary
    /// BigEndian::write_i16(&mut page[origin - 2..], 42);
    ///
    /// let hdr = RecordHeader::parse_compact(&page, origin).unwrap();
    /// assert_eq!(hdr.n_owned, 2);
    /// assert!(hdr.delete_mark());
    /// assert_eq!(hdr.heap_no, 7);
    /// assert_eq!(hdr.rec_type, RecordType::Ordinary);
    /// assert_eq!(hdr.next_origin, Some(242));
    /// ```
    pub fn parse_compact(page_data: &[u8], origin: usize) -> Option<Self> {
        if origin < REC_N_NEW_EXTRA_BYTES || origin > page_data.len() {
            return None;
        }
        let byte0 = page_data[origin - 5];
        let two_bytes = BigEndian::read_u16(&page_data[origin - 4..]);
        let rec_type = RecordType::from_u8((two_bytes & 0x07) as u8)?;
        let rel = BigEndian::read_i16(&page_data[origin - 2..]);
        let next_origin = if rel == 0 {
            None
        } else {
            // Offsets wrap within the page like ut_align_offset
            let len = page_data.len() as isize;
            Some((origin as isize + rel as isize).rem_euclid(len) as usize)
        };

        Some(RecordHeader {
            info_bits: byte0 & 0xF0,
            n_owned: byte0 & 0x0F,
            heap_no: (two_bytes >> 3) & 0x1FFF,
            rec_type,
            next_origin,
            n_fields: None,
            short_offsets: false,
        })
    }

    /// Parse a redundant header for the record at `origin`.
    ///
    /// The record type is derived from the system record offsets and the
    /// page level, since the redundant layout does not store it.
    pub fn parse_redundant(page_data: &[u8], origin: usize, is_leaf: bool) -> Option<Self> {
        if origin < REC_N_OLD_EXTRA_BYTES || origin > page_data.len() {
            return None;
        }
        let byte0 = page_data[origin - 6];
        let heap_bits = BigEndian::read_u16(&page_data[origin - 5..]);
        let field_bits = BigEndian::read_u16(&page_data[origin - 4..]);
        let next = BigEndian::read_u16(&page_data[origin - 2..]) as usize;

        let rec_type = match origin {
            PAGE_OLD_INFIMUM => RecordType::Infimum,
            PAGE_OLD_SUPREMUM => RecordType::Supremum,
            _ if is_leaf => RecordType::Ordinary,
            _ => RecordType::NodePtr,
        };

        Some(RecordHeader {
            info_bits: byte0 & 0xF0,
            n_owned: byte0 & 0x0F,
            heap_no: (heap_bits & 0xFFF8) >> 3,
            rec_type,
            next_origin: (next != 0).then_some(next),
            n_fields: Some((field_bits & 0x07FE) >> 1),
            short_offsets: (field_bits & 0x0001) != 0,
        })
    }

    pub fn parse(page_data: &[u8], origin: usize, layout: RecordLayout, is_leaf: bool) -> Option<Self> {
        match layout {
            RecordLayout::Compact => Self::parse_compact(page_data, origin),
            RecordLayout::Redundant => Self::parse_redundant(page_data, origin, is_leaf),
        }
    }

    pub fn delete_mark(&self) -> bool {
        self.info_bits & REC_INFO_DELETED_FLAG != 0
    }

    /// Leftmost node pointer on its B+Tree level.
    pub fn min_rec(&self) -> bool {
        self.info_bits & REC_INFO_MIN_REC_FLAG != 0
    }

    /// Record written after an instant ADD COLUMN (MySQL 8.0.12+).
    pub fn instant(&self) -> bool {
        self.info_bits & REC_INFO_INSTANT_FLAG != 0
    }

    /// Record carrying a row version (MySQL 8.0.29+ instant ADD/DROP).
    pub fn versioned(&self) -> bool {
        self.info_bits & REC_INFO_VERSION_FLAG != 0
    }
}

/// A record position on a page, with its parsed header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordInfo {
    /// Absolute offset of the record origin within the page.
    pub origin: usize,
    pub header: RecordHeader,
}

/// Walk all user records on an INDEX page in list (key) order.
///
/// Starts at the infimum and follows next-record links to the supremum.
/// A link that leaves the page, a cycle, or a list that never reaches the
/// supremum is reported as [`IbdError::Parse`].
pub fn walk_records(page: &Page) -> Result<Vec<RecordInfo>, IbdError> {
    let page_no = page.page_no();
    let index = page.index_header().ok_or_else(|| IbdError::UnsupportedFormat {
        page_no: Some(page_no),
        detail: format!("{} page has no record list", page.page_type()),
    })?;
    let data = page.data();
    let layout = if index.is_compact() {
        RecordLayout::Compact
    } else {
        RecordLayout::Redundant
    };
    let is_leaf = index.is_leaf();
    let broken = |detail: String| IbdError::Parse(format!("page {}: {}", page_no, detail));

    let infimum_origin = index.infimum_offset();
    let infimum = RecordHeader::parse(data, infimum_origin, layout, is_leaf)
        .ok_or_else(|| broken("unreadable infimum record".to_string()))?;

    let mut records = Vec::with_capacity(index.n_recs as usize);
    let mut next = infimum.next_origin;
    // Every record is visited at most once
    let max_records = data.len() / layout.extra_bytes();

    loop {
        let origin = next.ok_or_else(|| broken("record list ends before the supremum".to_string()))?;
        if origin < PAGE_DATA_OFFSET + layout.extra_bytes() || origin >= data.len() - SIZE_FIL_TRAILER {
            return Err(broken(format!("next-record link points outside the page ({})", origin)));
        }
        let header = RecordHeader::parse(data, origin, layout, is_leaf)
            .ok_or_else(|| broken(format!("unreadable record header at {}", origin)))?;
        match header.rec_type {
            RecordType::Supremum => break,
            RecordType::Infimum => {
                return Err(broken(format!("record list loops back to the infimum at {}", origin)))
            }
            RecordType::Ordinary | RecordType::NodePtr => {}
        }
        next = header.next_origin;
        records.push(RecordInfo { origin, header });
        if records.len() > max_records {
            return Err(broken("record list contains a cycle".to_string()));
        }
    }

    Ok(records)
}
