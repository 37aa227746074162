//! InnoDB page header and trailer parsing.
//!
//! Every InnoDB page begins with a 38-byte FIL header ([`FilHeader`]) containing
//! the checksum, page number, prev/next pointers, LSN, page type, flush LSN, and
//! space ID. The last 8 bytes form the FIL trailer ([`FilTrailer`]) with the
//! old-style checksum and low 32 bits of the LSN.
//!
//! Page 0 of every tablespace also contains the FSP header ([`FspHeader`]) at
//! byte offset 38, which stores the space ID, tablespace size, and feature flags
//! (page size, compressed page size).
//!
//! A [`Page`] bundles the raw bytes of one page with its parsed header and
//! classification, as handed out by the page reader.

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use crate::innodb::constants::*;
use crate::innodb::index::IndexHeader;
use crate::innodb::page_types::{PageKind, PageType};
use crate::IbdError;

/// Parsed FIL header (38 bytes, present at the start of every InnoDB page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilHeader {
    /// Checksum (or space id in very old formats). Bytes 0-3.
    pub checksum: u32,
    /// Page number within the tablespace. Bytes 4-7.
    pub page_number: u32,
    /// Previous page at the same B+Tree level, FIL_NULL if none. Bytes 8-11.
    pub prev_page: u32,
    /// Next page at the same B+Tree level, FIL_NULL if none. Bytes 12-15.
    pub next_page: u32,
    /// LSN of newest modification to this page. Bytes 16-23.
    pub lsn: u64,
    /// Page type. Bytes 24-25.
    pub page_type: PageType,
    /// Flush LSN (only meaningful for page 0 of the system tablespace). Bytes 26-33.
    pub flush_lsn: u64,
    /// Space ID this page belongs to. Bytes 34-37.
    pub space_id: u32,
}

impl FilHeader {
    /// Parse a FIL header from a byte slice of at least 38 bytes.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIZE_FIL_HEAD {
            return None;
        }

        Some(FilHeader {
            checksum: BigEndian::read_u32(&data[FIL_PAGE_SPACE_OR_CHKSUM..]),
            page_number: BigEndian::read_u32(&data[FIL_PAGE_OFFSET..]),
            prev_page: BigEndian::read_u32(&data[FIL_PAGE_PREV..]),
            next_page: BigEndian::read_u32(&data[FIL_PAGE_NEXT..]),
            lsn: BigEndian::read_u64(&data[FIL_PAGE_LSN..]),
            page_type: PageType::from_u16(BigEndian::read_u16(&data[FIL_PAGE_TYPE..])),
            flush_lsn: BigEndian::read_u64(&data[FIL_PAGE_FILE_FLUSH_LSN..]),
            space_id: BigEndian::read_u32(&data[FIL_PAGE_SPACE_ID..]),
        })
    }

    /// Returns true if there is a previous sibling page.
    pub fn has_prev(&self) -> bool {
        self.prev_page != FIL_NULL
    }

    /// Returns true if there is a next sibling page.
    pub fn has_next(&self) -> bool {
        self.next_page != FIL_NULL
    }
}

/// Parsed FIL trailer (8 bytes, present at the end of every InnoDB page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilTrailer {
    /// Old-style checksum, or a copy of the CRC-32C header checksum.
    pub checksum: u32,
    /// Low 32 bits of the LSN.
    pub lsn_low32: u32,
}

impl FilTrailer {
    /// Parse a FIL trailer from the last 8 bytes of a page.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < SIZE_FIL_TRAILER {
            return None;
        }

        Some(FilTrailer {
            checksum: BigEndian::read_u32(&data[0..]),
            lsn_low32: BigEndian::read_u32(&data[4..]),
        })
    }
}

/// Parsed FSP header (from page 0 of a tablespace, starts at FIL_PAGE_DATA).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FspHeader {
    /// Space ID.
    pub space_id: u32,
    /// Size of the tablespace in pages.
    pub size: u32,
    /// Minimum page number not yet initialized.
    pub free_limit: u32,
    /// Space flags (page size, compressed page size, format bits).
    pub flags: u32,
    /// Number of used pages in the FSP_FREE_FRAG list.
    pub frag_n_used: u32,
}

impl FspHeader {
    /// Parse the FSP header from a full page 0 buffer.
    pub fn parse(page_data: &[u8]) -> Option<Self> {
        let offset = FIL_PAGE_DATA;
        if page_data.len() < offset + FSP_HEADER_SIZE {
            return None;
        }
        let data = &page_data[offset..];

        Some(FspHeader {
            space_id: BigEndian::read_u32(&data[FSP_SPACE_ID..]),
            size: BigEndian::read_u32(&data[FSP_SIZE..]),
            free_limit: BigEndian::read_u32(&data[FSP_FREE_LIMIT..]),
            flags: BigEndian::read_u32(&data[FSP_SPACE_FLAGS..]),
            frag_n_used: BigEndian::read_u32(&data[FSP_FRAG_N_USED..]),
        })
    }

    /// Logical page size encoded in the flags.
    ///
    /// A zero `PAGE_SSIZE` means the 16K default; otherwise the size is
    /// `1 << (ssize + 9)` (ssize 3 = 4K up to ssize 7 = 64K).
    pub fn page_size_from_flags(&self) -> u32 {
        let ssize = (self.flags & FSP_FLAGS_MASK_PAGE_SSIZE) >> FSP_FLAGS_POS_PAGE_SSIZE;
        if ssize == 0 {
            SIZE_PAGE_DEFAULT
        } else {
            1u32 << (ssize + 9)
        }
    }

    /// Returns true if the tablespace stores compressed (KEY_BLOCK_SIZE) pages.
    pub fn is_compressed(&self) -> bool {
        (self.flags & FSP_FLAGS_MASK_ZIP_SSIZE) != 0
    }
}

/// Returns true if `page_size` is one InnoDB supports.
pub fn is_valid_page_size(page_size: u32) -> bool {
    matches!(
        page_size,
        SIZE_PAGE_4K | SIZE_PAGE_8K | SIZE_PAGE_16K | SIZE_PAGE_32K | SIZE_PAGE_64K
    )
}

/// One fetched page: raw bytes plus parsed header and classification.
///
/// Pages are immutable once built and shared through `Arc` by the page cache.
#[derive(Debug, Clone)]
pub struct Page {
    page_no: u32,
    data: Vec<u8>,
    header: FilHeader,
    kind: PageKind,
    index: Option<IndexHeader>,
}

impl Page {
    /// Parse and classify a page.
    ///
    /// Fails with [`IbdError::UnsupportedFormat`] for page type values MySQL
    /// does not define, and with [`IbdError::Parse`] when the buffer is
    /// shorter than `page_size` or a B+Tree page lacks its index header.
    ///
    /// # Examples
    ///
    /// ```
    /// use byteorder::{BigEndian, ByteOrder};
    /// use ibread::innodb::page::Page;
    /// use ibread::innodb::page_types::PageKind;
    ///
    /// let mut buf = vec![0u8; 16384];
    /// BigEndian::write_u32(&mut buf[4..], 3);
    /// BigEndian::write_u16(&mut buf[24..], 10); // BLOB
    ///
    /// let page = Page::parse(3, buf, 16384).unwrap();
    /// assert_eq!(page.kind(), PageKind::Overflow);
    /// assert!(page.index_header().is_none());
    /// ```
    pub fn parse(page_no: u32, data: Vec<u8>, page_size: u32) -> Result<Self, IbdError> {
        if data.len() < page_size as usize {
            return Err(IbdError::Parse(format!(
                "page {} is {} bytes, expected {}",
                page_no,
                data.len(),
                page_size
            )));
        }
        let header = FilHeader::parse(&data)
            .ok_or_else(|| IbdError::Parse(format!("page {} is too short for a FIL header", page_no)))?;
        let kind = header.page_type.kind().ok_or_else(|| IbdError::UnsupportedFormat {
            page_no: Some(page_no),
            detail: format!("unrecognized page type {}", header.page_type.as_u16()),
        })?;
        let index = if kind == PageKind::BTreeNode {
            Some(IndexHeader::parse(&data).ok_or_else(|| {
                IbdError::Parse(format!("page {} is too short for an INDEX header", page_no))
            })?)
        } else {
            None
        };

        Ok(Page {
            page_no,
            data,
            header,
            kind,
            index,
        })
    }

    /// Page number this page was read from.
    pub fn page_no(&self) -> u32 {
        self.page_no
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn header(&self) -> &FilHeader {
        &self.header
    }

    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    /// INDEX page header, present on B+Tree node pages only.
    pub fn index_header(&self) -> Option<&IndexHeader> {
        self.index.as_ref()
    }

    /// B+Tree level (0 = leaf), `None` for non-index pages.
    pub fn level(&self) -> Option<u16> {
        self.index.as_ref().map(|h| h.level)
    }

    pub fn trailer(&self) -> Option<FilTrailer> {
        let start = self.data.len().checked_sub(SIZE_FIL_TRAILER)?;
        FilTrailer::parse(&self.data[start..])
    }

    /// Next sibling page number, if any.
    pub fn next_page(&self) -> Option<u32> {
        self.header.has_next().then_some(self.header.next_page)
    }

    /// Require this page to be of the given kind.
    pub fn expect_kind(&self, kind: PageKind) -> Result<(), IbdError> {
        if self.kind != kind {
            return Err(IbdError::UnsupportedFormat {
                page_no: Some(self.page_no),
                detail: format!("expected a {} page, found {}", kind, self.header.page_type),
            });
        }
        Ok(())
    }
}
