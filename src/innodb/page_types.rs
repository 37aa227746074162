//! InnoDB page type definitions and classification.
//!
//! Maps the 2-byte page type field (bytes 24-25 of the FIL header) to a
//! [`PageType`], and groups page types into the [`PageKind`]s the row reader
//! cares about: B+Tree nodes, overflow pages of externally stored columns,
//! the file space header, and administrative pages that never hold rows.
//!
//! Values not defined by MySQL are kept as [`PageType::Unrecognized`] so that
//! the reader can surface them as errors instead of guessing.

use serde::Serialize;
use std::fmt;

/// InnoDB page types from MySQL 5.6 through 8.0 (`fil0fil.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PageType {
    /// Freshly allocated, type field not initialized (FIL_PAGE_TYPE_ALLOCATED = 0)
    Allocated,
    /// FIL_PAGE_TYPE_UNUSED = 1
    Unused,
    /// Undo log page (FIL_PAGE_UNDO_LOG = 2)
    UndoLog,
    /// File segment inode (FIL_PAGE_INODE = 3)
    Inode,
    /// Insert buffer free list (FIL_PAGE_IBUF_FREE_LIST = 4)
    IbufFreeList,
    /// Insert buffer bitmap (FIL_PAGE_IBUF_BITMAP = 5)
    IbufBitmap,
    /// System internal page (FIL_PAGE_TYPE_SYS = 6)
    Sys,
    /// Transaction system header (FIL_PAGE_TYPE_TRX_SYS = 7)
    TrxSys,
    /// File space header, page 0 of each tablespace (FIL_PAGE_TYPE_FSP_HDR = 8)
    FspHdr,
    /// Extent descriptor (FIL_PAGE_TYPE_XDES = 9)
    Xdes,
    /// Uncompressed BLOB page (FIL_PAGE_TYPE_BLOB = 10)
    Blob,
    /// First compressed BLOB page (FIL_PAGE_TYPE_ZBLOB = 11)
    ZBlob,
    /// Subsequent compressed BLOB page (FIL_PAGE_TYPE_ZBLOB2 = 12)
    ZBlob2,
    /// FIL_PAGE_TYPE_UNKNOWN = 13
    Unknown,
    /// Compressed page (FIL_PAGE_COMPRESSED = 14)
    Compressed,
    /// Encrypted page (FIL_PAGE_ENCRYPTED = 15)
    Encrypted,
    /// FIL_PAGE_COMPRESSED_AND_ENCRYPTED = 16
    CompressedEncrypted,
    /// FIL_PAGE_ENCRYPTED_RTREE = 17
    EncryptedRtree,
    /// Uncompressed SDI BLOB page (FIL_PAGE_SDI_BLOB = 18)
    SdiBlob,
    /// Compressed SDI BLOB page (FIL_PAGE_SDI_ZBLOB = 19)
    SdiZblob,
    /// FIL_PAGE_TYPE_LEGACY_DBLWR = 20
    LegacyDblwr,
    /// FIL_PAGE_TYPE_RSEG_ARRAY = 21
    RsegArray,
    /// LOB index page (FIL_PAGE_TYPE_LOB_INDEX = 22)
    LobIndex,
    /// LOB data page (FIL_PAGE_TYPE_LOB_DATA = 23)
    LobData,
    /// LOB first page (FIL_PAGE_TYPE_LOB_FIRST = 24)
    LobFirst,
    /// FIL_PAGE_TYPE_ZLOB_FIRST = 25
    ZlobFirst,
    /// FIL_PAGE_TYPE_ZLOB_DATA = 26
    ZlobData,
    /// FIL_PAGE_TYPE_ZLOB_INDEX = 27
    ZlobIndex,
    /// FIL_PAGE_TYPE_ZLOB_FRAG = 28
    ZlobFrag,
    /// FIL_PAGE_TYPE_ZLOB_FRAG_ENTRY = 29
    ZlobFragEntry,
    /// SDI index page (FIL_PAGE_SDI = 17853)
    Sdi,
    /// R-tree index page (FIL_PAGE_RTREE = 17854)
    Rtree,
    /// B+Tree index page (FIL_PAGE_INDEX = 17855)
    Index,
    /// A value MySQL does not define.
    Unrecognized(u16),
}

/// Coarse page role used by the row reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PageKind {
    /// B+Tree node (root, internal or leaf, told apart by the page level).
    BTreeNode,
    /// Old-style uncompressed BLOB chain page.
    Overflow,
    /// MySQL 8.0 uncompressed LOB page (first, index or data).
    LargeObject,
    /// Compressed BLOB/LOB page; recognized but not decoded.
    CompressedLargeObject,
    /// File space header (page 0).
    SpaceHeader,
    /// Bookkeeping page with no row content.
    Administrative,
}

impl PageType {
    /// Parse a page type from the u16 value in the FIL header.
    ///
    /// # Examples
    ///
    /// ```
    /// use ibread::innodb::page_types::{PageKind, PageType};
    ///
    /// assert_eq!(PageType::from_u16(17855), PageType::Index);
    /// assert_eq!(PageType::from_u16(10).kind(), Some(PageKind::Overflow));
    /// assert_eq!(PageType::from_u16(9999), PageType::Unrecognized(9999));
    /// assert_eq!(PageType::from_u16(9999).kind(), None);
    /// ```
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => PageType::Allocated,
            1 => PageType::Unused,
            2 => PageType::UndoLog,
            3 => PageType::Inode,
            4 => PageType::IbufFreeList,
            5 => PageType::IbufBitmap,
            6 => PageType::Sys,
            7 => PageType::TrxSys,
            8 => PageType::FspHdr,
            9 => PageType::Xdes,
            10 => PageType::Blob,
            11 => PageType::ZBlob,
            12 => PageType::ZBlob2,
            13 => PageType::Unknown,
            14 => PageType::Compressed,
            15 => PageType::Encrypted,
            16 => PageType::CompressedEncrypted,
            17 => PageType::EncryptedRtree,
            18 => PageType::SdiBlob,
            19 => PageType::SdiZblob,
            20 => PageType::LegacyDblwr,
            21 => PageType::RsegArray,
            22 => PageType::LobIndex,
            23 => PageType::LobData,
            24 => PageType::LobFirst,
            25 => PageType::ZlobFirst,
            26 => PageType::ZlobData,
            27 => PageType::ZlobIndex,
            28 => PageType::ZlobFrag,
            29 => PageType::ZlobFragEntry,
            17853 => PageType::Sdi,
            17854 => PageType::Rtree,
            17855 => PageType::Index,
            other => PageType::Unrecognized(other),
        }
    }

    /// The on-disk value of this page type.
    pub fn as_u16(self) -> u16 {
        match self {
            PageType::Allocated => 0,
            PageType::Unused => 1,
            PageType::UndoLog => 2,
            PageType::Inode => 3,
            PageType::IbufFreeList => 4,
            PageType::IbufBitmap => 5,
            PageType::Sys => 6,
            PageType::TrxSys => 7,
            PageType::FspHdr => 8,
            PageType::Xdes => 9,
            PageType::Blob => 10,
            PageType::ZBlob => 11,
            PageType::ZBlob2 => 12,
            PageType::Unknown => 13,
            PageType::Compressed => 14,
            PageType::Encrypted => 15,
            PageType::CompressedEncrypted => 16,
            PageType::EncryptedRtree => 17,
            PageType::SdiBlob => 18,
            PageType::SdiZblob => 19,
            PageType::LegacyDblwr => 20,
            PageType::RsegArray => 21,
            PageType::LobIndex => 22,
            PageType::LobData => 23,
            PageType::LobFirst => 24,
            PageType::ZlobFirst => 25,
            PageType::ZlobData => 26,
            PageType::ZlobIndex => 27,
            PageType::ZlobFrag => 28,
            PageType::ZlobFragEntry => 29,
            PageType::Sdi => 17853,
            PageType::Rtree => 17854,
            PageType::Index => 17855,
            PageType::Unrecognized(v) => v,
        }
    }

    /// Classify this page type, or `None` if the value is not recognized.
    pub fn kind(self) -> Option<PageKind> {
        let kind = match self {
            PageType::Index | PageType::Sdi | PageType::Rtree => PageKind::BTreeNode,
            PageType::Blob | PageType::SdiBlob => PageKind::Overflow,
            PageType::LobFirst | PageType::LobIndex | PageType::LobData => PageKind::LargeObject,
            PageType::ZBlob
            | PageType::ZBlob2
            | PageType::SdiZblob
            | PageType::ZlobFirst
            | PageType::ZlobData
            | PageType::ZlobIndex
            | PageType::ZlobFrag
            | PageType::ZlobFragEntry => PageKind::CompressedLargeObject,
            PageType::FspHdr => PageKind::SpaceHeader,
            PageType::Allocated
            | PageType::Unused
            | PageType::UndoLog
            | PageType::Inode
            | PageType::IbufFreeList
            | PageType::IbufBitmap
            | PageType::Sys
            | PageType::TrxSys
            | PageType::Xdes
            | PageType::Unknown
            | PageType::Compressed
            | PageType::Encrypted
            | PageType::CompressedEncrypted
            | PageType::EncryptedRtree
            | PageType::LegacyDblwr
            | PageType::RsegArray => PageKind::Administrative,
            PageType::Unrecognized(_) => return None,
        };
        Some(kind)
    }

    /// MySQL source name, e.g. `INDEX` or `LOB_FIRST`.
    pub fn name(self) -> &'static str {
        match self {
            PageType::Allocated => "ALLOCATED",
            PageType::Unused => "UNUSED",
            PageType::UndoLog => "UNDO_LOG",
            PageType::Inode => "INODE",
            PageType::IbufFreeList => "IBUF_FREE_LIST",
            PageType::IbufBitmap => "IBUF_BITMAP",
            PageType::Sys => "SYS",
            PageType::TrxSys => "TRX_SYS",
            PageType::FspHdr => "FSP_HDR",
            PageType::Xdes => "XDES",
            PageType::Blob => "BLOB",
            PageType::ZBlob => "ZBLOB",
            PageType::ZBlob2 => "ZBLOB2",
            PageType::Unknown => "UNKNOWN",
            PageType::Compressed => "COMPRESSED",
            PageType::Encrypted => "ENCRYPTED",
            PageType::CompressedEncrypted => "COMPRESSED_ENCRYPTED",
            PageType::EncryptedRtree => "ENCRYPTED_RTREE",
            PageType::SdiBlob => "SDI_BLOB",
            PageType::SdiZblob => "SDI_ZBLOB",
            PageType::LegacyDblwr => "LEGACY_DBLWR",
            PageType::RsegArray => "RSEG_ARRAY",
            PageType::LobIndex => "LOB_INDEX",
            PageType::LobData => "LOB_DATA",
            PageType::LobFirst => "LOB_FIRST",
            PageType::ZlobFirst => "ZLOB_FIRST",
            PageType::ZlobData => "ZLOB_DATA",
            PageType::ZlobIndex => "ZLOB_INDEX",
            PageType::ZlobFrag => "ZLOB_FRAG",
            PageType::ZlobFragEntry => "ZLOB_FRAG_ENTRY",
            PageType::Sdi => "SDI",
            PageType::Rtree => "RTREE",
            PageType::Index => "INDEX",
            PageType::Unrecognized(_) => "UNRECOGNIZED",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageType::Unrecognized(v) => write!(f, "UNRECOGNIZED({})", v),
            other => f.write_str(other.name()),
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageKind::BTreeNode => "b-tree node",
            PageKind::Overflow => "overflow",
            PageKind::LargeObject => "large object",
            PageKind::CompressedLargeObject => "compressed large object",
            PageKind::SpaceHeader => "space header",
            PageKind::Administrative => "administrative",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_defined_value_round_trips() {
        for v in (0u16..=29).chain([17853, 17854, 17855]) {
            let pt = PageType::from_u16(v);
            assert!(!matches!(pt, PageType::Unrecognized(_)), "value {}", v);
            assert_eq!(pt.as_u16(), v);
        }
    }

    #[test]
    fn test_unrecognized_values_keep_raw_code() {
        let pt = PageType::from_u16(34354);
        assert_eq!(pt, PageType::Unrecognized(34354));
        assert_eq!(pt.as_u16(), 34354);
        assert_eq!(pt.to_string(), "UNRECOGNIZED(34354)");
        assert!(pt.kind().is_none());
    }

    #[test]
    fn test_classification() {
        assert_eq!(PageType::Index.kind(), Some(PageKind::BTreeNode));
        assert_eq!(PageType::Blob.kind(), Some(PageKind::Overflow));
        assert_eq!(PageType::LobFirst.kind(), Some(PageKind::LargeObject));
        assert_eq!(PageType::LobData.kind(), Some(PageKind::LargeObject));
        assert_eq!(PageType::ZBlob.kind(), Some(PageKind::CompressedLargeObject));
        assert_eq!(PageType::ZlobFirst.kind(), Some(PageKind::CompressedLargeObject));
        assert_eq!(PageType::FspHdr.kind(), Some(PageKind::SpaceHeader));
        assert_eq!(PageType::Inode.kind(), Some(PageKind::Administrative));
    }

    #[test]
    fn test_display_uses_source_name() {
        assert_eq!(PageType::Index.to_string(), "INDEX");
        assert_eq!(PageType::LobFirst.to_string(), "LOB_FIRST");
    }
}
