/// InnoDB page, record and large-object structure constants.
///
/// These values are derived from the MySQL/InnoDB source code headers:
/// - fil0fil.h (FIL header/trailer)
/// - page0page.h (page header, system records)
/// - fsp0fsp.h (FSP header)
/// - rem0rec.h (record extra bytes, info bits)
/// - btr0types.h / lob0*.h (external field references, LOB pages)
// Page sizes
pub const SIZE_PAGE_DEFAULT: u32 = 16384;
pub const SIZE_PAGE_4K: u32 = 4096;
pub const SIZE_PAGE_8K: u32 = 8192;
pub const SIZE_PAGE_16K: u32 = 16384;
pub const SIZE_PAGE_32K: u32 = 32768;
pub const SIZE_PAGE_64K: u32 = 65536;

// FIL Header (38 bytes total)
pub const SIZE_FIL_HEAD: usize = 38;
pub const FIL_PAGE_SPACE_OR_CHKSUM: usize = 0; // 4 bytes - checksum or space id
pub const FIL_PAGE_OFFSET: usize = 4; // 4 bytes - page number
pub const FIL_PAGE_PREV: usize = 8; // 4 bytes - previous page
pub const FIL_PAGE_NEXT: usize = 12; // 4 bytes - next page
pub const FIL_PAGE_LSN: usize = 16; // 8 bytes - LSN of newest modification
pub const FIL_PAGE_TYPE: usize = 24; // 2 bytes - page type
pub const FIL_PAGE_FILE_FLUSH_LSN: usize = 26; // 8 bytes - flush LSN
pub const FIL_PAGE_SPACE_ID: usize = 34; // 4 bytes - space id

// FIL Trailer (8 bytes total): old-style checksum (4) + low 32 bits of LSN (4)
pub const SIZE_FIL_TRAILER: usize = 8;

// Start of page data (immediately after FIL header)
pub const FIL_PAGE_DATA: usize = 38;

// FSP Header (112 bytes, starts at FIL_PAGE_DATA on page 0)
pub const FSP_HEADER_SIZE: usize = 112;
pub const FSP_SPACE_ID: usize = 0; // 4 bytes - space id
pub const FSP_SIZE: usize = 8; // 4 bytes - tablespace size in pages
pub const FSP_FREE_LIMIT: usize = 12; // 4 bytes - minimum page not yet initialized
pub const FSP_SPACE_FLAGS: usize = 16; // 4 bytes - flags
pub const FSP_FRAG_N_USED: usize = 20; // 4 bytes - used pages in FSP_FREE_FRAG list

// FSP flags bit positions
pub const FSP_FLAGS_POS_ZIP_SSIZE: u32 = 1;
pub const FSP_FLAGS_MASK_ZIP_SSIZE: u32 = 0xF << FSP_FLAGS_POS_ZIP_SSIZE;
pub const FSP_FLAGS_POS_PAGE_SSIZE: u32 = 6;
pub const FSP_FLAGS_MASK_PAGE_SSIZE: u32 = 0xF << FSP_FLAGS_POS_PAGE_SSIZE;

// Page Header (INDEX page specific, starts at FIL_PAGE_DATA = offset 38)
pub const PAGE_N_DIR_SLOTS: usize = 0; // 2 bytes - number of directory slots
pub const PAGE_HEAP_TOP: usize = 2; // 2 bytes - pointer to record heap top
pub const PAGE_N_HEAP: usize = 4; // 2 bytes - records in heap (bit 15 = compact flag)
pub const PAGE_FREE: usize = 6; // 2 bytes - start of free record list
pub const PAGE_GARBAGE: usize = 8; // 2 bytes - bytes in deleted records
pub const PAGE_LAST_INSERT: usize = 10; // 2 bytes - last inserted record
pub const PAGE_DIRECTION: usize = 12; // 2 bytes - last insert direction
pub const PAGE_N_DIRECTION: usize = 14; // 2 bytes - consecutive inserts in same direction
pub const PAGE_N_RECS: usize = 16; // 2 bytes - number of user records
pub const PAGE_MAX_TRX_ID: usize = 18; // 8 bytes - max trx id (secondary indexes only)
pub const PAGE_LEVEL: usize = 26; // 2 bytes - level in B+tree (0 = leaf)
pub const PAGE_INDEX_ID: usize = 28; // 8 bytes - index id
pub const PAGE_INDEX_HEADER_SIZE: usize = 36;

// FSEG Header size
pub const FSEG_HEADER_SIZE: usize = 10;

// Record extra bytes
pub const REC_N_OLD_EXTRA_BYTES: usize = 6;
pub const REC_N_NEW_EXTRA_BYTES: usize = 5;

// PAGE_DATA = PAGE_HEADER(38) + 36 + 2 * FSEG_HEADER_SIZE = 94
pub const PAGE_DATA_OFFSET: usize = FIL_PAGE_DATA + PAGE_INDEX_HEADER_SIZE + 2 * FSEG_HEADER_SIZE;

pub const PAGE_NEW_INFIMUM: usize = PAGE_DATA_OFFSET + REC_N_NEW_EXTRA_BYTES; // 99
pub const PAGE_NEW_SUPREMUM: usize = PAGE_DATA_OFFSET + 2 * REC_N_NEW_EXTRA_BYTES + 8; // 112
pub const PAGE_OLD_INFIMUM: usize = PAGE_DATA_OFFSET + 1 + REC_N_OLD_EXTRA_BYTES; // 101
pub const PAGE_OLD_SUPREMUM: usize = PAGE_DATA_OFFSET + 2 + 2 * REC_N_OLD_EXTRA_BYTES + 8; // 116

// Record info bits (upper nibble of the first extra byte)
pub const REC_INFO_INSTANT_FLAG: u8 = 0x80;
pub const REC_INFO_VERSION_FLAG: u8 = 0x40;
pub const REC_INFO_DELETED_FLAG: u8 = 0x20;
pub const REC_INFO_MIN_REC_FLAG: u8 = 0x10;

// Hidden clustered index columns
pub const DATA_ROW_ID_LEN: usize = 6;
pub const DATA_TRX_ID_LEN: usize = 6;
pub const DATA_ROLL_PTR_LEN: usize = 7;

// Child page number stored at the end of a node pointer record
pub const REC_NODE_PTR_SIZE: usize = 4;

// External field reference (btr0types.h)
pub const BTR_EXTERN_FIELD_REF_SIZE: usize = 20;
pub const BTR_EXTERN_SPACE_ID: usize = 0;
pub const BTR_EXTERN_PAGE_NO: usize = 4;
pub const BTR_EXTERN_OFFSET: usize = 8;
pub const BTR_EXTERN_LEN: usize = 12;
pub const BTR_EXTERN_OWNER_FLAG: u8 = 0x80;
pub const BTR_EXTERN_INHERITED_FLAG: u8 = 0x40;
pub const BTR_EXTERN_BEING_MODIFIED_FLAG: u8 = 0x20;

// Locally stored prefix of an externally stored column (Antelope formats)
pub const REC_ANTELOPE_MAX_INDEX_COL_LEN: usize = 768;

// Old-style BLOB page header (relative to FIL_PAGE_DATA)
pub const BTR_BLOB_HDR_PART_LEN: usize = 0;
pub const BTR_BLOB_HDR_NEXT_PAGE_NO: usize = 4;
pub const BTR_BLOB_HDR_SIZE: usize = 8;

// MySQL 8.0 LOB first page (absolute offsets, lob0first.h)
pub const LOB_FIRST_OFFSET_VERSION: usize = FIL_PAGE_DATA;
pub const LOB_FIRST_OFFSET_FLAGS: usize = LOB_FIRST_OFFSET_VERSION + 1;
pub const LOB_FIRST_OFFSET_LOB_VERSION: usize = LOB_FIRST_OFFSET_FLAGS + 1;
pub const LOB_FIRST_OFFSET_LAST_TRX_ID: usize = LOB_FIRST_OFFSET_LOB_VERSION + 4;
pub const LOB_FIRST_OFFSET_LAST_UNDO_NO: usize = LOB_FIRST_OFFSET_LAST_TRX_ID + 6;
pub const LOB_FIRST_OFFSET_DATA_LEN: usize = LOB_FIRST_OFFSET_LAST_UNDO_NO + 4;
pub const LOB_FIRST_OFFSET_TRX_ID: usize = LOB_FIRST_OFFSET_DATA_LEN + 4;
pub const LOB_FIRST_OFFSET_INDEX_LIST: usize = LOB_FIRST_OFFSET_TRX_ID + 6;
pub const LOB_FIRST_OFFSET_INDEX_FREE_NODES: usize = LOB_FIRST_OFFSET_INDEX_LIST + FLST_BASE_NODE_SIZE;
pub const LOB_FIRST_PAGE_DATA: usize = LOB_FIRST_OFFSET_INDEX_FREE_NODES + FLST_BASE_NODE_SIZE;

// MySQL 8.0 LOB index entry (lob0index.h)
pub const LOB_INDEX_ENTRY_OFFSET_PREV: usize = 0;
pub const LOB_INDEX_ENTRY_OFFSET_NEXT: usize = 6;
pub const LOB_INDEX_ENTRY_OFFSET_VERSIONS: usize = 12;
pub const LOB_INDEX_ENTRY_OFFSET_TRXID: usize = 28;
pub const LOB_INDEX_ENTRY_OFFSET_PAGE_NO: usize = 48;
pub const LOB_INDEX_ENTRY_OFFSET_DATA_LEN: usize = 52;
pub const LOB_INDEX_ENTRY_OFFSET_LOB_VERSION: usize = 56;
pub const LOB_INDEX_ENTRY_SIZE: usize = 60;

// MySQL 8.0 LOB data page (absolute offsets, lob0pages.h)
pub const LOB_DATA_OFFSET_VERSION: usize = FIL_PAGE_DATA;
pub const LOB_DATA_OFFSET_DATA_LEN: usize = LOB_DATA_OFFSET_VERSION + 1;
pub const LOB_DATA_OFFSET_TRX_ID: usize = LOB_DATA_OFFSET_DATA_LEN + 4;
pub const LOB_DATA_PAGE_DATA: usize = LOB_DATA_OFFSET_TRX_ID + 6;

// File list base node and file address (fut0lst.h)
pub const FLST_BASE_NODE_SIZE: usize = 16;
pub const FLST_LEN: usize = 0;
pub const FLST_FIRST: usize = 4;
pub const FLST_LAST: usize = 10;
pub const FIL_ADDR_SIZE: usize = 6;

// Special page number values
pub const FIL_NULL: u32 = 0xFFFFFFFF;

// Checksum constants
pub const BUF_NO_CHECKSUM_MAGIC: u32 = 0xDEADBEEF;
pub const UT_HASH_RANDOM_MASK: u32 = 1463735687;
pub const UT_HASH_RANDOM_MASK2: u32 = 1653893711;
