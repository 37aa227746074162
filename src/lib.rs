//! Offline row reader for InnoDB tablespace files.
//!
//! The `innodb-reader` crate (library name `ibread`) reads MySQL InnoDB
//! tablespace files (`.ibd`) directly from disk, without a running server,
//! and reconstructs table rows from the clustered B+Tree index. It decodes
//! the compact, dynamic and redundant row formats, follows externally
//! stored BLOB/TEXT chains across overflow pages, and walks the index in
//! primary-key order.
//!
//! # CLI Reference
//!
//! The `ibread` binary (feature `cli`, on by default) wraps the library:
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `ibread scan` | Full scan or range scan from a start key, text/JSON/CSV output |
//! | `ibread pages` | Page header and page type summary |
//! | `ibread verify` | Verify every page checksum in parallel |
//! | `ibread blob` | Resolve an external (overflow) reference into raw bytes |
//! | `ibread completions` | Shell completion script (bash, zsh, fish, powershell, elvish) |
//!
//! All subcommands accept `--color <auto|always|never>` and `--output <file>`.
//! Set `RUST_LOG=ibread=debug` to see page fetches and tree descents.
//!
//! # Library API
//!
//! ```no_run
//! use std::sync::Arc;
//! use ibread::innodb::cursor::{open_scan, ScanOptions};
//! use ibread::innodb::schema::{Column, SchemaBuilder, TableFormat};
//! use ibread::innodb::tablespace::{PageReader, ReaderOptions, Tablespace};
//!
//! let schema = SchemaBuilder::new()
//!     .charset("utf8mb4")
//!     .format(TableFormat::mysql57_dynamic())
//!     .column(Column::new("id", "int(11)").primary_key())
//!     .column(Column::new("name", "varchar(64)").nullable())
//!     .build()
//!     .unwrap();
//!
//! let ts = Tablespace::open("users.ibd").unwrap();
//! let reader = PageReader::new(Arc::new(ts), ReaderOptions::default()).unwrap();
//!
//! let mut cursor = open_scan(&reader, &schema, 3, ScanOptions::default()).unwrap();
//! while let Some(row) = cursor.next_row().unwrap() {
//!     println!("{:?} {:?}", row.get("id"), row.get("name"));
//! }
//! ```
//!
//! ## Key entry points
//!
//! | Type / Function | Purpose |
//! |-----------------|---------|
//! | [`TableSchema`](innodb::schema::TableSchema) | Immutable schema view consumed by the decoder |
//! | [`Tablespace`](innodb::tablespace::Tablespace) | Open `.ibd` files and read raw pages |
//! | [`PageReader`](innodb::tablespace::PageReader) | Checksum verification, page classification, page cache |
//! | [`open_scan`](innodb::cursor::open_scan) | Position a B+Tree cursor for a full or directed scan |
//! | [`decode_record`](innodb::row::decode_record) | Decode one record into typed fields |
//! | [`resolve_overflow`](innodb::lob::resolve_overflow) | Reassemble an externally stored column |
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`innodb::charset`] | Charset names and max bytes per character |
//! | [`innodb::schema`] | Column types, schema finalization, row format tags |
//! | [`innodb::page`] | FIL header/trailer, FSP header, parsed pages |
//! | [`innodb::page_types`] | Page type codes and classification |
//! | [`innodb::checksum`] | CRC-32C and legacy InnoDB checksum algorithms |
//! | [`innodb::index`] | INDEX page header |
//! | [`innodb::record`] | Record headers and record list traversal |
//! | [`innodb::field_decode`] | Typed value decoding |
//! | [`innodb::row`] | Record decoder producing rows |
//! | [`innodb::lob`] | External references and overflow page chains |
//! | [`innodb::cache`] | Shared LRU page cache |
//! | [`innodb::cursor`] | B+Tree cursor |
//! | [`innodb::tablespace`] | Page sources and the page reader |
//! | [`innodb::constants`] | On-disk structure constants |

#[cfg(feature = "cli")]
pub mod cli;
pub mod innodb;
pub mod util;

use thiserror::Error;

/// Errors returned by `ibread` operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IbdError {
    /// An I/O error occurred (file open, read, seek failure).
    #[error("I/O error: {0}")]
    Io(String),

    /// A parse error occurred (malformed binary data or unexpected values).
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid argument was supplied (bad schema, out-of-range page, bad option).
    #[error("Invalid argument: {0}")]
    Argument(String),

    /// The stored page checksum does not match the tablespace's algorithm.
    #[error("Corrupt page {page_no}: stored checksum 0x{stored:08X}, calculated 0x{calculated:08X} ({algorithm})")]
    CorruptPage {
        page_no: u32,
        stored: u32,
        calculated: u32,
        algorithm: String,
    },

    /// A recognized but unimplemented page type, row format or record variant.
    #[error("Unsupported format{}: {detail}", fmt_page(.page_no))]
    UnsupportedFormat { page_no: Option<u32>, detail: String },

    /// Lengths or offsets inside a record are inconsistent with the page.
    #[error("Field decode error on page {page_no} at offset {offset} (column {column}): {detail}")]
    FieldDecode {
        page_no: u32,
        offset: usize,
        column: String,
        detail: String,
    },

    /// An overflow page chain ended before the declared external length.
    #[error("Incomplete overflow chain starting at page {page_no}: expected {expected} bytes, got {actual}")]
    IncompleteOverflowChain {
        page_no: u32,
        expected: u64,
        actual: u64,
    },

    /// A scan observed its cancellation token.
    #[error("Scan cancelled before page {page_no}")]
    Cancelled { page_no: u32 },
}

fn fmt_page(page_no: &Option<u32>) -> String {
    match page_no {
        Some(p) => format!(" on page {}", p),
        None => String::new(),
    }
}

impl From<std::io::Error> for IbdError {
    fn from(e: std::io::Error) -> Self {
        IbdError::Io(e.to_string())
    }
}
