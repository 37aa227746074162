//! CLI subcommand implementations for the `ibread` binary.
//!
//! Argument parsing uses clap derive macros. The top-level [`app::Cli`]
//! struct and [`app::Commands`] enum live in [`app`] and are shared between
//! `main.rs` and `build.rs` (man pages, shell completions) via `include!()`.
//!
//! Each subcommand module has an `Options` struct and a
//! `pub fn execute(opts, writer) -> Result<(), IbdError>` entry point. The
//! writer is `&mut dyn Write` so output can be captured in tests or sent to
//! the file named by the global `--output` flag.
//!
//! | Command | Module | Purpose |
//! |---------|--------|---------|
//! | `ibread scan` | [`scan`] | Full or directed scan of the clustered index |
//! | `ibread pages` | [`pages`] | FIL and INDEX header summary per page |
//! | `ibread verify` | [`verify`] | Parallel checksum verification |
//! | `ibread blob` | [`blob`] | Reassemble one externally stored value |

pub mod app;
pub mod blob;
pub mod pages;
pub mod scan;
pub mod verify;

/// Write a line to the given writer, converting io::Error to IbdError.
macro_rules! wprintln {
    ($w:expr) => {
        writeln!($w).map_err(|e| $crate::IbdError::Io(e.to_string()))
    };
    ($w:expr, $($arg:tt)*) => {
        writeln!($w, $($arg)*).map_err(|e| $crate::IbdError::Io(e.to_string()))
    };
}

/// Write (without newline) to the given writer, converting io::Error to IbdError.
macro_rules! wprint {
    ($w:expr, $($arg:tt)*) => {
        write!($w, $($arg)*).map_err(|e| $crate::IbdError::Io(e.to_string()))
    };
}

pub(crate) use wprint;
pub(crate) use wprintln;

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::app::ChecksumArg;
use crate::innodb::field_decode::FieldValue;
use crate::innodb::tablespace::{ChecksumPolicy, PageReader, ReaderOptions, Tablespace};
use crate::IbdError;

/// Open a tablespace file, selecting mmap or buffered I/O based on the flag.
pub(crate) fn open_tablespace(
    path: &str,
    page_size: Option<u32>,
    use_mmap: bool,
) -> Result<Tablespace, IbdError> {
    match (use_mmap, page_size) {
        (true, ps) => Tablespace::open_mmap(path, ps),
        (false, Some(ps)) => Tablespace::open_with_page_size(path, ps),
        (false, None) => Tablespace::open(path),
    }
}

/// Open a tablespace and wrap it in a verifying [`PageReader`].
pub(crate) fn open_reader(
    path: &str,
    use_mmap: bool,
    options: ReaderOptions,
) -> Result<PageReader, IbdError> {
    let ts = open_tablespace(path, options.page_size, use_mmap)?;
    PageReader::new(Arc::new(ts), options)
}

impl From<ChecksumArg> for ChecksumPolicy {
    fn from(arg: ChecksumArg) -> Self {
        match arg {
            ChecksumArg::Auto => ChecksumPolicy::Auto,
            ChecksumArg::Crc32c => ChecksumPolicy::Crc32c,
            ChecksumArg::Innodb => ChecksumPolicy::InnoDB,
            ChecksumArg::None => ChecksumPolicy::None,
        }
    }
}

/// Create a styled progress bar for iterating over pages.
pub(crate) fn create_progress_bar(count: u64, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(count);
    let template = format!(
        "{{spinner:.green}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{eta}})",
        unit
    );
    if let Ok(style) = ProgressStyle::default_bar().template(&template) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Create a spinner that counts rows as they stream out.
pub(crate) fn create_spinner(unit: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let template = format!("{{spinner:.green}} {{pos}} {} ({{elapsed}})", unit);
    if let Ok(style) = ProgressStyle::default_spinner().template(&template) {
        pb.set_style(style);
    }
    pb
}

/// Render one value as a CSV cell (RFC 4180 quoting).
pub(crate) fn csv_escape(val: &FieldValue) -> String {
    let text = match val {
        FieldValue::Null => return String::new(),
        FieldValue::Bytes(b) => crate::util::hex::format_bytes(b),
        other => other.to_string(),
    };
    if text.contains(',') || text.contains('"') || text.contains('\n') || text.contains('\r') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}
