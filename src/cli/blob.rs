//! CLI implementation for the `ibread blob` subcommand.
//!
//! Builds an external reference from the command line and reassembles the
//! value, following either an old-style BLOB chain or a MySQL 8.0 LOB.

use std::io::Write;

use crate::cli::{open_reader, wprintln};
use crate::innodb::lob::{resolve_overflow, ExternRef};
use crate::innodb::tablespace::ReaderOptions;
use crate::util::hex::hex_dump;
use crate::IbdError;

/// Options for the `ibread blob` subcommand.
pub struct BlobOptions {
    pub file: String,
    pub page: u32,
    pub offset: u32,
    pub length: u64,
    /// Defaults to the tablespace's own space id.
    pub space: Option<u32>,
    pub raw: bool,
    pub page_size: Option<u32>,
    pub mmap: bool,
}

/// Resolve one external value and write it out.
pub fn execute(opts: &BlobOptions, writer: &mut dyn Write) -> Result<(), IbdError> {
    let reader = open_reader(
        &opts.file,
        opts.mmap,
        ReaderOptions {
            page_size: opts.page_size,
            ..ReaderOptions::default()
        },
    )?;

    let reference = ExternRef {
        space_id: opts.space.unwrap_or_else(|| reader.space_id()),
        page_no: opts.page,
        offset: opts.offset,
        length: opts.length,
        owned: true,
        inherited: false,
        being_modified: false,
    };
    let data = resolve_overflow(&reader, &reference)?;

    if opts.raw {
        writer
            .write_all(&data)
            .map_err(|e| IbdError::Io(e.to_string()))?;
        return Ok(());
    }

    wprintln!(
        writer,
        "External value: space {} page {} offset {} ({} bytes)",
        reference.space_id,
        reference.page_no,
        reference.offset,
        data.len()
    )?;
    wprintln!(writer, "{}", hex_dump(&data, 0))?;
    Ok(())
}
