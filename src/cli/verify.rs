//! CLI implementation for the `ibread verify` subcommand.
//!
//! Settles the checksum algorithm from page 0 (or takes it from
//! `--checksum`), then checks every page against it on the rayon pool.

use std::io::Write;

use colored::Colorize;
use rayon::prelude::*;
use serde::Serialize;

use crate::cli::{create_progress_bar, open_reader, wprintln};
use crate::innodb::tablespace::{ChecksumPolicy, ReaderOptions};
use crate::IbdError;

/// Options for the `ibread verify` subcommand.
pub struct VerifyOptions {
    pub file: String,
    pub json: bool,
    pub page_size: Option<u32>,
    pub checksum: ChecksumPolicy,
    /// List every invalid page in text output.
    pub verbose: bool,
    pub mmap: bool,
    pub progress: bool,
}

#[derive(Debug, Serialize)]
struct InvalidPage {
    page_no: u32,
    stored: u32,
    calculated: u32,
}

#[derive(Debug, Serialize)]
struct VerifyReport {
    file: String,
    page_size: u32,
    algorithm: String,
    total_pages: u64,
    valid_pages: u64,
    invalid_pages: Vec<InvalidPage>,
}

/// Verify every page checksum. Fails when any page is invalid.
pub fn execute(opts: &VerifyOptions, writer: &mut dyn Write) -> Result<(), IbdError> {
    let reader = open_reader(
        &opts.file,
        opts.mmap,
        ReaderOptions {
            page_size: opts.page_size,
            checksum: opts.checksum,
            verify_checksums: false,
            cache_pages: 0,
            ..ReaderOptions::default()
        },
    )?;
    let page_count = reader.page_count();

    let pb = (opts.progress && !opts.json).then(|| create_progress_bar(page_count, "pages"));

    let results: Vec<Result<(u32, bool, u32, u32), IbdError>> = (0..page_count as u32)
        .into_par_iter()
        .map(|page_no| {
            let r = reader.verify(page_no);
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            r.map(|c| (page_no, c.valid, c.stored_checksum, c.calculated_checksum))
        })
        .collect();

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let mut invalid_pages = Vec::new();
    for r in results {
        let (page_no, valid, stored, calculated) = r?;
        if !valid {
            invalid_pages.push(InvalidPage {
                page_no,
                stored,
                calculated,
            });
        }
    }

    let report = VerifyReport {
        file: opts.file.clone(),
        page_size: reader.page_size(),
        algorithm: reader.algorithm().to_string(),
        total_pages: page_count,
        valid_pages: page_count - invalid_pages.len() as u64,
        invalid_pages,
    };

    if opts.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| IbdError::Parse(format!("JSON serialization error: {}", e)))?;
        wprintln!(writer, "{}", json)?;
    } else {
        wprintln!(
            writer,
            "Verifying {} ({} pages, page size {}, algorithm {})",
            report.file,
            report.total_pages,
            report.page_size,
            report.algorithm
        )?;
        if opts.verbose {
            for p in &report.invalid_pages {
                wprintln!(
                    writer,
                    "Page {}: {} (stored=0x{:08X}, calculated=0x{:08X})",
                    p.page_no,
                    "INVALID".red(),
                    p.stored,
                    p.calculated
                )?;
            }
        }
        wprintln!(writer, "  Valid pages:   {}", report.valid_pages)?;
        let invalid = report.invalid_pages.len().to_string();
        if report.invalid_pages.is_empty() {
            wprintln!(writer, "  Invalid pages: {}", invalid.green())?;
        } else {
            wprintln!(writer, "  Invalid pages: {}", invalid.red())?;
        }
    }

    if !report.invalid_pages.is_empty() {
        return Err(IbdError::Parse(format!(
            "{} of {} pages failed checksum verification",
            report.invalid_pages.len(),
            report.total_pages
        )));
    }
    Ok(())
}
