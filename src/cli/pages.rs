//! CLI implementation for the `ibread pages` subcommand.
//!
//! One line (or JSON object) per page: FIL header fields, checksum status
//! under the tablespace's detected algorithm, and for B+Tree pages the
//! INDEX header (level, record count, index id, row format).

use std::io::Write;

use colored::Colorize;
use serde::Serialize;

use crate::cli::{open_tablespace, wprintln};
use crate::innodb::checksum::{detect_algorithm, verify_page, ChecksumAlgorithm};
use crate::innodb::constants::FIL_NULL;
use crate::innodb::index::IndexHeader;
use crate::innodb::page::FilHeader;
use crate::innodb::page_types::{PageKind, PageType};
use crate::innodb::tablespace::PageSource;
use crate::util::hex::format_hex32;
use crate::IbdError;

/// Options for the `ibread pages` subcommand.
pub struct PagesOptions {
    pub file: String,
    /// Only this page.
    pub page: Option<u32>,
    /// Only pages whose type name matches (case-insensitive).
    pub filter_type: Option<String>,
    pub json: bool,
    pub page_size: Option<u32>,
    pub mmap: bool,
}

#[derive(Debug, Serialize)]
struct PageSummary {
    page_no: u32,
    page_type: String,
    kind: Option<String>,
    lsn: u64,
    space_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    prev: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<u32>,
    checksum_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<IndexSummary>,
}

#[derive(Debug, Serialize)]
struct IndexSummary {
    index_id: u64,
    level: u16,
    n_recs: u16,
    compact: bool,
}

fn link(page_no: u32) -> Option<u32> {
    (page_no != FIL_NULL).then_some(page_no)
}

fn matches_filter(page_type: PageType, filter: &str) -> bool {
    let f = filter.to_ascii_uppercase();
    let f = f.strip_prefix("FIL_PAGE_").unwrap_or(&f);
    page_type.name() == f
}

/// Summarize pages of a tablespace.
pub fn execute(opts: &PagesOptions, writer: &mut dyn Write) -> Result<(), IbdError> {
    let ts = open_tablespace(&opts.file, opts.page_size, opts.mmap)?;
    let page_size = ts.page_size();
    let page0 = ts.read_page(0)?;
    let algorithm = detect_algorithm(&page0, page_size).unwrap_or(ChecksumAlgorithm::Crc32c);

    if let Some(p) = opts.page {
        if p as u64 >= ts.page_count() {
            return Err(IbdError::Argument(format!(
                "page {} out of range (tablespace has {} pages)",
                p,
                ts.page_count()
            )));
        }
    }

    let mut summaries = Vec::new();
    ts.for_each_page(|page_no, data| {
        if opts.page.is_some_and(|p| p != page_no) {
            return Ok(());
        }
        let Some(fil) = FilHeader::parse(data) else {
            return Ok(());
        };
        if let Some(filter) = &opts.filter_type {
            if !matches_filter(fil.page_type, filter) {
                return Ok(());
            }
        }
        let kind = fil.page_type.kind();
        let index = if kind == Some(PageKind::BTreeNode) {
            IndexHeader::parse(data).map(|h| IndexSummary {
                index_id: h.index_id,
                level: h.level,
                n_recs: h.n_recs,
                compact: h.is_compact(),
            })
        } else {
            None
        };
        summaries.push(PageSummary {
            page_no,
            page_type: fil.page_type.to_string(),
            kind: kind.map(|k| k.to_string()),
            lsn: fil.lsn,
            space_id: fil.space_id,
            prev: link(fil.prev_page),
            next: link(fil.next_page),
            checksum_valid: verify_page(data, page_size, algorithm).valid,
            index,
        });
        Ok(())
    })?;

    if opts.json {
        let json = serde_json::to_string_pretty(&summaries)
            .map_err(|e| IbdError::Parse(format!("JSON serialization error: {}", e)))?;
        wprintln!(writer, "{}", json)?;
        return Ok(());
    }

    wprintln!(
        writer,
        "{} ({} pages, page size {}, checksum {})",
        opts.file,
        ts.page_count(),
        page_size,
        algorithm
    )?;
    for s in &summaries {
        let status = if s.checksum_valid {
            "OK".green()
        } else {
            "BAD".red()
        };
        let mut line = format!(
            "{:>6}  {:<16} lsn={} space={} {}",
            s.page_no,
            s.page_type,
            s.lsn,
            format_hex32(s.space_id),
            status
        );
        if let Some(prev) = s.prev {
            line.push_str(&format!(" prev={}", prev));
        }
        if let Some(next) = s.next {
            line.push_str(&format!(" next={}", next));
        }
        if let Some(idx) = &s.index {
            line.push_str(&format!(
                " index_id={} level={} n_recs={} {}",
                idx.index_id,
                idx.level,
                idx.n_recs,
                if idx.compact { "compact" } else { "redundant" }
            ));
        }
        wprintln!(writer, "{}", line)?;
    }
    wprintln!(writer, "{} pages listed", summaries.len())?;
    Ok(())
}
