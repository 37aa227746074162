//! CLI implementation for the `ibread scan` subcommand.
//!
//! Loads a JSON schema, opens a verifying page reader over the tablespace
//! and streams rows from the clustered index in key order. Ctrl+C stops
//! the scan between pages and keeps whatever has already been written.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;

use crate::cli::app::RowOutput;
use crate::cli::{create_spinner, csv_escape, open_reader, wprint, wprintln};
use crate::innodb::cursor::{open_scan, ScanOptions};
use crate::innodb::field_decode::FieldValue;
use crate::innodb::row::Row;
use crate::innodb::schema::{ColumnType, TableSchema};
use crate::innodb::tablespace::{ChecksumPolicy, ReaderOptions};
use crate::IbdError;

/// Options for the `ibread scan` subcommand.
pub struct ScanCliOptions {
    pub file: String,
    /// Path to the JSON schema file.
    pub schema: String,
    /// Clustered index root; the server version's default when `None`.
    pub root: Option<u32>,
    /// Comma-separated start key.
    pub key: Option<String>,
    pub limit: Option<usize>,
    pub columns: Vec<String>,
    pub format: RowOutput,
    pub page_size: Option<u32>,
    pub checksum: ChecksumPolicy,
    pub verify: bool,
    pub best_effort: bool,
    pub include_deleted: bool,
    pub verbose: bool,
    pub mmap: bool,
    /// Show a row counter on stderr.
    pub progress: bool,
}

/// Parse a comma-separated key into values typed by the index key columns.
///
/// Tables without a primary key are keyed on `DB_ROW_ID`, parsed as an
/// unsigned integer.
pub fn parse_start_key(schema: &TableSchema, text: &str) -> Result<Vec<FieldValue>, IbdError> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    if !schema.has_primary_key() {
        if parts.len() != 1 {
            return Err(IbdError::Argument(
                "table has no primary key; the start key is a single DB_ROW_ID".to_string(),
            ));
        }
        return parse_unsigned(parts[0], "DB_ROW_ID").map(|v| vec![v]);
    }

    let key_columns = schema.primary_key();
    if parts.len() > key_columns.len() {
        return Err(IbdError::Argument(format!(
            "start key has {} values, the primary key has {} columns",
            parts.len(),
            key_columns.len()
        )));
    }

    let mut key = Vec::with_capacity(parts.len());
    for (part, &pos) in parts.iter().zip(key_columns) {
        let col = schema
            .column(pos)
            .ok_or_else(|| IbdError::Argument(format!("no column at position {}", pos)))?;
        key.push(parse_key_value(&col.column_type, part, &col.name)?);
    }
    Ok(key)
}

fn parse_key_value(column_type: &ColumnType, text: &str, name: &str) -> Result<FieldValue, IbdError> {
    let bad = |e: &dyn std::fmt::Display| {
        IbdError::Argument(format!("bad key value '{}' for column {}: {}", text, name, e))
    };
    match column_type {
        ColumnType::TinyInt { unsigned: true }
        | ColumnType::SmallInt { unsigned: true }
        | ColumnType::MediumInt { unsigned: true }
        | ColumnType::Int { unsigned: true }
        | ColumnType::BigInt { unsigned: true }
        | ColumnType::Year
        | ColumnType::Bit { .. } => parse_unsigned(text, name),
        ColumnType::TinyInt { .. }
        | ColumnType::SmallInt { .. }
        | ColumnType::MediumInt { .. }
        | ColumnType::Int { .. }
        | ColumnType::BigInt { .. } => text.parse::<i64>().map(FieldValue::Int).map_err(|e| bad(&e)),
        ColumnType::Float | ColumnType::Double => {
            text.parse::<f64>().map(FieldValue::Double).map_err(|e| bad(&e))
        }
        ColumnType::Decimal { .. } => {
            text.parse::<f64>().map_err(|e| bad(&e))?;
            Ok(FieldValue::Decimal(text.to_string()))
        }
        ColumnType::Binary { .. } | ColumnType::VarBinary { .. } => {
            Ok(FieldValue::Bytes(text.as_bytes().to_vec()))
        }
        _ => Ok(FieldValue::Str(text.to_string())),
    }
}

fn parse_unsigned(text: &str, name: &str) -> Result<FieldValue, IbdError> {
    text.parse::<u64>().map(FieldValue::Uint).map_err(|e| {
        IbdError::Argument(format!("bad key value '{}' for column {}: {}", text, name, e))
    })
}

/// Stream rows from the clustered index to `writer`.
pub fn execute(opts: &ScanCliOptions, writer: &mut dyn Write) -> Result<(), IbdError> {
    let schema_json = std::fs::read_to_string(&opts.schema)
        .map_err(|e| IbdError::Io(format!("Cannot read schema {}: {}", opts.schema, e)))?;
    let schema = TableSchema::from_json(&schema_json)?;

    let reader = open_reader(
        &opts.file,
        opts.mmap,
        ReaderOptions {
            page_size: opts.page_size,
            checksum: opts.checksum,
            verify_checksums: opts.verify,
            best_effort: opts.best_effort,
            include_deleted: opts.include_deleted,
            ..ReaderOptions::default()
        },
    )?;

    let root = opts
        .root
        .unwrap_or_else(|| schema.format().server.default_clustered_root());

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::debug!(error = %e, "Ctrl+C handler not installed");
    }

    let mut scan = match &opts.key {
        Some(k) => ScanOptions::from_key(parse_start_key(&schema, k)?),
        None => ScanOptions::default(),
    }
    .cancel_token(cancel);
    if !opts.columns.is_empty() {
        scan.columns = Some(opts.columns.clone());
    }
    scan.limit = opts.limit;

    tracing::info!(file = %opts.file, root, algorithm = %reader.algorithm(), "scan started");
    let mut cursor = open_scan(&reader, &schema, root, scan)?;

    let names: Vec<String> = match &opts.columns {
        cols if !cols.is_empty() => cols.clone(),
        _ => schema.column_names().iter().map(|s| s.to_string()).collect(),
    };

    let pb = if opts.progress {
        Some(create_spinner("rows"))
    } else {
        None
    };

    match opts.format {
        RowOutput::Csv => wprintln!(writer, "{}", names.join(","))?,
        RowOutput::Json => wprint!(writer, "[")?,
        RowOutput::Text => {}
    }

    let mut count = 0usize;
    let mut interrupted = None;
    loop {
        let row = match cursor.next_row() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(IbdError::Cancelled { page_no }) => {
                interrupted = Some(page_no);
                break;
            }
            Err(e) => {
                if let Some(pb) = &pb {
                    pb.finish_and_clear();
                }
                return Err(e);
            }
        };
        match opts.format {
            RowOutput::Text => write_text_row(writer, &row, opts.verbose)?,
            RowOutput::Csv => {
                let cells: Vec<String> = names
                    .iter()
                    .map(|n| row.get(n).map(csv_escape).unwrap_or_default())
                    .collect();
                wprintln!(writer, "{}", cells.join(","))?;
            }
            RowOutput::Json => {
                let json = serde_json::to_string(&row)
                    .map_err(|e| IbdError::Parse(format!("JSON serialization error: {}", e)))?;
                if count > 0 {
                    wprint!(writer, ",")?;
                }
                wprint!(writer, "\n  {}", json)?;
            }
        }
        count += 1;
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }

    if opts.format == RowOutput::Json {
        if count > 0 {
            wprintln!(writer)?;
        }
        wprintln!(writer, "]")?;
    }
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    if let Some(page_no) = interrupted {
        eprintln!(
            "{} after {} rows (next page {})",
            "Interrupted".yellow(),
            count,
            page_no
        );
    }
    if cursor.records_skipped() > 0 {
        eprintln!(
            "{} {} undecodable records",
            "Skipped".yellow(),
            cursor.records_skipped()
        );
    }
    if opts.format == RowOutput::Text {
        wprintln!(writer, "{} rows", count)?;
    }
    Ok(())
}

fn write_text_row(writer: &mut dyn Write, row: &Row, verbose: bool) -> Result<(), IbdError> {
    if verbose {
        let meta = row.meta();
        wprint!(
            writer,
            "{} ",
            format!("[page {} heap {}]", meta.page_no, meta.heap_no).dimmed()
        )?;
        if let Some(trx) = meta.trx_id {
            wprint!(writer, "{} ", format!("trx={}", trx).dimmed())?;
        }
        if meta.deleted {
            wprint!(writer, "{} ", "DELETED".red())?;
        }
    }
    let mut first = true;
    for (name, value) in row.iter() {
        if !first {
            wprint!(writer, " ")?;
        }
        first = false;
        let rendered = match value {
            FieldValue::Null => "NULL".dimmed().to_string(),
            FieldValue::Str(s) => format!("{:?}", s),
            FieldValue::Errored(_) => value.to_string().red().to_string(),
            FieldValue::Unavailable(_) => value.to_string().yellow().to_string(),
            other => other.to_string(),
        };
        wprint!(writer, "{}={}", name.bold(), rendered)?;
    }
    wprintln!(writer)?;
    for (column, err) in row.field_errors() {
        wprintln!(writer, "  {} {}: {}", "error".red(), column, err)?;
    }
    Ok(())
}
