#![cfg(feature = "cli")]
//! Integration tests for the `ibread` subcommands.

mod common;

use std::io::Write;

use clap::CommandFactory;
use tempfile::NamedTempFile;

use common::*;
use ibread::cli::app::{Cli, RowOutput};
use ibread::cli::blob::{self, BlobOptions};
use ibread::cli::pages::{self, PagesOptions};
use ibread::cli::scan::{self, ScanCliOptions};
use ibread::cli::verify::{self, VerifyOptions};
use ibread::innodb::constants::FIL_PAGE_DATA;
use ibread::innodb::tablespace::ChecksumPolicy;
use ibread::IbdError;

fn schema_file() -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(blobs_schema_json("dynamic", "mysql57").as_bytes())
        .unwrap();
    f.flush().unwrap();
    f
}

fn path(f: &NamedTempFile) -> String {
    f.path().to_str().unwrap().to_string()
}

fn scan_opts(fx: &Fixture, schema: &NamedTempFile, format: RowOutput) -> ScanCliOptions {
    ScanCliOptions {
        file: path(&fx.file),
        schema: path(schema),
        root: None,
        key: None,
        limit: None,
        columns: Vec::new(),
        format,
        page_size: None,
        checksum: ChecksumPolicy::Auto,
        verify: true,
        best_effort: false,
        include_deleted: false,
        verbose: false,
        mmap: false,
        progress: false,
    }
}

fn run_scan(opts: &ScanCliOptions) -> String {
    colored::control::set_override(false);
    let mut out = Vec::new();
    scan::execute(opts, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_scan_json_output() {
    let fx = standard_fixture(mysql57());
    let schema = schema_file();
    let out = run_scan(&scan_opts(&fx, &schema, RowOutput::Json));

    let rows: serde_json::Value = serde_json::from_str(&out).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0]["id"], 1);
    assert_eq!(rows[0]["name"], "row-1");
    assert!(rows[3]["name"].is_null());
    assert!(rows[3]["b"].is_null());
}

#[test]
fn test_scan_csv_with_key_and_columns() {
    let fx = standard_fixture(mysql57());
    let schema = schema_file();
    let mut opts = scan_opts(&fx, &schema, RowOutput::Csv);
    opts.key = Some("8".into());
    opts.columns = vec!["id".into(), "name".into()];
    let out = run_scan(&opts);

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["id,name", "8,row-8", "9,row-9", "10,row-10"]);
}

#[test]
fn test_scan_text_with_limit() {
    let fx = standard_fixture(mysql57());
    let schema = schema_file();
    let mut opts = scan_opts(&fx, &schema, RowOutput::Text);
    opts.limit = Some(2);
    opts.columns = vec!["id".into()];
    let out = run_scan(&opts);

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines, vec!["id=1", "id=2", "2 rows"]);
}

#[test]
fn test_scan_bad_key() {
    let fx = standard_fixture(mysql57());
    let schema = schema_file();
    let mut opts = scan_opts(&fx, &schema, RowOutput::Text);
    opts.key = Some("seven".into());
    let mut out = Vec::new();
    assert!(matches!(
        scan::execute(&opts, &mut out),
        Err(IbdError::Argument(_))
    ));
}

#[test]
fn test_pages_json_lists_layout() {
    let fx = standard_fixture(mysql57());
    let opts = PagesOptions {
        file: path(&fx.file),
        page: None,
        filter_type: Some("index".into()),
        json: true,
        page_size: None,
        mmap: false,
    };
    let mut out = Vec::new();
    pages::execute(&opts, &mut out).unwrap();

    let pages: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let pages = pages.as_array().unwrap();
    // Root plus three leaves
    assert_eq!(pages.len(), 4);
    assert_eq!(pages[0]["page_no"], fx.root);
    assert_eq!(pages[0]["index"]["level"], 1);
    assert!(pages.iter().all(|p| p["checksum_valid"] == true));
    assert_eq!(pages[1]["next"], fx.leaves[1]);
}

#[test]
fn test_pages_out_of_range() {
    let fx = standard_fixture(mysql57());
    let opts = PagesOptions {
        file: path(&fx.file),
        page: Some(10_000),
        filter_type: None,
        json: false,
        page_size: None,
        mmap: false,
    };
    let mut out = Vec::new();
    assert!(matches!(
        pages::execute(&opts, &mut out),
        Err(IbdError::Argument(_))
    ));
}

fn verify_opts(file: &NamedTempFile) -> VerifyOptions {
    VerifyOptions {
        file: path(file),
        json: true,
        page_size: None,
        checksum: ChecksumPolicy::Auto,
        verbose: false,
        mmap: false,
        progress: false,
    }
}

#[test]
fn test_verify_clean_tablespace() {
    let fx = standard_fixture(mysql57());
    let mut out = Vec::new();
    verify::execute(&verify_opts(&fx.file), &mut out).unwrap();

    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["algorithm"], "crc32c");
    assert_eq!(report["valid_pages"], report["total_pages"]);
    assert!(report["invalid_pages"].as_array().unwrap().is_empty());
}

#[test]
fn test_verify_reports_damaged_page() {
    let fx = standard_fixture(mysql57());
    let mut image = fx.image.clone();
    image[fx.leaves[2] as usize * PS + 1000] ^= 0x10;
    let file = write_image(&image);

    let mut out = Vec::new();
    let err = verify::execute(&verify_opts(&file), &mut out).unwrap_err();
    assert!(matches!(err, IbdError::Parse(_)));

    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let invalid = report["invalid_pages"].as_array().unwrap();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0]["page_no"], fx.leaves[2]);
}

#[test]
fn test_blob_raw_output() {
    let fx = standard_fixture(mysql57());
    let opts = BlobOptions {
        file: path(&fx.file),
        page: fx.extern_pages[&1],
        offset: FIL_PAGE_DATA as u32,
        length: 60_001,
        space: None,
        raw: true,
        page_size: None,
        mmap: false,
    };
    let mut out = Vec::new();
    blob::execute(&opts, &mut out).unwrap();
    assert_eq!(out, blob_pattern(1, 60_001));
}

#[test]
fn test_blob_hex_output() {
    let fx = standard_fixture(mysql57());
    let opts = BlobOptions {
        file: path(&fx.file),
        page: fx.extern_pages[&1],
        offset: FIL_PAGE_DATA as u32,
        length: 32,
        space: None,
        raw: false,
        page_size: None,
        mmap: false,
    };
    let mut out = Vec::new();
    blob::execute(&opts, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().ends_with("(32 bytes)"));
    assert!(lines.next().unwrap().starts_with("00000000  "));
    assert!(lines.next().unwrap().starts_with("00000010  "));
}

fn completions(shell: clap_complete::Shell) -> String {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    clap_complete::generate(shell, &mut cmd, "ibread", &mut buf);
    String::from_utf8(buf).unwrap()
}

#[test]
fn test_bash_completions_list_subcommands() {
    let out = completions(clap_complete::Shell::Bash);
    for sub in ["scan", "pages", "verify", "blob", "completions"] {
        assert!(out.contains(sub), "missing {}", sub);
    }
}

#[test]
fn test_zsh_and_fish_completions() {
    for shell in [clap_complete::Shell::Zsh, clap_complete::Shell::Fish] {
        assert!(completions(shell).contains("ibread"));
    }
}

#[test]
fn test_cli_definition_is_consistent() {
    Cli::command().debug_assert();
}
