//! Integration tests for clustered index scans over synthetic tablespaces.

mod common;

use std::sync::Arc;
use std::thread;

use common::*;
use ibread::innodb::cursor::{open_scan, CursorState, ScanOptions};
use ibread::innodb::field_decode::FieldValue;
use ibread::innodb::row::Row;
use ibread::innodb::tablespace::{PageReader, ReaderOptions};
use ibread::IbdError;

fn scan_all(reader: &PageReader, fx: &Fixture, options: ScanOptions) -> Vec<Row> {
    open_scan(reader, &fx.schema, fx.root, options)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap())
        .collect()
}

fn assert_rows_match(rows: &[Row], expected: &[FixtureRow]) {
    assert_eq!(rows.len(), expected.len());
    for (row, want) in rows.iter().zip(expected) {
        assert_eq!(row.get("id"), Some(&FieldValue::Int(want.id as i64)));
        match &want.name {
            Some(n) => assert_eq!(row.get("name"), Some(&FieldValue::Str(n.clone()))),
            None => assert_eq!(row.get("name"), Some(&FieldValue::Null)),
        }
        assert_eq!(row.get("a").and_then(|v| v.as_bytes()), Some(want.tiny.as_slice()));
        match &want.body {
            Some(b) => {
                let got = row.get("b").and_then(|v| v.as_bytes()).unwrap();
                assert_eq!(got.len(), b.len(), "row {} body length", want.id);
                assert!(got == b.as_slice(), "row {} body content", want.id);
            }
            None => assert_eq!(row.get("b"), Some(&FieldValue::Null)),
        }
        assert!(row.field_errors().is_empty());
    }
}

#[test]
fn test_full_scan_returns_every_row_in_key_order() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let rows = scan_all(&reader, &fx, ScanOptions::default());

    assert_eq!(ids(&rows), (1..=10).collect::<Vec<_>>());
    assert_rows_match(&rows, &fx.rows);
}

#[test]
fn test_scan_independent_of_leaf_boundaries() {
    for split in [&[10][..], &[1, 9], &[2, 2, 2, 2, 2], &[5, 1, 4]] {
        let fx = build_table(mysql57(), fixture_rows(), split);
        let reader = fx.reader();
        let rows = scan_all(&reader, &fx, ScanOptions::default());
        assert_eq!(ids(&rows), (1..=10).collect::<Vec<_>>(), "split {:?}", split);
    }
}

#[test]
fn test_tiny_blob_pattern_round_trip() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let rows = scan_all(&reader, &fx, ScanOptions::default());

    for (i, row) in rows.iter().enumerate() {
        let a = row.get("a").and_then(|v| v.as_bytes()).unwrap();
        assert_eq!(a.len(), 201);
        assert_eq!(a[0], 97 + i as u8);
        assert!(a[1..].iter().all(|&b| b == 0x0a));
    }
}

#[test]
fn test_null_columns_keep_following_fields_aligned() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let rows = scan_all(&reader, &fx, ScanOptions::default());

    let row4 = &rows[3];
    assert_eq!(row4.get("name"), Some(&FieldValue::Null));
    assert_eq!(row4.get("b"), Some(&FieldValue::Null));
    assert_eq!(row4.get("a").and_then(|v| v.as_bytes()), Some(tiny_pattern(3).as_slice()));
    // The row after the NULLs decodes normally
    assert_eq!(rows[4].get("name"), Some(&FieldValue::Str("row-5".into())));
}

#[test]
fn test_record_metadata() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let rows = scan_all(&reader, &fx, ScanOptions::default());

    let meta = rows[5].meta();
    assert_eq!(meta.trx_id, Some(0x0500 + 6));
    assert_eq!(meta.roll_ptr, Some((0x80u64 << 48) | 6));
    assert_eq!(meta.row_id, None);
    assert!(!meta.deleted);
    let (page_no, origin) = fx.origins[&6];
    assert_eq!((meta.page_no, meta.origin), (page_no, origin));
}

#[test]
fn test_directed_scan_full_key() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();

    for start in 1..=10i64 {
        let rows = scan_all(&reader, &fx, ScanOptions::from_key(vec![FieldValue::Int(start)]));
        assert_eq!(ids(&rows), (start..=10).collect::<Vec<_>>(), "start {}", start);
    }
}

#[test]
fn test_directed_scan_outside_key_range() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();

    let before = scan_all(&reader, &fx, ScanOptions::from_key(vec![FieldValue::Int(-100)]));
    assert_eq!(before.len(), 10);

    let mut cursor = open_scan(&reader, &fx.schema, fx.root, ScanOptions::from_key(vec![FieldValue::Int(11)])).unwrap();
    assert!(cursor.next_row().unwrap().is_none());
    assert_eq!(cursor.state(), CursorState::Exhausted);
}

#[test]
fn test_directed_scan_between_leaves_moves_to_sibling() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();

    // Greater than everything on the first leaf, less than the second leaf's first key
    let rows = scan_all(&reader, &fx, ScanOptions::from_key(vec![FieldValue::Double(4.5)]));
    assert_eq!(ids(&rows), (5..=10).collect::<Vec<_>>());
}

#[test]
fn test_limit_stops_scan() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let mut cursor = open_scan(&reader, &fx.schema, fx.root, ScanOptions::default().limit(6)).unwrap();
    let mut n = 0;
    while cursor.next_row().unwrap().is_some() {
        n += 1;
    }
    assert_eq!(n, 6);
    assert_eq!(cursor.rows_returned(), 6);
}

#[test]
fn test_projection_skips_overflow_pages() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let rows = scan_all(&reader, &fx, ScanOptions::default().projection(&["id", "a"]));

    assert_eq!(rows.len(), 10);
    assert!(rows[0].get("b").is_none());
    assert!(rows[0].get("name").is_none());
    assert_eq!(rows[0].get("a").and_then(|v| v.as_bytes()), Some(tiny_pattern(0).as_slice()));

    // Root and three leaves, nothing else
    let stats = reader.cache_stats().unwrap();
    assert_eq!(stats.misses, 4);
}

#[test]
fn test_projection_unknown_column() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let err = open_scan(&reader, &fx.schema, fx.root, ScanOptions::default().projection(&["id", "nope"])).unwrap_err();
    assert!(matches!(err, IbdError::Argument(_)));
}

#[test]
fn test_start_key_too_long() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let key = vec![FieldValue::Int(1), FieldValue::Int(2)];
    assert!(matches!(
        open_scan(&reader, &fx.schema, fx.root, ScanOptions::from_key(key)),
        Err(IbdError::Argument(_))
    ));
}

#[test]
fn test_delete_marked_rows_hidden_by_default() {
    let mut rows = fixture_rows();
    rows[6].deleted = true;
    let fx = build_table(mysql57(), rows, &[4, 3, 3]);

    let reader = fx.reader();
    let visible = scan_all(&reader, &fx, ScanOptions::default());
    assert!(!ids(&visible).contains(&7));
    assert_eq!(visible.len(), 9);

    let reader = fx.reader_with(ReaderOptions {
        include_deleted: true,
        ..ReaderOptions::default()
    });
    let all = scan_all(&reader, &fx, ScanOptions::default());
    assert_eq!(all.len(), 10);
    assert!(all[6].meta().deleted);
}

#[test]
fn test_antelope_compact_rows() {
    let fx = standard_fixture(antelope_compact());
    let reader = fx.reader();
    let rows = scan_all(&reader, &fx, ScanOptions::default());
    assert_rows_match(&rows, &fx.rows);
}

#[test]
fn test_redundant_rows() {
    let fx = standard_fixture(antelope_redundant());
    let reader = fx.reader();
    let rows = scan_all(&reader, &fx, ScanOptions::default());
    assert_rows_match(&rows, &fx.rows);

    let from_8 = scan_all(&reader, &fx, ScanOptions::from_key(vec![FieldValue::Int(8)]));
    assert_eq!(ids(&from_8), vec![8, 9, 10]);
}

#[test]
fn test_mysql80_rows_use_default_root() {
    let fx = standard_fixture(mysql80());
    assert_eq!(fx.root, 4);
    let reader = fx.reader();
    let rows = scan_all(&reader, &fx, ScanOptions::default());
    assert_rows_match(&rows, &fx.rows);
}

#[test]
fn test_schema_row_format_mismatch() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let wrong = blobs_schema(antelope_redundant());
    let err = open_scan(&reader, &wrong, fx.root, ScanOptions::default()).unwrap_err();
    assert!(matches!(err, IbdError::UnsupportedFormat { .. }));
}

#[test]
fn test_root_must_be_index_page() {
    let fx = standard_fixture(mysql57());
    let reader = fx.reader();
    let first_blob = fx.extern_pages[&1];
    assert!(open_scan(&reader, &fx.schema, first_blob, ScanOptions::default()).is_err());
}

#[test]
fn test_concurrent_scans_share_reader() {
    let fx = standard_fixture(mysql57());
    let reader = Arc::new(fx.reader());
    let schema = Arc::new(fx.schema.clone());
    let root = fx.root;

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let reader = Arc::clone(&reader);
            let schema = Arc::clone(&schema);
            thread::spawn(move || {
                let start = vec![FieldValue::Int(1 + t)];
                let cursor = open_scan(&reader, &schema, root, ScanOptions::from_key(start)).unwrap();
                cursor.map(|r| r.unwrap().get("id").and_then(|v| v.as_i64()).unwrap()).collect::<Vec<_>>()
            })
        })
        .collect();

    for (t, h) in handles.into_iter().enumerate() {
        let got = h.join().unwrap();
        assert_eq!(got, (1 + t as i64..=10).collect::<Vec<_>>());
    }
}
