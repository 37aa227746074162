//! B+Tree cursor over the clustered index.
//!
//! [`open_scan`] descends from the root to the leaf that holds the start
//! key (or the leftmost leaf for a full scan); [`Cursor::next_row`] then
//! walks the leaf records in key order, hopping to the next sibling leaf
//! through the FIL header's next-page pointer until the level ends.
//!
//! ```text
//! Unpositioned -> AtInternalNode -> ... -> AtLeaf -> AtLeaf (sibling) -> Exhausted
//! ```
//!
//! Any page that fails verification aborts the scan with the reader's
//! error; the cursor never tries to resynchronize past a bad page. The
//! sibling walk can take at most one hop per page of the tablespace, more
//! means the chain loops.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use serde::Serialize;

use crate::innodb::field_decode::FieldValue;
use crate::innodb::page::Page;
use crate::innodb::page_types::PageKind;
use crate::innodb::record::{walk_records, RecordInfo};
use crate::innodb::row::{decode_key, decode_node_pointer, decode_record, materialize, row_names, Projection, Row};
use crate::innodb::schema::TableSchema;
use crate::innodb::tablespace::PageReader;
use crate::IbdError;

/// Options for one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Start at the first record whose key is >= this (a key prefix is allowed).
    pub start_key: Option<Vec<FieldValue>>,
    /// Columns to materialize, all when `None`.
    pub columns: Option<Vec<String>>,
    /// Stop after this many rows.
    pub limit: Option<usize>,
    /// Checked between leaf pages; set it to abort the scan.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ScanOptions {
    /// Directed scan starting at `key`.
    pub fn from_key(key: Vec<FieldValue>) -> Self {
        ScanOptions {
            start_key: Some(key),
            ..ScanOptions::default()
        }
    }

    pub fn projection(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn cancel_token(mut self, token: Arc<AtomicBool>) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Where the cursor currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CursorState {
    Unpositioned,
    AtInternalNode { page_no: u32, level: u16 },
    AtLeaf { page_no: u32 },
    Exhausted,
}

/// Compare a record key against a (possibly shorter) search key.
///
/// Only the first `target.len()` fields take part, so a key prefix
/// compares equal to every record that starts with it.
pub fn compare_key_prefix(record_key: &[FieldValue], target: &[FieldValue]) -> Ordering {
    for (a, b) in record_key.iter().zip(target) {
        match a.key_cmp(b) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Pull-based iterator over the leaf level of a clustered index.
#[derive(Debug)]
pub struct Cursor<'a> {
    reader: &'a PageReader,
    schema: &'a TableSchema,
    root_page: u32,
    options: ScanOptions,
    projection: Projection,
    names: Arc<[String]>,
    state: CursorState,
    leaf: Option<Arc<Page>>,
    records: Vec<RecordInfo>,
    next_idx: usize,
    leaf_hops: u64,
    include_deleted: bool,
    best_effort: bool,
    returned: usize,
    skipped: usize,
}

/// Open a scan over the clustered index rooted at `root_page`.
///
/// The cursor is positioned before returning: the root is fetched and the
/// tree is descended to the starting leaf.
///
/// # Errors
///
/// Returns the reader's error for any page that fails verification,
/// [`IbdError::UnsupportedFormat`] for row formats this reader cannot
/// decode, and [`IbdError::Argument`] for bad start keys or column names.
pub fn open_scan<'a>(
    reader: &'a PageReader,
    schema: &'a TableSchema,
    root_page: u32,
    options: ScanOptions,
) -> Result<Cursor<'a>, IbdError> {
    schema.format().ensure_supported()?;
    if let Some(key) = &options.start_key {
        if key.is_empty() || key.len() > schema.key_field_count() {
            return Err(IbdError::Argument(format!(
                "start key has {} fields, the index key has {}",
                key.len(),
                schema.key_field_count()
            )));
        }
    }
    let projection = match &options.columns {
        Some(cols) => Projection::of(schema, cols)?,
        None => Projection::all(),
    };

    let mut cursor = Cursor {
        reader,
        schema,
        root_page,
        options,
        projection,
        names: row_names(schema),
        state: CursorState::Unpositioned,
        leaf: None,
        records: Vec::new(),
        next_idx: 0,
        leaf_hops: 0,
        include_deleted: reader.options().include_deleted,
        best_effort: reader.options().best_effort,
        returned: 0,
        skipped: 0,
    };
    cursor.descend()?;
    Ok(cursor)
}

impl<'a> Cursor<'a> {
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Rows handed out so far.
    pub fn rows_returned(&self) -> usize {
        self.returned
    }

    /// Records skipped in best-effort mode.
    pub fn records_skipped(&self) -> usize {
        self.skipped
    }

    pub fn root_page(&self) -> u32 {
        self.root_page
    }

    fn check_cancel(&self, page_no: u32) -> Result<(), IbdError> {
        match &self.options.cancel {
            Some(flag) if flag.load(AtomicOrdering::Relaxed) => Err(IbdError::Cancelled { page_no }),
            _ => Ok(()),
        }
    }

    fn fetch_node(&self, page_no: u32) -> Result<Arc<Page>, IbdError> {
        let page = self.reader.fetch(page_no)?;
        page.expect_kind(PageKind::BTreeNode)?;
        if let Some(index) = page.index_header() {
            index.check_row_format(page_no, self.schema.format().row_format)?;
        }
        Ok(page)
    }

    fn descend(&mut self) -> Result<(), IbdError> {
        let mut page_no = self.root_page;
        let mut expected_level: Option<u16> = None;

        loop {
            self.check_cancel(page_no)?;
            let page = self.fetch_node(page_no)?;
            let level = page.level().unwrap_or(0);
            if let Some(expected) = expected_level {
                if level != expected {
                    return Err(IbdError::Parse(format!(
                        "page {}: expected B+Tree level {}, found {}",
                        page_no, expected, level
                    )));
                }
            }
            if level == 0 {
                return self.enter_first_leaf(page);
            }

            self.state = CursorState::AtInternalNode { page_no, level };
            let records = walk_records(&page)?;
            if records.is_empty() {
                return Err(IbdError::Parse(format!(
                    "page {}: internal node has no node pointers",
                    page_no
                )));
            }
            let child = match &self.options.start_key {
                None => decode_node_pointer(&page, &records[0], self.schema)?.child,
                Some(target) => {
                    let mut pointers = Vec::with_capacity(records.len());
                    for info in &records {
                        pointers.push(decode_node_pointer(&page, info, self.schema)?);
                    }
                    // Full keys are unique, so a pointer equal to the target is
                    // the child that holds it. A prefix may span several children.
                    let full_key = target.len() == self.schema.key_field_count();
                    let n_before = pointers[1..].partition_point(|p| {
                        if p.min_rec {
                            return true;
                        }
                        match compare_key_prefix(&p.key, target) {
                            Ordering::Less => true,
                            Ordering::Equal => full_key,
                            Ordering::Greater => false,
                        }
                    });
                    pointers[n_before].child
                }
            };
            tracing::debug!(page_no, level, child, "descending");
            page_no = child;
            expected_level = Some(level - 1);
        }
    }

    fn enter_first_leaf(&mut self, page: Arc<Page>) -> Result<(), IbdError> {
        let page_no = page.page_no();
        let records = walk_records(&page)?;
        let start = match &self.options.start_key {
            None => 0,
            Some(target) => {
                // First record with key >= target
                let (mut lo, mut hi) = (0usize, records.len());
                while lo < hi {
                    let mid = lo + (hi - lo) / 2;
                    let key = decode_key(&page, &records[mid], self.schema)?;
                    if compare_key_prefix(&key, target) == Ordering::Less {
                        lo = mid + 1;
                    } else {
                        hi = mid;
                    }
                }
                lo
            }
        };
        tracing::debug!(page_no, start, n_recs = records.len(), "positioned on leaf");
        self.records = records;
        self.next_idx = start;
        self.leaf = Some(page);
        self.state = CursorState::AtLeaf { page_no };
        Ok(())
    }

    fn advance_leaf(&mut self, current: &Page) -> Result<bool, IbdError> {
        let next = match current.next_page() {
            Some(n) => n,
            None => return Ok(false),
        };
        self.check_cancel(next)?;
        self.leaf_hops += 1;
        if self.leaf_hops >= self.reader.page_count() {
            return Err(IbdError::Parse(format!(
                "page {}: leaf sibling chain still going after {} hops, it loops",
                current.page_no(),
                self.leaf_hops
            )));
        }
        let page = self.fetch_node(next)?;
        if page.level() != Some(0) {
            return Err(IbdError::Parse(format!(
                "page {}: next sibling {} is not a leaf",
                current.page_no(),
                next
            )));
        }
        self.records = walk_records(&page)?;
        self.next_idx = 0;
        tracing::debug!(from = current.page_no(), to = next, n_recs = self.records.len(), "next leaf");
        self.leaf = Some(page);
        self.state = CursorState::AtLeaf { page_no: next };
        Ok(true)
    }

    /// Fetch the next row, or `Ok(None)` at the end of the index.
    ///
    /// Errors end the scan: later calls return `Ok(None)`.
    pub fn next_row(&mut self) -> Result<Option<Row>, IbdError> {
        let result = self.step();
        if result.is_err() {
            self.state = CursorState::Exhausted;
        }
        result
    }

    fn step(&mut self) -> Result<Option<Row>, IbdError> {
        loop {
            match self.state {
                CursorState::Exhausted => return Ok(None),
                CursorState::Unpositioned | CursorState::AtInternalNode { .. } => self.descend()?,
                CursorState::AtLeaf { .. } => {}
            }
            if let Some(limit) = self.options.limit {
                if self.returned >= limit {
                    self.state = CursorState::Exhausted;
                    return Ok(None);
                }
            }
            let leaf = match &self.leaf {
                Some(p) => Arc::clone(p),
                None => {
                    self.state = CursorState::Exhausted;
                    return Ok(None);
                }
            };

            if self.next_idx >= self.records.len() {
                if !self.advance_leaf(&leaf)? {
                    tracing::debug!(rows = self.returned, "end of index");
                    self.state = CursorState::Exhausted;
                    return Ok(None);
                }
                continue;
            }

            let info = self.records[self.next_idx].clone();
            self.next_idx += 1;
            if info.header.delete_mark() && !self.include_deleted {
                continue;
            }
            match decode_record(&leaf, &info, self.schema, &self.projection) {
                Ok(decoded) => {
                    let row = materialize(self.reader, self.schema, &self.names, decoded)?;
                    self.returned += 1;
                    return Ok(Some(row));
                }
                Err(err @ IbdError::FieldDecode { .. }) if self.best_effort => {
                    tracing::warn!(page_no = leaf.page_no(), origin = info.origin, error = %err, "skipping record");
                    self.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Row, IbdError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}
