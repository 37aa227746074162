//! Synthetic tablespace builder shared by the integration tests.
//!
//! Builds a complete `.ibd` image byte by byte: an FSP header page, a
//! two-level clustered index (one root, several leaves) and the overflow
//! pages of externally stored columns, in either the compact or the
//! redundant record layout. Every page gets a valid CRC-32C checksum.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use tempfile::NamedTempFile;

use ibread::innodb::checksum::{stamp_checksum, ChecksumAlgorithm};
use ibread::innodb::constants::*;
use ibread::innodb::lob::lob_first_page_data_offset;
use ibread::innodb::schema::{
    Column, FieldDef, FieldKind, RowFormat, SchemaBuilder, ServerVersion, Storage, TableFormat,
    TableSchema,
};
use ibread::innodb::tablespace::{PageReader, ReaderOptions, Tablespace};

pub const PS: usize = SIZE_PAGE_DEFAULT as usize;
pub const SPACE_ID: u32 = 21;
pub const INDEX_ID: u64 = 144;

/// Values at or above this length are stored off-page.
const EXTERN_THRESHOLD: usize = 8000;

const PT_FSP_HDR: u16 = 8;
const PT_IBUF_BITMAP: u16 = 5;
const PT_INODE: u16 = 3;
pub const PT_INDEX: u16 = 17855;
const PT_BLOB: u16 = 10;
const PT_LOB_DATA: u16 = 23;
const PT_LOB_FIRST: u16 = 24;

/// One row of the `blobs` test table.
#[derive(Debug, Clone)]
pub struct FixtureRow {
    pub id: i32,
    pub name: Option<String>,
    pub tiny: Vec<u8>,
    pub body: Option<Vec<u8>>,
    pub deleted: bool,
}

/// 201 bytes: `97 + i`, then 200 newlines.
pub fn tiny_pattern(i: usize) -> Vec<u8> {
    let mut v = vec![0x0a; 201];
    v[0] = 97 + i as u8;
    v
}

/// Deterministic body content, distinct per row.
pub fn blob_pattern(id: i32, len: usize) -> Vec<u8> {
    (0..len).map(|j| ((j * 7 + id as usize * 13) % 251) as u8).collect()
}

/// The ten rows every fixture starts from.
///
/// Rows 1 to 3 carry 60001, 80001 and 100001 byte bodies stored off-page,
/// row 4 has NULL name and body, the rest have short inline bodies.
pub fn fixture_rows() -> Vec<FixtureRow> {
    (0..10)
        .map(|i| {
            let id = i as i32 + 1;
            let body = match id {
                1 => Some(blob_pattern(id, 60_001)),
                2 => Some(blob_pattern(id, 80_001)),
                3 => Some(blob_pattern(id, 100_001)),
                4 => None,
                _ => Some(blob_pattern(id, 40 + id as usize)),
            };
            FixtureRow {
                id,
                name: (id != 4).then(|| format!("row-{}", id)),
                tiny: tiny_pattern(i),
                body,
                deleted: false,
            }
        })
        .collect()
}

/// `blobs(id INT PRIMARY KEY, name VARCHAR(32) NULL, a TINYBLOB, b MEDIUMBLOB NULL)`.
pub fn blobs_schema(format: TableFormat) -> TableSchema {
    SchemaBuilder::new()
        .charset("latin1")
        .format(format)
        .column(Column::new("id", "int(11)").primary_key())
        .column(Column::new("name", "varchar(32)").nullable())
        .column(Column::new("a", "tinyblob"))
        .column(Column::new("b", "mediumblob").nullable())
        .build()
        .unwrap()
}

/// The same table as JSON, for the CLI.
pub fn blobs_schema_json(row_format: &str, server: &str) -> String {
    format!(
        r#"{{
  "charset": "latin1",
  "row_format": "{}",
  "server": "{}",
  "columns": [
    {{"name": "id", "type": "int(11)", "primary_key": true}},
    {{"name": "name", "type": "varchar(32)", "nullable": true}},
    {{"name": "a", "type": "tinyblob"}},
    {{"name": "b", "type": "mediumblob", "nullable": true}}
  ]
}}"#,
        row_format, server
    )
}

/// A built tablespace plus what the tests need to know about its layout.
pub struct Fixture {
    pub file: NamedTempFile,
    pub image: Vec<u8>,
    pub schema: TableSchema,
    pub rows: Vec<FixtureRow>,
    pub root: u32,
    pub leaves: Vec<u32>,
    /// Row id to (leaf page, record origin).
    pub origins: HashMap<i32, (u32, usize)>,
    /// Row id to the first page of its external body.
    pub extern_pages: HashMap<i32, u32>,
}

impl Fixture {
    pub fn reader(&self) -> PageReader {
        self.reader_with(ReaderOptions::default())
    }

    pub fn reader_with(&self, options: ReaderOptions) -> PageReader {
        let ts = Tablespace::open(self.file.path()).unwrap();
        PageReader::new(Arc::new(ts), options).unwrap()
    }

    pub fn page(&self, page_no: u32) -> &[u8] {
        let start = page_no as usize * PS;
        &self.image[start..start + PS]
    }

    /// Copy of the image with one page edited and its checksum restamped.
    pub fn patched<F: FnOnce(&mut [u8])>(&self, page_no: u32, edit: F) -> Vec<u8> {
        patch_page(&self.image, page_no, edit)
    }
}

/// Copy of `image` with one page edited and its checksum restamped.
pub fn patch_page<F: FnOnce(&mut [u8])>(image: &[u8], page_no: u32, edit: F) -> Vec<u8> {
    let mut image = image.to_vec();
    let start = page_no as usize * PS;
    let page = &mut image[start..start + PS];
    edit(page);
    stamp_checksum(page, PS as u32, ChecksumAlgorithm::Crc32c);
    image
}

/// Reader over an in-memory image.
pub fn reader_over(image: Vec<u8>, options: ReaderOptions) -> PageReader {
    let ts = Tablespace::from_bytes(image).unwrap();
    PageReader::new(Arc::new(ts), options).unwrap()
}

/// Write a tablespace image to a temp file.
pub fn write_image(image: &[u8]) -> NamedTempFile {
    let mut tmp = NamedTempFile::new().expect("create temp file");
    tmp.write_all(image).expect("write image");
    tmp.flush().expect("flush");
    tmp
}

/// Build the `blobs` table with the rows split over leaves of the given sizes.
pub fn build_table(format: TableFormat, rows: Vec<FixtureRow>, per_leaf: &[usize]) -> Fixture {
    assert_eq!(per_leaf.iter().sum::<usize>(), rows.len());
    let schema = blobs_schema(format);
    let root = format.server.default_clustered_root();
    let compact = format.row_format != RowFormat::Redundant;
    let antelope = format.row_format.keeps_local_prefix();

    let mut pages: Vec<Vec<u8>> = Vec::new();
    pages.push(vec![0u8; PS]); // page 0, filled in last
    pages.push(blank_page(1, PT_IBUF_BITMAP));
    pages.push(blank_page(2, PT_INODE));
    while pages.len() < root as usize {
        pages.push(vec![0u8; PS]);
    }
    let leaves: Vec<u32> = (0..per_leaf.len() as u32).map(|i| root + 1 + i).collect();
    let first_free = root + 1 + per_leaf.len() as u32;
    while pages.len() < first_free as usize {
        pages.push(vec![0u8; PS]);
    }

    // Off-page bodies go after the index pages
    let mut extern_pages = HashMap::new();
    let mut cells_by_row = Vec::with_capacity(rows.len());
    for row in &rows {
        let body = match &row.body {
            None => Cell::Null,
            Some(v) if v.len() < EXTERN_THRESHOLD => Cell::Data(v.clone()),
            Some(v) => {
                let prefix_len = if antelope { REC_ANTELOPE_MAX_INDEX_COL_LEN } else { 0 };
                let external = &v[prefix_len..];
                let first = pages.len() as u32;
                let (new_pages, ref_offset) = if format.server.has_lob_index_format() {
                    (lob_pages(first, external), 1)
                } else {
                    (blob_chain_pages(first, external), FIL_PAGE_DATA as u32)
                };
                pages.extend(new_pages);
                extern_pages.insert(row.id, first);
                let mut local = v[..prefix_len].to_vec();
                local.extend_from_slice(&extern_ref(first, ref_offset, external.len() as u64));
                Cell::Extern(local)
            }
        };
        cells_by_row.push(leaf_cells(&schema, row, body));
    }

    // Leaves
    let mut origins = HashMap::new();
    let mut first_keys = Vec::new();
    let mut next_row = 0;
    for (leaf_idx, &count) in per_leaf.iter().enumerate() {
        let page_no = leaves[leaf_idx];
        let mut recs = Vec::with_capacity(count);
        for r in next_row..next_row + count {
            let info = if rows[r].deleted { REC_INFO_DELETED_FLAG } else { 0 };
            recs.push(encode(&schema, schema.leaf_fields(), &cells_by_row[r], compact, false, info, 0));
        }
        first_keys.push(rows[next_row].id);
        let prev = if leaf_idx == 0 { FIL_NULL } else { leaves[leaf_idx - 1] };
        let next = leaves.get(leaf_idx + 1).copied().unwrap_or(FIL_NULL);
        let (page, recs_at) = index_page(page_no, 0, prev, next, compact, &recs);
        for (k, origin) in recs_at.into_iter().enumerate() {
            origins.insert(rows[next_row + k].id, (page_no, origin));
        }
        pages[page_no as usize] = page;
        next_row += count;
    }

    // Root: one node pointer per leaf, the leftmost flagged min_rec
    let n_key = schema.key_field_count();
    let key_defs = &schema.leaf_fields()[..n_key];
    let mut pointers = Vec::new();
    for (i, (&leaf, &key)) in leaves.iter().zip(&first_keys).enumerate() {
        let cells = vec![Cell::Data(int_bytes(key))];
        let info = if i == 0 { REC_INFO_MIN_REC_FLAG } else { 0 };
        pointers.push(encode(&schema, key_defs, &cells, compact, true, info, leaf));
    }
    let (root_page, _) = index_page(root, 1, FIL_NULL, FIL_NULL, compact, &pointers);
    pages[root as usize] = root_page;

    let total = pages.len() as u32;
    pages[0] = fsp_page(total);

    let mut image = Vec::with_capacity(pages.len() * PS);
    for mut page in pages {
        if page.iter().any(|&b| b != 0) {
            stamp_checksum(&mut page, PS as u32, ChecksumAlgorithm::Crc32c);
        }
        image.extend_from_slice(&page);
    }

    Fixture {
        file: write_image(&image),
        image,
        schema,
        rows,
        root,
        leaves,
        origins,
        extern_pages,
    }
}

/// A clustered index of any schema and height, without off-page values.
pub struct Tree {
    pub image: Vec<u8>,
    pub schema: TableSchema,
    pub root: u32,
    pub leaves: Vec<u32>,
    /// Levels including the leaf level.
    pub height: u16,
}

impl Tree {
    pub fn reader(&self) -> PageReader {
        reader_over(self.image.clone(), ReaderOptions::default())
    }
}

/// System columns of a leaf record (DB_TRX_ID, DB_ROLL_PTR).
pub fn system_cells(trx_id: u64) -> [Cell; 2] {
    [
        Cell::Data(trx_id.to_be_bytes()[2..].to_vec()),
        Cell::Data(((0x80u64 << 48) | trx_id).to_be_bytes()[1..].to_vec()),
    ]
}

/// Build a tree over `records` (leaf field cells, already in key order).
///
/// Leaves hold `per_leaf` records each; every internal node points at up to
/// `fanout` children, and levels are added until a single root remains.
pub fn build_tree(schema: TableSchema, records: Vec<Vec<Cell>>, per_leaf: &[usize], fanout: usize) -> Tree {
    assert_eq!(per_leaf.iter().sum::<usize>(), records.len());
    assert!(fanout >= 2);
    let compact = schema.format().row_format != RowFormat::Redundant;
    let n_key = schema.key_field_count();
    let key_defs = &schema.leaf_fields()[..n_key];

    let mut pages: Vec<Vec<u8>> = vec![vec![0u8; PS], blank_page(1, PT_IBUF_BITMAP), blank_page(2, PT_INODE)];

    // (page number, key cells of its first record) for the level just built
    let first_leaf = pages.len() as u32;
    let leaves: Vec<u32> = (0..per_leaf.len() as u32).map(|i| first_leaf + i).collect();
    let mut level_nodes = Vec::with_capacity(leaves.len());
    let mut next_rec = 0;
    for (i, &count) in per_leaf.iter().enumerate() {
        let recs: Vec<RecImage> = records[next_rec..next_rec + count]
            .iter()
            .map(|cells| encode(&schema, schema.leaf_fields(), cells, compact, false, 0, 0))
            .collect();
        let prev = if i == 0 { FIL_NULL } else { leaves[i - 1] };
        let next = leaves.get(i + 1).copied().unwrap_or(FIL_NULL);
        let (page, _) = index_page(leaves[i], 0, prev, next, compact, &recs);
        pages.push(page);
        level_nodes.push((leaves[i], records[next_rec][..n_key].to_vec()));
        next_rec += count;
    }

    let mut level = 0u16;
    while level_nodes.len() > 1 || level == 0 {
        level += 1;
        let groups: Vec<_> = level_nodes.chunks(fanout).collect();
        let first = pages.len() as u32;
        let mut parents = Vec::with_capacity(groups.len());
        for (g, group) in groups.iter().enumerate() {
            let page_no = first + g as u32;
            let pointers: Vec<RecImage> = group
                .iter()
                .enumerate()
                .map(|(k, (child, key))| {
                    let info = if g == 0 && k == 0 { REC_INFO_MIN_REC_FLAG } else { 0 };
                    encode(&schema, key_defs, key, compact, true, info, *child)
                })
                .collect();
            let prev = if g == 0 { FIL_NULL } else { page_no - 1 };
            let next = if g + 1 < groups.len() { page_no + 1 } else { FIL_NULL };
            let (page, _) = index_page(page_no, level, prev, next, compact, &pointers);
            pages.push(page);
            parents.push((page_no, group[0].1.clone()));
        }
        level_nodes = parents;
    }
    let root = level_nodes[0].0;

    pages[0] = fsp_page(pages.len() as u32);
    let mut image = Vec::with_capacity(pages.len() * PS);
    for mut page in pages {
        stamp_checksum(&mut page, PS as u32, ChecksumAlgorithm::Crc32c);
        image.extend_from_slice(&page);
    }
    Tree {
        image,
        schema,
        root,
        leaves,
        height: level + 1,
    }
}

/// The default layout: ten rows over three leaves.
pub fn standard_fixture(format: TableFormat) -> Fixture {
    build_table(format, fixture_rows(), &[4, 3, 3])
}

// ---------- pages ----------

pub fn blank_page(page_no: u32, page_type: u16) -> Vec<u8> {
    let mut page = vec![0u8; PS];
    BigEndian::write_u32(&mut page[FIL_PAGE_OFFSET..], page_no);
    BigEndian::write_u32(&mut page[FIL_PAGE_PREV..], FIL_NULL);
    BigEndian::write_u32(&mut page[FIL_PAGE_NEXT..], FIL_NULL);
    BigEndian::write_u64(&mut page[FIL_PAGE_LSN..], 0x2000 + page_no as u64 * 16);
    BigEndian::write_u16(&mut page[FIL_PAGE_TYPE..], page_type);
    BigEndian::write_u32(&mut page[FIL_PAGE_SPACE_ID..], SPACE_ID);
    page
}

fn fsp_page(total_pages: u32) -> Vec<u8> {
    let mut page = blank_page(0, PT_FSP_HDR);
    let fsp = FIL_PAGE_DATA;
    BigEndian::write_u32(&mut page[fsp + FSP_SPACE_ID..], SPACE_ID);
    BigEndian::write_u32(&mut page[fsp + FSP_SIZE..], total_pages);
    BigEndian::write_u32(&mut page[fsp + FSP_FREE_LIMIT..], total_pages);
    BigEndian::write_u32(&mut page[fsp + FSP_SPACE_FLAGS..], 0);
    page
}

fn blob_chain_pages(first: u32, data: &[u8]) -> Vec<Vec<u8>> {
    let cap = PS - FIL_PAGE_DATA - BTR_BLOB_HDR_SIZE - SIZE_FIL_TRAILER;
    let chunks: Vec<&[u8]> = data.chunks(cap).collect();
    let mut out = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let page_no = first + i as u32;
        let mut page = blank_page(page_no, PT_BLOB);
        let hdr = FIL_PAGE_DATA;
        BigEndian::write_u32(&mut page[hdr + BTR_BLOB_HDR_PART_LEN..], chunk.len() as u32);
        let next = if i + 1 < chunks.len() { page_no + 1 } else { FIL_NULL };
        BigEndian::write_u32(&mut page[hdr + BTR_BLOB_HDR_NEXT_PAGE_NO..], next);
        let start = hdr + BTR_BLOB_HDR_SIZE;
        page[start..start + chunk.len()].copy_from_slice(chunk);
        out.push(page);
    }
    out
}

fn lob_pages(first: u32, data: &[u8]) -> Vec<Vec<u8>> {
    let data_off = lob_first_page_data_offset(PS as u32);
    let first_cap = PS - SIZE_FIL_TRAILER - data_off;
    let data_cap = PS - SIZE_FIL_TRAILER - LOB_DATA_PAGE_DATA;

    let mut chunks: Vec<&[u8]> = vec![&data[..first_cap.min(data.len())]];
    if data.len() > first_cap {
        chunks.extend(data[first_cap..].chunks(data_cap));
    }
    assert!(chunks.len() <= 10, "value needs more index entries than the first page holds");

    let mut head = blank_page(first, PT_LOB_FIRST);
    head[LOB_FIRST_OFFSET_VERSION] = 1;
    BigEndian::write_u32(&mut head[LOB_FIRST_OFFSET_DATA_LEN..], chunks[0].len() as u32);
    let list = LOB_FIRST_OFFSET_INDEX_LIST;
    BigEndian::write_u32(&mut head[list + FLST_LEN..], chunks.len() as u32);
    let entry_off = |i: usize| LOB_FIRST_PAGE_DATA + i * LOB_INDEX_ENTRY_SIZE;
    BigEndian::write_u32(&mut head[list + FLST_FIRST..], first);
    BigEndian::write_u16(&mut head[list + FLST_FIRST + 4..], entry_off(0) as u16);

    let mut out = vec![];
    let mut data_pages = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let e = entry_off(i);
        if i + 1 < chunks.len() {
            BigEndian::write_u32(&mut head[e + LOB_INDEX_ENTRY_OFFSET_NEXT..], first);
            BigEndian::write_u16(&mut head[e + LOB_INDEX_ENTRY_OFFSET_NEXT + 4..], entry_off(i + 1) as u16);
        } else {
            BigEndian::write_u32(&mut head[e + LOB_INDEX_ENTRY_OFFSET_NEXT..], FIL_NULL);
        }
        let page_no = first + i as u32;
        BigEndian::write_u32(&mut head[e + LOB_INDEX_ENTRY_OFFSET_PAGE_NO..], page_no);
        BigEndian::write_u16(&mut head[e + LOB_INDEX_ENTRY_OFFSET_DATA_LEN..], chunk.len() as u16);
        if i == 0 {
            head[data_off..data_off + chunk.len()].copy_from_slice(chunk);
        } else {
            let mut p = blank_page(page_no, PT_LOB_DATA);
            BigEndian::write_u32(&mut p[LOB_DATA_OFFSET_DATA_LEN..], chunk.len() as u32);
            p[LOB_DATA_PAGE_DATA..LOB_DATA_PAGE_DATA + chunk.len()].copy_from_slice(chunk);
            data_pages.push(p);
        }
    }
    out.push(head);
    out.extend(data_pages);
    out
}

pub fn extern_ref(page_no: u32, offset: u32, length: u64) -> [u8; 20] {
    let mut r = [0u8; 20];
    BigEndian::write_u32(&mut r[BTR_EXTERN_SPACE_ID..], SPACE_ID);
    BigEndian::write_u32(&mut r[BTR_EXTERN_PAGE_NO..], page_no);
    BigEndian::write_u32(&mut r[BTR_EXTERN_OFFSET..], offset);
    BigEndian::write_u64(&mut r[BTR_EXTERN_LEN..], length);
    r
}

// ---------- records ----------

/// One stored field value.
#[derive(Debug, Clone)]
pub enum Cell {
    Null,
    Data(Vec<u8>),
    /// Local part of an external field, ending in its 20-byte reference.
    Extern(Vec<u8>),
}

/// Signed INT as stored: big-endian with the sign bit flipped.
pub fn int_bytes(v: i32) -> Vec<u8> {
    ((v as u32) ^ 0x8000_0000).to_be_bytes().to_vec()
}

fn leaf_cells(schema: &TableSchema, row: &FixtureRow, body: Cell) -> Vec<Cell> {
    let mut body = Some(body);
    schema
        .leaf_fields()
        .iter()
        .map(|def| match def.kind {
            FieldKind::Column(0) => Cell::Data(int_bytes(row.id)),
            FieldKind::Column(1) => match &row.name {
                Some(n) => Cell::Data(n.as_bytes().to_vec()),
                None => Cell::Null,
            },
            FieldKind::Column(2) => Cell::Data(row.tiny.clone()),
            FieldKind::Column(_) => body.take().unwrap_or(Cell::Null),
            FieldKind::TrxId => Cell::Data((0x0500 + row.id as u64).to_be_bytes()[2..].to_vec()),
            FieldKind::RollPtr => {
                Cell::Data(((0x80u64 << 48) | row.id as u64).to_be_bytes()[1..].to_vec())
            }
            FieldKind::RowId => Cell::Data((row.id as u64).to_be_bytes()[2..].to_vec()),
        })
        .collect()
}

/// A record ready to be laid out on a page.
pub struct RecImage {
    /// Bytes below the fixed header, in memory order.
    below: Vec<u8>,
    body: Vec<u8>,
    info_bits: u8,
    status: u8,
    n_fields: usize,
    short: bool,
}

fn encode(
    schema: &TableSchema,
    defs: &[FieldDef],
    cells: &[Cell],
    compact: bool,
    node_ptr: bool,
    info_bits: u8,
    child: u32,
) -> RecImage {
    let mut body = Vec::new();
    for cell in cells {
        if let Cell::Data(d) | Cell::Extern(d) = cell {
            body.extend_from_slice(d);
        }
    }
    if node_ptr {
        body.extend_from_slice(&child.to_be_bytes());
    }

    let below = if compact {
        // Built downward from the header, reversed at the end
        let n_nullable = schema.leaf_fields().iter().filter(|f| f.nullable).count();
        let mut bitmap = vec![0u8; n_nullable.div_ceil(8)];
        let mut lens = Vec::new();
        let mut null_idx = 0;
        for (def, cell) in defs.iter().zip(cells) {
            if def.nullable {
                if matches!(cell, Cell::Null) {
                    bitmap[null_idx / 8] |= 1 << (null_idx % 8);
                }
                null_idx += 1;
            }
            let (len, ext) = match cell {
                Cell::Null => continue,
                Cell::Data(d) => (d.len(), false),
                Cell::Extern(d) => (d.len(), true),
            };
            match def.storage {
                Storage::Fixed(n) => assert_eq!(n, len, "fixed field length"),
                Storage::Variable { big, .. } => {
                    if big && (len > 127 || ext) {
                        lens.push(0x80 | if ext { 0x40 } else { 0 } | (len >> 8) as u8);
                        lens.push(len as u8);
                    } else {
                        lens.push(len as u8);
                    }
                }
            }
        }
        let mut down = bitmap;
        down.extend(lens);
        down.reverse();
        down
    } else {
        let n = cells.len() + node_ptr as usize;
        let short = body.len() < 128 && !cells.iter().any(|c| matches!(c, Cell::Extern(_)));
        let mut down = Vec::new();
        let mut end = 0usize;
        let push = |end: usize, null: bool, ext: bool, down: &mut Vec<u8>| {
            if short {
                down.push(end as u8 | if null { 0x80 } else { 0 });
            } else {
                let v = end as u16 | if null { 0x8000 } else { 0 } | if ext { 0x4000 } else { 0 };
                down.push(v as u8);
                down.push((v >> 8) as u8);
            }
        };
        for cell in cells {
            match cell {
                Cell::Null => push(end, true, false, &mut down),
                Cell::Data(d) => {
                    end += d.len();
                    push(end, false, false, &mut down);
                }
                Cell::Extern(d) => {
                    end += d.len();
                    push(end, false, true, &mut down);
                }
            }
        }
        if node_ptr {
            end += REC_NODE_PTR_SIZE;
            push(end, false, false, &mut down);
        }
        down.reverse();
        return RecImage {
            below: down,
            body,
            info_bits,
            status: 0,
            n_fields: n,
            short,
        };
    };

    RecImage {
        below,
        body,
        info_bits,
        status: if node_ptr { 1 } else { 0 },
        n_fields: cells.len() + node_ptr as usize,
        short: false,
    }
}

/// Lay records out on an INDEX page. Returns the page and each record's origin.
pub fn index_page(
    page_no: u32,
    level: u16,
    prev: u32,
    next: u32,
    compact: bool,
    recs: &[RecImage],
) -> (Vec<u8>, Vec<usize>) {
    let mut page = blank_page(page_no, PT_INDEX);
    BigEndian::write_u32(&mut page[FIL_PAGE_PREV..], prev);
    BigEndian::write_u32(&mut page[FIL_PAGE_NEXT..], next);

    let extra = if compact { REC_N_NEW_EXTRA_BYTES } else { REC_N_OLD_EXTRA_BYTES };
    let (infimum, supremum, mut pos) = if compact {
        (PAGE_NEW_INFIMUM, PAGE_NEW_SUPREMUM, PAGE_NEW_SUPREMUM + 8)
    } else {
        (PAGE_OLD_INFIMUM, PAGE_OLD_SUPREMUM, PAGE_OLD_SUPREMUM + 9)
    };

    let mut origins = Vec::with_capacity(recs.len());
    for (i, rec) in recs.iter().enumerate() {
        let origin = pos + rec.below.len() + extra;
        page[pos..pos + rec.below.len()].copy_from_slice(&rec.below);
        page[origin..origin + rec.body.len()].copy_from_slice(&rec.body);
        let heap_no = 2 + i as u16;
        if compact {
            page[origin - 5] = rec.info_bits;
            BigEndian::write_u16(&mut page[origin - 4..], (heap_no << 3) | rec.status as u16);
        } else {
            page[origin - 6] = rec.info_bits;
            let bits = ((heap_no as u32) << 11) | ((rec.n_fields as u32) << 1) | rec.short as u32;
            page[origin - 5] = (bits >> 16) as u8;
            page[origin - 4] = (bits >> 8) as u8;
            page[origin - 3] = bits as u8;
        }
        origins.push(origin);
        pos = origin + rec.body.len();
    }

    // System records and the next-record chain
    let mut chain = vec![infimum];
    chain.extend(&origins);
    chain.push(supremum);
    if compact {
        page[infimum - 5] = 0x01;
        BigEndian::write_u16(&mut page[infimum - 4..], 0x0002);
        page[infimum..infimum + 8].copy_from_slice(b"infimum\0");
        page[supremum - 5] = (recs.len() + 1) as u8;
        BigEndian::write_u16(&mut page[supremum - 4..], (1 << 3) | 0x0003);
        page[supremum..supremum + 8].copy_from_slice(b"supremum");
        for w in chain.windows(2) {
            BigEndian::write_i16(&mut page[w[0] - 2..], (w[1] as isize - w[0] as isize) as i16);
        }
    } else {
        page[infimum - 6] = 0x01;
        page[infimum - 5..infimum - 2].copy_from_slice(&[0x00, 0x00, 0x03]);
        page[infimum - 7] = 8;
        page[infimum..infimum + 8].copy_from_slice(b"infimum\0");
        page[supremum - 6] = (recs.len() + 1) as u8;
        page[supremum - 5..supremum - 2].copy_from_slice(&[0x00, 0x08, 0x03]);
        page[supremum - 7] = 9;
        page[supremum..supremum + 9].copy_from_slice(b"supremum\0");
        for w in chain.windows(2) {
            BigEndian::write_u16(&mut page[w[0] - 2..], w[1] as u16);
        }
    }

    let ph = FIL_PAGE_DATA;
    let n_heap = 2 + recs.len() as u16;
    BigEndian::write_u16(&mut page[ph + PAGE_N_DIR_SLOTS..], 2);
    BigEndian::write_u16(&mut page[ph + PAGE_HEAP_TOP..], pos as u16);
    BigEndian::write_u16(
        &mut page[ph + PAGE_N_HEAP..],
        if compact { 0x8000 | n_heap } else { n_heap },
    );
    BigEndian::write_u16(&mut page[ph + PAGE_N_RECS..], recs.len() as u16);
    BigEndian::write_u16(&mut page[ph + PAGE_LEVEL..], level);
    BigEndian::write_u64(&mut page[ph + PAGE_INDEX_ID..], INDEX_ID);

    // Page directory: infimum and supremum slots
    let dir = PS - SIZE_FIL_TRAILER;
    BigEndian::write_u16(&mut page[dir - 2..], infimum as u16);
    BigEndian::write_u16(&mut page[dir - 4..], supremum as u16);

    (page, origins)
}

pub fn mysql57() -> TableFormat {
    TableFormat::mysql57_dynamic()
}

pub fn mysql80() -> TableFormat {
    TableFormat::mysql80_dynamic()
}

pub fn antelope_compact() -> TableFormat {
    TableFormat::new(RowFormat::Compact, ServerVersion::Mysql56)
}

pub fn antelope_redundant() -> TableFormat {
    TableFormat::new(RowFormat::Redundant, ServerVersion::Mysql56)
}
