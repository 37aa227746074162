//! Clustered index record decoding.
//!
//! Turns one record on an INDEX page into typed values. The variable part of
//! a record header grows backwards from the record origin, so everything
//! here reads right-to-left before the fixed header and left-to-right after
//! it:
//!
//! ```text
//! compact:   [lengths ...][null bitmap][(n_fields)][5-byte header] origin [fields ...]
//! redundant: [end offsets ...][6-byte header] origin [fields ...]
//! ```
//!
//! Decoding happens in two steps. [`decode_record`] is a pure function of
//! the page bytes and the schema; it returns a [`DecodedRecord`] whose
//! externally stored columns are still pending as [`ExternField`]s.
//! [`materialize`] then chases those references through a [`PageReader`]
//! and produces the final [`Row`].

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::innodb::constants::*;
use crate::innodb::field_decode::{decode_value, read_be_uint, FieldValue};
use crate::innodb::lob::{resolve_overflow, ExternRef};
use crate::innodb::page::Page;
use crate::innodb::record::{RecordHeader, RecordInfo};
use crate::innodb::schema::{FieldDef, FieldKind, Storage, TableSchema};
use crate::innodb::tablespace::PageReader;
use crate::IbdError;

/// Set of columns a scan materializes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    selected: Option<Vec<bool>>,
}

impl Projection {
    /// Every column.
    pub fn all() -> Self {
        Projection::default()
    }

    /// Only the named columns; unknown names are rejected.
    pub fn of<S: AsRef<str>>(schema: &TableSchema, names: &[S]) -> Result<Self, IbdError> {
        let mut selected = vec![false; schema.column_count()];
        for name in names {
            let name = name.as_ref();
            let pos = schema
                .position(name)
                .ok_or_else(|| IbdError::Argument(format!("unknown column '{}'", name)))?;
            selected[pos] = true;
        }
        Ok(Projection {
            selected: Some(selected),
        })
    }

    pub fn includes(&self, position: usize) -> bool {
        match &self.selected {
            Some(sel) => sel.get(position).copied().unwrap_or(false),
            None => true,
        }
    }
}

/// Where a record came from, plus its hidden system columns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RecordMeta {
    pub page_no: u32,
    /// Record origin offset within the page.
    pub origin: usize,
    pub heap_no: u16,
    pub deleted: bool,
    pub trx_id: Option<u64>,
    pub roll_ptr: Option<u64>,
    /// Hidden row id, only for tables without a primary key.
    pub row_id: Option<u64>,
}

/// A column stored off-page, waiting for [`materialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternField {
    /// Declaration position of the column.
    pub position: usize,
    pub reference: ExternRef,
    /// Locally stored prefix (768 bytes for Redundant/Compact, empty for Dynamic).
    pub prefix: Vec<u8>,
}

/// Output of [`decode_record`]: values in declaration order.
///
/// `values[i]` is `None` when column `i` is outside the projection or is
/// one of the pending `externs`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub meta: RecordMeta,
    pub values: Vec<Option<FieldValue>>,
    pub externs: Vec<ExternField>,
}

/// A decoded node pointer from a non-leaf page.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePointer {
    /// Smallest key in the child subtree.
    pub key: Vec<FieldValue>,
    pub child: u32,
    /// Leftmost pointer on its level; compares below every key.
    pub min_rec: bool,
}

/// A fully materialized row.
#[derive(Debug, Clone)]
pub struct Row {
    names: Arc<[String]>,
    values: Vec<Option<FieldValue>>,
    field_errors: Vec<(String, IbdError)>,
    meta: RecordMeta,
}

impl Row {
    /// Value of a column by name; `None` if the column is not projected.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        let pos = self.names.iter().position(|n| n == name)?;
        self.get_at(pos)
    }

    /// Value by declaration position.
    pub fn get_at(&self, position: usize) -> Option<&FieldValue> {
        self.values.get(position).and_then(|v| v.as_ref())
    }

    /// One entry per schema column, in declaration order.
    pub fn values(&self) -> &[Option<FieldValue>] {
        &self.values
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// `(name, value)` pairs in declaration order, projected columns only.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.names
            .iter()
            .zip(&self.values)
            .filter_map(|(n, v)| v.as_ref().map(|v| (n.as_str(), v)))
    }

    /// Per-field failures (overflow chains that could not be resolved).
    pub fn field_errors(&self) -> &[(String, IbdError)] {
        &self.field_errors
    }

    pub fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSlot {
    offset: usize,
    len: usize,
    null: bool,
    external: bool,
}

fn field_name(schema: &TableSchema, def: Option<&FieldDef>) -> String {
    match def.map(|d| d.kind) {
        Some(FieldKind::Column(p)) => schema
            .column(p)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("#{}", p)),
        Some(FieldKind::RowId) => "DB_ROW_ID".to_string(),
        Some(FieldKind::TrxId) => "DB_TRX_ID".to_string(),
        Some(FieldKind::RollPtr) => "DB_ROLL_PTR".to_string(),
        None => "child page".to_string(),
    }
}

fn field_error(page_no: u32, offset: usize, column: String, detail: String) -> IbdError {
    IbdError::FieldDecode {
        page_no,
        offset,
        column,
        detail,
    }
}

/// Locate every stored field of a record.
///
/// `defs` are the fields the record is expected to hold, in physical order.
/// With `child` set a 4-byte child page number follows them (node pointers).
/// Returns one slot per stored field; instant records may store fewer
/// fields than `defs`.
fn locate_fields(
    page: &Page,
    origin: usize,
    header: &RecordHeader,
    schema: &TableSchema,
    defs: &[FieldDef],
    child: bool,
) -> Result<Vec<FieldSlot>, IbdError> {
    let page_no = page.page_no();
    let index = page.index_header().ok_or_else(|| IbdError::UnsupportedFormat {
        page_no: Some(page_no),
        detail: format!("{} page holds no records", page.page_type()),
    })?;
    index.check_row_format(page_no, schema.format().row_format)?;
    if index.is_compact() {
        compact_slots(page, origin, header, schema, defs, child)
    } else {
        redundant_slots(page, origin, header, schema, defs, child)
    }
}

fn compact_slots(
    page: &Page,
    origin: usize,
    header: &RecordHeader,
    schema: &TableSchema,
    defs: &[FieldDef],
    child: bool,
) -> Result<Vec<FieldSlot>, IbdError> {
    let data = page.data();
    let page_no = page.page_no();
    let limit = data.len() - SIZE_FIL_TRAILER;
    let floor = PAGE_DATA_OFFSET;
    let header_err = |detail: String| field_error(page_no, origin, "record header".to_string(), detail);

    if header.versioned() {
        return Err(IbdError::UnsupportedFormat {
            page_no: Some(page_no),
            detail: format!("record at {} carries a row version (instant ADD/DROP COLUMN)", origin),
        });
    }

    // First byte below the fixed header
    let mut below = origin - REC_N_NEW_EXTRA_BYTES;
    let n_stored = if header.instant() && !child {
        if !schema.format().server.supports_instant_columns() {
            return Err(IbdError::UnsupportedFormat {
                page_no: Some(page_no),
                detail: format!(
                    "record at {} uses instant ADD COLUMN, not available on {}",
                    origin,
                    schema.format().server
                ),
            });
        }
        if below < floor + 1 {
            return Err(header_err("field count runs off the page".to_string()));
        }
        let b = data[below - 1];
        let n = if b & 0x80 != 0 {
            if below < floor + 2 {
                return Err(header_err("two-byte field count runs off the page".to_string()));
            }
            below -= 2;
            (((b & 0x7F) as usize) << 8) | data[below] as usize
        } else {
            below -= 1;
            b as usize
        };
        if n > defs.len() {
            return Err(header_err(format!(
                "record stores {} fields, the table defines {}",
                n,
                defs.len()
            )));
        }
        n
    } else if child {
        defs.len()
    } else {
        // Written before the first instant ADD COLUMN
        schema.fields_before_instant().unwrap_or(defs.len())
    };

    // Node pointers share the leaf bitmap width
    let n_nullable = if child {
        schema.leaf_fields().iter().filter(|f| f.nullable).count()
    } else {
        defs[..n_stored].iter().filter(|f| f.nullable).count()
    };
    let null_bytes = n_nullable.div_ceil(8);
    if below < floor + null_bytes {
        return Err(header_err("null bitmap runs off the page".to_string()));
    }
    let nulls_top = below;
    let mut lens = below - null_bytes;

    let mut slots = Vec::with_capacity(n_stored + child as usize);
    let mut null_idx = 0;
    let mut pos = origin;
    for def in &defs[..n_stored] {
        if def.nullable {
            let byte = data[nulls_top - 1 - null_idx / 8];
            let is_null = (byte >> (null_idx % 8)) & 1 != 0;
            null_idx += 1;
            if is_null {
                slots.push(FieldSlot {
                    offset: pos,
                    len: 0,
                    null: true,
                    external: false,
                });
                continue;
            }
        }

        let (len, external) = match def.storage {
            Storage::Fixed(n) => (n, false),
            Storage::Variable { big, .. } => {
                if lens <= floor {
                    return Err(field_error(
                        page_no,
                        pos,
                        field_name(schema, Some(def)),
                        "length array runs off the page".to_string(),
                    ));
                }
                lens -= 1;
                let b1 = data[lens];
                if big && b1 & 0x80 != 0 {
                    if lens <= floor {
                        return Err(field_error(
                            page_no,
                            pos,
                            field_name(schema, Some(def)),
                            "length array runs off the page".to_string(),
                        ));
                    }
                    lens -= 1;
                    let b2 = data[lens];
                    ((((b1 & 0x3F) as usize) << 8) | b2 as usize, b1 & 0x40 != 0)
                } else {
                    (b1 as usize, false)
                }
            }
        };
        if pos + len > limit {
            return Err(field_error(
                page_no,
                pos,
                field_name(schema, Some(def)),
                format!("length {} runs past the end of the page", len),
            ));
        }
        slots.push(FieldSlot {
            offset: pos,
            len,
            null: false,
            external,
        });
        pos += len;
    }

    if child {
        if pos + REC_NODE_PTR_SIZE > limit {
            return Err(field_error(
                page_no,
                pos,
                field_name(schema, None),
                "child pointer runs past the end of the page".to_string(),
            ));
        }
        slots.push(FieldSlot {
            offset: pos,
            len: REC_NODE_PTR_SIZE,
            null: false,
            external: false,
        });
    }
    Ok(slots)
}

fn redundant_slots(
    page: &Page,
    origin: usize,
    header: &RecordHeader,
    schema: &TableSchema,
    defs: &[FieldDef],
    child: bool,
) -> Result<Vec<FieldSlot>, IbdError> {
    let data = page.data();
    let page_no = page.page_no();
    let limit = data.len() - SIZE_FIL_TRAILER;
    let header_err = |detail: String| field_error(page_no, origin, "record header".to_string(), detail);

    let n_fields = header.n_fields.unwrap_or(0) as usize;
    let expected = defs.len() + child as usize;
    if child && n_fields != expected {
        return Err(header_err(format!(
            "node pointer stores {} fields, expected {}",
            n_fields, expected
        )));
    }
    if n_fields > expected || n_fields == 0 {
        return Err(header_err(format!(
            "record stores {} fields, the table defines {}",
            n_fields,
            defs.len()
        )));
    }
    let entry_size = if header.short_offsets { 1 } else { 2 };
    if origin < PAGE_DATA_OFFSET + REC_N_OLD_EXTRA_BYTES + n_fields * entry_size {
        return Err(header_err("field offsets run off the page".to_string()));
    }

    let mut slots = Vec::with_capacity(n_fields);
    let mut start = 0usize;
    for i in 0..n_fields {
        let def = defs.get(i);
        let (end, null, external) = if header.short_offsets {
            let b = data[origin - REC_N_OLD_EXTRA_BYTES - i - 1];
            ((b & 0x7F) as usize, b & 0x80 != 0, false)
        } else {
            let v = BigEndian::read_u16(&data[origin - REC_N_OLD_EXTRA_BYTES - 2 * i - 2..]);
            ((v & 0x3FFF) as usize, v & 0x8000 != 0, v & 0x4000 != 0)
        };
        let name = || field_name(schema, def);
        if end < start {
            return Err(field_error(
                page_no,
                origin + start,
                name(),
                format!("end offset {} precedes start {}", end, start),
            ));
        }
        let len = end - start;
        let offset = origin + start;
        if offset + len > limit {
            return Err(field_error(
                page_no,
                offset,
                name(),
                format!("length {} runs past the end of the page", len),
            ));
        }
        match def.map(|d| d.storage) {
            Some(Storage::Fixed(n)) if !null && len != n => {
                return Err(field_error(
                    page_no,
                    offset,
                    name(),
                    format!("fixed-length field holds {} bytes, expected {}", len, n),
                ));
            }
            None if len != REC_NODE_PTR_SIZE => {
                return Err(field_error(
                    page_no,
                    offset,
                    name(),
                    format!("child pointer holds {} bytes", len),
                ));
            }
            _ => {}
        }
        slots.push(FieldSlot {
            offset,
            len,
            null,
            external,
        });
        start = end;
    }
    Ok(slots)
}

fn key_value(
    page: &Page,
    schema: &TableSchema,
    def: &FieldDef,
    slot: &FieldSlot,
) -> Result<FieldValue, IbdError> {
    if slot.null {
        return Ok(FieldValue::Null);
    }
    let bytes = &page.data()[slot.offset..slot.offset + slot.len];
    match def.kind {
        FieldKind::Column(p) => {
            let col = schema
                .column(p)
                .ok_or_else(|| IbdError::Argument(format!("schema has no column {}", p)))?;
            decode_value(&col.column_type, bytes, schema.charset())
                .map_err(|e| field_error(page.page_no(), slot.offset, col.name.clone(), e.0))
        }
        _ => Ok(FieldValue::Uint(read_be_uint(bytes))),
    }
}

/// Decode a node pointer record from a non-leaf page.
pub fn decode_node_pointer(page: &Page, info: &RecordInfo, schema: &TableSchema) -> Result<NodePointer, IbdError> {
    let key_defs = &schema.leaf_fields()[..schema.key_field_count()];
    let slots = locate_fields(page, info.origin, &info.header, schema, key_defs, true)?;
    let mut key = Vec::with_capacity(key_defs.len());
    for (def, slot) in key_defs.iter().zip(&slots) {
        key.push(key_value(page, schema, def, slot)?);
    }
    let child_slot = slots
        .last()
        .ok_or_else(|| IbdError::Parse(format!("page {}: empty node pointer", page.page_no())))?;
    let child = BigEndian::read_u32(&page.data()[child_slot.offset..]);
    Ok(NodePointer {
        key,
        child,
        min_rec: info.header.min_rec(),
    })
}

/// Decode the primary key (or `DB_ROW_ID`) of a leaf record.
pub fn decode_key(page: &Page, info: &RecordInfo, schema: &TableSchema) -> Result<Vec<FieldValue>, IbdError> {
    let n_key = schema.key_field_count();
    let defs = schema.leaf_fields();
    let slots = locate_fields(page, info.origin, &info.header, schema, defs, false)?;
    defs[..n_key]
        .iter()
        .zip(&slots)
        .map(|(def, slot)| key_value(page, schema, def, slot))
        .collect()
}

/// Decode one leaf record.
///
/// Fails with [`IbdError::FieldDecode`] when lengths or offsets are
/// inconsistent with the page, and [`IbdError::UnsupportedFormat`] for
/// record variants this reader does not handle. Columns outside
/// `projection` are neither decoded nor chased off-page.
pub fn decode_record(
    page: &Page,
    info: &RecordInfo,
    schema: &TableSchema,
    projection: &Projection,
) -> Result<DecodedRecord, IbdError> {
    let page_no = page.page_no();
    if page.level() != Some(0) {
        return Err(IbdError::Argument(format!(
            "page {} is not a leaf page, records there are node pointers",
            page_no
        )));
    }
    let defs = schema.leaf_fields();
    let slots = locate_fields(page, info.origin, &info.header, schema, defs, false)?;
    let data = page.data();
    let keeps_prefix = schema.format().row_format.keeps_local_prefix();

    let mut meta = RecordMeta {
        page_no,
        origin: info.origin,
        heap_no: info.header.heap_no,
        deleted: info.header.delete_mark(),
        ..RecordMeta::default()
    };
    let mut values: Vec<Option<FieldValue>> = vec![None; schema.column_count()];
    let mut externs = Vec::new();

    for (i, def) in defs.iter().enumerate() {
        let slot = match slots.get(i) {
            Some(s) => s,
            None => {
                // Added by instant ADD COLUMN after this record was written
                if let FieldKind::Column(p) = def.kind {
                    if projection.includes(p) {
                        values[p] = Some(FieldValue::Unavailable(
                            "column added after this record was written".to_string(),
                        ));
                    }
                }
                continue;
            }
        };
        let bytes = &data[slot.offset..slot.offset + slot.len];
        match def.kind {
            FieldKind::RowId => meta.row_id = Some(read_be_uint(bytes)),
            FieldKind::TrxId => meta.trx_id = Some(read_be_uint(bytes)),
            FieldKind::RollPtr => meta.roll_ptr = Some(read_be_uint(bytes)),
            FieldKind::Column(p) => {
                if !projection.includes(p) {
                    continue;
                }
                let col = &schema.columns()[p];
                if slot.null {
                    values[p] = Some(FieldValue::Null);
                    continue;
                }
                if slot.external {
                    if !matches!(col.storage, Storage::Variable { big: true, .. }) {
                        return Err(field_error(
                            page_no,
                            slot.offset,
                            col.name.clone(),
                            format!("{} column cannot be stored externally", col.column_type),
                        ));
                    }
                    let reference = ExternRef::parse(bytes).ok_or_else(|| {
                        field_error(
                            page_no,
                            slot.offset,
                            col.name.clone(),
                            format!("external field of {} bytes is shorter than its reference", slot.len),
                        )
                    })?;
                    let local = &bytes[..bytes.len() - BTR_EXTERN_FIELD_REF_SIZE];
                    externs.push(ExternField {
                        position: p,
                        reference,
                        prefix: if keeps_prefix { local.to_vec() } else { Vec::new() },
                    });
                    continue;
                }
                let value = decode_value(&col.column_type, bytes, schema.charset())
                    .map_err(|e| field_error(page_no, slot.offset, col.name.clone(), e.0))?;
                values[p] = Some(value);
            }
        }
    }

    Ok(DecodedRecord { meta, values, externs })
}

/// Resolve pending external fields and build the final [`Row`].
///
/// A chain that is broken or ends early does not fail the row: the field
/// becomes [`FieldValue::Errored`] and the error is kept in
/// [`Row::field_errors`]. Compressed large objects become
/// [`FieldValue::Unavailable`].
///
/// # Errors
///
/// A chain page that fails its checksum, cannot be read, or a cancelled
/// fetch ends the row with the reader's error.
pub fn materialize(
    reader: &PageReader,
    schema: &TableSchema,
    names: &Arc<[String]>,
    record: DecodedRecord,
) -> Result<Row, IbdError> {
    let DecodedRecord {
        meta,
        mut values,
        externs,
    } = record;
    let mut field_errors = Vec::new();

    for ext in externs {
        let col = &schema.columns()[ext.position];
        let outcome = if ext.reference.is_null() {
            Err(IbdError::Parse(format!(
                "page {}: external reference of column '{}' was never written",
                meta.page_no, col.name
            )))
        } else {
            match resolve_overflow(reader, &ext.reference) {
                Ok(external) => {
                    let mut full = ext.prefix;
                    full.extend_from_slice(&external);
                    decode_value(&col.column_type, &full, schema.charset())
                        .map_err(|e| field_error(meta.page_no, meta.origin, col.name.clone(), e.0))
                }
                Err(IbdError::UnsupportedFormat { detail, .. }) => {
                    tracing::warn!(column = %col.name, page_no = ext.reference.page_no, %detail, "external value unavailable");
                    Ok(FieldValue::Unavailable(detail))
                }
                // Page-level failures end the scan, not just this field
                Err(
                    err @ (IbdError::CorruptPage { .. } | IbdError::Io(_) | IbdError::Cancelled { .. }),
                ) => return Err(err),
                Err(err) => Err(err),
            }
        };
        let value = match outcome {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(column = %col.name, error = %err, "external value could not be resolved");
                let v = FieldValue::Errored(err.to_string());
                field_errors.push((col.name.clone(), err));
                v
            }
        };
        values[ext.position] = Some(value);
    }

    Ok(Row {
        names: Arc::clone(names),
        values,
        field_errors,
        meta,
    })
}

/// Column names of a schema, shared by every row of a scan.
pub fn row_names(schema: &TableSchema) -> Arc<[String]> {
    schema.columns().iter().map(|c| c.name.clone()).collect()
}
