//! Table schema view consumed by the record decoder.
//!
//! A [`TableSchema`] is built once by [`SchemaBuilder::build`] and never
//! mutated afterwards. The build step is a single validation-and-derivation
//! pass that resolves declared MySQL type strings into [`ColumnType`]s,
//! computes the nullable and variable-length column sets (promoting `CHAR`
//! columns to variable-length under multi-byte charsets), and lays out the
//! physical field order of a clustered index record:
//!
//! 1. Primary key columns (or the hidden 6-byte `DB_ROW_ID` without a key)
//! 2. `DB_TRX_ID` (6 bytes)
//! 3. `DB_ROLL_PTR` (7 bytes)
//! 4. Remaining columns in declaration order
//!
//! Rows returned to callers keep declaration order; only the decoder walks
//! the physical order.
//!
//! # Usage
//!
//! ```
//! use ibread::innodb::schema::{Column, SchemaBuilder, TableFormat};
//!
//! let schema = SchemaBuilder::new()
//!     .charset("latin1")
//!     .format(TableFormat::mysql56_compact())
//!     .column(Column::new("id", "int(11)").primary_key())
//!     .column(Column::new("code", "char(4)"))
//!     .column(Column::new("note", "varchar(300)").nullable())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(schema.column_count(), 3);
//! assert_eq!(schema.nullable_count(), 1);
//! assert_eq!(schema.variable_count(), 1); // CHAR(4) stays fixed under latin1
//! assert_eq!(schema.position("note"), Some(2));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::innodb::charset::Charset;
use crate::innodb::constants::*;
use crate::IbdError;

// ---------------------------------------------------------------------------
// Column types
// ---------------------------------------------------------------------------

/// Declared column type, a closed set of the MySQL types InnoDB can store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    TinyInt { unsigned: bool },
    SmallInt { unsigned: bool },
    MediumInt { unsigned: bool },
    Int { unsigned: bool },
    BigInt { unsigned: bool },
    Float,
    Double,
    Decimal { precision: u32, scale: u32 },
    Date,
    DateTime { fsp: u32 },
    Timestamp { fsp: u32 },
    Time { fsp: u32 },
    Year,
    Char { len: u32 },
    VarChar { len: u32 },
    Binary { len: u32 },
    VarBinary { len: u32 },
    TinyText,
    Text,
    MediumText,
    LongText,
    TinyBlob,
    Blob,
    MediumBlob,
    LongBlob,
    Enum { elements: Vec<String> },
    Set { elements: Vec<String> },
    Bit { bits: u32 },
    Json,
    Geometry,
}

impl ColumnType {
    /// Parse a MySQL column type string such as `int(11)`, `varchar(64)`,
    /// `decimal(10,2)`, `bigint unsigned` or `enum('a','b')`.
    ///
    /// Display widths on integer types are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use ibread::innodb::schema::ColumnType;
    ///
    /// assert_eq!(ColumnType::parse("int(11)").unwrap(), ColumnType::Int { unsigned: false });
    /// assert_eq!(ColumnType::parse("BIGINT(20) UNSIGNED").unwrap(), ColumnType::BigInt { unsigned: true });
    /// assert_eq!(ColumnType::parse("varchar(64)").unwrap(), ColumnType::VarChar { len: 64 });
    /// assert_eq!(ColumnType::parse("TINYBLOB").unwrap(), ColumnType::TinyBlob);
    /// assert_eq!(
    ///     ColumnType::parse("decimal(10,2)").unwrap(),
    ///     ColumnType::Decimal { precision: 10, scale: 2 }
    /// );
    /// assert!(ColumnType::parse("hyperlog").is_err());
    /// ```
    pub fn parse(declared: &str) -> Result<Self, IbdError> {
        let text = declared.trim();
        let lower = text.to_ascii_lowercase();

        let (base, args, rest) = match lower.find('(') {
            Some(open) => {
                let close = lower.rfind(')').ok_or_else(|| {
                    IbdError::Argument(format!("unbalanced parentheses in type '{}'", declared))
                })?;
                if close < open {
                    return Err(IbdError::Argument(format!(
                        "unbalanced parentheses in type '{}'",
                        declared
                    )));
                }
                // Keep the original case for ENUM/SET element names
                (
                    lower[..open].trim().to_string(),
                    Some(text[open + 1..close].to_string()),
                    lower[close + 1..].to_string(),
                )
            }
            None => {
                let mut parts = lower.splitn(2, char::is_whitespace);
                let base = parts.next().unwrap_or("").to_string();
                let rest = parts.next().unwrap_or("").to_string();
                (base, None, rest)
            }
        };
        let unsigned = rest.split_whitespace().any(|w| w == "unsigned");

        let nums = |default: &[u32]| -> Result<Vec<u32>, IbdError> {
            match &args {
                Some(a) => a
                    .split(',')
                    .map(|p| {
                        p.trim().parse::<u32>().map_err(|_| {
                            IbdError::Argument(format!("bad type argument '{}' in '{}'", p, declared))
                        })
                    })
                    .collect(),
                None => Ok(default.to_vec()),
            }
        };
        let len_arg = |default: u32| -> Result<u32, IbdError> {
            Ok(nums(&[default])?.first().copied().unwrap_or(default))
        };
        let fsp_arg = || -> Result<u32, IbdError> {
            let fsp = len_arg(0)?;
            if fsp > 6 {
                return Err(IbdError::Argument(format!(
                    "fractional seconds precision {} out of range in '{}'",
                    fsp, declared
                )));
            }
            Ok(fsp)
        };

        let ty = match base.as_str() {
            "tinyint" | "bool" | "boolean" => ColumnType::TinyInt { unsigned },
            "smallint" => ColumnType::SmallInt { unsigned },
            "mediumint" => ColumnType::MediumInt { unsigned },
            "int" | "integer" => ColumnType::Int { unsigned },
            "bigint" => ColumnType::BigInt { unsigned },
            "float" => ColumnType::Float,
            "double" | "real" => ColumnType::Double,
            "decimal" | "numeric" | "dec" | "fixed" => {
                let n = nums(&[10, 0])?;
                let precision = n.first().copied().unwrap_or(10);
                let scale = n.get(1).copied().unwrap_or(0);
                if precision == 0 || precision > 65 || scale > 30 || scale > precision {
                    return Err(IbdError::Argument(format!(
                        "invalid decimal precision/scale in '{}'",
                        declared
                    )));
                }
                ColumnType::Decimal { precision, scale }
            }
            "date" => ColumnType::Date,
            "datetime" => ColumnType::DateTime { fsp: fsp_arg()? },
            "timestamp" => ColumnType::Timestamp { fsp: fsp_arg()? },
            "time" => ColumnType::Time { fsp: fsp_arg()? },
            "year" => ColumnType::Year,
            "char" | "character" => ColumnType::Char { len: len_arg(1)? },
            "varchar" => ColumnType::VarChar {
                len: nums(&[])?.first().copied().ok_or_else(|| {
                    IbdError::Argument(format!("varchar requires a length: '{}'", declared))
                })?,
            },
            "binary" => ColumnType::Binary { len: len_arg(1)? },
            "varbinary" => ColumnType::VarBinary {
                len: nums(&[])?.first().copied().ok_or_else(|| {
                    IbdError::Argument(format!("varbinary requires a length: '{}'", declared))
                })?,
            },
            "tinytext" => ColumnType::TinyText,
            "text" => ColumnType::Text,
            "mediumtext" => ColumnType::MediumText,
            "longtext" => ColumnType::LongText,
            "tinyblob" => ColumnType::TinyBlob,
            "blob" => ColumnType::Blob,
            "mediumblob" => ColumnType::MediumBlob,
            "longblob" => ColumnType::LongBlob,
            "enum" => ColumnType::Enum {
                elements: parse_elements(args.as_deref().unwrap_or(""))?,
            },
            "set" => ColumnType::Set {
                elements: parse_elements(args.as_deref().unwrap_or(""))?,
            },
            "bit" => {
                let bits = len_arg(1)?;
                if bits == 0 || bits > 64 {
                    return Err(IbdError::Argument(format!("bit width out of range in '{}'", declared)));
                }
                ColumnType::Bit { bits }
            }
            "json" => ColumnType::Json,
            "geometry" | "point" | "linestring" | "polygon" | "multipoint" | "multilinestring"
            | "multipolygon" | "geometrycollection" => ColumnType::Geometry,
            _ => {
                return Err(IbdError::Argument(format!(
                    "unsupported column type '{}'",
                    declared
                )))
            }
        };
        Ok(ty)
    }

    /// Returns true for types whose value is a character string.
    pub fn is_character(&self) -> bool {
        matches!(
            self,
            ColumnType::Char { .. }
                | ColumnType::VarChar { .. }
                | ColumnType::TinyText
                | ColumnType::Text
                | ColumnType::MediumText
                | ColumnType::LongText
        )
    }

    /// Returns true for BLOB/TEXT/JSON/GEOMETRY, the large-object types.
    pub fn is_large_object(&self) -> bool {
        matches!(
            self,
            ColumnType::TinyText
                | ColumnType::Text
                | ColumnType::MediumText
                | ColumnType::LongText
                | ColumnType::TinyBlob
                | ColumnType::Blob
                | ColumnType::MediumBlob
                | ColumnType::LongBlob
                | ColumnType::Json
                | ColumnType::Geometry
        )
    }

    /// Physical storage of this type under the given charset.
    ///
    /// `CHAR(n)` becomes variable-length when the charset can use more than
    /// one byte per character. A variable-length column is "big" (its length
    /// entry may take two bytes and it may be stored externally) when its
    /// maximum byte length exceeds 255 or it is a large-object type.
    pub fn storage(&self, charset: Charset) -> Storage {
        let mbpc = charset.max_bytes_per_char();
        let variable = |max_len: usize, lob: bool| Storage::Variable {
            max_len,
            big: max_len > 255 || lob,
        };
        match self {
            ColumnType::TinyInt { .. } => Storage::Fixed(1),
            ColumnType::SmallInt { .. } => Storage::Fixed(2),
            ColumnType::MediumInt { .. } => Storage::Fixed(3),
            ColumnType::Int { .. } => Storage::Fixed(4),
            ColumnType::BigInt { .. } => Storage::Fixed(8),
            ColumnType::Float => Storage::Fixed(4),
            ColumnType::Double => Storage::Fixed(8),
            ColumnType::Decimal { precision, scale } => {
                Storage::Fixed(decimal_storage_bytes(*precision, *scale))
            }
            ColumnType::Date => Storage::Fixed(3),
            ColumnType::DateTime { fsp } => Storage::Fixed(5 + fsp_storage_bytes(*fsp)),
            ColumnType::Timestamp { fsp } => Storage::Fixed(4 + fsp_storage_bytes(*fsp)),
            ColumnType::Time { fsp } => Storage::Fixed(3 + fsp_storage_bytes(*fsp)),
            ColumnType::Year => Storage::Fixed(1),
            ColumnType::Char { len } => {
                if mbpc > 1 {
                    variable(*len as usize * mbpc, false)
                } else {
                    Storage::Fixed(*len as usize)
                }
            }
            ColumnType::VarChar { len } => variable(*len as usize * mbpc, false),
            ColumnType::Binary { len } => Storage::Fixed(*len as usize),
            ColumnType::VarBinary { len } => variable(*len as usize, false),
            ColumnType::TinyText | ColumnType::TinyBlob => variable(255, true),
            ColumnType::Text | ColumnType::Blob => variable(65_535, true),
            ColumnType::MediumText | ColumnType::MediumBlob => variable(16_777_215, true),
            ColumnType::LongText | ColumnType::LongBlob | ColumnType::Json | ColumnType::Geometry => {
                variable(u32::MAX as usize, true)
            }
            ColumnType::Enum { elements } => Storage::Fixed(if elements.len() <= 255 { 1 } else { 2 }),
            ColumnType::Set { elements } => Storage::Fixed(set_storage_bytes(elements.len())),
            ColumnType::Bit { bits } => Storage::Fixed((*bits as usize).div_ceil(8)),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let u = |unsigned: &bool| if *unsigned { " unsigned" } else { "" };
        match self {
            ColumnType::TinyInt { unsigned } => write!(f, "tinyint{}", u(unsigned)),
            ColumnType::SmallInt { unsigned } => write!(f, "smallint{}", u(unsigned)),
            ColumnType::MediumInt { unsigned } => write!(f, "mediumint{}", u(unsigned)),
            ColumnType::Int { unsigned } => write!(f, "int{}", u(unsigned)),
            ColumnType::BigInt { unsigned } => write!(f, "bigint{}", u(unsigned)),
            ColumnType::Float => f.write_str("float"),
            ColumnType::Double => f.write_str("double"),
            ColumnType::Decimal { precision, scale } => write!(f, "decimal({},{})", precision, scale),
            ColumnType::Date => f.write_str("date"),
            ColumnType::DateTime { fsp } => write!(f, "datetime({})", fsp),
            ColumnType::Timestamp { fsp } => write!(f, "timestamp({})", fsp),
            ColumnType::Time { fsp } => write!(f, "time({})", fsp),
            ColumnType::Year => f.write_str("year"),
            ColumnType::Char { len } => write!(f, "char({})", len),
            ColumnType::VarChar { len } => write!(f, "varchar({})", len),
            ColumnType::Binary { len } => write!(f, "binary({})", len),
            ColumnType::VarBinary { len } => write!(f, "varbinary({})", len),
            ColumnType::TinyText => f.write_str("tinytext"),
            ColumnType::Text => f.write_str("text"),
            ColumnType::MediumText => f.write_str("mediumtext"),
            ColumnType::LongText => f.write_str("longtext"),
            ColumnType::TinyBlob => f.write_str("tinyblob"),
            ColumnType::Blob => f.write_str("blob"),
            ColumnType::MediumBlob => f.write_str("mediumblob"),
            ColumnType::LongBlob => f.write_str("longblob"),
            ColumnType::Enum { elements } => write!(f, "enum({})", quote_elements(elements)),
            ColumnType::Set { elements } => write!(f, "set({})", quote_elements(elements)),
            ColumnType::Bit { bits } => write!(f, "bit({})", bits),
            ColumnType::Json => f.write_str("json"),
            ColumnType::Geometry => f.write_str("geometry"),
        }
    }
}

fn quote_elements(elements: &[String]) -> String {
    elements
        .iter()
        .map(|e| format!("'{}'", e.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse `'a','b','it''s'` into element names.
fn parse_elements(args: &str) -> Result<Vec<String>, IbdError> {
    let mut elements = Vec::new();
    let mut chars = args.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some('\'') => {
                let mut elem = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            elem.push('\'');
                        }
                        Some('\'') => break,
                        Some(c) => elem.push(c),
                        None => {
                            return Err(IbdError::Argument(format!(
                                "unterminated element in '{}'",
                                args
                            )))
                        }
                    }
                }
                elements.push(elem);
            }
            Some(c) => {
                return Err(IbdError::Argument(format!(
                    "unexpected '{}' in element list '{}'",
                    c, args
                )))
            }
        }
    }
    if elements.is_empty() {
        return Err(IbdError::Argument("ENUM/SET needs at least one element".to_string()));
    }
    Ok(elements)
}

/// Bytes needed for leftover digits in DECIMAL packed binary.
pub(crate) fn decimal_leftover_bytes(digits: usize) -> usize {
    const DIG2BYTES: [usize; 10] = [0, 1, 1, 2, 2, 3, 3, 4, 4, 4];
    DIG2BYTES[digits.min(9)]
}

/// Total storage of a DECIMAL(precision, scale) value.
pub(crate) fn decimal_storage_bytes(precision: u32, scale: u32) -> usize {
    let intg = (precision - scale) as usize;
    let frac = scale as usize;
    (intg / 9) * 4 + decimal_leftover_bytes(intg % 9) + (frac / 9) * 4 + decimal_leftover_bytes(frac % 9)
}

/// Storage bytes for fractional seconds precision.
pub(crate) fn fsp_storage_bytes(fsp: u32) -> usize {
    (fsp as usize).div_ceil(2)
}

fn set_storage_bytes(n_elements: usize) -> usize {
    match n_elements.div_ceil(8) {
        0 | 1 => 1,
        2 => 2,
        3 => 3,
        4 => 4,
        _ => 8,
    }
}

/// How a field is laid out inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Storage {
    /// Always exactly this many bytes.
    Fixed(usize),
    /// Length recorded in the record header.
    Variable { max_len: usize, big: bool },
}

impl Storage {
    pub fn is_variable(&self) -> bool {
        matches!(self, Storage::Variable { .. })
    }
}

// ---------------------------------------------------------------------------
// Row format / server version tags
// ---------------------------------------------------------------------------

/// InnoDB row format of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowFormat {
    Redundant,
    Compact,
    Dynamic,
    Compressed,
}

impl RowFormat {
    /// Returns true for the "new-style" compact record layout.
    pub fn is_compact_layout(&self) -> bool {
        !matches!(self, RowFormat::Redundant)
    }

    /// Antelope formats keep a 768-byte local prefix of externally stored columns.
    pub fn keeps_local_prefix(&self) -> bool {
        matches!(self, RowFormat::Redundant | RowFormat::Compact)
    }
}

impl fmt::Display for RowFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowFormat::Redundant => "REDUNDANT",
            RowFormat::Compact => "COMPACT",
            RowFormat::Dynamic => "DYNAMIC",
            RowFormat::Compressed => "COMPRESSED",
        };
        f.write_str(s)
    }
}

/// MySQL server release family that wrote the tablespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerVersion {
    Mysql56,
    Mysql57,
    Mysql80,
}

impl ServerVersion {
    /// MySQL 8.0 stores uncompressed large objects as LOB first/index/data pages.
    pub fn has_lob_index_format(&self) -> bool {
        matches!(self, ServerVersion::Mysql80)
    }

    /// MySQL 8.0.12+ can mark records written after an instant ADD COLUMN.
    pub fn supports_instant_columns(&self) -> bool {
        matches!(self, ServerVersion::Mysql80)
    }

    /// Root page of the clustered index in a file-per-table tablespace.
    ///
    /// Page 3 holds the SDI index in MySQL 8.0, pushing the clustered
    /// index root to page 4.
    pub fn default_clustered_root(&self) -> u32 {
        match self {
            ServerVersion::Mysql56 | ServerVersion::Mysql57 => 3,
            ServerVersion::Mysql80 => 4,
        }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerVersion::Mysql56 => "MySQL 5.6",
            ServerVersion::Mysql57 => "MySQL 5.7",
            ServerVersion::Mysql80 => "MySQL 8.0",
        };
        f.write_str(s)
    }
}

/// Format tag selected once at schema setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableFormat {
    pub row_format: RowFormat,
    pub server: ServerVersion,
}

impl TableFormat {
    pub fn new(row_format: RowFormat, server: ServerVersion) -> Self {
        TableFormat { row_format, server }
    }

    pub fn mysql56_compact() -> Self {
        Self::new(RowFormat::Compact, ServerVersion::Mysql56)
    }

    pub fn mysql57_dynamic() -> Self {
        Self::new(RowFormat::Dynamic, ServerVersion::Mysql57)
    }

    pub fn mysql80_dynamic() -> Self {
        Self::new(RowFormat::Dynamic, ServerVersion::Mysql80)
    }

    /// Fail fast on variants the decoder does not implement.
    pub fn ensure_supported(&self) -> Result<(), IbdError> {
        if self.row_format == RowFormat::Compressed {
            return Err(IbdError::UnsupportedFormat {
                page_no: None,
                detail: format!("row format {} ({})", self.row_format, self.server),
            });
        }
        Ok(())
    }
}

impl Default for TableFormat {
    fn default() -> Self {
        Self::mysql57_dynamic()
    }
}

// ---------------------------------------------------------------------------
// Columns and schema
// ---------------------------------------------------------------------------

/// A column declaration as supplied by the schema collaborator.
///
/// Columns are `NOT NULL` unless [`nullable`](Column::nullable) is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

impl Column {
    pub fn new(name: &str, declared_type: &str) -> Self {
        Column {
            name: name.to_string(),
            declared_type: declared_type.to_string(),
            nullable: false,
            primary_key: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }
}

/// A finalized column inside a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    /// Column name, unique within the schema.
    pub name: String,
    /// Position in declaration order.
    pub position: usize,
    /// Resolved type.
    pub column_type: ColumnType,
    /// Whether the column allows NULL.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Physical storage under the table charset.
    pub storage: Storage,
}

/// What a physical record field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    /// A user column, by declaration position.
    Column(usize),
    /// Hidden `DB_ROW_ID` (tables without a primary key).
    RowId,
    /// Hidden `DB_TRX_ID`.
    TrxId,
    /// Hidden `DB_ROLL_PTR`.
    RollPtr,
}

/// One field of a clustered index leaf record, in physical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldDef {
    pub kind: FieldKind,
    pub storage: Storage,
    pub nullable: bool,
}

/// Immutable schema view: columns, derived sets and record layout.
#[derive(Debug, Clone)]
pub struct TableSchema {
    columns: Vec<ColumnDef>,
    name_to_position: HashMap<String, usize>,
    primary_key: Vec<usize>,
    nullable: Vec<usize>,
    variable: Vec<usize>,
    charset: Charset,
    format: TableFormat,
    leaf_fields: Vec<FieldDef>,
    n_key_fields: usize,
    fields_before_instant: Option<usize>,
}

impl TableSchema {
    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, position: usize) -> Option<&ColumnDef> {
        self.columns.get(position)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Declaration position of a column by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.name_to_position.get(name).copied()
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ColumnDef> {
        self.position(name).and_then(|p| self.columns.get(p))
    }

    /// Primary key columns in key order (empty when the table uses `DB_ROW_ID`).
    pub fn primary_key(&self) -> &[usize] {
        &self.primary_key
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Nullable columns in declaration order.
    pub fn nullable_columns(&self) -> &[usize] {
        &self.nullable
    }

    pub fn nullable_count(&self) -> usize {
        self.nullable.len()
    }

    /// Variable-length columns in declaration order.
    pub fn variable_columns(&self) -> &[usize] {
        &self.variable
    }

    pub fn variable_count(&self) -> usize {
        self.variable.len()
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn max_bytes_per_char(&self) -> usize {
        self.charset.max_bytes_per_char()
    }

    pub fn format(&self) -> TableFormat {
        self.format
    }

    /// Fields of a clustered index leaf record in physical order.
    pub fn leaf_fields(&self) -> &[FieldDef] {
        &self.leaf_fields
    }

    /// Number of leading fields that form the index key (node pointer prefix).
    pub fn key_field_count(&self) -> usize {
        self.n_key_fields
    }

    /// Leaf fields stored by records written before the first instant
    /// ADD COLUMN, `None` when no column was added instantly.
    pub fn fields_before_instant(&self) -> Option<usize> {
        self.fields_before_instant
    }

    /// Parse a JSON schema description (see [`SchemaFile`]).
    pub fn from_json(json: &str) -> Result<Self, IbdError> {
        let file: SchemaFile = serde_json::from_str(json)
            .map_err(|e| IbdError::Parse(format!("schema JSON: {}", e)))?;
        file.into_builder().build()
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Table schema (charset={}, row_format={}, server={}):",
            self.charset, self.format.row_format, self.format.server
        )?;
        for col in &self.columns {
            write!(f, "\n  {} {}", col.name, col.column_type)?;
            if !col.nullable {
                f.write_str(" NOT NULL")?;
            }
            if col.primary_key {
                f.write_str(" PRIMARY KEY")?;
            }
        }
        Ok(())
    }
}

/// Collects column declarations and finalizes them into a [`TableSchema`].
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    columns: Vec<Column>,
    charset: Option<String>,
    format: TableFormat,
    primary_key: Option<Vec<String>>,
    instant_columns: Option<usize>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table charset name, e.g. `utf8mb4` (default `utf8`).
    pub fn charset(mut self, name: &str) -> Self {
        self.charset = Some(name.to_string());
        self
    }

    pub fn format(mut self, format: TableFormat) -> Self {
        self.format = format;
        self
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Declare a composite primary key explicitly, in key order.
    ///
    /// Overrides per-column [`Column::primary_key`] flags.
    pub fn primary_key(mut self, names: &[&str]) -> Self {
        self.primary_key = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Number of columns the table had before its first instant ADD COLUMN.
    ///
    /// The columns declared after them were added instantly. Records written
    /// earlier carry no instant flag and store only the original fields.
    pub fn instant_columns(mut self, n: usize) -> Self {
        self.instant_columns = Some(n);
        self
    }

    /// Validate the declarations and derive the immutable schema view.
    pub fn build(self) -> Result<TableSchema, IbdError> {
        if self.columns.is_empty() {
            return Err(IbdError::Argument("no column is specified".to_string()));
        }
        let charset = match &self.charset {
            Some(name) => name.parse::<Charset>()?,
            None => Charset::default(),
        };

        let mut name_to_position = HashMap::with_capacity(self.columns.len());
        for (pos, col) in self.columns.iter().enumerate() {
            if col.name.trim().is_empty() {
                return Err(IbdError::Argument(format!("column {} has an empty name", pos)));
            }
            if name_to_position.insert(col.name.clone(), pos).is_some() {
                return Err(IbdError::Argument(format!("duplicate column name '{}'", col.name)));
            }
        }

        let primary_key: Vec<usize> = match &self.primary_key {
            Some(names) => names
                .iter()
                .map(|n| {
                    name_to_position.get(n).copied().ok_or_else(|| {
                        IbdError::Argument(format!("primary key column '{}' is not defined", n))
                    })
                })
                .collect::<Result<_, _>>()?,
            None => self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.primary_key)
                .map(|(p, _)| p)
                .collect(),
        };
        for (i, p) in primary_key.iter().enumerate() {
            if primary_key[..i].contains(p) {
                return Err(IbdError::Argument(format!(
                    "column '{}' repeated in primary key",
                    self.columns[*p].name
                )));
            }
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        for (position, col) in self.columns.iter().enumerate() {
            let column_type = ColumnType::parse(&col.declared_type)?;
            let storage = column_type.storage(charset);
            let is_pk = primary_key.contains(&position);
            columns.push(ColumnDef {
                name: col.name.clone(),
                position,
                column_type,
                // Key columns are implicitly NOT NULL
                nullable: col.nullable && !is_pk,
                primary_key: is_pk,
                storage,
            });
        }

        if primary_key.is_empty() {
            tracing::warn!("primary key is not specified, records are keyed by the hidden DB_ROW_ID");
        }

        let nullable = columns.iter().filter(|c| c.nullable).map(|c| c.position).collect();
        let variable = columns
            .iter()
            .filter(|c| c.storage.is_variable())
            .map(|c| c.position)
            .collect();

        let mut leaf_fields = Vec::with_capacity(columns.len() + 3);
        let column_field = |c: &ColumnDef| FieldDef {
            kind: FieldKind::Column(c.position),
            storage: c.storage,
            nullable: c.nullable,
        };
        if primary_key.is_empty() {
            leaf_fields.push(FieldDef {
                kind: FieldKind::RowId,
                storage: Storage::Fixed(DATA_ROW_ID_LEN),
                nullable: false,
            });
        } else {
            for &p in &primary_key {
                leaf_fields.push(column_field(&columns[p]));
            }
        }
        let n_key_fields = leaf_fields.len();
        leaf_fields.push(FieldDef {
            kind: FieldKind::TrxId,
            storage: Storage::Fixed(DATA_TRX_ID_LEN),
            nullable: false,
        });
        leaf_fields.push(FieldDef {
            kind: FieldKind::RollPtr,
            storage: Storage::Fixed(DATA_ROLL_PTR_LEN),
            nullable: false,
        });
        for c in columns.iter().filter(|c| !c.primary_key) {
            leaf_fields.push(column_field(c));
        }

        let fields_before_instant = match self.instant_columns {
            None => None,
            Some(n) if n == 0 || n > columns.len() => {
                return Err(IbdError::Argument(format!(
                    "instant column boundary {} is outside 1..={}",
                    n,
                    columns.len()
                )))
            }
            Some(n) => {
                if let Some(c) = columns[n..].iter().find(|c| c.primary_key) {
                    return Err(IbdError::Argument(format!(
                        "primary key column '{}' cannot have been added instantly",
                        c.name
                    )));
                }
                if !self.format.server.supports_instant_columns() {
                    return Err(IbdError::UnsupportedFormat {
                        page_no: None,
                        detail: format!("instant ADD COLUMN on {}", self.format.server),
                    });
                }
                Some(leaf_fields.len() - (columns.len() - n))
            }
        };

        Ok(TableSchema {
            columns,
            name_to_position,
            primary_key,
            nullable,
            variable,
            charset,
            format: self.format,
            leaf_fields,
            n_key_fields,
            fields_before_instant,
        })
    }
}

// ---------------------------------------------------------------------------
// JSON schema files
// ---------------------------------------------------------------------------

/// On-disk JSON description of a table, used by the CLI.
///
/// ```json
/// {
///   "charset": "utf8mb4",
///   "row_format": "dynamic",
///   "server": "mysql80",
///   "columns": [
///     {"name": "id", "type": "int(11)", "primary_key": true},
///     {"name": "body", "type": "text", "nullable": true}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default = "default_row_format")]
    pub row_format: RowFormat,
    #[serde(default = "default_server")]
    pub server: ServerVersion,
    #[serde(default)]
    pub primary_key: Option<Vec<String>>,
    /// Columns that existed before the first instant ADD COLUMN.
    #[serde(default)]
    pub instant_columns: Option<usize>,
    pub columns: Vec<SchemaFileColumn>,
}

/// A column entry in a [`SchemaFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaFileColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_row_format() -> RowFormat {
    RowFormat::Dynamic
}

fn default_server() -> ServerVersion {
    ServerVersion::Mysql57
}

impl SchemaFile {
    pub fn into_builder(self) -> SchemaBuilder {
        let mut builder = SchemaBuilder::new().format(TableFormat::new(self.row_format, self.server));
        if let Some(cs) = &self.charset {
            builder = builder.charset(cs);
        }
        for c in self.columns {
            builder = builder.column(Column {
                name: c.name,
                declared_type: c.declared_type,
                nullable: c.nullable,
                primary_key: c.primary_key,
            });
        }
        if let Some(pk) = &self.primary_key {
            let names: Vec<&str> = pk.iter().map(|s| s.as_str()).collect();
            builder = builder.primary_key(&names);
        }
        if let Some(n) = self.instant_columns {
            builder = builder.instant_columns(n);
        }
        builder
    }
}
