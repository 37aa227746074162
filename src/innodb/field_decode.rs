//! Typed value decoding for InnoDB record fields.
//!
//! InnoDB stores most column values in a memcmp-comparable encoding. This
//! module turns the raw field bytes of one column into a [`FieldValue`].
//!
//! | SQL Type | InnoDB encoding | Value |
//! |----------|-----------------|-------|
//! | TINYINT-BIGINT signed | Big-endian, sign bit flipped | `Int` |
//! | TINYINT-BIGINT unsigned | Big-endian | `Uint` |
//! | FLOAT / DOUBLE | Little-endian IEEE 754 (copied from the server row) | `Float` / `Double` |
//! | DECIMAL | Packed 9-digit groups, sign bit flipped, negatives inverted | `Decimal` |
//! | DATE | 3 bytes, sign bit flipped, day(5) month(4) year(14) | `Str` |
//! | DATETIME | 5 bytes + fsp, year*13+month, day, hour, minute, second | `Str` |
//! | TIMESTAMP | 4 bytes UTC seconds + fsp | `Str` |
//! | TIME | 3 bytes + fsp, offset by 0x800000 | `Str` |
//! | YEAR | 1 byte, offset from 1900 | `Uint` |
//! | CHAR | Charset-encoded, space padded | `Str` (padding trimmed) |
//! | VARCHAR / TEXT | Charset-encoded | `Str` |
//! | BINARY / VARBINARY / BLOB / JSON / GEOMETRY | Raw | `Bytes` |
//! | ENUM / SET | Big-endian index / bitmask | `Str` |
//! | BIT | Big-endian | `Uint` |

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

use crate::innodb::charset::Charset;
use crate::innodb::schema::{decimal_leftover_bytes, decimal_storage_bytes, fsp_storage_bytes, ColumnType};
use crate::util::hex::format_bytes;

/// A decoded column value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// SQL NULL.
    Null,
    /// Signed integer.
    Int(i64),
    /// Unsigned integer (also YEAR and BIT).
    Uint(u64),
    Float(f32),
    Double(f64),
    /// Exact decimal in canonical text form, e.g. `-12.50`.
    Decimal(String),
    /// Character data and formatted temporal values.
    Str(String),
    /// Binary data.
    Bytes(Vec<u8>),
    /// The value exists but this reader cannot materialize it (instant
    /// columns absent from an older record, compressed LOBs).
    Unavailable(String),
    /// Resolution of this field failed; see `Row::field_errors`.
    Errored(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Uint(v) => Some(*v),
            FieldValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) | FieldValue::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Bytes(b) => Some(b),
            FieldValue::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Key ordering: numeric for numbers, byte-wise for strings and bytes,
    /// NULL before everything.
    ///
    /// Byte-wise string comparison matches binary and simple Latin
    /// collations only; multi-byte collations may order differently.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::cmp::Ordering;
    /// use ibread::innodb::field_decode::FieldValue;
    ///
    /// assert_eq!(FieldValue::Int(-1).key_cmp(&FieldValue::Uint(3)), Ordering::Less);
    /// assert_eq!(
    ///     FieldValue::Decimal("9.5".into()).key_cmp(&FieldValue::Decimal("10.25".into())),
    ///     Ordering::Less
    /// );
    /// assert_eq!(FieldValue::Str("b".into()).key_cmp(&FieldValue::Str("ab".into())), Ordering::Greater);
    /// ```
    pub fn key_cmp(&self, other: &FieldValue) -> Ordering {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Int(a), Int(b)) => a.cmp(b),
            (Uint(a), Uint(b)) => a.cmp(b),
            (Int(a), Uint(b)) => (*a as i128).cmp(&(*b as i128)),
            (Uint(a), Int(b)) => (*a as i128).cmp(&(*b as i128)),
            (Decimal(a), Decimal(b)) => compare_decimal_text(a, b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                _ => a.key_bytes().cmp(&b.key_bytes()),
            },
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Uint(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v as f64),
            FieldValue::Double(v) => Some(*v),
            FieldValue::Decimal(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn key_bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::Str(s) | FieldValue::Decimal(s) => s.as_bytes().to_vec(),
            FieldValue::Bytes(b) => b.clone(),
            other => other.to_string().into_bytes(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("NULL"),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Uint(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Double(v) => write!(f, "{}", v),
            FieldValue::Decimal(s) | FieldValue::Str(s) => f.write_str(s),
            FieldValue::Bytes(b) => write!(f, "0x{}", format_bytes(b)),
            FieldValue::Unavailable(why) => write!(f, "<unavailable: {}>", why),
            FieldValue::Errored(why) => write!(f, "<error: {}>", why),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Int(v) => serializer.serialize_i64(*v),
            FieldValue::Uint(v) => serializer.serialize_u64(*v),
            FieldValue::Float(v) => serializer.serialize_f32(*v),
            FieldValue::Double(v) => serializer.serialize_f64(*v),
            FieldValue::Decimal(s) | FieldValue::Str(s) => serializer.serialize_str(s),
            FieldValue::Bytes(b) => serializer.serialize_str(&format!("0x{}", format_bytes(b))),
            FieldValue::Unavailable(why) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("unavailable", why)?;
                map.end()
            }
            FieldValue::Errored(why) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", why)?;
                map.end()
            }
        }
    }
}

/// Compare two canonical decimal strings numerically.
fn compare_decimal_text(a: &str, b: &str) -> Ordering {
    let (a_neg, a_abs) = split_sign(a);
    let (b_neg, b_abs) = split_sign(b);
    match (a_neg, b_neg) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => compare_unsigned_decimal(a_abs, b_abs),
        (true, true) => compare_unsigned_decimal(b_abs, a_abs),
    }
}

fn split_sign(s: &str) -> (bool, &str) {
    match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    }
}

fn compare_unsigned_decimal(a: &str, b: &str) -> Ordering {
    let (a_int, a_frac) = a.split_once('.').unwrap_or((a, ""));
    let (b_int, b_frac) = b.split_once('.').unwrap_or((b, ""));
    let a_int = a_int.trim_start_matches('0');
    let b_int = b_int.trim_start_matches('0');
    a_int
        .len()
        .cmp(&b_int.len())
        .then_with(|| a_int.cmp(b_int))
        .then_with(|| {
            let width = a_frac.len().max(b_frac.len());
            let pad = |s: &str| format!("{:0<width$}", s, width = width);
            pad(a_frac).cmp(&pad(b_frac))
        })
}

/// A field whose bytes do not fit its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValueError(pub String);

fn need(data: &[u8], len: usize, what: &str) -> Result<(), ValueError> {
    if data.len() != len {
        return Err(ValueError(format!(
            "{} needs {} bytes, field has {}",
            what,
            len,
            data.len()
        )));
    }
    Ok(())
}

/// Read a big-endian unsigned integer of up to 8 bytes.
pub fn read_be_uint(data: &[u8]) -> u64 {
    data.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

/// Decode a signed integer stored with its sign bit flipped.
fn decode_signed(data: &[u8]) -> i64 {
    let bits = data.len() * 8;
    let raw = read_be_uint(data) ^ (1u64 << (bits - 1));
    // Sign-extend from `bits`
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

/// Decode the raw bytes of one non-NULL column value.
///
/// # Examples
///
/// ```
/// use ibread::innodb::charset::Charset;
/// use ibread::innodb::field_decode::{decode_value, FieldValue};
/// use ibread::innodb::schema::ColumnType;
///
/// let int = ColumnType::Int { unsigned: false };
/// assert_eq!(decode_value(&int, &[0x7F, 0xFF, 0xFF, 0xFF], Charset::Utf8).unwrap(), FieldValue::Int(-1));
/// assert_eq!(decode_value(&int, &[0x80, 0x00, 0x00, 0x2A], Charset::Utf8).unwrap(), FieldValue::Int(42));
///
/// let char4 = ColumnType::Char { len: 4 };
/// assert_eq!(decode_value(&char4, b"ab  ", Charset::Latin1).unwrap(), FieldValue::Str("ab".into()));
/// ```
pub fn decode_value(column_type: &ColumnType, data: &[u8], charset: Charset) -> Result<FieldValue, ValueError> {
    let value = match column_type {
        ColumnType::TinyInt { unsigned }
        | ColumnType::SmallInt { unsigned }
        | ColumnType::MediumInt { unsigned }
        | ColumnType::Int { unsigned }
        | ColumnType::BigInt { unsigned } => {
            let size = match column_type {
                ColumnType::TinyInt { .. } => 1,
                ColumnType::SmallInt { .. } => 2,
                ColumnType::MediumInt { .. } => 3,
                ColumnType::Int { .. } => 4,
                _ => 8,
            };
            need(data, size, "integer")?;
            if *unsigned {
                FieldValue::Uint(read_be_uint(data))
            } else {
                FieldValue::Int(decode_signed(data))
            }
        }
        ColumnType::Float => {
            need(data, 4, "FLOAT")?;
            FieldValue::Float(f32::from_le_bytes([data[0], data[1], data[2], data[3]]))
        }
        ColumnType::Double => {
            need(data, 8, "DOUBLE")?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(data);
            FieldValue::Double(f64::from_le_bytes(buf))
        }
        ColumnType::Decimal { precision, scale } => {
            need(data, decimal_storage_bytes(*precision, *scale), "DECIMAL")?;
            FieldValue::Decimal(decode_decimal(data, *precision as usize, *scale as usize))
        }
        ColumnType::Date => {
            need(data, 3, "DATE")?;
            FieldValue::Str(decode_date(data))
        }
        ColumnType::DateTime { fsp } => {
            need(data, 5 + fsp_storage_bytes(*fsp), "DATETIME")?;
            FieldValue::Str(decode_datetime(data, *fsp))
        }
        ColumnType::Timestamp { fsp } => {
            need(data, 4 + fsp_storage_bytes(*fsp), "TIMESTAMP")?;
            FieldValue::Str(decode_timestamp(data, *fsp))
        }
        ColumnType::Time { fsp } => {
            need(data, 3 + fsp_storage_bytes(*fsp), "TIME")?;
            FieldValue::Str(decode_time(data, *fsp))
        }
        ColumnType::Year => {
            need(data, 1, "YEAR")?;
            FieldValue::Uint(if data[0] == 0 { 0 } else { 1900 + data[0] as u64 })
        }
        ColumnType::Char { .. } => FieldValue::Str(charset.decode(trim_trailing_spaces(data))),
        ColumnType::VarChar { .. }
        | ColumnType::TinyText
        | ColumnType::Text
        | ColumnType::MediumText
        | ColumnType::LongText => FieldValue::Str(charset.decode(data)),
        ColumnType::Binary { .. }
        | ColumnType::VarBinary { .. }
        | ColumnType::TinyBlob
        | ColumnType::Blob
        | ColumnType::MediumBlob
        | ColumnType::LongBlob
        | ColumnType::Json
        | ColumnType::Geometry => FieldValue::Bytes(data.to_vec()),
        ColumnType::Enum { elements } => {
            if data.is_empty() || data.len() > 2 {
                return Err(ValueError(format!("ENUM field has {} bytes", data.len())));
            }
            let idx = read_be_uint(data) as usize;
            match idx {
                0 => FieldValue::Str(String::new()),
                i if i <= elements.len() => FieldValue::Str(elements[i - 1].clone()),
                i => FieldValue::Uint(i as u64),
            }
        }
        ColumnType::Set { elements } => {
            if data.is_empty() || data.len() > 8 {
                return Err(ValueError(format!("SET field has {} bytes", data.len())));
            }
            let mask = read_be_uint(data);
            let selected: Vec<&str> = elements
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1u64 << i) != 0)
                .map(|(_, e)| e.as_str())
                .collect();
            FieldValue::Str(selected.join(","))
        }
        ColumnType::Bit { .. } => {
            if data.is_empty() || data.len() > 8 {
                return Err(ValueError(format!("BIT field has {} bytes", data.len())));
            }
            FieldValue::Uint(read_be_uint(data))
        }
    };
    Ok(value)
}

fn trim_trailing_spaces(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0x20).map_or(0, |p| p + 1);
    &data[..end]
}

/// Decode packed DECIMAL into canonical text.
fn decode_decimal(data: &[u8], precision: usize, scale: usize) -> String {
    let intg = precision - scale;
    let (intg_full, intg_left) = (intg / 9, intg % 9);
    let (frac_full, frac_left) = (scale / 9, scale % 9);

    let mut buf = data.to_vec();
    let negative = buf[0] & 0x80 == 0;
    if negative {
        for b in &mut buf {
            *b ^= 0xFF;
        }
    }
    buf[0] ^= 0x80;

    let mut pos = 0;
    let mut take = |n: usize| {
        let v = read_be_uint(&buf[pos..pos + n]);
        pos += n;
        v
    };

    let mut int_digits = String::new();
    if intg_left > 0 {
        let v = take(decimal_leftover_bytes(intg_left));
        int_digits.push_str(&format!("{:0width$}", v, width = intg_left));
    }
    for _ in 0..intg_full {
        int_digits.push_str(&format!("{:09}", take(4)));
    }
    let int_part = int_digits.trim_start_matches('0');

    let mut frac_digits = String::new();
    for _ in 0..frac_full {
        frac_digits.push_str(&format!("{:09}", take(4)));
    }
    if frac_left > 0 {
        let v = take(decimal_leftover_bytes(frac_left));
        frac_digits.push_str(&format!("{:0width$}", v, width = frac_left));
    }

    let mut out = String::with_capacity(precision + 2);
    let is_zero = int_part.is_empty() && frac_digits.bytes().all(|b| b == b'0');
    if negative && !is_zero {
        out.push('-');
    }
    out.push_str(if int_part.is_empty() { "0" } else { int_part });
    if scale > 0 {
        out.push('.');
        out.push_str(&frac_digits);
    }
    out
}

fn decode_date(data: &[u8]) -> String {
    let val = read_be_uint(data) ^ 0x80_0000;
    let day = val & 0x1F;
    let month = (val >> 5) & 0x0F;
    let year = val >> 9;
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Read fractional seconds and scale them to microseconds.
fn read_micros(data: &[u8], fsp: u32) -> u64 {
    let frac = read_be_uint(data);
    match fsp {
        1 | 2 => frac * 10_000,
        3 | 4 => frac * 100,
        _ => frac,
    }
}

fn format_fraction(micros: u64, fsp: u32) -> String {
    if fsp == 0 {
        return String::new();
    }
    let digits = format!("{:06}", micros);
    format!(".{}", &digits[..fsp as usize])
}

fn decode_datetime(data: &[u8], fsp: u32) -> String {
    let val = read_be_uint(&data[..5]) ^ (1u64 << 39);
    let second = val & 0x3F;
    let minute = (val >> 6) & 0x3F;
    let hour = (val >> 12) & 0x1F;
    let day = (val >> 17) & 0x1F;
    let year_month = val >> 22;
    let micros = read_micros(&data[5..], fsp);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}",
        year_month / 13,
        year_month % 13,
        day,
        hour,
        minute,
        second,
        format_fraction(micros, fsp)
    )
}

fn decode_timestamp(data: &[u8], fsp: u32) -> String {
    let secs = read_be_uint(&data[..4]);
    let micros = read_micros(&data[4..], fsp);
    if secs == 0 {
        return format!("0000-00-00 00:00:00{}", format_fraction(micros, fsp));
    }
    let (year, month, day) = days_to_ymd(secs / 86_400);
    let tod = secs % 86_400;
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}",
        year,
        month,
        day,
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60,
        format_fraction(micros, fsp)
    )
}

/// Days since 1970-01-01 to (year, month, day), proleptic Gregorian.
fn days_to_ymd(days: u64) -> (u64, u64, u64) {
    let z = days + 719_468;
    let era = z / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe + era * 400 + u64::from(m <= 2);
    (y, m, d)
}

/// TIME2: the integer part is offset by 0x800000; a negative value with a
/// fraction borrows one second from the integer part.
fn decode_time(data: &[u8], fsp: u32) -> String {
    let packed: i64 = match fsp_storage_bytes(fsp) {
        0 => (read_be_uint(&data[..3]) as i64 - 0x80_0000) << 24,
        1 => {
            let mut intpart = read_be_uint(&data[..3]) as i64 - 0x80_0000;
            let mut frac = data[3] as i64;
            if intpart < 0 && frac != 0 {
                intpart += 1;
                frac -= 0x100;
            }
            (intpart << 24) + frac * 10_000
        }
        2 => {
            let mut intpart = read_be_uint(&data[..3]) as i64 - 0x80_0000;
            let mut frac = read_be_uint(&data[3..5]) as i64;
            if intpart < 0 && frac != 0 {
                intpart += 1;
                frac -= 0x1_0000;
            }
            (intpart << 24) + frac * 100
        }
        _ => read_be_uint(&data[..6]) as i64 - 0x8000_0000_0000,
    };

    let sign = if packed < 0 { "-" } else { "" };
    let abs = packed.unsigned_abs();
    let hms = abs >> 24;
    let micros = abs & 0xFF_FFFF;
    format!(
        "{}{:02}:{:02}:{:02}{}",
        sign,
        (hms >> 12) & 0x3FF,
        (hms >> 6) & 0x3F,
        hms & 0x3F,
        format_fraction(micros, fsp)
    )
}
