//! Table charset table.
//!
//! Maps a MySQL table charset name (as written in `DEFAULT CHARSET=...`) to
//! the maximum number of bytes one character can occupy. InnoDB uses this
//! width to decide whether a `CHAR(n)` column is stored as fixed-length
//! (single-byte charsets) or carries a length byte like a `VARCHAR`
//! (multi-byte charsets), and whether a column's length entry in the record
//! header takes one or two bytes.
//!
//! The same [`Charset`] also decodes character column bytes into Rust strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::IbdError;

/// A table charset recognized by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    Latin1,
    Ascii,
    Binary,
    Cp1250,
    Cp1251,
    Cp1256,
    Cp1257,
    Gb2312,
    Gbk,
    Gb18030,
    Big5,
    Sjis,
    Cp932,
    Euckr,
    Ujis,
    Eucjpms,
    Ucs2,
    Utf8,
    Utf8mb4,
    Utf16,
    Utf16le,
    Utf32,
}

/// `(name, charset, max bytes per character)` as reported by `SHOW CHARACTER SET`.
const CHARSET_TABLE: &[(&str, Charset, usize)] = &[
    ("latin1", Charset::Latin1, 1),
    ("ascii", Charset::Ascii, 1),
    ("binary", Charset::Binary, 1),
    ("cp1250", Charset::Cp1250, 1),
    ("cp1251", Charset::Cp1251, 1),
    ("cp1256", Charset::Cp1256, 1),
    ("cp1257", Charset::Cp1257, 1),
    ("gb2312", Charset::Gb2312, 2),
    ("gbk", Charset::Gbk, 2),
    ("gb18030", Charset::Gb18030, 4),
    ("big5", Charset::Big5, 2),
    ("sjis", Charset::Sjis, 2),
    ("cp932", Charset::Cp932, 2),
    ("euckr", Charset::Euckr, 2),
    ("ujis", Charset::Ujis, 3),
    ("eucjpms", Charset::Eucjpms, 3),
    ("ucs2", Charset::Ucs2, 2),
    ("utf8", Charset::Utf8, 3),
    ("utf8mb3", Charset::Utf8, 3),
    ("utf8mb4", Charset::Utf8mb4, 4),
    ("utf16", Charset::Utf16, 4),
    ("utf16le", Charset::Utf16le, 4),
    ("utf32", Charset::Utf32, 4),
];

impl Charset {
    /// Look up a charset by its MySQL name (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use ibread::innodb::charset::Charset;
    ///
    /// assert_eq!(Charset::from_name("utf8mb4"), Some(Charset::Utf8mb4));
    /// assert_eq!(Charset::from_name("UTF8MB3"), Some(Charset::Utf8));
    /// assert_eq!(Charset::from_name("klingon"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        CHARSET_TABLE
            .iter()
            .find(|(n, _, _)| *n == lower)
            .map(|(_, cs, _)| *cs)
    }

    /// Canonical MySQL name of this charset.
    pub fn name(&self) -> &'static str {
        CHARSET_TABLE
            .iter()
            .find(|(_, cs, _)| cs == self)
            .map(|(n, _, _)| *n)
            .unwrap_or("utf8mb4")
    }

    /// Maximum number of bytes one character occupies in this charset.
    ///
    /// # Examples
    ///
    /// ```
    /// use ibread::innodb::charset::Charset;
    ///
    /// assert_eq!(Charset::Latin1.max_bytes_per_char(), 1);
    /// assert_eq!(Charset::Utf8.max_bytes_per_char(), 3);
    /// assert_eq!(Charset::Utf8mb4.max_bytes_per_char(), 4);
    /// ```
    pub fn max_bytes_per_char(&self) -> usize {
        CHARSET_TABLE
            .iter()
            .find(|(_, cs, _)| cs == self)
            .map(|(_, _, n)| *n)
            .unwrap_or(4)
    }

    /// Returns true if a character can take more than one byte.
    pub fn is_multi_byte(&self) -> bool {
        self.max_bytes_per_char() > 1
    }

    /// Decode column bytes into a string.
    ///
    /// UTF-8 family charsets decode with lossy replacement; single-byte
    /// Latin charsets map each byte to the code point of the same value.
    /// Other multi-byte charsets have no codec here and fall back to lossy
    /// UTF-8.
    pub fn decode(&self, data: &[u8]) -> String {
        match self {
            Charset::Latin1 | Charset::Cp1250 | Charset::Cp1251 | Charset::Cp1256 | Charset::Cp1257 => {
                data.iter().map(|&b| b as char).collect()
            }
            _ => String::from_utf8_lossy(data).into_owned(),
        }
    }
}

impl Default for Charset {
    fn default() -> Self {
        Charset::Utf8
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Charset {
    type Err = IbdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Charset::from_name(s)
            .ok_or_else(|| IbdError::Argument(format!("table charset not supported: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_entry_resolves() {
        for (name, cs, bytes) in CHARSET_TABLE {
            assert_eq!(Charset::from_name(name), Some(*cs));
            assert_eq!(cs.max_bytes_per_char(), *bytes);
        }
    }

    #[test]
    fn test_utf8mb3_alias_reports_canonical_name() {
        let cs: Charset = "utf8mb3".parse().unwrap();
        assert_eq!(cs, Charset::Utf8);
        assert_eq!(cs.name(), "utf8");
    }

    #[test]
    fn test_unknown_charset_is_argument_error() {
        let err = "ebcdic".parse::<Charset>().unwrap_err();
        assert!(matches!(err, IbdError::Argument(_)));
    }

    #[test]
    fn test_latin1_decodes_high_bytes() {
        assert_eq!(Charset::Latin1.decode(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn test_utf8_decode_is_lossy() {
        assert_eq!(Charset::Utf8mb4.decode("héllo".as_bytes()), "héllo");
        assert_eq!(Charset::Utf8mb4.decode(&[0x61, 0xFF]), "a\u{FFFD}");
    }

    #[test]
    fn test_multi_byte_flag() {
        assert!(!Charset::Latin1.is_multi_byte());
        assert!(Charset::Gbk.is_multi_byte());
    }
}
