//! Page checksum algorithms.
//!
//! InnoDB has written two checksum algorithms over the years: the legacy
//! "innodb" fold checksum (MySQL 5.6 default) and CRC-32C (5.7 onward). A
//! tablespace uses one algorithm for every page, so the reader detects the
//! algorithm once (see [`detect_algorithm`]) and then verifies each page
//! against that algorithm only with [`verify_page`].
//!
//! Both algorithms skip the stored checksum (bytes 0-3), the flush LSN and
//! space id (bytes 26-37) and the 8-byte trailer.

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::innodb::constants::*;

/// Checksum algorithm used by a tablespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// CRC-32C, `innodb_checksum_algorithm=crc32`
    Crc32c,
    /// Legacy fold checksum, `innodb_checksum_algorithm=innodb`
    InnoDB,
    /// `innodb_checksum_algorithm=none`, header holds 0xDEADBEEF
    None,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChecksumAlgorithm::Crc32c => "crc32c",
            ChecksumAlgorithm::InnoDB => "innodb",
            ChecksumAlgorithm::None => "none",
        };
        f.write_str(s)
    }
}

/// Result of verifying one page against one algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumResult {
    pub algorithm: ChecksumAlgorithm,
    pub valid: bool,
    pub stored_checksum: u32,
    pub calculated_checksum: u32,
}

/// CRC-32C over bytes 4..26 and 38..page_size-8.
pub fn crc32c_checksum(page_data: &[u8], page_size: usize) -> u32 {
    let end = page_size - SIZE_FIL_TRAILER;
    let crc = crc32c::crc32c(&page_data[FIL_PAGE_OFFSET..FIL_PAGE_FILE_FLUSH_LSN]);
    crc32c::crc32c_append(crc, &page_data[FIL_PAGE_DATA..end])
}

/// MySQL's `ut_fold_ulint_pair`, computed in 64 bits like `ulint` on LP64.
#[inline]
fn ut_fold_ulint_pair(n1: u64, n2: u64) -> u64 {
    let mask2 = UT_HASH_RANDOM_MASK2 as u64;
    let mask = UT_HASH_RANDOM_MASK as u64;
    ((((n1 ^ n2 ^ mask2) << 8).wrapping_add(n1)) ^ mask).wrapping_add(n2)
}

/// MySQL's `ut_fold_binary`: eight bytes at a time as two u32 words, then
/// the remainder byte by byte with a trailing u32 when four bytes are left.
fn ut_fold_binary(data: &[u8]) -> u64 {
    let mut fold: u64 = 0;
    let aligned_len = data.len() & !7;
    let mut i = 0;
    while i < aligned_len {
        fold = ut_fold_ulint_pair(fold, BigEndian::read_u32(&data[i..]) as u64);
        fold = ut_fold_ulint_pair(fold, BigEndian::read_u32(&data[i + 4..]) as u64);
        i += 8;
    }

    let mut remainder = data.len() & 7;
    // Same fallthrough as the C switch: single bytes until a full word remains
    while remainder > 0 {
        if remainder == 4 {
            fold = ut_fold_ulint_pair(fold, BigEndian::read_u32(&data[i..]) as u64);
            break;
        }
        fold = ut_fold_ulint_pair(fold, data[i] as u64);
        i += 1;
        remainder -= 1;
    }
    fold
}

/// Legacy checksum stored in the FIL header (`buf_calc_page_new_checksum`).
pub fn innodb_new_checksum(page_data: &[u8], page_size: usize) -> u32 {
    let end = page_size - SIZE_FIL_TRAILER;
    let fold1 = ut_fold_binary(&page_data[FIL_PAGE_OFFSET..FIL_PAGE_FILE_FLUSH_LSN]);
    let fold2 = ut_fold_binary(&page_data[FIL_PAGE_DATA..end]);
    fold1.wrapping_add(fold2) as u32
}

/// Legacy checksum stored in the FIL trailer (`buf_calc_page_old_checksum`).
pub fn innodb_old_checksum(page_data: &[u8]) -> u32 {
    ut_fold_binary(&page_data[..FIL_PAGE_FILE_FLUSH_LSN]) as u32
}

fn is_all_zero(page_data: &[u8]) -> bool {
    page_data.iter().all(|&b| b == 0)
}

/// Detect which algorithm wrote a page, normally page 0.
///
/// Returns `None` when no algorithm matches (the page is corrupt) or the
/// page is all zeros and says nothing about the algorithm.
pub fn detect_algorithm(page_data: &[u8], page_size: u32) -> Option<ChecksumAlgorithm> {
    let ps = page_size as usize;
    if page_data.len() < ps || is_all_zero(&page_data[..ps]) {
        return None;
    }
    let stored = BigEndian::read_u32(&page_data[FIL_PAGE_SPACE_OR_CHKSUM..]);
    if stored == BUF_NO_CHECKSUM_MAGIC {
        return Some(ChecksumAlgorithm::None);
    }
    [ChecksumAlgorithm::Crc32c, ChecksumAlgorithm::InnoDB]
        .into_iter()
        .find(|&alg| verify_page(page_data, page_size, alg).valid)
}

/// Verify a page against one specific algorithm.
///
/// Freshly allocated all-zero pages are valid under every algorithm.
///
/// # Examples
///
/// ```
/// use ibread::innodb::checksum::{stamp_checksum, verify_page, ChecksumAlgorithm};
///
/// let mut page = vec![0u8; 16384];
/// page[38] = 0x42;
/// stamp_checksum(&mut page, 16384, ChecksumAlgorithm::Crc32c);
/// assert!(verify_page(&page, 16384, ChecksumAlgorithm::Crc32c).valid);
///
/// page[100] = 0x01;
/// assert!(!verify_page(&page, 16384, ChecksumAlgorithm::Crc32c).valid);
/// ```
pub fn verify_page(page_data: &[u8], page_size: u32, algorithm: ChecksumAlgorithm) -> ChecksumResult {
    let ps = page_size as usize;
    if page_data.len() < ps || ps < FIL_PAGE_DATA + SIZE_FIL_TRAILER {
        return ChecksumResult {
            algorithm,
            valid: false,
            stored_checksum: 0,
            calculated_checksum: 0,
        };
    }
    let stored = BigEndian::read_u32(&page_data[FIL_PAGE_SPACE_OR_CHKSUM..]);
    if stored == 0 && is_all_zero(&page_data[..ps]) {
        return ChecksumResult {
            algorithm,
            valid: true,
            stored_checksum: 0,
            calculated_checksum: 0,
        };
    }

    match algorithm {
        ChecksumAlgorithm::Crc32c => {
            let calculated = crc32c_checksum(page_data, ps);
            ChecksumResult {
                algorithm,
                valid: stored == calculated,
                stored_checksum: stored,
                calculated_checksum: calculated,
            }
        }
        ChecksumAlgorithm::InnoDB => {
            let calculated = innodb_new_checksum(page_data, ps);
            // Header may be 0 on pages written before the new checksum existed
            let header_ok = stored == 0 || stored == calculated;
            let trailer = BigEndian::read_u32(&page_data[ps - SIZE_FIL_TRAILER..]);
            let lsn_high = BigEndian::read_u32(&page_data[FIL_PAGE_LSN..]);
            let trailer_ok = trailer == lsn_high || trailer == innodb_old_checksum(page_data);
            ChecksumResult {
                algorithm,
                valid: header_ok && trailer_ok,
                stored_checksum: stored,
                calculated_checksum: calculated,
            }
        }
        ChecksumAlgorithm::None => ChecksumResult {
            algorithm,
            valid: stored == BUF_NO_CHECKSUM_MAGIC,
            stored_checksum: stored,
            calculated_checksum: BUF_NO_CHECKSUM_MAGIC,
        },
    }
}

/// Write header and trailer checksums for `algorithm` into a page buffer.
///
/// Also copies the low 32 bits of the header LSN into the trailer.
pub fn stamp_checksum(page_data: &mut [u8], page_size: u32, algorithm: ChecksumAlgorithm) {
    let ps = page_size as usize;
    let trailer = ps - SIZE_FIL_TRAILER;
    let lsn = BigEndian::read_u64(&page_data[FIL_PAGE_LSN..]);
    BigEndian::write_u32(&mut page_data[trailer + 4..], (lsn & 0xFFFFFFFF) as u32);

    let header = match algorithm {
        ChecksumAlgorithm::Crc32c => crc32c_checksum(page_data, ps),
        ChecksumAlgorithm::InnoDB => innodb_new_checksum(page_data, ps),
        ChecksumAlgorithm::None => BUF_NO_CHECKSUM_MAGIC,
    };
    BigEndian::write_u32(&mut page_data[FIL_PAGE_SPACE_OR_CHKSUM..], header);

    // The old-style trailer checksum covers the freshly written header
    let trailer_sum = match algorithm {
        ChecksumAlgorithm::InnoDB => innodb_old_checksum(page_data),
        _ => header,
    };
    BigEndian::write_u32(&mut page_data[trailer..], trailer_sum);
}

/// Check that the low 32 bits of the header LSN match the trailer.
pub fn validate_lsn(page_data: &[u8], page_size: u32) -> bool {
    let ps = page_size as usize;
    if page_data.len() < ps {
        return false;
    }
    let header_lsn = BigEndian::read_u64(&page_data[FIL_PAGE_LSN..]);
    let trailer_lsn_low32 = BigEndian::read_u32(&page_data[ps - SIZE_FIL_TRAILER + 4..]);
    (header_lsn & 0xFFFFFFFF) as u32 == trailer_lsn_low32
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS: u32 = 16384;

    fn sample_page() -> Vec<u8> {
        let mut page = vec![0u8; PS as usize];
        BigEndian::write_u32(&mut page[FIL_PAGE_OFFSET..], 7);
        BigEndian::write_u64(&mut page[FIL_PAGE_LSN..], 0x0000_0001_2345_6789);
        BigEndian::write_u16(&mut page[FIL_PAGE_TYPE..], 17855);
        for (i, b) in page[FIL_PAGE_DATA..1000].iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        page
    }

    #[test]
    fn test_all_zero_page_is_valid() {
        let page = vec![0u8; PS as usize];
        assert!(verify_page(&page, PS, ChecksumAlgorithm::Crc32c).valid);
        assert!(verify_page(&page, PS, ChecksumAlgorithm::InnoDB).valid);
        assert_eq!(detect_algorithm(&page, PS), None);
    }

    #[test]
    fn test_no_checksum_magic() {
        let mut page = sample_page();
        stamp_checksum(&mut page, PS, ChecksumAlgorithm::None);
        assert_eq!(detect_algorithm(&page, PS), Some(ChecksumAlgorithm::None));
        assert!(verify_page(&page, PS, ChecksumAlgorithm::None).valid);
    }

    #[test]
    fn test_crc32c_stamp_and_detect() {
        let mut page = sample_page();
        stamp_checksum(&mut page, PS, ChecksumAlgorithm::Crc32c);
        assert_eq!(detect_algorithm(&page, PS), Some(ChecksumAlgorithm::Crc32c));
        assert!(!verify_page(&page, PS, ChecksumAlgorithm::InnoDB).valid);
        assert!(validate_lsn(&page, PS));
    }

    #[test]
    fn test_innodb_stamp_and_detect() {
        let mut page = sample_page();
        stamp_checksum(&mut page, PS, ChecksumAlgorithm::InnoDB);
        assert_eq!(detect_algorithm(&page, PS), Some(ChecksumAlgorithm::InnoDB));
        assert!(!verify_page(&page, PS, ChecksumAlgorithm::Crc32c).valid);
    }

    #[test]
    fn test_excluded_ranges_do_not_affect_crc() {
        let mut page = sample_page();
        stamp_checksum(&mut page, PS, ChecksumAlgorithm::Crc32c);
        // Flush LSN and space id are written outside the buffer pool
        BigEndian::write_u64(&mut page[FIL_PAGE_FILE_FLUSH_LSN..], 0xFFFF);
        BigEndian::write_u32(&mut page[FIL_PAGE_SPACE_ID..], 99);
        assert!(verify_page(&page, PS, ChecksumAlgorithm::Crc32c).valid);
    }

    #[test]
    fn test_corruption_reports_both_values() {
        let mut page = sample_page();
        stamp_checksum(&mut page, PS, ChecksumAlgorithm::Crc32c);
        page[5000] ^= 0xFF;
        let result = verify_page(&page, PS, ChecksumAlgorithm::Crc32c);
        assert!(!result.valid);
        assert_ne!(result.stored_checksum, result.calculated_checksum);
        assert_eq!(detect_algorithm(&page, PS), None);
    }

    #[test]
    fn test_fold_remainder_lengths() {
        // Every remainder path must consume exactly the input
        for len in 0..16 {
            let data: Vec<u8> = (0..len as u8).collect();
            let _ = ut_fold_binary(&data);
        }
        assert_eq!(ut_fold_binary(&[]), 0);
    }

    #[test]
    fn test_lsn_validation_mismatch() {
        let mut page = vec![0u8; PS as usize];
        BigEndian::write_u64(&mut page[FIL_PAGE_LSN..], 0x12345678);
        BigEndian::write_u32(&mut page[16380..], 0xAAAAAAAA);
        assert!(!validate_lsn(&page, PS));
    }
}
