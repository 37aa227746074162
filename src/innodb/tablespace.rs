//! Page sources and the verifying page reader.
//!
//! A [`PageSource`] hands out raw page bytes by page number. [`Tablespace`]
//! is the standard source: a `.ibd` file read with positioned reads behind a
//! mutex, a memory-mapped file (feature `cli`), or an in-memory image. The
//! page size is auto-detected from the FSP flags on page 0 (4K through 64K).
//!
//! [`PageReader`] sits on top of a source. It settles the checksum
//! algorithm once (detected on page 0 or forced through
//! [`ReaderOptions::checksum`]), verifies every page it fetches against that
//! one algorithm, parses and classifies the page, and keeps recently used
//! pages in an optional shared [`PageCache`].

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::innodb::cache::{CacheStats, PageCache};
use crate::innodb::checksum::{detect_algorithm, verify_page, ChecksumAlgorithm, ChecksumResult};
use crate::innodb::constants::*;
use crate::innodb::page::{is_valid_page_size, FilHeader, FspHeader, Page};
use crate::IbdError;

/// Anything that can produce raw pages by number.
///
/// Implementations must be shareable across threads; the files they read
/// are never written.
pub trait PageSource: Send + Sync {
    /// Page size in bytes.
    fn page_size(&self) -> u32;

    /// Number of whole pages available.
    fn page_count(&self) -> u64;

    /// Read one page into a freshly allocated buffer of `page_size()` bytes.
    fn read_page(&self, page_no: u32) -> Result<Vec<u8>, IbdError>;
}

enum Backing {
    File(Mutex<File>),
    Memory(Vec<u8>),
    #[cfg(feature = "cli")]
    Mmap(memmap2::Mmap),
}

/// An InnoDB tablespace opened for reading.
pub struct Tablespace {
    backing: Backing,
    file_size: u64,
    page_size: u32,
    page_count: u64,
    fsp_header: Option<FspHeader>,
}

impl Tablespace {
    /// Open a tablespace file and auto-detect the page size.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IbdError> {
        let (file, file_size) = open_file(path.as_ref())?;
        Self::init(Backing::File(Mutex::new(file)), file_size, None)
    }

    /// Open a tablespace file with a fixed page size (bypass auto-detection).
    pub fn open_with_page_size<P: AsRef<Path>>(path: P, page_size: u32) -> Result<Self, IbdError> {
        let (file, file_size) = open_file(path.as_ref())?;
        Self::init(Backing::File(Mutex::new(file)), file_size, Some(page_size))
    }

    /// Open a tablespace file through a read-only memory map.
    ///
    /// The mapping is created with `unsafe` because another process could
    /// truncate the file underneath it. Tablespaces should only be mapped
    /// while the server is stopped or the file is a copy.
    #[cfg(feature = "cli")]
    pub fn open_mmap<P: AsRef<Path>>(path: P, page_size: Option<u32>) -> Result<Self, IbdError> {
        let path = path.as_ref();
        let (file, file_size) = open_file(path)?;
        // SAFETY: the map is read-only and this crate never writes the file.
        let mmap = unsafe {
            memmap2::Mmap::map(&file)
                .map_err(|e| IbdError::Io(format!("Cannot mmap {}: {}", path.display(), e)))?
        };
        Self::init(Backing::Mmap(mmap), file_size, page_size)
    }

    /// Wrap an in-memory tablespace image and auto-detect the page size.
    ///
    /// # Examples
    ///
    /// ```
    /// use ibread::innodb::tablespace::{PageSource, Tablespace};
    ///
    /// let mut image = vec![0u8; 4 * 16384];
    /// image[24..26].copy_from_slice(&8u16.to_be_bytes()); // FSP_HDR
    /// let ts = Tablespace::from_bytes(image).unwrap();
    /// assert_eq!(ts.page_size(), 16384);
    /// assert_eq!(ts.page_count(), 4);
    /// ```
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, IbdError> {
        let file_size = data.len() as u64;
        Self::init(Backing::Memory(data), file_size, None)
    }

    /// Wrap an in-memory tablespace image with a fixed page size.
    pub fn from_bytes_with_page_size(data: Vec<u8>, page_size: u32) -> Result<Self, IbdError> {
        let file_size = data.len() as u64;
        Self::init(Backing::Memory(data), file_size, Some(page_size))
    }

    fn init(backing: Backing, file_size: u64, forced_page_size: Option<u32>) -> Result<Self, IbdError> {
        if file_size < (SIZE_FIL_HEAD + FSP_HEADER_SIZE) as u64 {
            return Err(IbdError::Parse(format!(
                "File too small to be a valid tablespace: {} bytes",
                file_size
            )));
        }
        if let Some(ps) = forced_page_size {
            if !is_valid_page_size(ps) {
                return Err(IbdError::Argument(format!("Invalid page size {}", ps)));
            }
        }

        let head_len = std::cmp::min(file_size, SIZE_FIL_HEAD as u64 + FSP_HEADER_SIZE as u64) as usize;
        let head = read_at(&backing, 0, head_len)?;
        let fsp_header = FspHeader::parse(&head);

        let page_size = match forced_page_size {
            Some(ps) => ps,
            None => match &fsp_header {
                Some(fsp) => {
                    let detected = fsp.page_size_from_flags();
                    if is_valid_page_size(detected) {
                        detected
                    } else {
                        tracing::warn!(
                            flags = fsp.flags,
                            "FSP flags encode an invalid page size, assuming 16K"
                        );
                        SIZE_PAGE_DEFAULT
                    }
                }
                None => SIZE_PAGE_DEFAULT,
            },
        };
        if fsp_header.as_ref().is_some_and(|f| f.is_compressed()) {
            return Err(IbdError::UnsupportedFormat {
                page_no: Some(0),
                detail: "compressed (KEY_BLOCK_SIZE) tablespaces are not supported".to_string(),
            });
        }

        let page_count = file_size / page_size as u64;
        tracing::debug!(page_size, page_count, file_size, "opened tablespace");

        Ok(Tablespace {
            backing,
            file_size,
            page_size,
            page_count,
            fsp_header,
        })
    }

    /// Returns the file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Returns the FSP header from page 0, if it parsed.
    pub fn fsp_header(&self) -> Option<&FspHeader> {
        self.fsp_header.as_ref()
    }

    /// Invoke `callback` for every page in order.
    pub fn for_each_page<F>(&self, mut callback: F) -> Result<(), IbdError>
    where
        F: FnMut(u32, &[u8]) -> Result<(), IbdError>,
    {
        for page_no in 0..self.page_count {
            let page_no = page_no as u32;
            let data = self.read_page(page_no)?;
            callback(page_no, &data)?;
        }
        Ok(())
    }
}

impl PageSource for Tablespace {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn page_count(&self) -> u64 {
        self.page_count
    }

    fn read_page(&self, page_no: u32) -> Result<Vec<u8>, IbdError> {
        if page_no as u64 >= self.page_count {
            return Err(IbdError::Argument(format!(
                "Page {} out of range (tablespace has {} pages)",
                page_no, self.page_count
            )));
        }
        let offset = page_no as u64 * self.page_size as u64;
        read_at(&self.backing, offset, self.page_size as usize)
            .map_err(|e| IbdError::Io(format!("Cannot read page {}: {}", page_no, e)))
    }
}

impl std::fmt::Debug for Tablespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tablespace")
            .field("file_size", &self.file_size)
            .field("page_size", &self.page_size)
            .field("page_count", &self.page_count)
            .finish()
    }
}

fn open_file(path: &Path) -> Result<(File, u64), IbdError> {
    let file = File::open(path).map_err(|e| IbdError::Io(format!("Cannot open {}: {}", path.display(), e)))?;
    let file_size = file
        .metadata()
        .map_err(|e| IbdError::Io(format!("Cannot stat {}: {}", path.display(), e)))?
        .len();
    Ok((file, file_size))
}

fn read_at(backing: &Backing, offset: u64, len: usize) -> Result<Vec<u8>, IbdError> {
    match backing {
        Backing::File(file) => {
            let mut file = file
                .lock()
                .map_err(|_| IbdError::Io("tablespace file handle lock poisoned".to_string()))?;
            let mut buf = vec![0u8; len];
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
            Ok(buf)
        }
        Backing::Memory(data) => slice_at(data, offset, len),
        #[cfg(feature = "cli")]
        Backing::Mmap(map) => slice_at(map, offset, len),
    }
}

fn slice_at(data: &[u8], offset: u64, len: usize) -> Result<Vec<u8>, IbdError> {
    let start = offset as usize;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| IbdError::Io(format!("read of {} bytes at {} past end of image", len, offset)))?;
    Ok(data[start..end].to_vec())
}

/// Which checksum algorithm the reader enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumPolicy {
    /// Detect the algorithm on page 0 and enforce it for every page.
    #[default]
    Auto,
    Crc32c,
    InnoDB,
    None,
}

/// Reader configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Expected page size; must agree with the source when set.
    pub page_size: Option<u32>,
    pub checksum: ChecksumPolicy,
    /// Verify each fetched page against the settled algorithm.
    pub verify_checksums: bool,
    /// Page cache capacity in pages. 0 disables caching.
    pub cache_pages: usize,
    /// Skip records that fail to decode instead of aborting the scan.
    pub best_effort: bool,
    /// Return delete-marked records.
    pub include_deleted: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            page_size: None,
            checksum: ChecksumPolicy::Auto,
            verify_checksums: true,
            cache_pages: 256,
            best_effort: false,
            include_deleted: false,
        }
    }
}

/// Verifying, classifying, caching front end over a [`PageSource`].
///
/// `PageReader` is `Send + Sync`; wrap it in an `Arc` to run several
/// cursors over the same tablespace from different threads.
pub struct PageReader {
    source: Arc<dyn PageSource>,
    options: ReaderOptions,
    page_size: u32,
    algorithm: ChecksumAlgorithm,
    space_id: u32,
    cache: Option<PageCache>,
}

impl PageReader {
    /// Build a reader and settle the checksum algorithm from page 0.
    pub fn new(source: Arc<dyn PageSource>, options: ReaderOptions) -> Result<Self, IbdError> {
        let page_size = source.page_size();
        if let Some(expected) = options.page_size {
            if expected != page_size {
                return Err(IbdError::Argument(format!(
                    "page size {} requested but the tablespace uses {}",
                    expected, page_size
                )));
            }
        }
        if source.page_count() == 0 {
            return Err(IbdError::Parse("tablespace contains no pages".to_string()));
        }

        let page0 = source.read_page(0)?;
        let space_id = FilHeader::parse(&page0).map(|h| h.space_id).unwrap_or(0);
        let algorithm = match options.checksum {
            ChecksumPolicy::Crc32c => ChecksumAlgorithm::Crc32c,
            ChecksumPolicy::InnoDB => ChecksumAlgorithm::InnoDB,
            ChecksumPolicy::None => ChecksumAlgorithm::None,
            ChecksumPolicy::Auto => match detect_algorithm(&page0, page_size) {
                Some(alg) => alg,
                None if page0.iter().all(|&b| b == 0) => {
                    tracing::warn!("page 0 is empty, assuming crc32c checksums");
                    ChecksumAlgorithm::Crc32c
                }
                None if options.verify_checksums => {
                    let result = verify_page(&page0, page_size, ChecksumAlgorithm::Crc32c);
                    return Err(IbdError::CorruptPage {
                        page_no: 0,
                        stored: result.stored_checksum,
                        calculated: result.calculated_checksum,
                        algorithm: "crc32c/innodb".to_string(),
                    });
                }
                None => ChecksumAlgorithm::Crc32c,
            },
        };
        tracing::debug!(%algorithm, space_id, page_size, "page reader ready");

        let cache = (options.cache_pages > 0).then(|| PageCache::new(options.cache_pages));
        Ok(PageReader {
            source,
            options,
            page_size,
            algorithm,
            space_id,
            cache,
        })
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// The checksum algorithm every page is verified against.
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page_count(&self) -> u64 {
        self.source.page_count()
    }

    /// Space id recorded in page 0's FIL header.
    pub fn space_id(&self) -> u32 {
        self.space_id
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    /// Fetch, verify and classify one page.
    ///
    /// Fails with [`IbdError::CorruptPage`] when checksum verification is on
    /// and the page disagrees with the settled algorithm, and with
    /// [`IbdError::UnsupportedFormat`] for page types the reader does not
    /// recognize.
    pub fn fetch(&self, page_no: u32) -> Result<Arc<Page>, IbdError> {
        if let Some(cache) = &self.cache {
            if let Some(page) = cache.get(page_no) {
                return Ok(page);
            }
        }

        let data = self.source.read_page(page_no)?;
        if self.options.verify_checksums {
            let result = verify_page(&data, self.page_size, self.algorithm);
            if !result.valid {
                return Err(IbdError::CorruptPage {
                    page_no,
                    stored: result.stored_checksum,
                    calculated: result.calculated_checksum,
                    algorithm: self.algorithm.to_string(),
                });
            }
        }
        let page = Arc::new(Page::parse(page_no, data, self.page_size)?);
        tracing::debug!(page_no, page_type = %page.page_type(), "fetched page");

        if let Some(cache) = &self.cache {
            cache.insert(Arc::clone(&page));
        }
        Ok(page)
    }

    /// Checksum-check one page without parsing it.
    pub fn verify(&self, page_no: u32) -> Result<ChecksumResult, IbdError> {
        let data = self.source.read_page(page_no)?;
        Ok(verify_page(&data, self.page_size, self.algorithm))
    }
}

impl std::fmt::Debug for PageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageReader")
            .field("page_size", &self.page_size)
            .field("algorithm", &self.algorithm)
            .field("space_id", &self.space_id)
            .field("options", &self.options)
            .finish()
    }
}
