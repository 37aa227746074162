//! Bounded LRU page cache shared across cursors.
//!
//! Maps page number to a parsed [`Page`] behind an `Arc`. The cache is an
//! intrusive LRU (hash map entries linked by page number into a recency
//! list) guarded by one mutex, so it can be shared by cursors running on
//! different threads. Lookups never block on I/O: on a miss the caller reads
//! and parses the page itself and inserts the result, and when two threads
//! miss on the same page concurrently the later insert simply overwrites the
//! earlier one. Pages are immutable, so either copy is equally valid.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::innodb::page::Page;

struct Entry {
    page: Arc<Page>,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Default)]
struct LruState {
    map: HashMap<u32, Entry>,
    head: Option<u32>,
    tail: Option<u32>,
}

impl LruState {
    fn unlink(&mut self, page_no: u32) {
        let (prev, next) = match self.map.get(&page_no) {
            Some(e) => (e.prev, e.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(pe) = self.map.get_mut(&p) {
                    pe.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(ne) = self.map.get_mut(&n) {
                    ne.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, page_no: u32) {
        let old_head = self.head;
        if let Some(e) = self.map.get_mut(&page_no) {
            e.prev = None;
            e.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(he) = self.map.get_mut(&h) {
                he.prev = Some(page_no);
            }
        }
        self.head = Some(page_no);
        if self.tail.is_none() {
            self.tail = Some(page_no);
        }
    }

    fn touch(&mut self, page_no: u32) {
        if self.head != Some(page_no) {
            self.unlink(page_no);
            self.push_front(page_no);
        }
    }

    fn evict_tail(&mut self) -> Option<u32> {
        let tail = self.tail?;
        self.unlink(tail);
        self.map.remove(&tail);
        Some(tail)
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
}

/// Thread-safe bounded LRU cache of parsed pages.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ibread::innodb::cache::PageCache;
/// use ibread::innodb::page::Page;
///
/// let cache = PageCache::new(2);
/// for no in 0..3u32 {
///     let mut buf = vec![0u8; 16384];
///     buf[24..26].copy_from_slice(&8u16.to_be_bytes()); // FSP_HDR
///     cache.insert(Arc::new(Page::parse(no, buf, 16384).unwrap()));
/// }
/// assert!(cache.get(0).is_none()); // least recently used, evicted
/// assert!(cache.get(2).is_some());
/// assert_eq!(cache.len(), 2);
/// ```
pub struct PageCache {
    state: Mutex<LruState>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PageCache {
    /// Create a cache holding at most `capacity` pages (minimum 1).
    pub fn new(capacity: usize) -> Self {
        PageCache {
            state: Mutex::new(LruState::default()),
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up a page and mark it most recently used.
    pub fn get(&self, page_no: u32) -> Option<Arc<Page>> {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        let found = state.map.get(&page_no).map(|e| Arc::clone(&e.page));
        match found {
            Some(page) => {
                state.touch(page_no);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(page)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a page, replacing any cached copy and evicting the least
    /// recently used page when full.
    pub fn insert(&self, page: Arc<Page>) {
        let page_no = page.page_no();
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(e) = state.map.get_mut(&page_no) {
            e.page = page;
            state.touch(page_no);
            return;
        }
        state.map.insert(
            page_no,
            Entry {
                page,
                prev: None,
                next: None,
            },
        );
        state.push_front(page_no);
        while state.map.len() > self.capacity {
            if let Some(evicted) = state.evict_tail() {
                tracing::debug!(page_no = evicted, "evicted page from cache");
                self.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.state.lock() {
            Ok(s) => s.map.len(),
            Err(poisoned) => poisoned.into_inner().map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
