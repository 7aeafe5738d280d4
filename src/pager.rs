//! Disk-backed page cache.
//!
//! A [`Pager`] presents a database file as a random-access array of
//! fixed-size pages. Pages are cached by number behind a mutex so the
//! B+ tree and catalog layers can hand out short-lived locks rather
//! than long-lived typed references into a buffer that might move.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::errors::{err, Result};

pub const PAGE_SIZE: usize = 4096;

/// Hard ceiling on resident pages. Chosen generously for an embedded
/// engine; exceeding it is a fatal condition rather than an eviction
/// trigger, matching the spec's "no eviction" cache policy.
pub const TABLE_MAX_PAGES: usize = 100_000;

pub type Page = [u8; PAGE_SIZE];

pub struct Pager {
    file: File,
    num_pages: u32,
    cache: Vec<Option<Arc<Mutex<Page>>>>,
}

impl Pager {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_len = file.metadata()?.len();
        if file_len as usize % PAGE_SIZE != 0 {
            return Err(err!(
                Fatal,
                "database file length {} is not a multiple of page size {}",
                file_len,
                PAGE_SIZE
            ));
        }
        let num_pages = (file_len as usize / PAGE_SIZE) as u32;
        tracing::info!(num_pages, "opened pager");
        Ok(Pager {
            file,
            num_pages,
            cache: Vec::new(),
        })
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Returns the cached page, reading it from disk on first touch.
    /// If `page_num` is beyond the current file extent, the page is
    /// zero-initialized and the file is considered to have grown to
    /// cover it; the caller is responsible for initializing its layout.
    ///
    /// A read that comes up short (the file doesn't yet physically hold
    /// `page_num`'s bytes, e.g. a WAL replay touching a higher page
    /// number before a lower one that was never flushed) is tolerated:
    /// whatever wasn't on disk stays zeroed rather than erroring, since
    /// a caller in that situation is about to overwrite the page anyway.
    pub fn get_page(&mut self, page_num: u32) -> Result<Arc<Mutex<Page>>> {
        let idx = page_num as usize;
        if idx >= TABLE_MAX_PAGES {
            return Err(err!(
                Fatal,
                "page number {} exceeds maximum of {} pages",
                page_num,
                TABLE_MAX_PAGES
            ));
        }
        if idx >= self.cache.len() {
            self.cache.resize(idx + 1, None);
        }
        if self.cache[idx].is_none() {
            let mut buf = [0u8; PAGE_SIZE];
            if page_num < self.num_pages {
                self.file.seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                let mut filled = 0;
                loop {
                    let n = self.file.read(&mut buf[filled..])?;
                    if n == 0 {
                        break;
                    }
                    filled += n;
                }
                tracing::trace!(page_num, filled, "loaded page from disk");
            } else {
                self.num_pages = page_num + 1;
                tracing::trace!(page_num, "zero-initialized new page");
            }
            self.cache[idx] = Some(Arc::new(Mutex::new(buf)));
        }
        Ok(self.cache[idx].clone().expect("just inserted"))
    }

    /// Allocates a fresh page number. Pages are never reused; there is
    /// no free list.
    pub fn allocate_page(&mut self) -> Result<u32> {
        let page_num = self.num_pages;
        if page_num as usize >= TABLE_MAX_PAGES {
            return Err(err!(Fatal, "pager is full ({} pages)", TABLE_MAX_PAGES));
        }
        self.num_pages += 1;
        tracing::debug!(page_num, "allocated page");
        Ok(page_num)
    }

    pub fn flush(&mut self, page_num: u32) -> Result<()> {
        let idx = page_num as usize;
        let Some(Some(page)) = self.cache.get(idx) else {
            return Ok(());
        };
        let buf = *page.lock().expect("page mutex poisoned");
        self.file.seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        for page_num in 0..self.cache.len() as u32 {
            self.flush(page_num)?;
        }
        self.file.flush()?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.flush_all()?;
        tracing::info!("pager closed");
        Ok(())
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all() {
            tracing::warn!(error = %e, "failed to flush pager on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_get_round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("db.pages")).unwrap();
        let page_num = pager.allocate_page().unwrap();
        {
            let page = pager.get_page(page_num).unwrap();
            let mut guard = page.lock().unwrap();
            guard[0] = 0xAB;
        }
        let page = pager.get_page(page_num).unwrap();
        assert_eq!(page.lock().unwrap()[0], 0xAB);
    }

    #[test]
    fn reopen_preserves_flushed_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.pages");
        {
            let mut pager = Pager::open(&path).unwrap();
            let page_num = pager.allocate_page().unwrap();
            let page = pager.get_page(page_num).unwrap();
            page.lock().unwrap()[10] = 42;
            pager.close().unwrap();
        }
        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.num_pages(), 1);
        let page = pager.get_page(0).unwrap();
        assert_eq!(page.lock().unwrap()[10], 42);
    }

    #[test]
    fn page_beyond_max_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("db.pages")).unwrap();
        let err = pager.get_page(TABLE_MAX_PAGES as u32).unwrap_err();
        assert!(err.is_fatal());
    }
}
