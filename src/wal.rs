//! Optional write-ahead log: an append-only physical redo log of page
//! writes, replayed from the start on open.
//!
//! Record format (host-endian, matching the rest of the on-disk
//! layout):
//!
//! ```text
//! [page_num: u32][offset: u32][size: u32][bytes data[size]]
//! ```
//!
//! There is no checksum and no checkpointing — the log only ever
//! grows, and replay re-applies every record in order so the last
//! write to a given region wins. See the known limitations in the
//! accompanying design notes.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::Result;
use crate::pager::Pager;

pub struct Wal {
    file: File,
}

impl Wal {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        Ok(Wal { file })
    }

    /// Appends a physical write record and fsyncs before returning —
    /// the record is durable once this call completes.
    pub fn log_write(&mut self, page_num: u32, offset: u32, data: &[u8]) -> Result<()> {
        let size = data.len() as u32;
        self.file.write_all(&page_num.to_ne_bytes())?;
        self.file.write_all(&offset.to_ne_bytes())?;
        self.file.write_all(&size.to_ne_bytes())?;
        self.file.write_all(data)?;
        self.file.sync_all()?;
        tracing::debug!(page_num, offset, size, "wal: logged page write");
        Ok(())
    }

    /// Convenience for the common case of logging an entire page.
    pub fn log_page(&mut self, pager: &mut Pager, page_num: u32) -> Result<()> {
        let page = pager.get_page(page_num)?;
        let buf = *page.lock().expect("page mutex poisoned");
        self.log_write(page_num, 0, &buf)
    }

    /// Replays every record from the start of the log into the pager's
    /// cache, then repositions the log for further appends.
    pub fn replay(&mut self, pager: &mut Pager) -> Result<usize> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut applied = 0usize;
        loop {
            let mut header = [0u8; 12];
            match self.file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let page_num = u32::from_ne_bytes(header[0..4].try_into().unwrap());
            let offset = u32::from_ne_bytes(header[4..8].try_into().unwrap()) as usize;
            let size = u32::from_ne_bytes(header[8..12].try_into().unwrap()) as usize;
            let mut data = vec![0u8; size];
            self.file.read_exact(&mut data)?;

            let page = pager.get_page(page_num)?;
            let mut guard = page.lock().expect("page mutex poisoned");
            guard[offset..offset + size].copy_from_slice(&data);
            applied += 1;
        }
        self.file.seek(SeekFrom::End(0))?;
        tracing::info!(applied, "wal: replayed records");
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::PAGE_SIZE;

    #[test]
    fn replay_applies_logged_writes_to_pager() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("db")).unwrap();
        let page_num = pager.allocate_page().unwrap();
        pager.get_page(page_num).unwrap(); // ensure the page exists in num_pages

        let mut wal = Wal::open(dir.path().join("db.wal")).unwrap();
        let mut payload = [0u8; PAGE_SIZE];
        payload[0] = 0xAB;
        wal.log_write(page_num, 0, &payload).unwrap();

        // Simulate a reopen: a fresh in-memory pager for the same file.
        let mut fresh_pager = Pager::open(dir.path().join("db")).unwrap();
        let applied = wal.replay(&mut fresh_pager).unwrap();
        assert_eq!(applied, 1);
        let page = fresh_pager.get_page(page_num).unwrap();
        assert_eq!(page.lock().unwrap()[0], 0xAB);
    }
}
