//! A single-threaded, page-cache-backed file pager. The tree module is the
//! only caller; nothing here knows about node structure or cell layout.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::header;
use crate::layout::{DEFAULT_PAGE_SIZE, FILE_HEADER_SIZE};

pub struct Pager {
    file: File,
    page_size: u16,
    cache: HashMap<u32, Vec<u8>>,
    dirty: HashSet<u32>,
    num_pages: u32,
}

impl Pager {
    /// Opens (creating if necessary) the database file at `path`. A file
    /// shorter than the header is treated as a fresh, empty database: the
    /// caller is expected to write the header and the first root node.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Pager> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();

        let page_size = if len >= FILE_HEADER_SIZE as u64 {
            let mut pager = Pager {
                file,
                page_size: DEFAULT_PAGE_SIZE,
                cache: HashMap::new(),
                dirty: HashSet::new(),
                num_pages: 0,
            };
            let header_buf = pager.read_header_bytes()?;
            header::verify(&header_buf)?;
            let page_size = header::page_size(&header_buf);
            pager.page_size = page_size;
            pager.num_pages = (len / page_size as u64) as u32;
            return Ok(pager);
        } else {
            DEFAULT_PAGE_SIZE
        };

        debug!("opening fresh database with page size {page_size}");
        Ok(Pager {
            file,
            page_size,
            cache: HashMap::new(),
            dirty: HashSet::new(),
            num_pages: 0,
        })
    }

    fn read_header_bytes(&mut self) -> Result<[u8; FILE_HEADER_SIZE as usize]> {
        let mut buf = [0u8; FILE_HEADER_SIZE as usize];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Writes a brand-new file header and records page 1 as allocated. Must
    /// only be called once, immediately after [`Pager::open`] on an empty file.
    pub fn init_fresh(&mut self, page_size: u16) -> Result<()> {
        self.page_size = page_size;
        let header_buf = header::produce(page_size);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&header_buf)?;
        let mut page1 = vec![0u8; page_size as usize];
        page1[..FILE_HEADER_SIZE as usize].copy_from_slice(&header_buf);
        self.cache.insert(1, page1);
        self.dirty.insert(1);
        self.num_pages = 1;
        Ok(())
    }

    /// Appends a fresh, all-zero page and returns its 1-based page number.
    /// Page numbers are never reused, matching the append-only allocation
    /// policy described for the forest's shared address space.
    pub fn allocate_page(&mut self) -> Result<u32> {
        self.num_pages += 1;
        let npage = self.num_pages;
        self.cache.insert(npage, vec![0u8; self.page_size as usize]);
        self.dirty.insert(npage);
        Ok(npage)
    }

    /// Reads page `npage`, serving from cache when present.
    pub fn read_page(&mut self, npage: u32) -> Result<Vec<u8>> {
        if npage == 0 || npage > self.num_pages {
            return Err(Error::PageNo(npage));
        }
        if let Some(data) = self.cache.get(&npage) {
            return Ok(data.clone());
        }
        let mut buf = vec![0u8; self.page_size as usize];
        let offset = (npage - 1) as u64 * self.page_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        self.cache.insert(npage, buf.clone());
        Ok(buf)
    }

    /// Stores `data` as the new contents of page `npage`, marking it dirty.
    pub fn write_page(&mut self, npage: u32, data: Vec<u8>) -> Result<()> {
        if npage == 0 || npage > self.num_pages {
            return Err(Error::PageNo(npage));
        }
        self.cache.insert(npage, data);
        self.dirty.insert(npage);
        Ok(())
    }

    /// Drops a page from the cache without writing it back. The engine never
    /// reclaims page numbers, so this is purely a memory-pressure hint.
    pub fn release_page(&mut self, npage: u32) {
        if !self.dirty.contains(&npage) {
            self.cache.remove(&npage);
        }
    }

    /// Writes every dirty page back to the file.
    pub fn flush(&mut self) -> Result<()> {
        for npage in self.dirty.drain().collect::<Vec<_>>() {
            let data = self
                .cache
                .get(&npage)
                .expect("dirty page must still be cached");
            let offset = (npage - 1) as u64 * self.page_size as u64;
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.write_all(data)?;
        }
        self.file.flush()?;
        Ok(())
    }

    /// Flushes and consumes the pager.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}
