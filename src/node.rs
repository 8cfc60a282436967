//! In-memory view over one page's worth of bytes: the node header plus the
//! cell-offset array. `Node` owns its buffer; callers decode cells on demand
//! and hand the buffer back to the pager via [`Node::into_buf`].

use crate::binary::{read_u16, read_u32, write_u16, write_u32};
use crate::cell::Cell;
use crate::error::Result;
use crate::layout::{node_header, NodeTag, CELL_POINTER_SIZE, FILE_HEADER_SIZE};

#[derive(Debug, Clone)]
pub struct Node {
    pub tag: NodeTag,
    pub page_no: u32,
    /// Byte offset within `buf` where the node header begins: 100 on page 1,
    /// 0 on every other page.
    pub header_start: u16,
    pub free_offset: u16,
    pub n_cells: u16,
    pub cells_offset: u16,
    pub right_page: u32,
    pub buf: Vec<u8>,
}

impl Node {
    fn header_start_for(page_no: u32) -> u16 {
        if page_no == 1 {
            FILE_HEADER_SIZE
        } else {
            0
        }
    }

    /// Parses a node view out of a raw page buffer.
    pub fn parse(buf: Vec<u8>, page_no: u32) -> Result<Node> {
        let header_start = Self::header_start_for(page_no);
        let h = header_start as usize;
        let tag_byte = buf[h + node_header::TAG as usize];
        let tag = NodeTag::from_byte(tag_byte)
            .ok_or_else(|| crate::error::Error::Encoding(format!("unknown node tag {tag_byte}")))?;
        let free_offset = read_u16(&buf, h + node_header::FREE_OFFSET as usize);
        let n_cells = read_u16(&buf, h + node_header::N_CELLS as usize);
        let cells_offset = read_u16(&buf, h + node_header::CELLS_OFFSET as usize);
        let right_page = if tag.is_leaf() {
            0
        } else {
            read_u32(&buf, h + node_header::RIGHT_PAGE as usize)
        };

        Ok(Node {
            tag,
            page_no,
            header_start,
            free_offset,
            n_cells,
            cells_offset,
            right_page,
            buf,
        })
    }

    /// Builds a fresh, empty node of the given tag directly into a blank,
    /// zero-filled page buffer.
    pub fn init_buffer(tag: NodeTag, page_no: u32, page_size: u16) -> Node {
        let header_start = Self::header_start_for(page_no);
        let buf = vec![0u8; page_size as usize];
        let mut node = Node {
            tag,
            page_no,
            header_start,
            free_offset: header_start + tag.header_len(),
            n_cells: 0,
            cells_offset: page_size,
            right_page: 0,
            buf,
        };
        node.sync_header();
        node
    }

    /// Writes the in-memory header fields back into `self.buf`.
    pub fn sync_header(&mut self) {
        let h = self.header_start as usize;
        self.buf[h + node_header::TAG as usize] = self.tag.as_byte();
        self.buf[h + node_header::RESERVED as usize] = 0;
        write_u16(&mut self.buf, h + node_header::FREE_OFFSET as usize, self.free_offset);
        write_u16(&mut self.buf, h + node_header::N_CELLS as usize, self.n_cells);
        write_u16(&mut self.buf, h + node_header::CELLS_OFFSET as usize, self.cells_offset);
        if !self.tag.is_leaf() {
            write_u32(&mut self.buf, h + node_header::RIGHT_PAGE as usize, self.right_page);
        }
    }

    /// Syncs the header and hands the backing buffer to the caller (normally
    /// the pager, to be written to disk).
    pub fn into_buf(mut self) -> Vec<u8> {
        self.sync_header();
        self.buf
    }

    /// Byte offset of entry `k` in the cell-offset array.
    pub fn offset_array_entry(&self, k: u16) -> u16 {
        self.header_start + self.tag.header_len() + k * CELL_POINTER_SIZE
    }

    /// Reads the page-relative byte offset of cell `k`.
    pub fn cell_offset(&self, k: u16) -> Result<u16> {
        if k >= self.n_cells {
            return Err(crate::error::Error::CellNo(k));
        }
        Ok(read_u16(&self.buf, self.offset_array_entry(k) as usize))
    }

    /// Decodes the cell at ordinal `k`.
    pub fn cell_at(&self, k: u16) -> Result<Cell> {
        let offset = self.cell_offset(k)?;
        Cell::read(&self.buf[offset as usize..], self.tag)
    }

    /// Decodes every cell on the node, in stored (key) order.
    pub fn cells(&self) -> Result<Vec<Cell>> {
        (0..self.n_cells).map(|k| self.cell_at(k)).collect()
    }

    /// Bytes still available between the offset array's end and the
    /// lowest-addressed cell.
    pub fn free_space(&self) -> u16 {
        self.cells_offset.saturating_sub(self.free_offset)
    }
}
