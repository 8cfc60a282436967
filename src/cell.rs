//! The four cell variants stored inside a node. Table-leaf payloads are
//! opaque byte strings to this layer; everything else is a fixed-width
//! key/child record.

use crate::binary::{get_varint32, put_varint32, read_u32, varint32_len, write_u32};
use crate::error::{Error, Result};
use crate::layout::{NodeTag, INDEX_INTERNAL_CELL_SIZE, INDEX_LEAF_CELL_SIZE, TABLE_INTERNAL_CELL_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    TableInternal { key: u32, child: u32 },
    TableLeaf { key: u32, payload: Vec<u8> },
    IndexInternal { child: u32, key_idx: u32, key_pk: u32 },
    IndexLeaf { key_idx: u32, key_pk: u32 },
}

impl Cell {
    /// The key used to order this cell within its node: the primary key for
    /// table cells, the index key for index cells.
    pub fn sort_key(&self) -> u32 {
        match self {
            Cell::TableInternal { key, .. } => *key,
            Cell::TableLeaf { key, .. } => *key,
            Cell::IndexInternal { key_idx, .. } => *key_idx,
            Cell::IndexLeaf { key_idx, .. } => *key_idx,
        }
    }

    /// The row's primary key, for index cells only.
    pub fn pk(&self) -> Option<u32> {
        match self {
            Cell::IndexInternal { key_pk, .. } => Some(*key_pk),
            Cell::IndexLeaf { key_pk, .. } => Some(*key_pk),
            _ => None,
        }
    }

    /// The child page pointer, for internal cells only.
    pub fn child(&self) -> Option<u32> {
        match self {
            Cell::TableInternal { child, .. } => Some(*child),
            Cell::IndexInternal { child, .. } => Some(*child),
            _ => None,
        }
    }

    /// Encoded size in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            Cell::TableInternal { .. } => TABLE_INTERNAL_CELL_SIZE,
            Cell::TableLeaf { key, payload } => {
                varint32_len(payload.len() as u32) + varint32_len(*key) + payload.len()
            }
            Cell::IndexInternal { .. } => INDEX_INTERNAL_CELL_SIZE,
            Cell::IndexLeaf { .. } => INDEX_LEAF_CELL_SIZE,
        }
    }

    /// Writes the encoded cell into `buf`, starting at `buf[0]`. `buf` must
    /// have at least [`Cell::size_of`] bytes available.
    pub fn write(&self, buf: &mut [u8]) {
        match self {
            Cell::TableInternal { key, child } => {
                write_u32(buf, 0, *child);
                write_u32(buf, 4, *key);
            }
            Cell::TableLeaf { key, payload } => {
                let n = put_varint32(buf, payload.len() as u32);
                let n2 = put_varint32(&mut buf[n..], *key);
                buf[n + n2..n + n2 + payload.len()].copy_from_slice(payload);
            }
            Cell::IndexInternal { child, key_idx, key_pk } => {
                write_u32(buf, 0, *child);
                write_u32(buf, 4, *key_idx);
                write_u32(buf, 8, *key_pk);
            }
            Cell::IndexLeaf { key_idx, key_pk } => {
                write_u32(buf, 0, *key_idx);
                write_u32(buf, 4, *key_pk);
            }
        }
    }

    /// Decodes a cell of the given node variant starting at `buf[0]`.
    pub fn read(buf: &[u8], tag: NodeTag) -> Result<Cell> {
        match tag {
            NodeTag::TableInternal => {
                if buf.len() < TABLE_INTERNAL_CELL_SIZE {
                    return Err(Error::Encoding("truncated table-internal cell".to_string()));
                }
                let child = read_u32(buf, 0);
                let key = read_u32(buf, 4);
                Ok(Cell::TableInternal { key, child })
            }
            NodeTag::TableLeaf => {
                let (payload_len, n) = get_varint32(buf)?;
                let (key, n2) = get_varint32(&buf[n..])?;
                let start = n + n2;
                let end = start + payload_len as usize;
                if buf.len() < end {
                    return Err(Error::Encoding("truncated table-leaf payload".to_string()));
                }
                Ok(Cell::TableLeaf {
                    key,
                    payload: buf[start..end].to_vec(),
                })
            }
            NodeTag::IndexInternal => {
                if buf.len() < INDEX_INTERNAL_CELL_SIZE {
                    return Err(Error::Encoding("truncated index-internal cell".to_string()));
                }
                let child = read_u32(buf, 0);
                let key_idx = read_u32(buf, 4);
                let key_pk = read_u32(buf, 8);
                Ok(Cell::IndexInternal { child, key_idx, key_pk })
            }
            NodeTag::IndexLeaf => {
                if buf.len() < INDEX_LEAF_CELL_SIZE {
                    return Err(Error::Encoding("truncated index-leaf cell".to_string()));
                }
                let key_idx = read_u32(buf, 0);
                let key_pk = read_u32(buf, 4);
                Ok(Cell::IndexLeaf { key_idx, key_pk })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_internal_round_trip() {
        let cell = Cell::TableInternal { key: 42, child: 7 };
        let mut buf = vec![0u8; cell.size_of()];
        cell.write(&mut buf);
        assert_eq!(Cell::read(&buf, NodeTag::TableInternal).unwrap(), cell);
    }

    #[test]
    fn table_leaf_round_trip_small_payload() {
        let cell = Cell::TableLeaf { key: 1, payload: vec![1, 2, 3] };
        let mut buf = vec![0u8; cell.size_of()];
        cell.write(&mut buf);
        assert_eq!(Cell::read(&buf, NodeTag::TableLeaf).unwrap(), cell);
    }

    #[test]
    fn table_leaf_round_trip_large_key_and_payload() {
        let cell = Cell::TableLeaf {
            key: 0xFFFF_FFFF,
            payload: vec![0xAB; 300],
        };
        let mut buf = vec![0u8; cell.size_of()];
        cell.write(&mut buf);
        assert_eq!(Cell::read(&buf, NodeTag::TableLeaf).unwrap(), cell);
    }

    #[test]
    fn index_internal_round_trip() {
        let cell = Cell::IndexInternal { child: 3, key_idx: 9, key_pk: 99 };
        let mut buf = vec![0u8; cell.size_of()];
        cell.write(&mut buf);
        assert_eq!(Cell::read(&buf, NodeTag::IndexInternal).unwrap(), cell);
    }

    #[test]
    fn index_leaf_round_trip() {
        let cell = Cell::IndexLeaf { key_idx: 5, key_pk: 55 };
        let mut buf = vec![0u8; cell.size_of()];
        cell.write(&mut buf);
        assert_eq!(Cell::read(&buf, NodeTag::IndexLeaf).unwrap(), cell);
    }
}
