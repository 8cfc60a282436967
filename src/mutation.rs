//! Single-cell mutation of an in-memory node. This is the only place that
//! moves bytes around inside a page buffer; the tree module drives it.

use crate::cell::Cell;
use crate::error::{Error, Result};
use crate::node::Node;

/// Inserts `cell` at ordinal `k`, shifting cells `[k, n_cells)` up by one.
///
/// `k` may equal `n_cells` (append). Fails with [`Error::CellNo`] both when
/// `k` is out of range and when the cell does not fit in the node's free
/// space — there is no dedicated "node full" error in the taxonomy, so
/// callers (the tree's split logic) treat `CellNo` from this path as the
/// full-node signal.
pub fn insert_cell(node: &mut Node, k: u16, cell: &Cell) -> Result<()> {
    if k > node.n_cells {
        return Err(Error::CellNo(k));
    }

    let cell_size = cell.size_of();
    if (cell_size as u16) + 2 > node.free_space() {
        return Err(Error::CellNo(k));
    }

    let new_cells_offset = node.cells_offset - cell_size as u16;
    cell.write(&mut node.buf[new_cells_offset as usize..]);

    let array_base = node.offset_array_entry(0) as usize;
    let entry_size = 2usize;
    let shift_from = array_base + k as usize * entry_size;
    let shift_to = array_base + (k as usize + 1) * entry_size;
    let shift_len = (node.n_cells - k) as usize * entry_size;
    node.buf.copy_within(shift_from..shift_from + shift_len, shift_to);

    crate::binary::write_u16(&mut node.buf, shift_from, new_cells_offset);

    node.cells_offset = new_cells_offset;
    node.n_cells += 1;
    node.free_offset += 2;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::NodeTag;

    #[test]
    fn append_grows_n_cells_and_shrinks_free_space() {
        let mut node = Node::init_buffer(NodeTag::TableLeaf, 2, 256);
        let cell = Cell::TableLeaf { key: 1, payload: vec![9, 9, 9] };
        let before = node.free_space();
        insert_cell(&mut node, 0, &cell).unwrap();
        assert_eq!(node.n_cells, 1);
        assert!(node.free_space() < before);
        assert_eq!(node.cell_at(0).unwrap(), cell);
    }

    #[test]
    fn insert_in_middle_shifts_offset_array() {
        let mut node = Node::init_buffer(NodeTag::TableLeaf, 2, 256);
        let a = Cell::TableLeaf { key: 1, payload: vec![1] };
        let b = Cell::TableLeaf { key: 3, payload: vec![3] };
        let c = Cell::TableLeaf { key: 2, payload: vec![2] };
        insert_cell(&mut node, 0, &a).unwrap();
        insert_cell(&mut node, 1, &b).unwrap();
        insert_cell(&mut node, 1, &c).unwrap();
        let keys: Vec<u32> = node.cells().unwrap().iter().map(|c| c.sort_key()).collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn out_of_range_ordinal_is_cellno() {
        let mut node = Node::init_buffer(NodeTag::TableLeaf, 2, 256);
        let cell = Cell::TableLeaf { key: 1, payload: vec![1] };
        assert!(matches!(insert_cell(&mut node, 5, &cell), Err(Error::CellNo(5))));
    }

    #[test]
    fn cell_too_large_is_cellno() {
        let mut node = Node::init_buffer(NodeTag::TableLeaf, 2, 32);
        let cell = Cell::TableLeaf { key: 1, payload: vec![0u8; 1000] };
        assert!(matches!(insert_cell(&mut node, 0, &cell), Err(Error::CellNo(0))));
    }
}
