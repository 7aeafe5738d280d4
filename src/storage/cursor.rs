//! Positional iterator over a table's leaves: point lookup, start of
//! table, and forward advance across the leaf sibling chain.

use crate::errors::Result;
use crate::pager::Pager;
use crate::storage::btree::{Btree, NodeMut, NodeType};

pub struct Cursor {
    pub root_page: u32,
    pub page_num: u32,
    pub cell_num: usize,
    pub end_of_table: bool,
}

impl Cursor {
    /// Positions at the first cell of the leftmost leaf.
    pub fn table_start(pager: &mut Pager, root_page: u32, row_size: usize) -> Result<Cursor> {
        let mut page_num = root_page;
        loop {
            let page = pager.get_page(page_num)?;
            let mut guard = page.lock().expect("page mutex poisoned");
            let node = NodeMut::new(&mut guard, row_size);
            match node.node_type()? {
                NodeType::Leaf => break,
                NodeType::Internal => page_num = node.child_at(0),
            }
        }
        let page = pager.get_page(page_num)?;
        let num_cells = {
            let mut guard = page.lock().expect("page mutex poisoned");
            NodeMut::new(&mut guard, row_size).num_cells()
        };
        Ok(Cursor {
            root_page,
            page_num,
            cell_num: 0,
            end_of_table: num_cells == 0,
        })
    }

    /// Positions at the first cell whose key is `>= key`, descending
    /// through internal nodes from the root.
    pub fn table_find(
        pager: &mut Pager,
        root_page: u32,
        row_size: usize,
        key: u32,
    ) -> Result<Cursor> {
        let mut bt = Btree::new(pager, row_size);
        let (page_num, cell_num) = bt.find_leaf(root_page, key)?;
        let num_cells = {
            let page = bt.pager.get_page(page_num)?;
            let mut guard = page.lock().expect("page mutex poisoned");
            NodeMut::new(&mut guard, row_size).num_cells()
        };
        Ok(Cursor {
            root_page,
            page_num,
            cell_num,
            end_of_table: cell_num >= num_cells,
        })
    }

    pub fn key(&self, pager: &mut Pager, row_size: usize) -> Result<u32> {
        let page = pager.get_page(self.page_num)?;
        let mut guard = page.lock().expect("page mutex poisoned");
        Ok(NodeMut::new(&mut guard, row_size).leaf_key(self.cell_num))
    }

    pub fn value(&self, pager: &mut Pager, row_size: usize) -> Result<Vec<u8>> {
        let page = pager.get_page(self.page_num)?;
        let mut guard = page.lock().expect("page mutex poisoned");
        Ok(NodeMut::new(&mut guard, row_size)
            .leaf_value(self.cell_num)
            .to_vec())
    }

    /// Advances to the next cell, following the leaf's `next_leaf`
    /// sibling pointer when the current leaf is exhausted.
    pub fn advance(&mut self, pager: &mut Pager, row_size: usize) -> Result<()> {
        let page = pager.get_page(self.page_num)?;
        let (num_cells, next_leaf) = {
            let mut guard = page.lock().expect("page mutex poisoned");
            let node = NodeMut::new(&mut guard, row_size);
            (node.num_cells(), node.next_leaf())
        };
        self.cell_num += 1;
        if self.cell_num >= num_cells {
            if next_leaf == 0 {
                self.end_of_table = true;
            } else {
                self.page_num = next_leaf;
                self.cell_num = 0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::Pager;

    fn new_table(pager: &mut Pager, row_size: usize) -> u32 {
        let root = pager.allocate_page().unwrap();
        let page = pager.get_page(root).unwrap();
        let mut guard = page.lock().unwrap();
        let mut node = NodeMut::new(&mut guard, row_size);
        node.initialize_leaf();
        node.set_is_root(true);
        root
    }

    #[test]
    fn scan_yields_ascending_keys_across_splits() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("db")).unwrap();
        let row_size = 200;
        let root = new_table(&mut pager, row_size);
        {
            let mut bt = Btree::new(&mut pager, row_size);
            for k in 1..=100u32 {
                bt.insert(root, k, &vec![k as u8; row_size]).unwrap();
            }
        }

        let mut cursor = Cursor::table_start(&mut pager, root, row_size).unwrap();
        let mut seen = Vec::new();
        while !cursor.end_of_table {
            seen.push(cursor.key(&mut pager, row_size).unwrap());
            cursor.advance(&mut pager, row_size).unwrap();
        }
        let expected: Vec<u32> = (1..=100).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn table_find_locates_exact_key_through_internal_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("db")).unwrap();
        let row_size = 200;
        let root = new_table(&mut pager, row_size);
        {
            let mut bt = Btree::new(&mut pager, row_size);
            for k in 1..=100u32 {
                bt.insert(root, k, &vec![k as u8; row_size]).unwrap();
            }
        }
        let cursor = Cursor::table_find(&mut pager, root, row_size, 57).unwrap();
        assert_eq!(cursor.key(&mut pager, row_size).unwrap(), 57);
    }
}
