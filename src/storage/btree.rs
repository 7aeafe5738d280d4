//! Byte-exact node layout and the B+ tree search/insert/split algorithm.
//!
//! A node is a page interpreted through a [`NodeMut`] view that borrows
//! the page buffer directly out of the pager's cache — there is no
//! owned copy, so writes through a `NodeMut` are writes to the cached
//! page. Leaf cell width depends on the owning table's row size, so it
//! is threaded through every leaf accessor rather than fixed at compile
//! time; internal cells are a constant 8 bytes regardless of table.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::{err, Error, Result};
use crate::pager::{Page, Pager, PAGE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    Internal,
}

// Common header: [node_type:1][is_root:1][parent:4]
const NODE_TYPE_OFFSET: usize = 0;
const IS_ROOT_OFFSET: usize = 1;
const PARENT_OFFSET: usize = 2;
const COMMON_HEADER_SIZE: usize = 6;

// Leaf header: common + [num_cells:4][next_leaf:4]
const LEAF_NUM_CELLS_OFFSET: usize = COMMON_HEADER_SIZE;
const LEAF_NEXT_LEAF_OFFSET: usize = LEAF_NUM_CELLS_OFFSET + 4;
const LEAF_HEADER_SIZE: usize = LEAF_NEXT_LEAF_OFFSET + 4;

const LEAF_KEY_SIZE: usize = 4;

// Internal header: common + [num_keys:4][right_child:4]
const INTERNAL_NUM_KEYS_OFFSET: usize = COMMON_HEADER_SIZE;
const INTERNAL_RIGHT_CHILD_OFFSET: usize = INTERNAL_NUM_KEYS_OFFSET + 4;
const INTERNAL_HEADER_SIZE: usize = INTERNAL_RIGHT_CHILD_OFFSET + 4;

const INTERNAL_CHILD_SIZE: usize = 4;
const INTERNAL_KEY_SIZE: usize = 4;
const INTERNAL_CELL_SIZE: usize = INTERNAL_CHILD_SIZE + INTERNAL_KEY_SIZE;

/// Sentinel meaning "no such page" — used for an uninitialized parent
/// pointer on the root.
pub const INVALID_PAGE_NUM: u32 = u32::MAX;

pub const fn internal_max_cells() -> usize {
    (PAGE_SIZE - INTERNAL_HEADER_SIZE) / INTERNAL_CELL_SIZE
}

pub const fn leaf_max_cells(row_size: usize) -> usize {
    (PAGE_SIZE - LEAF_HEADER_SIZE) / (LEAF_KEY_SIZE + row_size)
}

/// Borrowed, byte-exact view over a single page's node layout.
///
/// `row_size` is the owning table's row width; it only matters for
/// leaf-cell layout. Internal nodes ignore it.
pub struct NodeMut<'a> {
    data: &'a mut Page,
    row_size: usize,
}

impl<'a> NodeMut<'a> {
    pub fn new(data: &'a mut Page, row_size: usize) -> Self {
        NodeMut { data, row_size }
    }

    pub fn node_type(&self) -> Result<NodeType> {
        match self.data[NODE_TYPE_OFFSET] {
            0 => Ok(NodeType::Leaf),
            1 => Ok(NodeType::Internal),
            other => Err(err!(Codec, "invalid node type byte: {}", other)),
        }
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.data[NODE_TYPE_OFFSET] = match node_type {
            NodeType::Leaf => 0,
            NodeType::Internal => 1,
        };
    }

    pub fn is_root(&self) -> bool {
        self.data[IS_ROOT_OFFSET] == 1
    }

    pub fn set_is_root(&mut self, is_root: bool) {
        self.data[IS_ROOT_OFFSET] = is_root as u8;
    }

    pub fn parent(&self) -> u32 {
        u32::from_ne_bytes(self.data[PARENT_OFFSET..PARENT_OFFSET + 4].try_into().unwrap())
    }

    pub fn set_parent(&mut self, page_num: u32) {
        self.data[PARENT_OFFSET..PARENT_OFFSET + 4].copy_from_slice(&page_num.to_ne_bytes());
    }

    pub fn max_key(&self) -> Result<u32> {
        match self.node_type()? {
            NodeType::Leaf => {
                let n = self.num_cells();
                if n == 0 {
                    return Err(err!(Fatal, "max_key of empty leaf"));
                }
                Ok(self.leaf_key(n - 1))
            }
            NodeType::Internal => {
                let n = self.num_keys();
                if n == 0 {
                    return Err(err!(Fatal, "max_key of internal node with no keys"));
                }
                Ok(self.internal_key(n - 1))
            }
        }
    }

    // --- leaf ---

    pub fn initialize_leaf(&mut self) {
        self.set_node_type(NodeType::Leaf);
        self.set_is_root(false);
        self.set_parent(INVALID_PAGE_NUM);
        self.set_num_cells(0);
        self.set_next_leaf(0);
    }

    pub fn num_cells(&self) -> usize {
        u32::from_ne_bytes(
            self.data[LEAF_NUM_CELLS_OFFSET..LEAF_NUM_CELLS_OFFSET + 4]
                .try_into()
                .unwrap(),
        ) as usize
    }

    pub fn set_num_cells(&mut self, n: usize) {
        self.data[LEAF_NUM_CELLS_OFFSET..LEAF_NUM_CELLS_OFFSET + 4]
            .copy_from_slice(&(n as u32).to_ne_bytes());
    }

    pub fn next_leaf(&self) -> u32 {
        u32::from_ne_bytes(
            self.data[LEAF_NEXT_LEAF_OFFSET..LEAF_NEXT_LEAF_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_next_leaf(&mut self, page_num: u32) {
        self.data[LEAF_NEXT_LEAF_OFFSET..LEAF_NEXT_LEAF_OFFSET + 4]
            .copy_from_slice(&page_num.to_ne_bytes());
    }

    fn leaf_cell_size(&self) -> usize {
        LEAF_KEY_SIZE + self.row_size
    }

    fn leaf_cell_offset(&self, cell_num: usize) -> usize {
        LEAF_HEADER_SIZE + cell_num * self.leaf_cell_size()
    }

    pub fn leaf_key(&self, cell_num: usize) -> u32 {
        let off = self.leaf_cell_offset(cell_num);
        u32::from_ne_bytes(self.data[off..off + LEAF_KEY_SIZE].try_into().unwrap())
    }

    pub fn set_leaf_key(&mut self, cell_num: usize, key: u32) {
        let off = self.leaf_cell_offset(cell_num);
        self.data[off..off + LEAF_KEY_SIZE].copy_from_slice(&key.to_ne_bytes());
    }

    pub fn leaf_value(&self, cell_num: usize) -> &[u8] {
        let off = self.leaf_cell_offset(cell_num) + LEAF_KEY_SIZE;
        &self.data[off..off + self.row_size]
    }

    pub fn set_leaf_value(&mut self, cell_num: usize, row: &[u8]) {
        debug_assert_eq!(row.len(), self.row_size);
        let off = self.leaf_cell_offset(cell_num) + LEAF_KEY_SIZE;
        self.data[off..off + self.row_size].copy_from_slice(row);
    }

    pub fn set_leaf_cell(&mut self, cell_num: usize, key: u32, row: &[u8]) {
        self.set_leaf_key(cell_num, key);
        self.set_leaf_value(cell_num, row);
    }

    /// Shifts cells `[from, num_cells)` right by one to open a gap at `from`.
    pub fn shift_leaf_cells_right(&mut self, from: usize, num_cells: usize) {
        let cell_size = self.leaf_cell_size();
        for i in (from..num_cells).rev() {
            let src = self.leaf_cell_offset(i);
            let dst = self.leaf_cell_offset(i + 1);
            self.data.copy_within(src..src + cell_size, dst);
        }
    }

    /// Binary search for the smallest cell index whose key is `>= key`.
    pub fn leaf_find(&self, key: u32) -> usize {
        let mut lo = 0usize;
        let mut hi = self.num_cells();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.leaf_key(mid) >= key {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    // --- internal ---

    pub fn initialize_internal(&mut self) {
        self.set_node_type(NodeType::Internal);
        self.set_is_root(false);
        self.set_parent(INVALID_PAGE_NUM);
        self.set_num_keys(0);
        self.set_right_child(INVALID_PAGE_NUM);
    }

    pub fn num_keys(&self) -> usize {
        u32::from_ne_bytes(
            self.data[INTERNAL_NUM_KEYS_OFFSET..INTERNAL_NUM_KEYS_OFFSET + 4]
                .try_into()
                .unwrap(),
        ) as usize
    }

    pub fn set_num_keys(&mut self, n: usize) {
        self.data[INTERNAL_NUM_KEYS_OFFSET..INTERNAL_NUM_KEYS_OFFSET + 4]
            .copy_from_slice(&(n as u32).to_ne_bytes());
    }

    pub fn right_child(&self) -> u32 {
        u32::from_ne_bytes(
            self.data[INTERNAL_RIGHT_CHILD_OFFSET..INTERNAL_RIGHT_CHILD_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_right_child(&mut self, page_num: u32) {
        self.data[INTERNAL_RIGHT_CHILD_OFFSET..INTERNAL_RIGHT_CHILD_OFFSET + 4]
            .copy_from_slice(&page_num.to_ne_bytes());
    }

    fn internal_cell_offset(&self, cell_num: usize) -> usize {
        INTERNAL_HEADER_SIZE + cell_num * INTERNAL_CELL_SIZE
    }

    pub fn internal_child(&self, cell_num: usize) -> u32 {
        let off = self.internal_cell_offset(cell_num);
        u32::from_ne_bytes(self.data[off..off + 4].try_into().unwrap())
    }

    pub fn set_internal_child(&mut self, cell_num: usize, page_num: u32) {
        let off = self.internal_cell_offset(cell_num);
        self.data[off..off + 4].copy_from_slice(&page_num.to_ne_bytes());
    }

    pub fn internal_key(&self, cell_num: usize) -> u32 {
        let off = self.internal_cell_offset(cell_num) + INTERNAL_CHILD_SIZE;
        u32::from_ne_bytes(self.data[off..off + 4].try_into().unwrap())
    }

    pub fn set_internal_key(&mut self, cell_num: usize, key: u32) {
        let off = self.internal_cell_offset(cell_num) + INTERNAL_CHILD_SIZE;
        self.data[off..off + 4].copy_from_slice(&key.to_ne_bytes());
    }

    pub fn set_internal_cell(&mut self, cell_num: usize, child: u32, key: u32) {
        self.set_internal_child(cell_num, child);
        self.set_internal_key(cell_num, key);
    }

    /// Returns the index of the child to descend into for `key`: the
    /// smallest `i` with `separator[i] >= key`, or `num_keys` for the
    /// rightmost child.
    pub fn internal_find_child_index(&self, key: u32) -> usize {
        let mut lo = 0usize;
        let mut hi = self.num_keys();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.internal_key(mid) >= key {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    pub fn child_at(&self, index: usize) -> u32 {
        if index == self.num_keys() {
            self.right_child()
        } else {
            self.internal_child(index)
        }
    }

    pub fn shift_internal_cells_right(&mut self, from: usize, num_keys: usize) {
        for i in (from..num_keys).rev() {
            let src = self.internal_cell_offset(i);
            let dst = self.internal_cell_offset(i + 1);
            self.data.copy_within(src..src + INTERNAL_CELL_SIZE, dst);
        }
    }
}

fn lock_page(page: &Arc<Mutex<Page>>) -> MutexGuard<'_, Page> {
    page.lock().expect("page mutex poisoned")
}

/// Operations over a single table's B+ tree, given its fixed row size.
/// The root page number is owned by the catalog and never changes once
/// assigned: splits rewrite the root page's bytes in place rather than
/// relocating it.
pub struct Btree<'p> {
    pub pager: &'p mut Pager,
    pub row_size: usize,
}

impl<'p> Btree<'p> {
    pub fn new(pager: &'p mut Pager, row_size: usize) -> Self {
        Btree { pager, row_size }
    }

    fn node_type_of(&mut self, page_num: u32) -> Result<NodeType> {
        let page = self.pager.get_page(page_num)?;
        let mut guard = lock_page(&page);
        NodeMut::new(&mut guard, self.row_size).node_type()
    }

    fn max_key_of(&mut self, page_num: u32) -> Result<u32> {
        let page = self.pager.get_page(page_num)?;
        let mut guard = lock_page(&page);
        NodeMut::new(&mut guard, self.row_size).max_key()
    }

    /// Descends from `root_page` to the leaf that would hold `key`,
    /// returning `(leaf_page, cell_num)` where `cell_num` is the first
    /// cell with key `>= key` (possibly one past the last cell).
    pub fn find_leaf(&mut self, root_page: u32, key: u32) -> Result<(u32, usize)> {
        let mut page_num = root_page;
        loop {
            let page = self.pager.get_page(page_num)?;
            let mut guard = lock_page(&page);
            let node = NodeMut::new(&mut guard, self.row_size);
            match node.node_type()? {
                NodeType::Leaf => return Ok((page_num, node.leaf_find(key))),
                NodeType::Internal => {
                    let idx = node.internal_find_child_index(key);
                    page_num = node.child_at(idx);
                }
            }
        }
    }

    /// Inserts `(key, row)`, failing with `DuplicateKey` if the key is
    /// already present. Returns every page number whose bytes changed,
    /// in write order, so a caller layering a WAL on top knows exactly
    /// what to log.
    pub fn insert(&mut self, root_page: u32, key: u32, row: &[u8]) -> Result<Vec<u32>> {
        let (leaf_page, cell_num) = self.find_leaf(root_page, key)?;
        let mut touched = Vec::new();
        self.insert_into_leaf(leaf_page, cell_num, key, row, &mut touched)?;
        Ok(touched)
    }

    fn insert_into_leaf(
        &mut self,
        leaf_page: u32,
        cell_num: usize,
        key: u32,
        row: &[u8],
        touched: &mut Vec<u32>,
    ) -> Result<()> {
        let max_cells = leaf_max_cells(self.row_size);
        let num_cells = {
            let page = self.pager.get_page(leaf_page)?;
            let mut guard = lock_page(&page);
            NodeMut::new(&mut guard, self.row_size).num_cells()
        };

        if num_cells >= max_cells {
            return self.split_leaf_and_insert(leaf_page, cell_num, key, row, touched);
        }

        let page = self.pager.get_page(leaf_page)?;
        let mut guard = lock_page(&page);
        let mut node = NodeMut::new(&mut guard, self.row_size);
        if cell_num < num_cells && node.leaf_key(cell_num) == key {
            return Err(Error::DuplicateKey(key));
        }
        node.shift_leaf_cells_right(cell_num, num_cells);
        node.set_leaf_cell(cell_num, key, row);
        node.set_num_cells(num_cells + 1);
        touched.push(leaf_page);
        tracing::trace!(leaf_page, key, "inserted leaf cell");
        Ok(())
    }

    fn split_leaf_and_insert(
        &mut self,
        old_page: u32,
        cell_num: usize,
        key: u32,
        row: &[u8],
        touched: &mut Vec<u32>,
    ) -> Result<()> {
        let max_cells = leaf_max_cells(self.row_size);
        let total = max_cells + 1;
        let split_index = (total + 1) / 2; // ceil(total / 2): left count

        // Duplicate check against the existing cell at cell_num, if any.
        {
            let page = self.pager.get_page(old_page)?;
            let mut guard = lock_page(&page);
            let node = NodeMut::new(&mut guard, self.row_size);
            if cell_num < node.num_cells() && node.leaf_key(cell_num) == key {
                return Err(Error::DuplicateKey(key));
            }
        }

        let (old_parent, old_next_leaf) = {
            let page = self.pager.get_page(old_page)?;
            let mut guard = lock_page(&page);
            let node = NodeMut::new(&mut guard, self.row_size);
            (node.parent(), node.next_leaf())
        };

        // Gather the conceptual `total` cells (old cells plus the new
        // one) into scratch, then redistribute across old/new leaves.
        let mut keys = Vec::with_capacity(total);
        let mut values: Vec<Vec<u8>> = Vec::with_capacity(total);
        {
            let page = self.pager.get_page(old_page)?;
            let mut guard = lock_page(&page);
            let node = NodeMut::new(&mut guard, self.row_size);
            for i in 0..max_cells {
                if i == cell_num {
                    keys.push(key);
                    values.push(row.to_vec());
                }
                keys.push(node.leaf_key(i));
                values.push(node.leaf_value(i).to_vec());
            }
            if cell_num == max_cells {
                keys.push(key);
                values.push(row.to_vec());
            }
        }

        let new_page = self.pager.allocate_page()?;
        {
            let page = self.pager.get_page(old_page)?;
            let mut guard = lock_page(&page);
            let mut node = NodeMut::new(&mut guard, self.row_size);
            for i in 0..split_index {
                node.set_leaf_cell(i, keys[i], &values[i]);
            }
            node.set_num_cells(split_index);
            node.set_next_leaf(new_page);
        }
        {
            let page = self.pager.get_page(new_page)?;
            let mut guard = lock_page(&page);
            let mut node = NodeMut::new(&mut guard, self.row_size);
            node.initialize_leaf();
            node.set_parent(old_parent);
            node.set_next_leaf(old_next_leaf);
            for i in split_index..total {
                node.set_leaf_cell(i - split_index, keys[i], &values[i]);
            }
            node.set_num_cells(total - split_index);
        }
        touched.push(old_page);
        touched.push(new_page);
        tracing::debug!(old_page, new_page, split_index, "split leaf node");

        let was_root = {
            let page = self.pager.get_page(old_page)?;
            let mut guard = lock_page(&page);
            NodeMut::new(&mut guard, self.row_size).is_root()
        };
        if was_root {
            self.create_new_root(old_page, new_page, touched)
        } else {
            let old_max = self.max_key_of(old_page)?;
            self.update_separator_key(old_parent, old_page, old_max, touched)?;
            self.internal_insert(old_parent, new_page, touched)
        }
    }

    /// Splits the former root in two: the root's bytes move to a fresh
    /// left-child page, and the root page is reinitialized in place as
    /// an internal node with two children.
    fn create_new_root(
        &mut self,
        root_page: u32,
        right_child: u32,
        touched: &mut Vec<u32>,
    ) -> Result<()> {
        let left_page = self.pager.allocate_page()?;
        let root_snapshot = {
            let page = self.pager.get_page(root_page)?;
            *lock_page(&page)
        };
        {
            let page = self.pager.get_page(left_page)?;
            let mut guard = lock_page(&page);
            *guard = root_snapshot;
            let mut node = NodeMut::new(&mut guard, self.row_size);
            node.set_is_root(false);
            node.set_parent(root_page);
        }
        let left_max = self.max_key_of(left_page)?;
        {
            let page = self.pager.get_page(root_page)?;
            let mut guard = lock_page(&page);
            let mut node = NodeMut::new(&mut guard, self.row_size);
            node.initialize_internal();
            node.set_is_root(true);
            node.set_num_keys(1);
            node.set_internal_cell(0, left_page, left_max);
            node.set_right_child(right_child);
        }
        {
            let page = self.pager.get_page(right_child)?;
            let mut guard = lock_page(&page);
            NodeMut::new(&mut guard, self.row_size).set_parent(root_page);
        }
        touched.push(left_page);
        touched.push(root_page);
        touched.push(right_child);
        tracing::debug!(root_page, left_page, right_child, "created new root");
        Ok(())
    }

    fn update_separator_key(
        &mut self,
        parent: u32,
        child: u32,
        new_key: u32,
        touched: &mut Vec<u32>,
    ) -> Result<()> {
        let page = self.pager.get_page(parent)?;
        let mut guard = lock_page(&page);
        let mut node = NodeMut::new(&mut guard, self.row_size);
        let num_keys = node.num_keys();
        for i in 0..num_keys {
            if node.internal_child(i) == child {
                node.set_internal_key(i, new_key);
                touched.push(parent);
                return Ok(());
            }
        }
        // `child` is (or was) the rightmost child; no separator entry names it.
        Ok(())
    }

    fn internal_insert(
        &mut self,
        parent_page: u32,
        child_page: u32,
        touched: &mut Vec<u32>,
    ) -> Result<()> {
        let child_max = self.max_key_of(child_page)?;
        let (num_keys, right_child) = {
            let page = self.pager.get_page(parent_page)?;
            let mut guard = lock_page(&page);
            let node = NodeMut::new(&mut guard, self.row_size);
            (node.num_keys(), node.right_child())
        };
        let right_max = self.max_key_of(right_child)?;
        let insert_is_rightmost = child_max > right_max;

        if num_keys >= internal_max_cells() {
            return Err(err!(
                Fatal,
                "internal node {} would exceed {} keys; internal-node splitting is not implemented",
                parent_page,
                internal_max_cells()
            ));
        }

        {
            let page = self.pager.get_page(parent_page)?;
            let mut guard = lock_page(&page);
            let mut node = NodeMut::new(&mut guard, self.row_size);
            if insert_is_rightmost {
                node.set_internal_cell(num_keys, right_child, right_max);
                node.set_right_child(child_page);
            } else {
                let idx = node.internal_find_child_index(child_max);
                node.shift_internal_cells_right(idx, num_keys);
                node.set_internal_cell(idx, child_page, child_max);
            }
            node.set_num_keys(num_keys + 1);
        }
        touched.push(parent_page);

        let child_page_ref = self.pager.get_page(child_page)?;
        let mut guard = lock_page(&child_page_ref);
        NodeMut::new(&mut guard, self.row_size).set_parent(parent_page);
        tracing::debug!(parent_page, child_page, "inserted into internal node");
        Ok(())
    }
}
