/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

// Chromosome B+ tree: a fixed-key-size string -> (id, size) on-disk map.
// `spec.md` §4.3, §6. Generalizes the fixed-layout node decoding style of the
// teacher's `BbiDataHeader::read_buffer`/`write_buffer` (src/bbi.rs) to a real
// tree structure.

use std::io::{Read, Seek, Write};

use byteorder::ByteOrder;

use crate::byteio::{read_fixed_string, read_u32, read_u64, write_fixed_string, write_u32, write_u64};
use crate::error::{Error, Result};

/* -------------------------------------------------------------------------- */

pub const BPLUS_MAGIC: u32 = 0x78CA8C91;
const HEADER_SIZE: u64 = 32;
const NODE_HEADER_SIZE: u64 = 4;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug)]
pub struct BPlusHeader {
    pub magic: u32,
    pub block_size: u32,
    pub key_size: u32,
    pub val_size: u32,
    pub item_count: u64,
    pub reserved: u64,
}

impl BPlusHeader {
    pub fn read<E: ByteOrder, R: Read>(r: &mut R) -> Result<BPlusHeader> {
        let magic = read_u32::<E, R>(r)?;
        if magic != BPLUS_MAGIC {
            return Err(Error::CorruptIndex("bad B+ tree magic".into()));
        }
        Ok(BPlusHeader {
            magic,
            block_size: read_u32::<E, R>(r)?,
            key_size: read_u32::<E, R>(r)?,
            val_size: read_u32::<E, R>(r)?,
            item_count: read_u64::<E, R>(r)?,
            reserved: read_u64::<E, R>(r)?,
        })
    }

    pub fn write<E: ByteOrder, W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32::<E, W>(w, self.magic)?;
        write_u32::<E, W>(w, self.block_size)?;
        write_u32::<E, W>(w, self.key_size)?;
        write_u32::<E, W>(w, self.val_size)?;
        write_u64::<E, W>(w, self.item_count)?;
        write_u64::<E, W>(w, self.reserved)?;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BPlusLeaf {
    pub key: String,
    pub id: u32,
    pub size: u32,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
enum BNodeKind {
    Leaf(Vec<BPlusLeaf>),
    Internal(Vec<(String, usize)>),
}

impl BNodeKind {
    fn child_count(&self) -> usize {
        match self {
            BNodeKind::Leaf(v) => v.len(),
            BNodeKind::Internal(v) => v.len(),
        }
    }

    fn first_key(&self) -> &str {
        match self {
            BNodeKind::Leaf(v) => &v[0].key,
            BNodeKind::Internal(v) => &v[0].0,
        }
    }
}

fn node_size(kind: &BNodeKind, key_size: u32) -> u64 {
    NODE_HEADER_SIZE + kind.child_count() as u64 * (key_size as u64 + 8)
}

/// `countLevels(blockSize, itemCount) = ceil(log_blockSize(itemCount))`, with
/// the special case `countLevels(n, n) = 1`. `spec.md` §4.3, §8 property 9.
pub fn count_levels(block_size: usize, item_count: usize) -> usize {
    if item_count == 0 {
        return 1;
    }
    if item_count == block_size {
        return 1;
    }
    let mut levels = 1;
    let mut capacity = block_size;
    while capacity < item_count {
        capacity *= block_size;
        levels += 1;
    }
    levels
}

/* -------------------------------------------------------------------------- */

/// An in-memory B+ tree ready to be written, or one parsed back from a file.
/// Cheap to clone: a [`BigBedReader`](crate::BigBedReader)/[`BigWigReader`](crate::BigWigReader)
/// clones its parsed tree rather than re-reading it when handing an
/// independent view of the same file to another thread. `spec.md` §5.
#[derive(Clone)]
pub struct BPlusTree {
    pub header: BPlusHeader,
    arena: Vec<BNodeKind>,
    root: usize,
    /// Level-order (root first), top-down write sequence.
    write_order: Vec<usize>,
}

impl BPlusTree {
    /// Builds the tree bottom-up from a leaf set. `spec.md` §4.3: sort by key,
    /// group into `block_size` chunks, repeat on parent pointers until one
    /// root node remains. `block_size >= 2` is a precondition, not a runtime
    /// error: callers control this value.
    pub fn build(mut leaves: Vec<BPlusLeaf>, block_size: u32) -> BPlusTree {
        assert!(block_size >= 2, "BPlusTree::build requires block_size >= 2");

        leaves.sort_by(|a, b| a.key.cmp(&b.key));

        let key_size = leaves.iter().map(|l| l.key.len()).max().unwrap_or(0).max(1) as u32;
        let item_count = leaves.len() as u64;

        let mut arena: Vec<BNodeKind> = Vec::new();
        let mut level: Vec<usize> = leaves
            .chunks(block_size as usize)
            .map(|chunk| {
                arena.push(BNodeKind::Leaf(chunk.to_vec()));
                arena.len() - 1
            })
            .collect();

        // Degenerate case: no leaves at all still needs a (empty) root node.
        if level.is_empty() {
            arena.push(BNodeKind::Leaf(Vec::new()));
            level.push(arena.len() - 1);
        }

        while level.len() > 1 {
            let next: Vec<usize> = level
                .chunks(block_size as usize)
                .map(|chunk| {
                    let entries = chunk
                        .iter()
                        .map(|&idx| (arena[idx].first_key().to_string(), idx))
                        .collect();
                    arena.push(BNodeKind::Internal(entries));
                    arena.len() - 1
                })
                .collect();
            level = next;
        }
        let root = level[0];

        let write_order = level_order(&arena, root);

        BPlusTree {
            header: BPlusHeader {
                magic: BPLUS_MAGIC,
                block_size,
                key_size,
                val_size: 8,
                item_count,
                reserved: 0,
            },
            arena,
            root,
            write_order,
        }
    }

    /// Writes the header followed by the tree body (root immediately after
    /// the header). Returns the absolute end offset.
    pub fn write<E: ByteOrder, W: Write + Seek>(&self, w: &mut W, base_offset: u64) -> Result<u64> {
        self.header.write::<E, W>(w)?;

        let body_start = base_offset + HEADER_SIZE;
        let offsets = assign_offsets(&self.arena, &self.write_order, self.header.key_size, body_start);

        for &idx in &self.write_order {
            self.write_node(w, idx, &offsets)?;
        }

        Ok(*offsets.last().unwrap_or(&body_start) + self.arena.last().map_or(0, |n| node_size(n, self.header.key_size)))
    }

    fn write_node<E: ByteOrder, W: Write>(&self, w: &mut W, idx: usize, offsets: &[u64]) -> Result<()> {
        let key_size = self.header.key_size as usize;
        match &self.arena[idx] {
            BNodeKind::Leaf(leaves) => {
                w.write_all(&[1u8, 0u8])?;
                crate::byteio::write_u16::<E, W>(w, leaves.len() as u16)?;
                for leaf in leaves {
                    let mut key_buf = vec![0u8; key_size];
                    write_fixed_string(&mut key_buf, &leaf.key);
                    w.write_all(&key_buf)?;
                    write_u32::<E, W>(w, leaf.id)?;
                    write_u32::<E, W>(w, leaf.size)?;
                }
            }
            BNodeKind::Internal(children) => {
                w.write_all(&[0u8, 0u8])?;
                crate::byteio::write_u16::<E, W>(w, children.len() as u16)?;
                for (key, child_idx) in children {
                    let mut key_buf = vec![0u8; key_size];
                    write_fixed_string(&mut key_buf, key);
                    w.write_all(&key_buf)?;
                    write_u64::<E, W>(w, offsets[*child_idx])?;
                }
            }
        }
        Ok(())
    }

    /// Parses a tree already on disk, reading every node eagerly (trees are
    /// small: one node per `block_size` chromosomes).
    pub fn read<E: ByteOrder, R: Read + Seek>(r: &mut R, base_offset: u64) -> Result<BPlusTree> {
        use std::io::SeekFrom;
        r.seek(SeekFrom::Start(base_offset))?;
        let header = BPlusHeader::read::<E, R>(r)?;

        let mut arena = Vec::new();
        let root = read_node::<E, R>(r, base_offset + HEADER_SIZE, header.key_size, &mut arena)?;
        let write_order = level_order(&arena, root);

        Ok(BPlusTree {
            header,
            arena,
            root,
            write_order,
        })
    }

    /// `find(key)`: descend from root, following the greatest `key_i <= key`
    /// at each internal node. `spec.md` §4.3, §8 property 8.
    pub fn find(&self, key: &str) -> Option<&BPlusLeaf> {
        let mut idx = self.root;
        loop {
            match &self.arena[idx] {
                BNodeKind::Leaf(leaves) => return leaves.iter().find(|l| l.key == key),
                BNodeKind::Internal(children) => {
                    let mut chosen = children[0].1;
                    for (k, child) in children {
                        if k.as_str() <= key {
                            chosen = *child;
                        } else {
                            break;
                        }
                    }
                    idx = chosen;
                }
            }
        }
    }

    /// DFS traversal in sorted key order.
    pub fn traverse(&self) -> Vec<&BPlusLeaf> {
        let mut out = Vec::new();
        self.traverse_node(self.root, &mut out);
        out
    }

    fn traverse_node<'a>(&'a self, idx: usize, out: &mut Vec<&'a BPlusLeaf>) {
        match &self.arena[idx] {
            BNodeKind::Leaf(leaves) => out.extend(leaves.iter()),
            BNodeKind::Internal(children) => {
                for (_, child) in children {
                    self.traverse_node(*child, out);
                }
            }
        }
    }
}

/* -------------------------------------------------------------------------- */

fn level_order(arena: &[BNodeKind], root: usize) -> Vec<usize> {
    // BFS from the root gives a level-order, top-down sequence; within a
    // level, children appear in left-to-right order because each internal
    // node's child list was built left-to-right.
    let mut order = Vec::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(root);
    while let Some(idx) = queue.pop_front() {
        order.push(idx);
        if let BNodeKind::Internal(children) = &arena[idx] {
            for (_, child) in children {
                queue.push_back(*child);
            }
        }
    }
    order
}

fn assign_offsets(arena: &[BNodeKind], write_order: &[usize], key_size: u32, body_start: u64) -> Vec<u64> {
    let mut offsets = vec![0u64; arena.len()];
    let mut cursor = body_start;
    for &idx in write_order {
        offsets[idx] = cursor;
        cursor += node_size(&arena[idx], key_size);
    }
    offsets
}

fn read_node<E: ByteOrder, R: Read + Seek>(r: &mut R, offset: u64, key_size: u32, arena: &mut Vec<BNodeKind>) -> Result<usize> {
    use std::io::SeekFrom;
    r.seek(SeekFrom::Start(offset))?;

    let mut header = [0u8; 4];
    r.read_exact(&mut header)?;
    let is_leaf = header[0] == 1;
    let child_count = E::read_u16(&header[2..4]) as usize;

    if is_leaf {
        let mut leaves = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let mut key_buf = vec![0u8; key_size as usize];
            r.read_exact(&mut key_buf)?;
            let id = read_u32::<E, R>(r)?;
            let size = read_u32::<E, R>(r)?;
            leaves.push(BPlusLeaf {
                key: read_fixed_string(&key_buf),
                id,
                size,
            });
        }
        arena.push(BNodeKind::Leaf(leaves));
        Ok(arena.len() - 1)
    } else {
        let mut slots = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let mut key_buf = vec![0u8; key_size as usize];
            r.read_exact(&mut key_buf)?;
            let child_offset = read_u64::<E, R>(r)?;
            slots.push((read_fixed_string(&key_buf), child_offset));
        }
        let mut children = Vec::with_capacity(child_count);
        for (key, child_offset) in slots {
            let child_idx = read_node::<E, R>(r, child_offset, key_size, arena)?;
            children.push((key, child_idx));
        }
        arena.push(BNodeKind::Internal(children));
        Ok(arena.len() - 1)
    }
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::LittleEndian;
    use std::io::Cursor;

    fn leaves(names: &[(&str, u32, u32)]) -> Vec<BPlusLeaf> {
        names
            .iter()
            .map(|&(k, id, size)| BPlusLeaf {
                key: k.to_string(),
                id,
                size,
            })
            .collect()
    }

    #[test]
    fn count_levels_examples() {
        assert_eq!(count_levels(10, 100), 2);
        assert_eq!(count_levels(10, 90), 2);
        assert_eq!(count_levels(10, 11), 2);
        assert_eq!(count_levels(10, 10), 1);
    }

    #[test]
    fn round_trip_find_and_traverse() {
        let input = leaves(&[("chr1", 0, 1000), ("chr2", 1, 2000), ("chr3", 2, 3000), ("chrX", 3, 500)]);
        let tree = BPlusTree::build(input.clone(), 2);

        let mut buf = Vec::new();
        let mut cursor = Cursor::new(&mut buf);
        tree.write::<LittleEndian, _>(&mut cursor, 0).unwrap();

        let mut reader = Cursor::new(buf);
        let parsed = BPlusTree::read::<LittleEndian, _>(&mut reader, 0).unwrap();

        assert_eq!(parsed.traverse().len(), parsed.header.item_count as usize);
        for leaf in &input {
            let found = parsed.find(&leaf.key).expect("leaf must be found");
            assert_eq!(found.id, leaf.id);
            assert_eq!(found.size, leaf.size);
        }
        assert!(parsed.find("chrMissing").is_none());
    }

    #[test]
    fn single_block_root_is_compact() {
        let input = leaves(&[("chr1", 0, 1), ("chr2", 1, 2)]);
        let tree = BPlusTree::build(input, 16);
        assert_eq!(tree.write_order.len(), 1);
    }
}
