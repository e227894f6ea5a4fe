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

// 1-D R+ tree over chromosome-scoped intervals, pointing at data blocks.
// `spec.md` §4.4, §6. Completes the `RTree`/`RVertex`/`RVertexGenerator` naming
// sketched (but left unfinished) in the teacher's `bigwig.rs`.

use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::ByteOrder;
use log::warn;

use crate::byteio::{read_u32, read_u64, write_u32, write_u64};
use crate::error::{Error, Result};

/* -------------------------------------------------------------------------- */

pub const RTREE_MAGIC: u32 = 0x2468ACE0;
const HEADER_SIZE: u64 = 48;
const NODE_HEADER_SIZE: u64 = 4;
const LEAF_SLOT_SIZE: u64 = 32;
const INTERNAL_SLOT_SIZE: u64 = 24;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug)]
pub struct RTreeHeader {
    pub magic: u32,
    pub block_size: u32,
    pub item_count: u64,
    pub start_chrom_ix: u32,
    pub start_base: u32,
    pub end_chrom_ix: u32,
    pub end_base: u32,
    pub end_data_offset: u64,
    pub items_per_slot: u32,
    pub reserved: u32,
}

impl RTreeHeader {
    pub fn read<E: ByteOrder, R: Read>(r: &mut R) -> Result<RTreeHeader> {
        let magic = read_u32::<E, R>(r)?;
        if magic != RTREE_MAGIC {
            return Err(Error::CorruptIndex("bad R+ tree magic".into()));
        }
        Ok(RTreeHeader {
            magic,
            block_size: read_u32::<E, R>(r)?,
            item_count: read_u64::<E, R>(r)?,
            start_chrom_ix: read_u32::<E, R>(r)?,
            start_base: read_u32::<E, R>(r)?,
            end_chrom_ix: read_u32::<E, R>(r)?,
            end_base: read_u32::<E, R>(r)?,
            end_data_offset: read_u64::<E, R>(r)?,
            items_per_slot: read_u32::<E, R>(r)?,
            reserved: read_u32::<E, R>(r)?,
        })
    }

    pub fn write<E: ByteOrder, W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32::<E, W>(w, self.magic)?;
        write_u32::<E, W>(w, self.block_size)?;
        write_u64::<E, W>(w, self.item_count)?;
        write_u32::<E, W>(w, self.start_chrom_ix)?;
        write_u32::<E, W>(w, self.start_base)?;
        write_u32::<E, W>(w, self.end_chrom_ix)?;
        write_u32::<E, W>(w, self.end_base)?;
        write_u64::<E, W>(w, self.end_data_offset)?;
        write_u32::<E, W>(w, self.items_per_slot)?;
        write_u32::<E, W>(w, self.reserved)?;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

/// A chromosome-scoped span; nodes hold the union of their children's spans,
/// which may cross chromosome boundaries. `spec.md` §3 (Interval), §4.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub start_chrom_ix: u32,
    pub start_base: u32,
    pub end_chrom_ix: u32,
    pub end_base: u32,
}

impl Span {
    pub fn single(chrom_ix: u32, start: u32, end: u32) -> Span {
        Span {
            start_chrom_ix: chrom_ix,
            start_base: start,
            end_chrom_ix: chrom_ix,
            end_base: end,
        }
    }

    fn union(a: &Span, b: &Span) -> Span {
        Span {
            start_chrom_ix: a.start_chrom_ix,
            start_base: a.start_base,
            end_chrom_ix: b.end_chrom_ix,
            end_base: b.end_base,
        }
    }

    /// `query` is always a single-chromosome range.
    pub fn overlaps(&self, chrom_ix: u32, start: u32, end: u32) -> bool {
        if self.end_chrom_ix < chrom_ix || self.start_chrom_ix > chrom_ix {
            return false;
        }
        let effective_start = if self.start_chrom_ix == chrom_ix { self.start_base } else { 0 };
        let effective_end = if self.end_chrom_ix == chrom_ix { self.end_base } else { u32::MAX };
        effective_start < end && effective_end > start
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct RTreeLeaf {
    pub span: Span,
    pub data_offset: u64,
    pub data_size: u64,
}

#[derive(Clone, Debug)]
enum RNodeKind {
    Leaf(Vec<RTreeLeaf>),
    Internal(Vec<(Span, usize)>),
}

impl RNodeKind {
    fn child_count(&self) -> usize {
        match self {
            RNodeKind::Leaf(v) => v.len(),
            RNodeKind::Internal(v) => v.len(),
        }
    }

    fn span(&self) -> Span {
        match self {
            RNodeKind::Leaf(v) => Span::union(&v[0].span, &v[v.len() - 1].span),
            RNodeKind::Internal(v) => Span::union(&v[0].0, &v[v.len() - 1].0),
        }
    }
}

fn node_size(kind: &RNodeKind, block_size: u32) -> u64 {
    let slot_size = match kind {
        RNodeKind::Leaf(_) => LEAF_SLOT_SIZE,
        RNodeKind::Internal(_) => INTERNAL_SLOT_SIZE,
    };
    NODE_HEADER_SIZE + block_size as u64 * slot_size
}

/* -------------------------------------------------------------------------- */

/// Cheap to clone for the same reason [`BPlusTree`](crate::bplustree::BPlusTree)
/// is: handing an independent per-thread reader a copy of already-parsed
/// metadata is cheaper than reparsing it. `spec.md` §5.
#[derive(Clone)]
pub struct RTree {
    pub header: RTreeHeader,
    arena: Vec<RNodeKind>,
    root: usize,
    write_order: Vec<usize>,
}

impl RTree {
    /// Builds a tower of levels from leaves sorted by `(chromIx, start)`,
    /// reducing adjacent groups of `block_size` via interval union.
    /// `spec.md` §4.4.
    pub fn build(leaves: Vec<RTreeLeaf>, block_size: u32, items_per_slot: u32) -> RTree {
        assert!(block_size >= 2, "RTree::build requires block_size >= 2");

        let item_count = leaves.len() as u64;
        let (start_span, end_span, end_data_offset) = if leaves.is_empty() {
            (Span::single(0, 0, 0), Span::single(0, 0, 0), 0)
        } else {
            (
                leaves[0].span,
                leaves[leaves.len() - 1].span,
                leaves.iter().map(|l| l.data_offset + l.data_size).max().unwrap(),
            )
        };

        let mut arena: Vec<RNodeKind> = Vec::new();
        let mut level: Vec<usize> = if leaves.is_empty() {
            vec![{
                arena.push(RNodeKind::Leaf(Vec::new()));
                arena.len() - 1
            }]
        } else {
            leaves
                .chunks(block_size as usize)
                .map(|chunk| {
                    arena.push(RNodeKind::Leaf(chunk.to_vec()));
                    arena.len() - 1
                })
                .collect()
        };

        while level.len() > 1 {
            let next: Vec<usize> = level
                .chunks(block_size as usize)
                .map(|chunk| {
                    let entries = chunk.iter().map(|&idx| (arena[idx].span(), idx)).collect();
                    arena.push(RNodeKind::Internal(entries));
                    arena.len() - 1
                })
                .collect();
            level = next;
        }
        let root = level[0];
        let write_order = level_order(&arena, root);

        RTree {
            header: RTreeHeader {
                magic: RTREE_MAGIC,
                block_size,
                item_count,
                start_chrom_ix: start_span.start_chrom_ix,
                start_base: start_span.start_base,
                end_chrom_ix: end_span.end_chrom_ix,
                end_base: end_span.end_base,
                end_data_offset,
                items_per_slot,
                reserved: 0,
            },
            arena,
            root,
            write_order,
        }
    }

    /// Depth of the tree from root to a leaf, inclusive. `spec.md` §8
    /// property 9 (`countLevels`).
    fn level_count(&self) -> usize {
        let mut depth = 1;
        let mut idx = self.root;
        loop {
            match &self.arena[idx] {
                RNodeKind::Leaf(_) => return depth,
                RNodeKind::Internal(children) => {
                    idx = children[0].1;
                    depth += 1;
                }
            }
        }
    }

    pub fn write<E: ByteOrder, W: Write + Seek>(&self, w: &mut W, base_offset: u64) -> Result<u64> {
        self.header.write::<E, W>(w)?;

        let body_start = base_offset + HEADER_SIZE;
        let offsets = assign_offsets(&self.arena, &self.write_order, self.header.block_size, body_start);

        for &idx in &self.write_order {
            self.write_node::<E, W>(w, idx, &offsets)?;
        }

        let last = *self.write_order.last().unwrap();
        Ok(offsets[last] + node_size(&self.arena[last], self.header.block_size))
    }

    fn write_node<E: ByteOrder, W: Write>(&self, w: &mut W, idx: usize, offsets: &[u64]) -> Result<()> {
        let block_size = self.header.block_size as usize;
        match &self.arena[idx] {
            RNodeKind::Leaf(leaves) => {
                w.write_all(&[1u8, 0u8])?;
                crate::byteio::write_u16::<E, W>(w, leaves.len() as u16)?;
                for leaf in leaves {
                    write_span::<E, W>(w, &leaf.span)?;
                    write_u64::<E, W>(w, leaf.data_offset)?;
                    write_u64::<E, W>(w, leaf.data_size)?;
                }
                let padding = block_size - leaves.len();
                w.write_all(&vec![0u8; padding * LEAF_SLOT_SIZE as usize])?;
            }
            RNodeKind::Internal(children) => {
                w.write_all(&[0u8, 0u8])?;
                crate::byteio::write_u16::<E, W>(w, children.len() as u16)?;
                for (span, child_idx) in children {
                    write_span::<E, W>(w, span)?;
                    write_u64::<E, W>(w, offsets[*child_idx])?;
                }
                let padding = block_size - children.len();
                w.write_all(&vec![0u8; padding * INTERNAL_SLOT_SIZE as usize])?;
            }
        }
        Ok(())
    }

    pub fn read<E: ByteOrder, R: Read + Seek>(r: &mut R, base_offset: u64) -> Result<RTree> {
        r.seek(SeekFrom::Start(base_offset))?;
        let header = RTreeHeader::read::<E, R>(r)?;

        let mut arena = Vec::new();
        let root = read_node::<E, R>(r, base_offset + HEADER_SIZE, header.block_size, &mut arena)?;
        let write_order = level_order(&arena, root);

        Ok(RTree {
            header,
            arena,
            root,
            write_order,
        })
    }

    /// `findOverlappingBlocks`: recursive DFS from the root, keeping children
    /// whose span intersects `query`. Overlapping leaves are tolerated and
    /// logged at debug level. `spec.md` §4.4.
    pub fn find_overlapping_blocks(&self, chrom_ix: u32, start: u32, end: u32) -> Vec<RTreeLeaf> {
        // cancel = None: `collect` can only return `Err` via a supplied callback.
        self.find_overlapping_blocks_cancellable(chrom_ix, start, end, None).unwrap()
    }

    /// Same traversal, checking `cancel` at every node visited (the
    /// recursion boundary `spec.md` §5 names as a valid place to observe
    /// cooperative cancellation). Returns `Error::Cancelled` the first time
    /// `cancel` reports true.
    pub fn find_overlapping_blocks_cancellable(
        &self,
        chrom_ix: u32,
        start: u32,
        end: u32,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<Vec<RTreeLeaf>> {
        let mut out = Vec::new();
        self.collect(self.root, chrom_ix, start, end, cancel, &mut out)?;
        out.sort_by(|a, b| (a.span.start_chrom_ix, a.span.start_base).cmp(&(b.span.start_chrom_ix, b.span.start_base)));
        warn_on_overlaps(&out);
        Ok(out)
    }

    fn collect(
        &self,
        idx: usize,
        chrom_ix: u32,
        start: u32,
        end: u32,
        cancel: Option<&dyn Fn() -> bool>,
        out: &mut Vec<RTreeLeaf>,
    ) -> Result<()> {
        if let Some(cancel) = cancel {
            if cancel() {
                return Err(Error::Cancelled);
            }
        }
        match &self.arena[idx] {
            RNodeKind::Leaf(leaves) => {
                // Children are materialized eagerly (the whole arena is
                // already in memory); no lazy I/O happens across this
                // recursion boundary. `spec.md` §4.4, §9.
                for leaf in leaves {
                    if leaf.span.overlaps(chrom_ix, start, end) {
                        out.push(leaf.clone());
                    }
                }
            }
            RNodeKind::Internal(children) => {
                for (span, child) in children {
                    if span.overlaps(chrom_ix, start, end) {
                        self.collect(*child, chrom_ix, start, end, cancel, out)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn warn_on_overlaps(leaves: &[RTreeLeaf]) {
    for w in leaves.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        if a.span.end_chrom_ix == b.span.start_chrom_ix && a.span.end_base > b.span.start_base {
            warn!("overlapping R+ tree leaves at data offsets {} and {}", a.data_offset, b.data_offset);
        }
    }
}

/* -------------------------------------------------------------------------- */

fn write_span<E: ByteOrder, W: Write>(w: &mut W, span: &Span) -> Result<()> {
    write_u32::<E, W>(w, span.start_chrom_ix)?;
    write_u32::<E, W>(w, span.start_base)?;
    write_u32::<E, W>(w, span.end_chrom_ix)?;
    write_u32::<E, W>(w, span.end_base)?;
    Ok(())
}

fn read_span<E: ByteOrder, R: Read>(r: &mut R) -> Result<Span> {
    Ok(Span {
        start_chrom_ix: read_u32::<E, R>(r)?,
        start_base: read_u32::<E, R>(r)?,
        end_chrom_ix: read_u32::<E, R>(r)?,
        end_base: read_u32::<E, R>(r)?,
    })
}

fn level_order(arena: &[RNodeKind], root: usize) -> Vec<usize> {
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(idx) = queue.pop_front() {
        order.push(idx);
        if let RNodeKind::Internal(children) = &arena[idx] {
            for (_, child) in children {
                queue.push_back(*child);
            }
        }
    }
    order
}

fn assign_offsets(arena: &[RNodeKind], write_order: &[usize], block_size: u32, body_start: u64) -> Vec<u64> {
    let mut offsets = vec![0u64; arena.len()];
    let mut cursor = body_start;
    for &idx in write_order {
        offsets[idx] = cursor;
        cursor += node_size(&arena[idx], block_size);
    }
    offsets
}

fn read_node<E: ByteOrder, R: Read + Seek>(r: &mut R, offset: u64, block_size: u32, arena: &mut Vec<RNodeKind>) -> Result<usize> {
    r.seek(SeekFrom::Start(offset))?;

    let mut header = [0u8; 4];
    r.read_exact(&mut header)?;
    let is_leaf = header[0] == 1;
    let child_count = E::read_u16(&header[2..4]) as usize;

    if is_leaf {
        let mut leaves = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let span = read_span::<E, R>(r)?;
            let data_offset = read_u64::<E, R>(r)?;
            let data_size = read_u64::<E, R>(r)?;
            leaves.push(RTreeLeaf { span, data_offset, data_size });
        }
        arena.push(RNodeKind::Leaf(leaves));
        Ok(arena.len() - 1)
    } else {
        let mut slots = Vec::with_capacity(child_count);
        for _ in 0..child_count {
            let span = read_span::<E, R>(r)?;
            let child_offset = read_u64::<E, R>(r)?;
            slots.push((span, child_offset));
        }
        let _ = block_size;
        let mut children = Vec::with_capacity(child_count);
        for (span, child_offset) in slots {
            let child_idx = read_node::<E, R>(r, child_offset, block_size, arena)?;
            children.push((span, child_idx));
        }
        arena.push(RNodeKind::Internal(children));
        Ok(arena.len() - 1)
    }
}

/* -------------------------------------------------------------------------- */
