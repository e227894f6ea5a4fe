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

// The façade tying every other module together: header, chromosome B+ tree,
// unzoomed R+ tree, zoom pyramid, and the ROM buffer. Generalizes the
// teacher's `BigWigReader`/`BigWigWriter` (bigwig.rs) to also cover BigBED,
// via a shared `BbiCore`/`BbiWriterCore` the way the teacher's `bwf: BbiFile`
// field was meant to be shared structure for both formats. `spec.md` §4.8.

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{debug, warn};

use crate::bed_codec::{self, BedEntry};
use crate::bplustree::{BPlusLeaf, BPlusTree};
use crate::byteio::{read_u16, read_u32, read_u64, write_u16, write_u32, write_u64, Endianness};
use crate::error::{Error, Result};
use crate::rombuffer::{BlockCompression, BufferPolicy, RomBuffer, SyncRomBuffer};
use crate::rtree::{RTree, RTreeLeaf, Span};
use crate::summary::{summarize_from_raw, summarize_from_zoom, to_sparse};
use crate::wig_codec::{self, WigSection};
use crate::zoom::{build_zoom_levels, BigSummary, SourceItem, ZoomLevel, ZoomRecord};

/* -------------------------------------------------------------------------- */

pub const BIGWIG_MAGIC: u32 = 0x888FFC26;
pub const BIGBED_MAGIC: u32 = 0x8789F2EB;

const HEADER_SIZE: u64 = 64;
const ZOOM_DESCRIPTOR_SIZE: u64 = 32;
const TOTAL_SUMMARY_SIZE: u64 = 40;
const CHROM_TREE_BLOCK_SIZE: u32 = 16;
const DEFAULT_ITEMS_PER_SLOT: u32 = 1024;
const DEFAULT_ZOOM_LEVEL_COUNT: usize = 8;
const MIN_VERSION: u16 = 1;
const MAX_VERSION: u16 = 5;
const VERSION_ZLIB: u16 = 4;
const VERSION_SNAPPY: u16 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BigFileKind {
    BigBed,
    BigWig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Snappy,
}

fn compression_for(version: u16, uncompress_buf_size: u32) -> BlockCompression {
    if uncompress_buf_size == 0 {
        BlockCompression::None
    } else if version >= VERSION_SNAPPY {
        BlockCompression::Snappy
    } else {
        BlockCompression::Zlib
    }
}

/// `uncompressBufSize > 0` is what tells a reader the data blocks are
/// compressed at all (`spec.md` §4.8); `Compression::None` must write `0`
/// regardless of the largest block size observed, or `compression_for` reads
/// the raw bytes back as zlib.
fn uncompress_buf_size_for(compression: Compression, max_uncompressed: u32) -> u32 {
    match compression {
        Compression::None => 0,
        Compression::Zlib | Compression::Snappy => max_uncompressed,
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct ChromInfo {
    pub name: String,
    pub id: u32,
    pub size: u32,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug)]
struct BigFileHeader {
    magic: u32,
    version: u16,
    zoom_level_count: u16,
    chrom_tree_offset: u64,
    unzoomed_data_offset: u64,
    unzoomed_index_offset: u64,
    field_count: u16,
    defined_field_count: u16,
    as_offset: u64,
    total_summary_offset: u64,
    uncompress_buf_size: u32,
    extended_header_offset: u64,
}

impl BigFileHeader {
    fn read<E: ByteOrder, R: Read>(r: &mut R) -> Result<BigFileHeader> {
        let magic = read_u32::<E, R>(r)?;
        let version = read_u16::<E, R>(r)?;
        if version < MIN_VERSION || version > MAX_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        Ok(BigFileHeader {
            magic,
            version,
            zoom_level_count: read_u16::<E, R>(r)?,
            chrom_tree_offset: read_u64::<E, R>(r)?,
            unzoomed_data_offset: read_u64::<E, R>(r)?,
            unzoomed_index_offset: read_u64::<E, R>(r)?,
            field_count: read_u16::<E, R>(r)?,
            defined_field_count: read_u16::<E, R>(r)?,
            as_offset: read_u64::<E, R>(r)?,
            total_summary_offset: read_u64::<E, R>(r)?,
            uncompress_buf_size: read_u32::<E, R>(r)?,
            extended_header_offset: read_u64::<E, R>(r)?,
        })
    }

    fn write<E: ByteOrder, W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32::<E, W>(w, self.magic)?;
        write_u16::<E, W>(w, self.version)?;
        write_u16::<E, W>(w, self.zoom_level_count)?;
        write_u64::<E, W>(w, self.chrom_tree_offset)?;
        write_u64::<E, W>(w, self.unzoomed_data_offset)?;
        write_u64::<E, W>(w, self.unzoomed_index_offset)?;
        write_u16::<E, W>(w, self.field_count)?;
        write_u16::<E, W>(w, self.defined_field_count)?;
        write_u64::<E, W>(w, self.as_offset)?;
        write_u64::<E, W>(w, self.total_summary_offset)?;
        write_u32::<E, W>(w, self.uncompress_buf_size)?;
        write_u64::<E, W>(w, self.extended_header_offset)?;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

/// Reads just enough of `source` to decide which of the two formats (if
/// either) it is, without committing to an endianness-specialized parse of
/// the rest of the header. `spec.md` §6 `determineFileType`.
pub fn determine_file_type<R: Read + Seek>(source: &mut R) -> Result<Option<BigFileKind>> {
    source.seek(SeekFrom::Start(0))?;
    let mut magic_buf = [0u8; 4];
    source.read_exact(&mut magic_buf)?;
    let candidate = BigEndian::read_u32(&magic_buf);

    if Endianness::detect(BIGWIG_MAGIC, candidate).is_ok() {
        return Ok(Some(BigFileKind::BigWig));
    }
    if Endianness::detect(BIGBED_MAGIC, candidate).is_ok() {
        return Ok(Some(BigFileKind::BigBed));
    }
    Ok(None)
}

/* -------------------------------------------------------------------------- */
// Shared reader plumbing.

/// How eagerly a reader parses its zoom-level R+ trees at open time.
/// `spec.md` §2, §6: "lazily load the B+ tree root and R+ tree root (or
/// eagerly prefetch, per configuration)". The chromosome B+ tree and the
/// unzoomed R+ tree are always loaded eagerly: almost every query needs them
/// immediately, so deferring them would just move the cost to the first
/// call. Only the zoom pyramid's per-level trees, which a query may never
/// touch (e.g. raw `query()` calls never consult them), are deferrable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefetchLevel {
    /// Parse every zoom level's R+ tree on first use.
    Lazy,
    /// Parse every zoom level's R+ tree at open time.
    Full,
}

impl Default for PrefetchLevel {
    fn default() -> Self {
        PrefetchLevel::Full
    }
}

/// Result of `summarize(..., index)`: dense carries one `BigSummary` per bin
/// (including empty ones), sparse carries only the non-empty `(bin_index,
/// summary)` pairs. `spec.md` §4.7, §6.
#[derive(Clone, Debug, PartialEq)]
pub enum SummaryOutput {
    Dense(Vec<BigSummary>),
    Sparse(Vec<(usize, BigSummary)>),
}

fn finish_summary(bins: Vec<BigSummary>, index: bool) -> SummaryOutput {
    if index {
        SummaryOutput::Sparse(to_sparse(bins))
    } else {
        SummaryOutput::Dense(bins)
    }
}

/// Dispatches block reads to the buffer strategy selected by a
/// [`BufferPolicy`] at open time. `spec.md` §5.
enum ReaderBuffer {
    /// No locking. Used for `SingleThreaded` and `PerThreadCopy`: the latter
    /// gets its independence from `BigBedReader::try_clone`/
    /// `BigWigReader::try_clone` cloning the file handle, not from locking.
    Owned(RefCell<RomBuffer<File>>),
    /// One shared file handle behind a mutex, for callers that want a single
    /// `BigFile` value usable from more than one place without re-opening.
    Synchronized(SyncRomBuffer<File>),
}

impl ReaderBuffer {
    fn new(file: File, policy: BufferPolicy) -> ReaderBuffer {
        match policy {
            BufferPolicy::SingleThreaded | BufferPolicy::PerThreadCopy => {
                ReaderBuffer::Owned(RefCell::new(RomBuffer::new(file)))
            }
            BufferPolicy::Synchronized => ReaderBuffer::Synchronized(SyncRomBuffer::new(file)),
        }
    }

    fn with(&self, offset: u64, size: usize, compression: BlockCompression) -> Result<Rc<Vec<u8>>> {
        match self {
            ReaderBuffer::Owned(cell) => cell.borrow_mut().with(offset, size, compression),
            ReaderBuffer::Synchronized(sync) => sync.with(offset, size, compression),
        }
    }

    fn with_file<T>(&self, f: impl FnOnce(&mut File) -> Result<T>) -> Result<T> {
        match self {
            ReaderBuffer::Owned(cell) => f(cell.borrow_mut().get_mut()),
            ReaderBuffer::Synchronized(sync) => sync.with_file(f),
        }
    }

    fn try_clone(&self, policy: BufferPolicy) -> Result<ReaderBuffer> {
        let cloned = self.with_file(|file| crate::rombuffer::per_thread_copy(file))?;
        Ok(ReaderBuffer::new(cloned.into_inner(), policy))
    }
}

struct BbiCore {
    kind: BigFileKind,
    endianness: Endianness,
    header: BigFileHeader,
    chrom_tree: BPlusTree,
    r_tree: RTree,
    zoom_levels: Vec<ZoomLevel>,
    zoom_trees: RefCell<Vec<Option<RTree>>>,
    total_summary: BigSummary,
    compression: BlockCompression,
    buffer: ReaderBuffer,
    policy: BufferPolicy,
}

impl BbiCore {
    fn open(path: &Path, expected: BigFileKind, policy: BufferPolicy, prefetch: PrefetchLevel) -> Result<BbiCore> {
        let mut file = File::open(path)?;
        let kind = determine_file_type(&mut file)?.ok_or(Error::BadSignature)?;
        if kind != expected {
            return Err(Error::BadSignature);
        }

        file.seek(SeekFrom::Start(0))?;
        let mut magic_buf = [0u8; 4];
        file.read_exact(&mut magic_buf)?;
        let candidate = BigEndian::read_u32(&magic_buf);
        let magic_be = match kind {
            BigFileKind::BigWig => BIGWIG_MAGIC,
            BigFileKind::BigBed => BIGBED_MAGIC,
        };
        let endianness = Endianness::detect(magic_be, candidate)?;

        file.seek(SeekFrom::Start(0))?;
        match endianness {
            Endianness::Big => Self::load::<BigEndian>(file, kind, endianness, policy, prefetch),
            Endianness::Little => Self::load::<LittleEndian>(file, kind, endianness, policy, prefetch),
        }
    }

    fn load<E: ByteOrder>(
        mut file: File,
        kind: BigFileKind,
        endianness: Endianness,
        policy: BufferPolicy,
        prefetch: PrefetchLevel,
    ) -> Result<BbiCore> {
        let header = BigFileHeader::read::<E, _>(&mut file)?;
        let compression = compression_for(header.version, header.uncompress_buf_size);

        file.seek(SeekFrom::Start(header.chrom_tree_offset))?;
        let chrom_tree = BPlusTree::read::<E, _>(&mut file, header.chrom_tree_offset)?;

        let r_tree = RTree::read::<E, _>(&mut file, header.unzoomed_index_offset)?;

        let mut zoom_levels = Vec::with_capacity(header.zoom_level_count as usize);
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        for _ in 0..header.zoom_level_count {
            zoom_levels.push(ZoomLevel::read::<E, _>(&mut file)?);
        }

        let zoom_trees = match prefetch {
            PrefetchLevel::Full => {
                let mut trees = Vec::with_capacity(zoom_levels.len());
                for level in &zoom_levels {
                    trees.push(Some(RTree::read::<E, _>(&mut file, level.index_offset)?));
                }
                trees
            }
            PrefetchLevel::Lazy => vec![None; zoom_levels.len()],
        };

        let total_summary = if header.total_summary_offset == 0 {
            BigSummary::empty()
        } else {
            file.seek(SeekFrom::Start(header.total_summary_offset))?;
            BigSummary::read::<E, _>(&mut file)?
        };

        Ok(BbiCore {
            kind,
            endianness,
            header,
            chrom_tree,
            r_tree,
            zoom_levels,
            zoom_trees: RefCell::new(zoom_trees),
            total_summary,
            compression,
            buffer: ReaderBuffer::new(file, policy),
            policy,
        })
    }

    fn try_clone(&self) -> Result<BbiCore> {
        Ok(BbiCore {
            kind: self.kind,
            endianness: self.endianness,
            header: self.header,
            chrom_tree: self.chrom_tree.clone(),
            r_tree: self.r_tree.clone(),
            zoom_levels: self.zoom_levels.clone(),
            zoom_trees: RefCell::new(self.zoom_trees.borrow().clone()),
            total_summary: self.total_summary,
            compression: self.compression,
            buffer: self.buffer.try_clone(self.policy)?,
            policy: self.policy,
        })
    }

    fn chrom_ix(&self, name: &str) -> Result<u32> {
        self.chrom_tree
            .find(name)
            .map(|leaf| leaf.id)
            .ok_or_else(|| Error::UnknownChromosome(name.to_string()))
    }

    fn leaves_overlapping(
        &self,
        chrom_ix: u32,
        start: u32,
        end: u32,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<Vec<RTreeLeaf>> {
        self.r_tree.find_overlapping_blocks_cancellable(chrom_ix, start, end, cancel)
    }

    fn fetch_block(&self, leaf: &RTreeLeaf) -> Result<Rc<Vec<u8>>> {
        self.buffer.with(leaf.data_offset, leaf.data_size as usize, self.compression)
    }

    /// Picks the coarsest zoom level whose reduction is `<= desired`, falling
    /// back to `None` (meaning: use the unzoomed data). `spec.md` §4.7, §8
    /// property 10.
    fn pick_zoom(&self, desired: f64) -> Option<usize> {
        crate::zoom::pick(&self.zoom_levels, desired)
    }

    /// Returns the parsed R+ tree for a zoom level, parsing and caching it on
    /// first use when the reader was opened with `PrefetchLevel::Lazy`.
    fn zoom_tree(&self, level: usize) -> Result<RTree> {
        let cached = self.zoom_trees.borrow()[level].clone();
        if let Some(tree) = cached {
            return Ok(tree);
        }
        let offset = self.zoom_levels[level].index_offset;
        let tree = self.buffer.with_file(|file| match self.endianness {
            Endianness::Big => RTree::read::<BigEndian, _>(file, offset),
            Endianness::Little => RTree::read::<LittleEndian, _>(file, offset),
        })?;
        self.zoom_trees.borrow_mut()[level] = Some(tree.clone());
        Ok(tree)
    }

    fn zoom_records_overlapping(
        &self,
        level: usize,
        chrom_ix: u32,
        start: u32,
        end: u32,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<Vec<ZoomRecord>> {
        let tree = self.zoom_tree(level)?;
        let leaves = tree.find_overlapping_blocks_cancellable(chrom_ix, start, end, cancel)?;
        let mut records = Vec::new();
        for leaf in leaves {
            if let Some(cancel) = cancel {
                if cancel() {
                    return Err(Error::Cancelled);
                }
            }
            let block = self.buffer.with(leaf.data_offset, leaf.data_size as usize, self.compression)?;
            let mut cursor = std::io::Cursor::new(block.as_slice());
            while (cursor.position() as usize) < block.len() {
                let record = match self.endianness {
                    Endianness::Big => ZoomRecord::read::<BigEndian, _>(&mut cursor)?,
                    Endianness::Little => ZoomRecord::read::<LittleEndian, _>(&mut cursor)?,
                };
                if record.chrom_ix == chrom_ix && record.start < end && record.end > start {
                    records.push(record);
                }
            }
        }
        records.sort_by_key(|r| r.start);
        Ok(records)
    }
}

/* -------------------------------------------------------------------------- */

pub struct BigBedReader {
    core: BbiCore,
}

impl BigBedReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<BigBedReader> {
        Self::open_with(path, BufferPolicy::default(), PrefetchLevel::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, policy: BufferPolicy, prefetch: PrefetchLevel) -> Result<BigBedReader> {
        Ok(BigBedReader { core: BbiCore::open(path.as_ref(), BigFileKind::BigBed, policy, prefetch)? })
    }

    /// An independent view of the same open file, for handing to another
    /// thread under `BufferPolicy::PerThreadCopy`: the OS file handle is
    /// duplicated and the already-parsed chromosome/interval trees are
    /// cloned rather than reparsed. `spec.md` §5.
    pub fn try_clone(&self) -> Result<BigBedReader> {
        Ok(BigBedReader { core: self.core.try_clone()? })
    }

    /// Queries over a chromosome absent from the file's B+ tree return an
    /// empty result rather than an error. `spec.md` §7 `Policy`, §8 S6.
    pub fn query(&self, chrom: &str, start: u32, end: u32, overlaps: bool) -> Result<Vec<BedEntry>> {
        self.query_cancellable(chrom, start, end, overlaps, None)
    }

    /// Same as [`BigBedReader::query`], checking `cancel` at every R+ tree
    /// recursion boundary. `spec.md` §5.
    pub fn query_cancellable(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        overlaps: bool,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<Vec<BedEntry>> {
        let chrom_ix = match self.core.chrom_ix(chrom) {
            Ok(ix) => ix,
            Err(Error::UnknownChromosome(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let leaves = self.core.leaves_overlapping(chrom_ix, start, end, cancel)?;
        let mut out = Vec::new();
        for leaf in leaves {
            let block = self.core.fetch_block(&leaf)?;
            let entries = match self.core.endianness {
                Endianness::Big => bed_codec::decode_block::<BigEndian>(&block)?,
                Endianness::Little => bed_codec::decode_block::<LittleEndian>(&block)?,
            };
            let filtered = if overlaps {
                bed_codec::filter_overlap(entries, chrom_ix, start, end)
            } else {
                bed_codec::filter_containment(entries, chrom_ix, start, end)
            };
            out.extend(filtered);
        }
        out.sort_by_key(|e| e.start);
        Ok(out)
    }

    pub fn summarize(&self, chrom: &str, start: u32, end: u32, num_bins: u32) -> Result<Vec<BigSummary>> {
        match self.summarize_cancellable(chrom, start, end, num_bins, false, None)? {
            SummaryOutput::Dense(bins) => Ok(bins),
            SummaryOutput::Sparse(_) => unreachable!("index=false always yields Dense"),
        }
    }

    /// `summarize(chrom, start, end, numBins, index, cancel)`: picks the
    /// coarsest zoom level whose reduction is `<= (end-start)/(2*numBins)`,
    /// falling back to the raw data; `index=true` returns only non-empty
    /// bins paired with their position. `spec.md` §4.7, §6.
    pub fn summarize_cancellable(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        num_bins: u32,
        index: bool,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<SummaryOutput> {
        let chrom_ix = match self.core.chrom_ix(chrom) {
            Ok(ix) => ix,
            Err(Error::UnknownChromosome(_)) => {
                return Ok(finish_summary(summarize_from_raw(&[], start, end, num_bins), index))
            }
            Err(err) => return Err(err),
        };
        let desired = (end - start) as f64 / (2.0 * num_bins as f64);

        if let Some(level) = self.core.pick_zoom(desired) {
            let records = self.core.zoom_records_overlapping(level, chrom_ix, start, end, cancel)?;
            return Ok(finish_summary(summarize_from_zoom(&records, start, end, num_bins), index));
        }

        let entries = self.query_cancellable(chrom, start, end, true, cancel)?;
        let items: Vec<(u32, u32, f64)> = entries.iter().map(|e| (e.start, e.end, 1.0)).collect();
        Ok(finish_summary(summarize_from_raw(&items, start, end, num_bins), index))
    }

    pub fn total_summary(&self) -> BigSummary {
        self.core.total_summary
    }

    pub fn chroms(&self) -> Vec<&BPlusLeaf> {
        self.core.chrom_tree.traverse()
    }

    pub fn close(self) {}
}

/* -------------------------------------------------------------------------- */

pub struct BigWigReader {
    core: BbiCore,
}

impl BigWigReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<BigWigReader> {
        Self::open_with(path, BufferPolicy::default(), PrefetchLevel::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, policy: BufferPolicy, prefetch: PrefetchLevel) -> Result<BigWigReader> {
        Ok(BigWigReader { core: BbiCore::open(path.as_ref(), BigFileKind::BigWig, policy, prefetch)? })
    }

    /// An independent view of the same open file, for handing to another
    /// thread under `BufferPolicy::PerThreadCopy`: the OS file handle is
    /// duplicated and the already-parsed chromosome/interval trees are
    /// cloned rather than reparsed. `spec.md` §5.
    pub fn try_clone(&self) -> Result<BigWigReader> {
        Ok(BigWigReader { core: self.core.try_clone()? })
    }

    /// Queries over a chromosome absent from the file's B+ tree return an
    /// empty result rather than an error. `spec.md` §7 `Policy`, §8 S6.
    pub fn query(&self, chrom: &str, start: u32, end: u32, overlaps: bool) -> Result<Vec<(u32, u32, f32)>> {
        self.query_cancellable(chrom, start, end, overlaps, None)
    }

    /// Same as [`BigWigReader::query`], checking `cancel` at every R+ tree
    /// recursion boundary. `spec.md` §5.
    pub fn query_cancellable(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        overlaps: bool,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<Vec<(u32, u32, f32)>> {
        let chrom_ix = match self.core.chrom_ix(chrom) {
            Ok(ix) => ix,
            Err(Error::UnknownChromosome(_)) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let leaves = self.core.leaves_overlapping(chrom_ix, start, end, cancel)?;
        let mut out = Vec::new();
        for leaf in leaves {
            let block = self.core.fetch_block(&leaf)?;
            let section = match self.core.endianness {
                Endianness::Big => wig_codec::decode_block::<BigEndian>(&block)?,
                Endianness::Little => wig_codec::decode_block::<LittleEndian>(&block)?,
            };
            out.extend(wig_codec::query(&section, chrom_ix, start, end, overlaps));
        }
        out.sort_by_key(|(s, _, _)| *s);
        Ok(out)
    }

    pub fn summarize(&self, chrom: &str, start: u32, end: u32, num_bins: u32) -> Result<Vec<BigSummary>> {
        match self.summarize_cancellable(chrom, start, end, num_bins, false, None)? {
            SummaryOutput::Dense(bins) => Ok(bins),
            SummaryOutput::Sparse(_) => unreachable!("index=false always yields Dense"),
        }
    }

    /// `summarize(chrom, start, end, numBins, index, cancel)`: picks the
    /// coarsest zoom level whose reduction is `<= (end-start)/(2*numBins)`,
    /// falling back to the raw data; `index=true` returns only non-empty
    /// bins paired with their position. `spec.md` §4.7, §6.
    pub fn summarize_cancellable(
        &self,
        chrom: &str,
        start: u32,
        end: u32,
        num_bins: u32,
        index: bool,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<SummaryOutput> {
        let chrom_ix = match self.core.chrom_ix(chrom) {
            Ok(ix) => ix,
            Err(Error::UnknownChromosome(_)) => {
                return Ok(finish_summary(summarize_from_raw(&[], start, end, num_bins), index))
            }
            Err(err) => return Err(err),
        };
        let desired = (end - start) as f64 / (2.0 * num_bins as f64);

        if let Some(level) = self.core.pick_zoom(desired) {
            let records = self.core.zoom_records_overlapping(level, chrom_ix, start, end, cancel)?;
            return Ok(finish_summary(summarize_from_zoom(&records, start, end, num_bins), index));
        }

        let hits = self.query_cancellable(chrom, start, end, true, cancel)?;
        let items: Vec<(u32, u32, f64)> = hits.iter().map(|(s, e, v)| (*s, *e, *v as f64)).collect();
        Ok(finish_summary(summarize_from_raw(&items, start, end, num_bins), index))
    }

    pub fn total_summary(&self) -> BigSummary {
        self.core.total_summary
    }

    pub fn chroms(&self) -> Vec<&BPlusLeaf> {
        self.core.chrom_tree.traverse()
    }

    pub fn close(self) {}
}

/* -------------------------------------------------------------------------- */
// Writer: the INIT -> ... -> CLOSED state machine from `spec.md` §4.8. Built
// against an in-memory component model (all tree/zoom state is computed
// before any byte beyond the header stub is written), which keeps the same
// linear transition order without needing a second open-for-append pass for
// zooming/totalling. See DESIGN.md.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriterState {
    Init,
    HeaderReserved,
    ChromTreeWritten,
    DataStreamed,
    IndexWritten,
    HeaderPatched,
    Zoomed,
    Summarized,
    Closed,
}

impl WriterState {
    fn assert_next(self, expected: WriterState) {
        debug_assert_eq!(self, expected, "bigfile writer state machine transitioned out of order");
    }
}

pub struct WriteOptions {
    pub items_per_slot: u32,
    pub zoom_level_count: usize,
    pub compression: Compression,
    pub endianness: Endianness,
}

impl Default for WriteOptions {
    fn default() -> WriteOptions {
        WriteOptions {
            items_per_slot: DEFAULT_ITEMS_PER_SLOT,
            zoom_level_count: DEFAULT_ZOOM_LEVEL_COUNT,
            compression: Compression::Snappy,
            endianness: Endianness::Little,
        }
    }
}

fn block_compression_of(c: Compression) -> BlockCompression {
    match c {
        Compression::None => BlockCompression::None,
        Compression::Zlib => BlockCompression::Zlib,
        Compression::Snappy => BlockCompression::Snappy,
    }
}

fn version_for(c: Compression) -> u16 {
    match c {
        Compression::None => VERSION_ZLIB,
        Compression::Zlib => VERSION_ZLIB,
        Compression::Snappy => VERSION_SNAPPY,
    }
}

fn compress_block(data: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => crate::rombuffer::compress_zlib(data),
        Compression::Snappy => crate::rombuffer::compress_snappy(data),
    }
}

/// `spec.md` §4.3: "if the leaf set fits in a single block, use `blockSize =
/// leafCount`" — below the usual fan-out the whole chromosome list collapses
/// into one block, and `blockSize` should say so rather than report a fan-out
/// no level of the tree actually uses.
fn build_chrom_tree(chroms: &[ChromInfo]) -> BPlusTree {
    let leaves: Vec<BPlusLeaf> = chroms
        .iter()
        .map(|c| BPlusLeaf { key: c.name.clone(), id: c.id, size: c.size })
        .collect();
    let block_size = if leaves.len() as u32 <= CHROM_TREE_BLOCK_SIZE {
        leaves.len().max(1) as u32
    } else {
        CHROM_TREE_BLOCK_SIZE
    };
    BPlusTree::build(leaves, block_size)
}

/// Streams `blocks` (each already-encoded, uncompressed bytes for one data
/// block sharing a chromIx) to `file`, compressing each and recording an
/// `RTreeLeaf`. Returns the leaves plus the largest uncompressed block size
/// seen (for the header's `uncompressBufSize`).
fn stream_blocks<W: Write + Seek>(
    w: &mut W,
    blocks: Vec<(Span, Vec<u8>)>,
    compression: Compression,
    cancel: Option<&dyn Fn() -> bool>,
) -> Result<(Vec<RTreeLeaf>, u32)> {
    let mut leaves = Vec::with_capacity(blocks.len());
    let mut max_uncompressed = 0u32;

    for (span, raw) in blocks {
        if let Some(cancel) = cancel {
            if cancel() {
                return Err(Error::Cancelled);
            }
        }
        max_uncompressed = max_uncompressed.max(raw.len() as u32);
        let compressed = compress_block(&raw, compression)?;
        let offset = w.stream_position()?;
        w.write_all(&compressed)?;
        leaves.push(RTreeLeaf { span, data_offset: offset, data_size: compressed.len() as u64 });
    }

    Ok((leaves, max_uncompressed))
}

fn write_zoom_pyramid<W: Write + Seek>(
    w: &mut W,
    items: &[SourceItem],
    options: &WriteOptions,
) -> Result<Vec<ZoomLevel>> {
    let built = build_zoom_levels(items, options.zoom_level_count);
    let mut levels = Vec::with_capacity(built.len());

    for (reduction, records) in built {
        let mut leaves = Vec::new();
        let mut data_offset = None;
        for same_chrom in chrom_runs(&records, |r| r.chrom_ix) {
            for chunk in same_chrom.chunks(options.items_per_slot as usize) {
                let mut raw = Vec::new();
                for record in chunk {
                    match options.endianness {
                        Endianness::Big => record.write::<BigEndian, _>(&mut raw)?,
                        Endianness::Little => record.write::<LittleEndian, _>(&mut raw)?,
                    }
                }
                let compressed = compress_block(&raw, options.compression)?;
                let offset = w.stream_position()?;
                data_offset.get_or_insert(offset);
                w.write_all(&compressed)?;
                let span = Span {
                    start_chrom_ix: chunk[0].chrom_ix,
                    start_base: chunk[0].start,
                    end_chrom_ix: chunk[chunk.len() - 1].chrom_ix,
                    end_base: chunk[chunk.len() - 1].end,
                };
                leaves.push(RTreeLeaf { span, data_offset: offset, data_size: compressed.len() as u64 });
            }
        }

        let index_offset = w.stream_position()?;
        let tree = RTree::build(leaves, 4, options.items_per_slot);
        match options.endianness {
            Endianness::Big => tree.write::<BigEndian, _>(w, index_offset)?,
            Endianness::Little => tree.write::<LittleEndian, _>(w, index_offset)?,
        };

        levels.push(ZoomLevel { reduction, data_offset: data_offset.unwrap_or(index_offset), index_offset });
    }

    Ok(levels)
}

fn write_header<W: Write>(header: &BigFileHeader, w: &mut W, endianness: Endianness) -> Result<()> {
    match endianness {
        Endianness::Big => header.write::<BigEndian, _>(w),
        Endianness::Little => header.write::<LittleEndian, _>(w),
    }
}

fn write_header_and_layout<W: Write + Seek>(
    w: &mut W,
    magic: u32,
    version: u16,
    zoom_level_count: usize,
    endianness: Endianness,
) -> Result<u64> {
    w.seek(SeekFrom::Start(0))?;
    let stub = BigFileHeader {
        magic,
        version,
        zoom_level_count: zoom_level_count as u16,
        chrom_tree_offset: 0,
        unzoomed_data_offset: 0,
        unzoomed_index_offset: 0,
        field_count: 3,
        defined_field_count: 3,
        as_offset: 0,
        total_summary_offset: 0,
        uncompress_buf_size: 0,
        extended_header_offset: 0,
    };
    write_header(&stub, w, endianness)?;
    // Reserve zoom descriptor slots; patched once reduction/offset pairs are known.
    for _ in 0..zoom_level_count {
        w.write_all(&[0u8; ZOOM_DESCRIPTOR_SIZE as usize])?;
    }
    Ok(HEADER_SIZE + zoom_level_count as u64 * ZOOM_DESCRIPTOR_SIZE)
}

/* -------------------------------------------------------------------------- */

pub struct BigBedWriter {
    file: File,
    state: WriterState,
    options: WriteOptions,
    chroms: Vec<ChromInfo>,
    items: Vec<BedEntry>,
}

impl BigBedWriter {
    pub fn create<P: AsRef<Path>>(path: P, chroms: Vec<ChromInfo>, options: WriteOptions) -> Result<BigBedWriter> {
        let file = OpenOptions::new().create(true).write(true).truncate(true).read(true).open(path)?;
        Ok(BigBedWriter { file, state: WriterState::Init, options, chroms, items: Vec::new() })
    }

    /// Accepts entries that must already be sorted by `(chrom, start)`
    /// (the writer never sorts on the caller's behalf). `spec.md` §4.8,
    /// §7 `WriteOrderingViolation`.
    pub fn write(&mut self, entries: Vec<BedEntry>) -> Result<()> {
        for pair in entries.windows(2) {
            if (pair[0].chrom_ix, pair[0].start) > (pair[1].chrom_ix, pair[1].start) {
                return Err(Error::WriteOrderingViolation(format!(
                    "entry at chromIx {} start {} follows a later-sorted entry",
                    pair[1].chrom_ix, pair[1].start
                )));
            }
        }
        self.items.extend(entries);
        Ok(())
    }

    /// Resolves `(chrom name, start, end, rest)` tuples against the writer's
    /// chromosome list, logs and silently drops any entry naming a
    /// chromosome absent from it, then writes the rest. `spec.md` §7 Policy
    /// for `UnknownChromosome` on the write path: "logged and silently
    /// dropped, not fatal."
    pub fn write_named(&mut self, entries: Vec<(String, u32, u32, String)>) -> Result<()> {
        let mut resolved = Vec::with_capacity(entries.len());
        for (name, start, end, rest) in entries {
            match self.chroms.iter().find(|c| c.name == name) {
                Some(chrom) => resolved.push(BedEntry::new(chrom.id, start, end, rest)),
                None => warn!("dropping entry for unknown chromosome {}", name),
            }
        }
        self.write(resolved)
    }

    pub fn close(mut self, cancel: Option<&dyn Fn() -> bool>) -> Result<()> {
        self.state.assert_next(WriterState::Init);
        self.state = WriterState::HeaderReserved;

        let version = version_for(self.options.compression);
        write_header_and_layout(&mut self.file, BIGBED_MAGIC, version, self.options.zoom_level_count, self.options.endianness)?;

        self.state.assert_next(WriterState::HeaderReserved);
        self.state = WriterState::ChromTreeWritten;

        let chrom_tree_offset = self.file.stream_position()?;
        let chrom_tree = build_chrom_tree(&self.chroms);
        match self.options.endianness {
            Endianness::Big => chrom_tree.write::<BigEndian, _>(&mut self.file, chrom_tree_offset)?,
            Endianness::Little => chrom_tree.write::<LittleEndian, _>(&mut self.file, chrom_tree_offset)?,
        };

        self.state.assert_next(WriterState::ChromTreeWritten);
        self.state = WriterState::DataStreamed;

        let unzoomed_data_offset = self.file.stream_position()?;
        let blocks = group_bed_into_blocks(&self.items, self.options.items_per_slot, self.options.endianness);
        let (leaves, max_uncompressed) = stream_blocks(&mut self.file, blocks, self.options.compression, cancel)?;

        self.state.assert_next(WriterState::DataStreamed);
        self.state = WriterState::IndexWritten;

        let unzoomed_index_offset = self.file.stream_position()?;
        let r_tree = RTree::build(leaves, 4, self.options.items_per_slot);
        match self.options.endianness {
            Endianness::Big => r_tree.write::<BigEndian, _>(&mut self.file, unzoomed_index_offset)?,
            Endianness::Little => r_tree.write::<LittleEndian, _>(&mut self.file, unzoomed_index_offset)?,
        };

        self.state.assert_next(WriterState::IndexWritten);
        self.state = WriterState::HeaderPatched;

        let header = BigFileHeader {
            magic: BIGBED_MAGIC,
            version,
            zoom_level_count: 0,
            chrom_tree_offset,
            unzoomed_data_offset,
            unzoomed_index_offset,
            field_count: 3,
            defined_field_count: 3,
            as_offset: 0,
            total_summary_offset: 0,
            uncompress_buf_size: uncompress_buf_size_for(self.options.compression, max_uncompressed),
            extended_header_offset: 0,
        };
        self.file.seek(SeekFrom::Start(0))?;
        write_header(&header, &mut self.file, self.options.endianness)?;

        self.state.assert_next(WriterState::HeaderPatched);
        self.state = WriterState::Zoomed;

        self.file.seek(SeekFrom::End(0))?;
        let source: Vec<SourceItem> =
            self.items.iter().map(|e| SourceItem { chrom_ix: e.chrom_ix, start: e.start, end: e.end, value: 1.0 }).collect();
        let zoom_levels = write_zoom_pyramid(&mut self.file, &source, &self.options)?;

        self.state.assert_next(WriterState::Zoomed);
        self.state = WriterState::Summarized;

        let mut total = BigSummary::empty();
        for item in &source {
            total.update(item.value, (item.end - item.start) as f64);
        }
        let total_summary_offset = self.file.stream_position()?;
        match self.options.endianness {
            Endianness::Big => total.write::<BigEndian, _>(&mut self.file)?,
            Endianness::Little => total.write::<LittleEndian, _>(&mut self.file)?,
        };

        let mut final_header = header;
        final_header.zoom_level_count = zoom_levels.len() as u16;
        final_header.total_summary_offset = total_summary_offset;
        self.file.seek(SeekFrom::Start(0))?;
        write_header(&final_header, &mut self.file, self.options.endianness)?;
        for level in &zoom_levels {
            match self.options.endianness {
                Endianness::Big => level.write::<BigEndian, _>(&mut self.file)?,
                Endianness::Little => level.write::<LittleEndian, _>(&mut self.file)?,
            };
        }

        self.state.assert_next(WriterState::Summarized);
        self.state = WriterState::Closed;

        debug!("wrote bigBed file: {} items, {} zoom levels", self.items.len(), zoom_levels.len());
        Ok(())
    }
}

/// Slots `items` into blocks of at most `items_per_slot` entries, additionally
/// breaking a chunk wherever `chrom_ix` changes so that every block's entries
/// share one chromosome (`spec.md` §4.5: "All entries in a block share the
/// same chromIx (asserted)").
fn group_bed_into_blocks(items: &[BedEntry], items_per_slot: u32, endianness: Endianness) -> Vec<(Span, Vec<u8>)> {
    let mut blocks = Vec::new();
    for same_chrom in chrom_runs(items, |e| e.chrom_ix) {
        for chunk in same_chrom.chunks(items_per_slot.max(1) as usize) {
            if chunk.is_empty() {
                continue;
            }
            let span = Span {
                start_chrom_ix: chunk[0].chrom_ix,
                start_base: chunk[0].start,
                end_chrom_ix: chunk[chunk.len() - 1].chrom_ix,
                end_base: chunk[chunk.len() - 1].end,
            };
            let mut raw = Vec::new();
            match endianness {
                Endianness::Big => bed_codec::encode_block::<BigEndian, _>(&mut raw, chunk),
                Endianness::Little => bed_codec::encode_block::<LittleEndian, _>(&mut raw, chunk),
            }
            .expect("in-memory write cannot fail");
            blocks.push((span, raw));
        }
    }
    blocks
}

/// Splits a `chrom_ix`-sorted slice into maximal runs sharing one `chrom_ix`,
/// preserving order. Shared by the data-block and zoom-slot chunkers so
/// neither ever packs two chromosomes into one slot.
fn chrom_runs<T>(items: &[T], chrom_ix: impl Fn(&T) -> u32) -> Vec<&[T]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..items.len() {
        if chrom_ix(&items[i]) != chrom_ix(&items[start]) {
            runs.push(&items[start..i]);
            start = i;
        }
    }
    if start < items.len() {
        runs.push(&items[start..]);
    }
    runs
}

/* -------------------------------------------------------------------------- */

pub struct BigWigWriter {
    file: File,
    state: WriterState,
    options: WriteOptions,
    chroms: Vec<ChromInfo>,
    sections: Vec<WigSection>,
}

impl BigWigWriter {
    pub fn create<P: AsRef<Path>>(path: P, chroms: Vec<ChromInfo>, options: WriteOptions) -> Result<BigWigWriter> {
        let file = OpenOptions::new().create(true).write(true).truncate(true).read(true).open(path)?;
        Ok(BigWigWriter { file, state: WriterState::Init, options, chroms, sections: Vec::new() })
    }

    pub fn write(&mut self, sections: Vec<WigSection>) -> Result<()> {
        for section in &sections {
            if matches!(section, WigSection::BedGraph { .. }) {
                return Err(Error::UnsupportedSection);
            }
        }
        self.sections.extend(sections);
        Ok(())
    }

    /// Resolves each section's chromosome name against the writer's
    /// chromosome list, logs and silently drops any section naming a
    /// chromosome absent from it, then writes the rest. `spec.md` §7 Policy
    /// for `UnknownChromosome` on the write path.
    pub fn write_named(&mut self, sections: Vec<(String, WigSection)>) -> Result<()> {
        let mut resolved = Vec::with_capacity(sections.len());
        for (name, section) in sections {
            match self.chroms.iter().find(|c| c.name == name) {
                Some(chrom) => resolved.push(section.with_chrom_ix(chrom.id)),
                None => warn!("dropping section for unknown chromosome {}", name),
            }
        }
        self.write(resolved)
    }

    pub fn close(mut self, cancel: Option<&dyn Fn() -> bool>) -> Result<()> {
        self.state.assert_next(WriterState::Init);
        self.state = WriterState::HeaderReserved;

        let version = version_for(self.options.compression);
        write_header_and_layout(&mut self.file, BIGWIG_MAGIC, version, self.options.zoom_level_count, self.options.endianness)?;

        self.state.assert_next(WriterState::HeaderReserved);
        self.state = WriterState::ChromTreeWritten;

        let chrom_tree_offset = self.file.stream_position()?;
        let chrom_tree = build_chrom_tree(&self.chroms);
        match self.options.endianness {
            Endianness::Big => chrom_tree.write::<BigEndian, _>(&mut self.file, chrom_tree_offset)?,
            Endianness::Little => chrom_tree.write::<LittleEndian, _>(&mut self.file, chrom_tree_offset)?,
        };

        self.state.assert_next(WriterState::ChromTreeWritten);
        self.state = WriterState::DataStreamed;

        let unzoomed_data_offset = self.file.stream_position()?;
        let endianness = self.options.endianness;
        let blocks: Vec<(Span, Vec<u8>)> = self
            .sections
            .iter()
            .map(|section| {
                let intervals = section.intervals();
                let span = Span {
                    start_chrom_ix: section.chrom_ix(),
                    start_base: intervals.first().map(|(s, _, _)| *s).unwrap_or(0),
                    end_chrom_ix: section.chrom_ix(),
                    end_base: intervals.last().map(|(_, e, _)| *e).unwrap_or(0),
                };
                let mut raw = Vec::new();
                match endianness {
                    Endianness::Big => wig_codec::encode_block::<BigEndian, _>(&mut raw, section),
                    Endianness::Little => wig_codec::encode_block::<LittleEndian, _>(&mut raw, section),
                }
                .expect("writer already rejected bedGraph");
                (span, raw)
            })
            .collect();
        let (leaves, max_uncompressed) = stream_blocks(&mut self.file, blocks, self.options.compression, cancel)?;

        self.state.assert_next(WriterState::DataStreamed);
        self.state = WriterState::IndexWritten;

        let unzoomed_index_offset = self.file.stream_position()?;
        let r_tree = RTree::build(leaves, 4, self.options.items_per_slot);
        match self.options.endianness {
            Endianness::Big => r_tree.write::<BigEndian, _>(&mut self.file, unzoomed_index_offset)?,
            Endianness::Little => r_tree.write::<LittleEndian, _>(&mut self.file, unzoomed_index_offset)?,
        };

        self.state.assert_next(WriterState::IndexWritten);
        self.state = WriterState::HeaderPatched;

        let header = BigFileHeader {
            magic: BIGWIG_MAGIC,
            version,
            zoom_level_count: 0,
            chrom_tree_offset,
            unzoomed_data_offset,
            unzoomed_index_offset,
            field_count: 0,
            defined_field_count: 0,
            as_offset: 0,
            total_summary_offset: 0,
            uncompress_buf_size: uncompress_buf_size_for(self.options.compression, max_uncompressed),
            extended_header_offset: 0,
        };
        self.file.seek(SeekFrom::Start(0))?;
        write_header(&header, &mut self.file, self.options.endianness)?;

        self.state.assert_next(WriterState::HeaderPatched);
        self.state = WriterState::Zoomed;

        self.file.seek(SeekFrom::End(0))?;
        let source: Vec<SourceItem> = self
            .sections
            .iter()
            .flat_map(|s| s.intervals().into_iter().map(|(start, end, value)| SourceItem { chrom_ix: s.chrom_ix(), start, end, value: value as f64 }))
            .collect();
        let zoom_levels = write_zoom_pyramid(&mut self.file, &source, &self.options)?;

        self.state.assert_next(WriterState::Zoomed);
        self.state = WriterState::Summarized;

        let mut total = BigSummary::empty();
        for item in &source {
            total.update(item.value, (item.end - item.start) as f64);
        }
        let total_summary_offset = self.file.stream_position()?;
        match self.options.endianness {
            Endianness::Big => total.write::<BigEndian, _>(&mut self.file)?,
            Endianness::Little => total.write::<LittleEndian, _>(&mut self.file)?,
        };

        let mut final_header = header;
        final_header.zoom_level_count = zoom_levels.len() as u16;
        final_header.total_summary_offset = total_summary_offset;
        self.file.seek(SeekFrom::Start(0))?;
        write_header(&final_header, &mut self.file, self.options.endianness)?;
        for level in &zoom_levels {
            match self.options.endianness {
                Endianness::Big => level.write::<BigEndian, _>(&mut self.file)?,
                Endianness::Little => level.write::<LittleEndian, _>(&mut self.file)?,
            };
        }

        self.state.assert_next(WriterState::Summarized);
        self.state = WriterState::Closed;

        debug!("wrote bigWig file: {} sections, {} zoom levels", self.sections.len(), zoom_levels.len());
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn chroms() -> Vec<ChromInfo> {
        vec![ChromInfo { name: "chr1".into(), id: 0, size: 2_000_000 }, ChromInfo { name: "chr2".into(), id: 1, size: 500_000 }]
    }

    #[test]
    fn bigbed_round_trip_and_query() {
        let tmp = NamedTempFile::new().unwrap();
        let mut writer = BigBedWriter::create(tmp.path(), chroms(), WriteOptions::default()).unwrap();
        writer
            .write(vec![
                BedEntry::new(0, 100, 200, "geneA\t0\t+"),
                BedEntry::new(0, 300, 400, "geneB\t0\t-"),
                BedEntry::new(1, 10, 20, "geneC\t0\t+"),
            ])
            .unwrap();
        writer.close(None).unwrap();

        let reader = BigBedReader::open(tmp.path()).unwrap();
        let hits = reader.query("chr1", 150, 350, true).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].rest, "geneA\t0\t+");

        let none = reader.query("chr2", 0, 5, true).unwrap();
        assert!(none.is_empty());

        let other_chrom = reader.query("chr2", 0, 30, true).unwrap();
        assert_eq!(other_chrom.len(), 1);
    }

    #[test]
    fn big_endian_write_round_trips_and_matches_little_endian() {
        use crate::byteio::Endianness;

        let le_tmp = NamedTempFile::new().unwrap();
        let mut le_writer = BigBedWriter::create(le_tmp.path(), chroms(), WriteOptions::default()).unwrap();
        le_writer.write(vec![BedEntry::new(0, 100, 200, "geneA"), BedEntry::new(1, 10, 20, "geneC")]).unwrap();
        le_writer.close(None).unwrap();

        let be_tmp = NamedTempFile::new().unwrap();
        let be_options = WriteOptions { endianness: Endianness::Big, ..WriteOptions::default() };
        let mut be_writer = BigBedWriter::create(be_tmp.path(), chroms(), be_options).unwrap();
        be_writer.write(vec![BedEntry::new(0, 100, 200, "geneA"), BedEntry::new(1, 10, 20, "geneC")]).unwrap();
        be_writer.close(None).unwrap();

        let mut be_file = File::open(be_tmp.path()).unwrap();
        assert_eq!(determine_file_type(&mut be_file).unwrap(), Some(BigFileKind::BigBed));

        let le_reader = BigBedReader::open(le_tmp.path()).unwrap();
        let be_reader = BigBedReader::open(be_tmp.path()).unwrap();
        assert_eq!(le_reader.query("chr1", 0, 300, true).unwrap(), be_reader.query("chr1", 0, 300, true).unwrap());
        assert_eq!(le_reader.total_summary(), be_reader.total_summary());
    }

    #[test]
    fn bigwig_round_trip_and_query() {
        let tmp = NamedTempFile::new().unwrap();
        let mut writer = BigWigWriter::create(tmp.path(), chroms(), WriteOptions::default()).unwrap();
        writer
            .write(vec![WigSection::FixedStep { chrom_ix: 0, start: 10, step: 5, span: 2, values: vec![1.0, 2.0, 3.0, 4.0] }])
            .unwrap();
        writer.close(None).unwrap();

        let reader = BigWigReader::open(tmp.path()).unwrap();
        let hits = reader.query("chr1", 12, 22, true).unwrap();
        assert_eq!(hits, vec![(15, 17, 2.0), (20, 22, 3.0)]);
    }

    #[test]
    fn determine_file_type_identifies_bigbed() {
        let tmp = NamedTempFile::new().unwrap();
        let mut writer = BigBedWriter::create(tmp.path(), chroms(), WriteOptions::default()).unwrap();
        writer.write(vec![BedEntry::new(0, 0, 10, "")]).unwrap();
        writer.close(None).unwrap();

        let mut file = File::open(tmp.path()).unwrap();
        assert_eq!(determine_file_type(&mut file).unwrap(), Some(BigFileKind::BigBed));
    }

    #[test]
    fn unsorted_write_is_rejected() {
        let tmp = NamedTempFile::new().unwrap();
        let mut writer = BigBedWriter::create(tmp.path(), chroms(), WriteOptions::default()).unwrap();
        let result = writer.write(vec![BedEntry::new(0, 200, 300, ""), BedEntry::new(0, 100, 150, "")]);
        assert!(matches!(result, Err(Error::WriteOrderingViolation(_))));
    }

    #[test]
    fn writing_bedgraph_to_bigwig_is_rejected() {
        let tmp = NamedTempFile::new().unwrap();
        let mut writer = BigWigWriter::create(tmp.path(), chroms(), WriteOptions::default()).unwrap();
        let result = writer.write(vec![WigSection::BedGraph { chrom_ix: 0, ranges: vec![(0, 10, 1.0)] }]);
        assert!(matches!(result, Err(Error::UnsupportedSection)));
    }
}
