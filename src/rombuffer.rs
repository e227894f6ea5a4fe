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

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::rc::Rc;
use std::sync::Mutex;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression as ZlibLevel;

use crate::error::{Error, Result};

/* -------------------------------------------------------------------------- */

/// Per-block compression in effect for a bbi data section. `spec.md` §4.2: two
/// codecs, DEFLATE and Snappy (the latter a private extension gated on file
/// format version >= 5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockCompression {
    None,
    Zlib,
    Snappy,
}

/* -------------------------------------------------------------------------- */

fn grow(buf: &mut Vec<u8>, needed: usize) {
    if buf.capacity() < needed {
        let target = (buf.capacity() as f64 * 1.5).ceil() as usize;
        buf.reserve(target.max(needed) - buf.len());
    }
}

fn uncompress_zlib(data: &[u8], scratch: &mut Vec<u8>) -> Result<Vec<u8>> {
    scratch.clear();
    let mut decoder = ZlibDecoder::new(data);
    decoder
        .read_to_end(scratch)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    Ok(scratch.clone())
}

fn uncompress_snappy(data: &[u8], scratch: &mut Vec<u8>) -> Result<Vec<u8>> {
    let mut decoder = snap::read::FrameDecoder::new(data);
    scratch.clear();
    decoder
        .read_to_end(scratch)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    Ok(scratch.clone())
}

pub fn compress_zlib(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn compress_snappy(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = snap::write::FrameEncoder::new(Vec::new());
    encoder.write_all(data)?;
    encoder
        .into_inner()
        .map_err(|e| Error::Decompression(e.to_string()))
}

/* -------------------------------------------------------------------------- */

/// A seekable view over a file (or any other `Read + Seek` byte source, which
/// is where an HTTP range-fetcher would plug in) with a cursor and reusable
/// scratch buffers for block decompression. Not `Sync`: scratch buffers are
/// mutated on every `with()` call, so a `RomBuffer` must not be shared across
/// threads without going through [`SyncRomBuffer`]. `spec.md` §4.2, §5.
pub struct RomBuffer<R> {
    source: R,
    position: u64,
    compressed_scratch: Vec<u8>,
    uncompressed_scratch: Vec<u8>,
    leaf_cache: Option<(u64, Rc<Vec<u8>>)>,
}

impl<R: Read + Seek> RomBuffer<R> {
    pub fn new(source: R) -> Self {
        RomBuffer {
            source,
            position: 0,
            compressed_scratch: Vec::new(),
            uncompressed_scratch: Vec::new(),
            leaf_cache: None,
        }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.source.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    fn read_raw_at(&mut self, offset: u64, size: usize) -> Result<()> {
        grow(&mut self.compressed_scratch, size);
        self.compressed_scratch.resize(size, 0);
        self.source.seek(SeekFrom::Start(offset))?;
        self.source.read_exact(&mut self.compressed_scratch)?;
        self.position = offset + size as u64;
        Ok(())
    }

    /// Returns a bounded, decompressed view of `size` compressed (or raw)
    /// bytes starting at `offset`. Repeated calls with the same `offset` reuse
    /// the last decompressed leaf without re-reading or re-inflating it.
    pub fn with(&mut self, offset: u64, size: usize, compression: BlockCompression) -> Result<Rc<Vec<u8>>> {
        if let Some((cached_offset, ref data)) = self.leaf_cache {
            if cached_offset == offset {
                return Ok(Rc::clone(data));
            }
        }

        self.read_raw_at(offset, size)?;

        let data = match compression {
            BlockCompression::None => Rc::new(self.compressed_scratch[..size].to_vec()),
            BlockCompression::Zlib => {
                let out = uncompress_zlib(&self.compressed_scratch[..size], &mut self.uncompressed_scratch)?;
                Rc::new(out)
            }
            BlockCompression::Snappy => {
                let out = uncompress_snappy(&self.compressed_scratch[..size], &mut self.uncompressed_scratch)?;
                Rc::new(out)
            }
        };

        self.leaf_cache = Some((offset, Rc::clone(&data)));
        Ok(data)
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

/* -------------------------------------------------------------------------- */

/// One thread's private `RomBuffer`, built by cloning the underlying file
/// handle so the OS-level file description (and hence byte offset on some
/// platforms) is independent per thread. `spec.md` §5: "per-thread-copy".
pub fn per_thread_copy(file: &File) -> Result<RomBuffer<File>> {
    Ok(RomBuffer::new(file.try_clone()?))
}

/* -------------------------------------------------------------------------- */

/// A `RomBuffer` guarded by a mutex so independent threads may share one
/// open file handle, serializing access. `spec.md` §5: "synchronized".
pub struct SyncRomBuffer<R> {
    inner: Mutex<RomBuffer<R>>,
}

impl<R: Read + Seek> SyncRomBuffer<R> {
    pub fn new(source: R) -> Self {
        SyncRomBuffer {
            inner: Mutex::new(RomBuffer::new(source)),
        }
    }

    pub fn with(&self, offset: u64, size: usize, compression: BlockCompression) -> Result<Rc<Vec<u8>>> {
        let mut guard = self.inner.lock().expect("RomBuffer mutex poisoned");
        guard.with(offset, size, compression)
    }

    /// Runs `f` against the underlying source directly, under the same lock
    /// used for data blocks. Used for structural reads (tree nodes) that
    /// bypass the compressed-block cache.
    pub fn with_file<T>(&self, f: impl FnOnce(&mut R) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock().expect("RomBuffer mutex poisoned");
        f(guard.get_mut())
    }
}

/* -------------------------------------------------------------------------- */

/// Selects how scratch buffers are shared across threads when a `BigFile` is
/// opened. `spec.md` §5.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Fastest: no locking, but the resulting reader cannot be shared.
    SingleThreaded,
    /// Each thread clones the file handle and keeps its own scratch buffers.
    PerThreadCopy,
    /// One shared buffer, a mutex serializes access.
    Synchronized,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        BufferPolicy::SingleThreaded
    }
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn uncompressed_round_trip() {
        let data = b"hello genomic world".to_vec();
        let mut buf = RomBuffer::new(Cursor::new(data.clone()));
        let view = buf.with(0, data.len(), BlockCompression::None).unwrap();
        assert_eq!(&view[..], &data[..]);
    }

    #[test]
    fn zlib_round_trip() {
        let data = b"ACGTACGTACGTACGTACGTACGTACGTACGT".to_vec();
        let compressed = compress_zlib(&data).unwrap();
        let mut buf = RomBuffer::new(Cursor::new(compressed.clone()));
        let view = buf.with(0, compressed.len(), BlockCompression::Zlib).unwrap();
        assert_eq!(&view[..], &data[..]);
    }

    #[test]
    fn snappy_round_trip() {
        let data = b"ACGTACGTACGTACGTACGTACGTACGTACGT".to_vec();
        let compressed = compress_snappy(&data).unwrap();
        let mut buf = RomBuffer::new(Cursor::new(compressed.clone()));
        let view = buf.with(0, compressed.len(), BlockCompression::Snappy).unwrap();
        assert_eq!(&view[..], &data[..]);
    }

    #[test]
    fn leaf_cache_skips_rereads() {
        let data = b"cached block contents".to_vec();
        let mut buf = RomBuffer::new(Cursor::new(data.clone()));
        let v1 = buf.with(0, data.len(), BlockCompression::None).unwrap();
        let v2 = buf.with(0, data.len(), BlockCompression::None).unwrap();
        assert!(Rc::ptr_eq(&v1, &v2));
    }

    #[test]
    fn sync_rom_buffer_serializes_access() {
        let data = b"mutex guarded block".to_vec();
        let buf = SyncRomBuffer::new(Cursor::new(data.clone()));
        let view = buf.with(0, data.len(), BlockCompression::None).unwrap();
        assert_eq!(&view[..], &data[..]);
    }

    #[test]
    fn per_thread_copy_reads_independently_of_the_source_handle() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), b"independent file handle").unwrap();
        let file = File::open(tmp.path()).unwrap();
        let mut cloned = per_thread_copy(&file).unwrap();
        let view = cloned.with(0, 24, BlockCompression::None).unwrap();
        assert_eq!(&view[..], b"independent file handle");
    }
}
