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

use thiserror::Error as ThisError;

/* -------------------------------------------------------------------------- */

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("bad signature: magic number did not match either byte order")]
    BadSignature,

    #[error("unsupported file format version: {0}")]
    UnsupportedVersion(u16),

    #[error("bedGraph sections cannot be written to a BigWIG file")]
    UnsupportedSection,

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("writer input is not sorted by (chrom, start): {0}")]
    WriteOrderingViolation(String),

    #[error("unknown chromosome: {0}")]
    UnknownChromosome(String),

    #[error("operation cancelled")]
    Cancelled,
}

/* -------------------------------------------------------------------------- */

pub type Result<T> = std::result::Result<T, Error>;
