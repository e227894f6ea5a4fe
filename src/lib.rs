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

/* -------------------------------------------------------------------------- */

pub mod bed_codec;
pub mod bigfile;
pub mod bplustree;
pub mod byteio;
pub mod error;
pub mod rombuffer;
pub mod rtree;
pub mod summary;
pub mod wig_codec;
pub mod zoom;

pub use bed_codec::{BedEntry, ExtendedBedEntry};
pub use bigfile::{
    determine_file_type, BigBedReader, BigBedWriter, BigFileKind, BigWigReader, BigWigWriter, ChromInfo, Compression,
    PrefetchLevel, SummaryOutput, WriteOptions,
};
pub use error::{Error, Result};
pub use rombuffer::BufferPolicy;
pub use wig_codec::WigSection;
pub use zoom::BigSummary;
