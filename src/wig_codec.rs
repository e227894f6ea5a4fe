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

// BigWIG data-block codec: one block holds exactly one WIG section.
// `spec.md` §3, §4.5.

use std::io::{Read, Write};

use byteorder::ByteOrder;

use crate::byteio::{read_f32, read_u16, read_u32, read_u8, write_f32, write_u16, write_u32, write_u8};
use crate::error::{Error, Result};

/* -------------------------------------------------------------------------- */

const KIND_BED_GRAPH: u8 = 1;
const KIND_VARIABLE_STEP: u8 = 2;
const KIND_FIXED_STEP: u8 = 3;

#[derive(Clone, Copy, Debug)]
pub struct WigBlockHeader {
    pub chrom_ix: u32,
    pub start: u32,
    pub end: u32,
    pub step: u32,
    pub span: u32,
    pub kind: u8,
    pub count: u16,
}

impl WigBlockHeader {
    pub fn read<E: ByteOrder, R: Read>(r: &mut R) -> Result<WigBlockHeader> {
        let chrom_ix = read_u32::<E, R>(r)?;
        let start = read_u32::<E, R>(r)?;
        let end = read_u32::<E, R>(r)?;
        let step = read_u32::<E, R>(r)?;
        let span = read_u32::<E, R>(r)?;
        let kind = read_u8(r)?;
        let _reserved = read_u8(r)?;
        let count = read_u16::<E, R>(r)?;
        Ok(WigBlockHeader { chrom_ix, start, end, step, span, kind, count })
    }

    pub fn write<E: ByteOrder, W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32::<E, W>(w, self.chrom_ix)?;
        write_u32::<E, W>(w, self.start)?;
        write_u32::<E, W>(w, self.end)?;
        write_u32::<E, W>(w, self.step)?;
        write_u32::<E, W>(w, self.span)?;
        write_u8(w, self.kind)?;
        write_u8(w, 0)?;
        write_u16::<E, W>(w, self.count)?;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

/// A single WIG section: the three text formats this crate may encounter as
/// one data block. `VariableStepSection` requires strictly ascending
/// `positions`; `FixedStepSection`'s i-th interval is
/// `[start + i*step, start + i*step + span)`. `BedGraphSection` is read-only:
/// the writer rejects it with `Error::UnsupportedSection`.
///
/// Equality compares every field directly (no self-comparison shortcut for
/// `start`, unlike the source this crate was distilled from).
#[derive(Clone, Debug, PartialEq)]
pub enum WigSection {
    VariableStep {
        chrom_ix: u32,
        span: u32,
        positions: Vec<u32>,
        values: Vec<f32>,
    },
    FixedStep {
        chrom_ix: u32,
        start: u32,
        step: u32,
        span: u32,
        values: Vec<f32>,
    },
    BedGraph {
        chrom_ix: u32,
        ranges: Vec<(u32, u32, f32)>,
    },
}

impl WigSection {
    pub fn chrom_ix(&self) -> u32 {
        match self {
            WigSection::VariableStep { chrom_ix, .. } => *chrom_ix,
            WigSection::FixedStep { chrom_ix, .. } => *chrom_ix,
            WigSection::BedGraph { chrom_ix, .. } => *chrom_ix,
        }
    }

    /// Rewrites the section's chromosome index in place, e.g. after a
    /// writer resolves a section built against a chromosome name into the
    /// id assigned by the chromosome B+ tree.
    pub fn with_chrom_ix(mut self, id: u32) -> WigSection {
        match &mut self {
            WigSection::VariableStep { chrom_ix, .. } => *chrom_ix = id,
            WigSection::FixedStep { chrom_ix, .. } => *chrom_ix = id,
            WigSection::BedGraph { chrom_ix, .. } => *chrom_ix = id,
        }
        self
    }

    /// Every `(start, end, value)` interval this section covers, in order.
    pub fn intervals(&self) -> Vec<(u32, u32, f32)> {
        match self {
            WigSection::VariableStep { span, positions, values, .. } => positions
                .iter()
                .zip(values.iter())
                .map(|(&p, &v)| (p, p + span, v))
                .collect(),
            WigSection::FixedStep { start, step, span, values, .. } => values
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let s = start + i as u32 * step;
                    (s, s + span, v)
                })
                .collect(),
            WigSection::BedGraph { ranges, .. } => ranges.clone(),
        }
    }
}

/* -------------------------------------------------------------------------- */

pub fn decode_block<E: ByteOrder>(block: &[u8]) -> Result<WigSection> {
    let mut cursor = std::io::Cursor::new(block);
    let header = WigBlockHeader::read::<E, _>(&mut cursor)?;

    match header.kind {
        KIND_VARIABLE_STEP => {
            let mut positions = Vec::with_capacity(header.count as usize);
            let mut values = Vec::with_capacity(header.count as usize);
            for _ in 0..header.count {
                positions.push(read_u32::<E, _>(&mut cursor)?);
                values.push(read_f32::<E, _>(&mut cursor)?);
            }
            Ok(WigSection::VariableStep { chrom_ix: header.chrom_ix, span: header.span, positions, values })
        }
        KIND_FIXED_STEP => {
            let mut values = Vec::with_capacity(header.count as usize);
            for _ in 0..header.count {
                values.push(read_f32::<E, _>(&mut cursor)?);
            }
            Ok(WigSection::FixedStep {
                chrom_ix: header.chrom_ix,
                start: header.start,
                step: header.step,
                span: header.span,
                values,
            })
        }
        KIND_BED_GRAPH => {
            let mut ranges = Vec::with_capacity(header.count as usize);
            for _ in 0..header.count {
                let start = read_u32::<E, _>(&mut cursor)?;
                let end = read_u32::<E, _>(&mut cursor)?;
                let value = read_f32::<E, _>(&mut cursor)?;
                ranges.push((start, end, value));
            }
            Ok(WigSection::BedGraph { chrom_ix: header.chrom_ix, ranges })
        }
        other => Err(Error::CorruptIndex(format!("unknown WIG section kind {other}"))),
    }
}

/// Encodes `section` as one data block. Fails with `Error::UnsupportedSection`
/// for `BedGraph`, which BigWIG may read but never write.
pub fn encode_block<E: ByteOrder, W: Write>(w: &mut W, section: &WigSection) -> Result<()> {
    match section {
        WigSection::VariableStep { chrom_ix, span, positions, values } => {
            let (start, end) = span_bounds_variable(positions, values, *span);
            let header = WigBlockHeader {
                chrom_ix: *chrom_ix,
                start,
                end,
                step: 0,
                span: *span,
                kind: KIND_VARIABLE_STEP,
                count: positions.len() as u16,
            };
            header.write::<E, W>(w)?;
            for (&pos, &val) in positions.iter().zip(values.iter()) {
                write_u32::<E, W>(w, pos)?;
                write_f32::<E, W>(w, val)?;
            }
            Ok(())
        }
        WigSection::FixedStep { chrom_ix, start, step, span, values } => {
            let end = start + values.len() as u32 * step;
            let header = WigBlockHeader {
                chrom_ix: *chrom_ix,
                start: *start,
                end,
                step: *step,
                span: *span,
                kind: KIND_FIXED_STEP,
                count: values.len() as u16,
            };
            header.write::<E, W>(w)?;
            for &val in values {
                write_f32::<E, W>(w, val)?;
            }
            Ok(())
        }
        WigSection::BedGraph { .. } => Err(Error::UnsupportedSection),
    }
}

fn span_bounds_variable(positions: &[u32], values: &[f32], span: u32) -> (u32, u32) {
    if positions.is_empty() {
        return (0, 0);
    }
    let _ = values;
    (positions[0], positions[positions.len() - 1] + span)
}

/* -------------------------------------------------------------------------- */

/// Keeps intervals from `section.intervals()` that lie on `chrom_ix` and
/// satisfy the query: contained in `[start, end)` if `overlaps` is false,
/// merely intersecting it otherwise. `spec.md` §4.5.
pub fn query(section: &WigSection, chrom_ix: u32, start: u32, end: u32, overlaps: bool) -> Vec<(u32, u32, f32)> {
    if section.chrom_ix() != chrom_ix {
        return Vec::new();
    }
    section
        .intervals()
        .into_iter()
        .filter(|(s, e, _)| {
            if overlaps {
                *s < end && *e > start
            } else {
                *s >= start && *e <= end
            }
        })
        .collect()
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::LittleEndian;

    #[test]
    fn fixed_step_round_trip_and_query() {
        let section = WigSection::FixedStep {
            chrom_ix: 3,
            start: 10,
            step: 5,
            span: 2,
            values: vec![1.0, 2.0, 3.0, 4.0],
        };

        let mut buf = Vec::new();
        encode_block::<LittleEndian, _>(&mut buf, &section).unwrap();
        let decoded = decode_block::<LittleEndian>(&buf).unwrap();
        assert_eq!(decoded, section);

        // S2: query("chrX",12,22) -> [15,17)=2, [20,22)=3
        let hits = query(&decoded, 3, 12, 22, true);
        assert_eq!(hits, vec![(15, 17, 2.0), (20, 22, 3.0)]);
    }

    #[test]
    fn variable_step_round_trip_and_query() {
        let section = WigSection::VariableStep {
            chrom_ix: 7,
            span: 1,
            positions: vec![5, 10, 15],
            values: vec![1.0, 2.0, 3.0],
        };

        let mut buf = Vec::new();
        encode_block::<LittleEndian, _>(&mut buf, &section).unwrap();
        let decoded = decode_block::<LittleEndian>(&buf).unwrap();
        assert_eq!(decoded, section);

        // S3: query("chrY",6,15) -> [10,11)=2.0
        let hits = query(&decoded, 7, 6, 15, true);
        assert_eq!(hits, vec![(10, 11, 2.0)]);
    }

    #[test]
    fn bed_graph_is_read_only() {
        let section = WigSection::BedGraph { chrom_ix: 0, ranges: vec![(0, 10, 1.0)] };
        let mut buf = Vec::new();
        assert!(matches!(encode_block::<LittleEndian, _>(&mut buf, &section), Err(Error::UnsupportedSection)));
    }

    #[test]
    fn bed_graph_decodes() {
        let mut buf = Vec::new();
        let header = WigBlockHeader { chrom_ix: 1, start: 0, end: 20, step: 0, span: 0, kind: KIND_BED_GRAPH, count: 2 };
        header.write::<LittleEndian, _>(&mut buf).unwrap();
        write_u32::<LittleEndian, _>(&mut buf, 0).unwrap();
        write_u32::<LittleEndian, _>(&mut buf, 10).unwrap();
        write_f32::<LittleEndian, _>(&mut buf, 1.0).unwrap();
        write_u32::<LittleEndian, _>(&mut buf, 10).unwrap();
        write_u32::<LittleEndian, _>(&mut buf, 20).unwrap();
        write_f32::<LittleEndian, _>(&mut buf, 2.0).unwrap();

        let decoded = decode_block::<LittleEndian>(&buf).unwrap();
        assert_eq!(decoded, WigSection::BedGraph { chrom_ix: 1, ranges: vec![(0, 10, 1.0), (10, 20, 2.0)] });
    }

    #[test]
    fn fixed_step_equality_compares_start_to_other_start() {
        let a = WigSection::FixedStep { chrom_ix: 0, start: 10, step: 1, span: 1, values: vec![1.0] };
        let b = WigSection::FixedStep { chrom_ix: 0, start: 20, step: 1, span: 1, values: vec![1.0] };
        assert_ne!(a, b);
    }
}
