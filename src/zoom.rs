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

// Zoom pyramid: progressively coarser summary levels over the unzoomed data.
// `spec.md` §3, §4.6. Generalizes the teacher's `BbiSummaryStatistics::add`
// into the commutative monoid `spec.md` §3 asks for, with real operator
// overloads rather than a bolt-on `.add()` method.

use std::io::{Read, Write};
use std::ops::{Add, AddAssign};

use byteorder::ByteOrder;

use crate::byteio::{read_f32, read_f64, read_u32, read_u64, write_f32, write_f64, write_u32, write_u64};
use crate::error::Result;

/* -------------------------------------------------------------------------- */

/// `(count, minValue, maxValue, sum, sumSquares)`: a commutative monoid with
/// an empty identity (`count == 0`). `spec.md` §3, §8 property 7.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BigSummary {
    pub count: u64,
    pub min_value: f64,
    pub max_value: f64,
    pub sum: f64,
    pub sum_squares: f64,
}

impl BigSummary {
    pub fn empty() -> BigSummary {
        BigSummary {
            count: 0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
            sum: 0.0,
            sum_squares: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Folds in `bases` worth of `value` (a raw item contributing its full
    /// value over an `bases`-long intersection). `spec.md` §4.7.
    pub fn update(&mut self, value: f64, bases: f64) {
        if bases <= 0.0 {
            return;
        }
        self.count += bases.round() as u64;
        self.sum += value * bases;
        self.sum_squares += value * value * bases;
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);
    }

    /// Folds in another summary scaled by `fraction` (zoom-to-zoom
    /// aggregation: `count`/`sum`/`sum_squares` scale by
    /// `intersection/total`, rounded to the nearest integer count;
    /// `min`/`max` propagate unscaled). `spec.md` §4.7.
    pub fn update_scaled(&mut self, other: &BigSummary, fraction: f64) {
        if other.is_empty() || fraction <= 0.0 {
            return;
        }
        self.count += (other.count as f64 * fraction).round() as u64;
        self.sum += other.sum * fraction;
        self.sum_squares += other.sum_squares * fraction;
        self.min_value = self.min_value.min(other.min_value);
        self.max_value = self.max_value.max(other.max_value);
    }

    pub fn read<E: ByteOrder, R: Read>(r: &mut R) -> Result<BigSummary> {
        Ok(BigSummary {
            count: read_u64::<E, R>(r)?,
            min_value: read_f64::<E, R>(r)?,
            max_value: read_f64::<E, R>(r)?,
            sum: read_f64::<E, R>(r)?,
            sum_squares: read_f64::<E, R>(r)?,
        })
    }

    pub fn write<E: ByteOrder, W: Write>(&self, w: &mut W) -> Result<()> {
        write_u64::<E, W>(w, self.count)?;
        write_f64::<E, W>(w, self.min_value)?;
        write_f64::<E, W>(w, self.max_value)?;
        write_f64::<E, W>(w, self.sum)?;
        write_f64::<E, W>(w, self.sum_squares)?;
        Ok(())
    }
}

impl Add for BigSummary {
    type Output = BigSummary;

    fn add(self, rhs: BigSummary) -> BigSummary {
        if self.is_empty() {
            return rhs;
        }
        if rhs.is_empty() {
            return self;
        }
        BigSummary {
            count: self.count + rhs.count,
            min_value: self.min_value.min(rhs.min_value),
            max_value: self.max_value.max(rhs.max_value),
            sum: self.sum + rhs.sum,
            sum_squares: self.sum_squares + rhs.sum_squares,
        }
    }
}

impl AddAssign for BigSummary {
    fn add_assign(&mut self, rhs: BigSummary) {
        *self = *self + rhs;
    }
}

/* -------------------------------------------------------------------------- */

/// On-disk zoom level descriptor: 32 bytes, `reduction:u32, reserved:u32,
/// data_offset:u64, index_offset:u64, reserved2:u64`. `spec.md` §6.
#[derive(Clone, Copy, Debug)]
pub struct ZoomLevel {
    pub reduction: u32,
    pub data_offset: u64,
    pub index_offset: u64,
}

impl ZoomLevel {
    pub fn read<E: ByteOrder, R: Read>(r: &mut R) -> Result<ZoomLevel> {
        let reduction = read_u32::<E, R>(r)?;
        let _reserved = read_u32::<E, R>(r)?;
        let data_offset = read_u64::<E, R>(r)?;
        let index_offset = read_u64::<E, R>(r)?;
        let _reserved2 = read_u64::<E, R>(r)?;
        Ok(ZoomLevel { reduction, data_offset, index_offset })
    }

    pub fn write<E: ByteOrder, W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32::<E, W>(w, self.reduction)?;
        write_u32::<E, W>(w, 0)?;
        write_u64::<E, W>(w, self.data_offset)?;
        write_u64::<E, W>(w, self.index_offset)?;
        write_u64::<E, W>(w, 0)?;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

/// One bin summary stored in a zoom level's data section: 32 bytes,
/// `chromIx, start, end, validCount, minVal, maxVal, sumData, sumSquares`
/// (all f32 beyond the coordinates, matching the on-disk width). `spec.md` §3.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomRecord {
    pub chrom_ix: u32,
    pub start: u32,
    pub end: u32,
    pub summary: BigSummaryF32,
}

/// `BigSummary` narrowed to the `f32` width the zoom data section stores.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BigSummaryF32 {
    pub count: u32,
    pub min_value: f32,
    pub max_value: f32,
    pub sum: f32,
    pub sum_squares: f32,
}

impl From<BigSummary> for BigSummaryF32 {
    fn from(s: BigSummary) -> BigSummaryF32 {
        BigSummaryF32 {
            count: s.count as u32,
            min_value: s.min_value as f32,
            max_value: s.max_value as f32,
            sum: s.sum as f32,
            sum_squares: s.sum_squares as f32,
        }
    }
}

impl From<BigSummaryF32> for BigSummary {
    fn from(s: BigSummaryF32) -> BigSummary {
        BigSummary {
            count: s.count as u64,
            min_value: s.min_value as f64,
            max_value: s.max_value as f64,
            sum: s.sum as f64,
            sum_squares: s.sum_squares as f64,
        }
    }
}

impl ZoomRecord {
    pub fn read<E: ByteOrder, R: Read>(r: &mut R) -> Result<ZoomRecord> {
        let chrom_ix = read_u32::<E, R>(r)?;
        let start = read_u32::<E, R>(r)?;
        let end = read_u32::<E, R>(r)?;
        let count = read_u32::<E, R>(r)?;
        let min_value = read_f32::<E, R>(r)?;
        let max_value = read_f32::<E, R>(r)?;
        let sum = read_f32::<E, R>(r)?;
        let sum_squares = read_f32::<E, R>(r)?;
        Ok(ZoomRecord {
            chrom_ix,
            start,
            end,
            summary: BigSummaryF32 { count, min_value, max_value, sum, sum_squares },
        })
    }

    pub fn write<E: ByteOrder, W: Write>(&self, w: &mut W) -> Result<()> {
        write_u32::<E, W>(w, self.chrom_ix)?;
        write_u32::<E, W>(w, self.start)?;
        write_u32::<E, W>(w, self.end)?;
        write_u32::<E, W>(w, self.summary.count)?;
        write_f32::<E, W>(w, self.summary.min_value)?;
        write_f32::<E, W>(w, self.summary.max_value)?;
        write_f32::<E, W>(w, self.summary.sum)?;
        write_f32::<E, W>(w, self.summary.sum_squares)?;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

/// One raw, unzoomed item feeding the base of the pyramid: a chromosome-scoped
/// interval with a single value (BED features carry `value = 1.0`; WIG
/// sections carry their own per-base values).
#[derive(Clone, Copy, Debug)]
pub struct SourceItem {
    pub chrom_ix: u32,
    pub start: u32,
    pub end: u32,
    pub value: f64,
}

/// Sweeps `items` (sorted by `(chrom_ix, start)`) into fixed-width bins of
/// `reduction` bases, emitting one `ZoomRecord` per non-empty bin.
/// `spec.md` §4.6 step 2a/2b.
fn sweep_from_items(items: &[SourceItem], reduction: u32) -> Vec<ZoomRecord> {
    let mut out = Vec::new();
    let mut current: Option<(u32, u32, BigSummary)> = None;

    for item in items {
        let mut bin_start = (item.start / reduction) * reduction;
        while bin_start < item.end {
            let bin_end = bin_start + reduction;
            let lo = item.start.max(bin_start);
            let hi = item.end.min(bin_end);
            if lo < hi {
                match &mut current {
                    Some((chrom_ix, start, summary)) if *chrom_ix == item.chrom_ix && *start == bin_start => {
                        summary.update(item.value, (hi - lo) as f64);
                    }
                    _ => {
                        if let Some((chrom_ix, start, summary)) = current.take() {
                            out.push(ZoomRecord { chrom_ix, start, end: start + reduction, summary: summary.into() });
                        }
                        let mut summary = BigSummary::empty();
                        summary.update(item.value, (hi - lo) as f64);
                        current = Some((item.chrom_ix, bin_start, summary));
                    }
                }
            }
            bin_start = bin_end;
        }
    }
    if let Some((chrom_ix, start, summary)) = current {
        out.push(ZoomRecord { chrom_ix, start, end: start + reduction, summary: summary.into() });
    }
    out
}

/// Cascades one zoom level into the next coarser one: previous-level records
/// are rebinned into `reduction`-wide windows, scaling each contribution by
/// `intersection / (prev.end - prev.start)`. `spec.md` §4.7 "zoom-to-zoom
/// aggregation", reused here per the cascading-construction decision in
/// DESIGN.md.
fn sweep_from_zoom(records: &[ZoomRecord], reduction: u32) -> Vec<ZoomRecord> {
    let mut out = Vec::new();
    let mut current: Option<(u32, u32, BigSummary)> = None;

    for record in records {
        let span = (record.end - record.start).max(1);
        let mut bin_start = (record.start / reduction) * reduction;
        while bin_start < record.end {
            let bin_end = bin_start + reduction;
            let lo = record.start.max(bin_start);
            let hi = record.end.min(bin_end);
            if lo < hi {
                let fraction = (hi - lo) as f64 / span as f64;
                match &mut current {
                    Some((chrom_ix, start, summary)) if *chrom_ix == record.chrom_ix && *start == bin_start => {
                        summary.update_scaled(&record.summary.into(), fraction);
                    }
                    _ => {
                        if let Some((chrom_ix, start, summary)) = current.take() {
                            out.push(ZoomRecord { chrom_ix, start, end: start + reduction, summary: summary.into() });
                        }
                        let mut summary = BigSummary::empty();
                        summary.update_scaled(&record.summary.into(), fraction);
                        current = Some((record.chrom_ix, bin_start, summary));
                    }
                }
            }
            bin_start = bin_end;
        }
    }
    if let Some((chrom_ix, start, summary)) = current {
        out.push(ZoomRecord { chrom_ix, start, end: start + reduction, summary: summary.into() });
    }
    out
}

/// Builds up to `max_levels` zoom levels from `items` (sorted by
/// `(chrom_ix, start)`), each one 4x coarser than the last, stopping early
/// once a level fails to at least halve the previous level's record count.
/// `spec.md` §4.6.
pub fn build_zoom_levels(items: &[SourceItem], max_levels: usize) -> Vec<(u32, Vec<ZoomRecord>)> {
    if items.is_empty() || max_levels == 0 {
        return Vec::new();
    }

    let total_bases: u64 = items.iter().map(|i| (i.end - i.start) as u64).sum();
    let count = items.len() as u64;
    let initial = 10 * (total_bases as f64 / count as f64).ceil().max(1.0) as u32;

    let mut levels = Vec::new();
    let mut reduction = initial;
    let mut previous_len = items.len();
    let mut previous_records = sweep_from_items(items, reduction);
    levels.push((reduction, previous_records.clone()));

    for _ in 1..max_levels {
        reduction = reduction.saturating_mul(4);
        let records = sweep_from_zoom(&previous_records, reduction);
        if records.is_empty() || records.len() * 2 > previous_len {
            break;
        }
        previous_len = records.len();
        previous_records = records.clone();
        levels.push((reduction, records));
    }

    levels
}

/// `pick(d)`: the zoom level with the largest reduction `<= d`, and among
/// ties the one closest to `d`; `None` if `d <= 1` or no level qualifies.
/// `spec.md` §8 property 10.
pub fn pick(levels: &[ZoomLevel], desired: f64) -> Option<usize> {
    if desired <= 1.0 {
        return None;
    }
    levels
        .iter()
        .enumerate()
        .filter(|(_, l)| (l.reduction as f64) <= desired)
        .min_by(|(_, a), (_, b)| {
            let da = (desired - a.reduction as f64).abs();
            let db = (desired - b.reduction as f64).abs();
            da.partial_cmp(&db).unwrap()
        })
        .map(|(i, _)| i)
}

/* -------------------------------------------------------------------------- */
