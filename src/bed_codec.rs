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

// BigBED data-block codec: one block holds a run of BED records sharing a
// chromIx, encoded back to back with no record-count prefix (the record
// count lives only in the R+ tree leaf that points at the block).
// `spec.md` §3, §4.5.

use std::io::{Cursor, Read, Write};

use byteorder::ByteOrder;

use crate::byteio::{read_u32, read_until_null, write_u32};
use crate::error::Result;

/* -------------------------------------------------------------------------- */

/// One BED feature: a half-open interval plus the verbatim remainder of the
/// line (fields 4 and onward, tab-separated, no trailing newline).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BedEntry {
    pub chrom_ix: u32,
    pub start: u32,
    pub end: u32,
    pub rest: String,
}

impl BedEntry {
    pub fn new(chrom_ix: u32, start: u32, end: u32, rest: impl Into<String>) -> BedEntry {
        BedEntry { chrom_ix, start, end, rest: rest.into() }
    }

    /// Number of extra BED fields beyond chrom/start/end, inferred from `rest`.
    pub fn field_count(&self) -> usize {
        if self.rest.is_empty() {
            3
        } else {
            3 + self.rest.split('\t').count()
        }
    }

    /// Decomposes `rest` into named BED9/BED12 fields. `spec.md` §3.
    pub fn extended(&self) -> ExtendedBedEntry {
        ExtendedBedEntry::decompose(&self.rest)
    }

    /// Builds an entry from an interval plus named fields, the inverse of
    /// [`BedEntry::extended`].
    pub fn from_extended(chrom_ix: u32, start: u32, end: u32, fields: &ExtendedBedEntry) -> BedEntry {
        BedEntry::new(chrom_ix, start, end, fields.pack())
    }
}

/* -------------------------------------------------------------------------- */

/// Decodes every record in one decompressed data block. Records are laid out
/// as `chromIx:u32, start:u32, end:u32, rest:cstring` repeated to the end of
/// the buffer.
pub fn decode_block<E: ByteOrder>(block: &[u8]) -> Result<Vec<BedEntry>> {
    let mut cursor = Cursor::new(block);
    let mut entries = Vec::new();

    while (cursor.position() as usize) < block.len() {
        let chrom_ix = read_u32::<E, _>(&mut cursor)?;
        let start = read_u32::<E, _>(&mut cursor)?;
        let end = read_u32::<E, _>(&mut cursor)?;
        let rest_bytes = read_until_null(&mut cursor)?;
        let rest = String::from_utf8_lossy(&rest_bytes).into_owned();
        entries.push(BedEntry { chrom_ix, start, end, rest });
    }

    Ok(entries)
}

/// Encodes a run of records (already grouped by chromIx by the caller) into
/// one data block, ready for compression by the caller.
pub fn encode_block<E: ByteOrder, W: Write>(w: &mut W, entries: &[BedEntry]) -> Result<()> {
    for entry in entries {
        write_u32::<E, W>(w, entry.chrom_ix)?;
        write_u32::<E, W>(w, entry.start)?;
        write_u32::<E, W>(w, entry.end)?;
        w.write_all(entry.rest.as_bytes())?;
        w.write_all(&[0u8])?;
    }
    Ok(())
}

/* -------------------------------------------------------------------------- */

/// Keeps entries whose interval intersects `[start, end)` on `chrom_ix`
/// (half-open overlap, `spec.md` §3 Interval, §8 property 5).
pub fn filter_overlap(entries: Vec<BedEntry>, chrom_ix: u32, start: u32, end: u32) -> Vec<BedEntry> {
    entries
        .into_iter()
        .filter(|e| e.chrom_ix == chrom_ix && e.start < end && e.end > start)
        .collect()
}

/// Keeps only entries fully contained within `[start, end)` on `chrom_ix`.
pub fn filter_containment(entries: Vec<BedEntry>, chrom_ix: u32, start: u32, end: u32) -> Vec<BedEntry> {
    entries
        .into_iter()
        .filter(|e| e.chrom_ix == chrom_ix && e.start >= start && e.end <= end)
        .collect()
}

/* -------------------------------------------------------------------------- */

/// `rest` decomposed into the named BED9/BED12 fields, the way the teacher's
/// `write_bed9`/`read_bed9` (`granges_bed.rs`) decompose a `GRanges` row's
/// meta columns into `name/score/strand/thickStart/thickEnd/itemRgb`, extended
/// with the BED12 block structure. Every field beyond `chrom/start/end` is
/// optional: a BED3 entry decomposes to all-`None`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtendedBedEntry {
    pub name: Option<String>,
    pub score: Option<i32>,
    pub strand: Option<char>,
    pub thick_start: Option<u32>,
    pub thick_end: Option<u32>,
    pub item_rgb: Option<(u8, u8, u8)>,
    pub block_sizes: Option<Vec<u32>>,
    pub block_starts: Option<Vec<u32>>,
}

impl ExtendedBedEntry {
    /// Decomposes a tab-separated `rest` string into named fields, positional
    /// per the BED9/BED12 column order. Fields past the last present column
    /// are left `None`; a malformed numeric field is treated as absent rather
    /// than an error (the source cstring has already been accepted as-is).
    pub fn decompose(rest: &str) -> ExtendedBedEntry {
        let fields: Vec<&str> = if rest.is_empty() { Vec::new() } else { rest.split('\t').collect() };
        let get = |i: usize| fields.get(i).copied();

        ExtendedBedEntry {
            name: get(0).map(str::to_string),
            score: get(1).and_then(|v| v.parse().ok()),
            strand: get(2).and_then(|v| v.chars().next()),
            thick_start: get(3).and_then(|v| v.parse().ok()),
            thick_end: get(4).and_then(|v| v.parse().ok()),
            item_rgb: get(5).and_then(parse_rgb),
            block_sizes: get(7).map(parse_csv_u32),
            block_starts: get(8).map(parse_csv_u32),
        }
    }

    /// Packs named fields back into a tab-separated `rest` string, the
    /// inverse of [`ExtendedBedEntry::decompose`]. Columns are emitted up to
    /// the last `Some` field; gaps before it are filled with BED placeholder
    /// defaults (`"."`/`0`/`"0,0,0"`) so the result stays positionally valid.
    pub fn pack(&self) -> String {
        let last = [
            self.name.is_some(),
            self.score.is_some(),
            self.strand.is_some(),
            self.thick_start.is_some(),
            self.thick_end.is_some(),
            self.item_rgb.is_some(),
            false,
            self.block_sizes.is_some(),
            self.block_starts.is_some(),
        ]
        .iter()
        .rposition(|&present| present);

        let Some(last) = last else { return String::new() };

        let columns = [
            self.name.clone().unwrap_or_else(|| ".".to_string()),
            self.score.unwrap_or(0).to_string(),
            self.strand.unwrap_or('.').to_string(),
            self.thick_start.unwrap_or(0).to_string(),
            self.thick_end.unwrap_or(0).to_string(),
            self.item_rgb.map(format_rgb).unwrap_or_else(|| "0,0,0".to_string()),
            self.block_sizes.as_ref().map(|v| v.len().to_string()).unwrap_or_else(|| "0".to_string()),
            self.block_sizes.clone().map(format_csv_u32).unwrap_or_default(),
            self.block_starts.clone().map(format_csv_u32).unwrap_or_default(),
        ];

        columns[..=last].join("\t")
    }
}

fn parse_rgb(field: &str) -> Option<(u8, u8, u8)> {
    let mut parts = field.splitn(3, ',');
    let r = parts.next()?.parse().ok()?;
    let g = parts.next()?.parse().ok()?;
    let b = parts.next()?.parse().ok()?;
    Some((r, g, b))
}

fn format_rgb((r, g, b): (u8, u8, u8)) -> String {
    format!("{},{},{}", r, g, b)
}

fn parse_csv_u32(field: &str) -> Vec<u32> {
    field.trim_end_matches(',').split(',').filter_map(|v| v.parse().ok()).collect()
}

fn format_csv_u32(values: Vec<u32>) -> String {
    values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::LittleEndian;

    #[test]
    fn round_trip_block() {
        let entries = vec![
            BedEntry::new(0, 10, 20, "geneA\t900\t+"),
            BedEntry::new(0, 30, 40, "geneB\t500\t-"),
        ];

        let mut buf = Vec::new();
        encode_block::<LittleEndian, _>(&mut buf, &entries).unwrap();
        let decoded = decode_block::<LittleEndian>(&buf).unwrap();

        assert_eq!(decoded, entries);
    }

    #[test]
    fn empty_rest_field_round_trips() {
        let entries = vec![BedEntry::new(2, 0, 5, "")];
        let mut buf = Vec::new();
        encode_block::<LittleEndian, _>(&mut buf, &entries).unwrap();
        let decoded = decode_block::<LittleEndian>(&buf).unwrap();
        assert_eq!(decoded, entries);
        assert_eq!(decoded[0].field_count(), 3);
    }

    #[test]
    fn overlap_is_half_open() {
        let entries = vec![BedEntry::new(0, 10, 20, "x")];
        assert!(filter_overlap(entries.clone(), 0, 15, 25).len() == 1);
        assert!(filter_overlap(entries.clone(), 0, 20, 30).is_empty());
        assert!(filter_overlap(entries, 0, 0, 10).is_empty());
    }

    #[test]
    fn containment_excludes_partial_overlap() {
        let entries = vec![BedEntry::new(0, 10, 20, "x")];
        assert!(filter_containment(entries.clone(), 0, 0, 20).len() == 1);
        assert!(filter_containment(entries, 0, 12, 20).is_empty());
    }

    #[test]
    fn bed3_decomposes_to_all_none() {
        let fields = ExtendedBedEntry::decompose("");
        assert_eq!(fields, ExtendedBedEntry::default());
        assert_eq!(fields.pack(), "");
    }

    #[test]
    fn bed9_round_trips_through_decompose_and_pack() {
        let rest = "geneA\t900\t+\t100\t200\t255,0,0";
        let fields = ExtendedBedEntry::decompose(rest);
        assert_eq!(fields.name.as_deref(), Some("geneA"));
        assert_eq!(fields.score, Some(900));
        assert_eq!(fields.strand, Some('+'));
        assert_eq!(fields.thick_start, Some(100));
        assert_eq!(fields.thick_end, Some(200));
        assert_eq!(fields.item_rgb, Some((255, 0, 0)));
        assert_eq!(fields.block_sizes, None);
        assert_eq!(fields.block_starts, None);
        assert_eq!(fields.pack(), rest);
    }

    #[test]
    fn bed12_round_trips_block_structure() {
        let rest = "geneB\t500\t-\t10\t90\t0,128,0\t2\t10,20\t0,70";
        let fields = ExtendedBedEntry::decompose(rest);
        assert_eq!(fields.block_sizes, Some(vec![10, 20]));
        assert_eq!(fields.block_starts, Some(vec![0, 70]));
        assert_eq!(fields.pack(), rest);
    }

    #[test]
    fn pack_fills_gaps_before_last_present_field_with_bed_defaults() {
        let fields = ExtendedBedEntry { thick_start: Some(5), thick_end: Some(15), ..Default::default() };
        assert_eq!(fields.pack(), ".\t0\t.\t5\t15");
    }

    #[test]
    fn pack_only_name_stops_at_first_column() {
        let fields = ExtendedBedEntry { name: Some("onlyName".into()), ..Default::default() };
        assert_eq!(fields.pack(), "onlyName");
    }

    #[test]
    fn bed_entry_extended_round_trips_through_from_extended() {
        let entry = BedEntry::new(0, 10, 20, "geneA\t900\t+");
        let fields = entry.extended();
        let rebuilt = BedEntry::from_extended(0, 10, 20, &fields);
        assert_eq!(rebuilt, entry);
    }
}
