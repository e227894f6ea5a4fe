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

use bigtools_rs::{BigWigReader, BigWigWriter, ChromInfo, SummaryOutput, WigSection, WriteOptions};
use tempfile::NamedTempFile;

/* -------------------------------------------------------------------------- */

#[test]
fn fixed_step_query_matches_scenario_s2() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chrX".into(), id: 0, size: 1000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    writer.write(vec![WigSection::FixedStep { chrom_ix: 0, start: 10, step: 5, span: 2, values: vec![1.0, 2.0, 3.0, 4.0] }]).unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    let hits = reader.query("chrX", 12, 22, true).unwrap();
    assert_eq!(hits, vec![(15, 17, 2.0), (20, 22, 3.0)]);
}

#[test]
fn variable_step_query_matches_scenario_s3() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chrY".into(), id: 0, size: 1000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    writer.write(vec![WigSection::VariableStep { chrom_ix: 0, span: 1, positions: vec![5, 10, 15], values: vec![1.0, 2.0, 3.0] }]).unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    let hits = reader.query("chrY", 6, 15, true).unwrap();
    assert_eq!(hits, vec![(10, 11, 2.0)]);
}

#[test]
fn round_trip_preserves_multiple_sections_in_order() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chr1".into(), id: 0, size: 2_000_000 }, ChromInfo { name: "chr2".into(), id: 1, size: 500_000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    writer
        .write(vec![
            WigSection::FixedStep { chrom_ix: 0, start: 0, step: 10, span: 5, values: vec![1.0, 2.0, 3.0] },
            WigSection::VariableStep { chrom_ix: 1, span: 2, positions: vec![100, 200], values: vec![9.0, 8.0] },
        ])
        .unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    let chr1_hits = reader.query("chr1", 0, 30, true).unwrap();
    assert_eq!(chr1_hits, vec![(0, 5, 1.0), (10, 15, 2.0), (20, 25, 3.0)]);

    let chr2_hits = reader.query("chr2", 0, 300, true).unwrap();
    assert_eq!(chr2_hits, vec![(100, 102, 9.0), (200, 202, 8.0)]);
}

#[test]
fn empty_query_over_missing_chromosome_matches_scenario_s6() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chr1".into(), id: 0, size: 1000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    writer.write(vec![WigSection::FixedStep { chrom_ix: 0, start: 0, step: 1, span: 1, values: vec![1.0] }]).unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    let hits = reader.query("chrMissing", 0, 100, true).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn writing_bedgraph_section_is_rejected() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chr1".into(), id: 0, size: 1000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    let result = writer.write(vec![WigSection::BedGraph { chrom_ix: 0, ranges: vec![(0, 10, 1.0)] }]);
    assert!(result.is_err());
}

#[test]
fn write_named_drops_unknown_chromosomes_and_logs_a_warning() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chrX".into(), id: 0, size: 1000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    writer
        .write_named(vec![
            ("chrX".to_string(), WigSection::FixedStep { chrom_ix: 0, start: 0, step: 1, span: 1, values: vec![1.0, 2.0] }),
            (
                "chrGhost".to_string(),
                WigSection::FixedStep { chrom_ix: 0, start: 0, step: 1, span: 1, values: vec![9.0] },
            ),
        ])
        .unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    let hits = reader.query("chrX", 0, 2, true).unwrap();
    assert_eq!(hits, vec![(0, 1, 1.0), (1, 2, 2.0)]);
}

#[test]
fn try_clone_gives_an_independent_reader_over_the_same_file() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chrX".into(), id: 0, size: 1000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    writer.write(vec![WigSection::FixedStep { chrom_ix: 0, start: 0, step: 1, span: 1, values: vec![1.0, 2.0] }]).unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    let cloned = reader.try_clone().unwrap();
    assert_eq!(reader.query("chrX", 0, 2, true).unwrap(), cloned.query("chrX", 0, 2, true).unwrap());
}

#[test]
fn query_cancellable_reports_cancellation() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chrX".into(), id: 0, size: 1000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    writer.write(vec![WigSection::FixedStep { chrom_ix: 0, start: 10, step: 5, span: 2, values: vec![1.0, 2.0, 3.0, 4.0] }]).unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    let always_cancel = || true;
    let err = reader.query_cancellable("chrX", 12, 22, true, Some(&always_cancel)).unwrap_err();
    assert!(matches!(err, bigtools_rs::Error::Cancelled));
}

#[test]
fn sparse_summarize_omits_empty_bins() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chrX".into(), id: 0, size: 1000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();
    writer.write(vec![WigSection::FixedStep { chrom_ix: 0, start: 10, step: 1, span: 1, values: vec![1.0] }]).unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    match reader.summarize_cancellable("chrX", 0, 1000, 10, true, None).unwrap() {
        SummaryOutput::Sparse(bins) => {
            assert_eq!(bins.len(), 1);
            assert!(bins[0].1.count > 0);
        }
        SummaryOutput::Dense(_) => panic!("index=true must return Sparse"),
    }
}

#[test]
fn zoom_summary_matches_even_coverage_scenario_s5() {
    let tmp = NamedTempFile::new().unwrap();
    let chroms = vec![ChromInfo { name: "chr1".into(), id: 0, size: 1_000_000 }];
    let mut writer = BigWigWriter::create(tmp.path(), chroms, WriteOptions::default()).unwrap();

    // 10_000 evenly-spaced entries of value 1, tiling chr1[0, 1_000_000) with no gaps.
    let count = 10_000u32;
    let step = 1_000_000 / count;
    let values = vec![1.0f32; count as usize];
    writer.write(vec![WigSection::FixedStep { chrom_ix: 0, start: 0, step, span: step, values }]).unwrap();
    writer.close(None).unwrap();

    let reader = BigWigReader::open(tmp.path()).unwrap();
    let summaries = reader.summarize("chr1", 0, 1_000_000, 10).unwrap();
    assert_eq!(summaries.len(), 10);
    for summary in &summaries {
        assert!((summary.sum - 100_000.0).abs() / 100_000.0 < 0.05);
        assert_eq!(summary.min_value, 1.0);
        assert_eq!(summary.max_value, 1.0);
    }
}
