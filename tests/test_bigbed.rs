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

use bigtools_rs::bplustree::{BPlusLeaf, BPlusTree};
use bigtools_rs::{
    BedEntry, BigBedReader, BigBedWriter, BufferPolicy, ChromInfo, PrefetchLevel, SummaryOutput, WriteOptions,
};
use tempfile::NamedTempFile;

/* -------------------------------------------------------------------------- */

fn chrom_sizes() -> Vec<ChromInfo> {
    vec![ChromInfo { name: "chr1".into(), id: 0, size: 1000 }, ChromInfo { name: "chr2".into(), id: 1, size: 100 }]
}

#[test]
fn round_trip_and_query_matches_scenario_s1() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer
        .write(vec![BedEntry::new(0, 100, 200, ""), BedEntry::new(0, 150, 250, ""), BedEntry::new(1, 0, 10, "")])
        .unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    let hits = reader.query("chr1", 0, 300, true).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!((hits[0].start, hits[0].end), (100, 200));
    assert_eq!((hits[1].start, hits[1].end), (150, 250));
}

#[test]
fn containment_excludes_partial_overlap_matches_property_4() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer
        .write(vec![BedEntry::new(0, 50, 150, "partial"), BedEntry::new(0, 200, 250, "contained")])
        .unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    let contained = reader.query("chr1", 100, 300, false).unwrap();
    assert_eq!(contained.len(), 1);
    assert_eq!(contained[0].rest, "contained");
    for entry in &contained {
        assert!(entry.start >= 100 && entry.end <= 300);
    }
}

#[test]
fn overlap_query_matches_property_5() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer
        .write(vec![BedEntry::new(0, 50, 150, "a"), BedEntry::new(0, 150, 250, "b"), BedEntry::new(0, 300, 400, "c")])
        .unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    let hits = reader.query("chr1", 100, 200, true).unwrap();
    assert_eq!(hits.iter().map(|e| e.rest.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    for entry in &hits {
        assert!(entry.end > 100 && entry.start < 200);
    }
    // "b" ends exactly at the query start plus the touching boundary; "c" starts at
    // the query's far side and must not be returned.
    assert!(!hits.iter().any(|e| e.rest == "c"));
}

#[test]
fn empty_query_over_missing_chromosome_matches_scenario_s6() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer.write(vec![BedEntry::new(0, 0, 10, "")]).unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    let hits = reader.query("chrMissing", 0, 100, true).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn b_plus_tree_traversal_is_exhaustive_matches_property_8() {
    let leaves = vec![
        BPlusLeaf { key: "chr1".into(), id: 0, size: 1000 },
        BPlusLeaf { key: "chr2".into(), id: 1, size: 100 },
        BPlusLeaf { key: "chrX".into(), id: 2, size: 500 },
    ];
    let tree = BPlusTree::build(leaves, 2);

    assert_eq!(tree.traverse().len() as u64, tree.header.item_count);
    for key in ["chr1", "chr2", "chrX"] {
        assert!(tree.find(key).is_some());
    }
    assert!(tree.find("chrMissing").is_none());

    let traversed_keys: Vec<&str> = tree.traverse().iter().map(|l| l.key.as_str()).collect();
    for key in ["chr1", "chr2", "chrX"] {
        assert!(traversed_keys.contains(&key));
    }
}

#[test]
fn lazy_prefetch_still_answers_queries_matches_scenario_s1() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer
        .write(vec![BedEntry::new(0, 100, 200, ""), BedEntry::new(0, 150, 250, ""), BedEntry::new(1, 0, 10, "")])
        .unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open_with(tmp.path(), BufferPolicy::SingleThreaded, PrefetchLevel::Lazy).unwrap();
    let hits = reader.query("chr1", 0, 300, true).unwrap();
    assert_eq!(hits.len(), 2);
    // Forces the zoom pyramid's lazily-deferred R+ trees to parse on demand.
    let summaries = reader.summarize("chr1", 0, 300, 2).unwrap();
    assert_eq!(summaries.len(), 2);
}

#[test]
fn synchronized_buffer_policy_round_trips() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer.write(vec![BedEntry::new(0, 0, 10, "a"), BedEntry::new(0, 20, 30, "b")]).unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open_with(tmp.path(), BufferPolicy::Synchronized, PrefetchLevel::Full).unwrap();
    let hits = reader.query("chr1", 0, 100, true).unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn try_clone_gives_an_independent_reader_over_the_same_file() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer.write(vec![BedEntry::new(0, 0, 10, "a"), BedEntry::new(1, 0, 5, "b")]).unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    let cloned = reader.try_clone().unwrap();
    assert_eq!(reader.query("chr1", 0, 10, true).unwrap(), cloned.query("chr1", 0, 10, true).unwrap());
    assert_eq!(cloned.query("chr2", 0, 5, true).unwrap().len(), 1);
}

#[test]
fn write_named_drops_unknown_chromosomes_and_logs_a_warning() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer
        .write_named(vec![
            ("chr1".to_string(), 0, 10, "kept".to_string()),
            ("chrGhost".to_string(), 0, 10, "dropped".to_string()),
        ])
        .unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    let hits = reader.query("chr1", 0, 10, true).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].rest, "kept");
}

#[test]
fn query_cancellable_stops_early_and_reports_cancellation() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer
        .write(vec![BedEntry::new(0, 100, 200, ""), BedEntry::new(0, 150, 250, ""), BedEntry::new(1, 0, 10, "")])
        .unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    let always_cancel = || true;
    let err = reader.query_cancellable("chr1", 0, 300, true, Some(&always_cancel)).unwrap_err();
    assert!(matches!(err, bigtools_rs::Error::Cancelled));

    // An uncancelled query against the same reader still succeeds.
    let never_cancel = || false;
    let hits = reader.query_cancellable("chr1", 0, 300, true, Some(&never_cancel)).unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn sparse_summarize_omits_empty_bins() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer.write(vec![BedEntry::new(0, 0, 10, "")]).unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    match reader.summarize_cancellable("chr1", 0, 1000, 10, true, None).unwrap() {
        SummaryOutput::Sparse(bins) => {
            assert_eq!(bins.len(), 1);
            assert_eq!(bins[0].0, 0);
            assert!(bins[0].1.count > 0);
        }
        SummaryOutput::Dense(_) => panic!("index=true must return Sparse"),
    }
}

#[test]
fn writer_exposes_chrom_tree_through_reader() {
    let tmp = NamedTempFile::new().unwrap();
    let mut writer = BigBedWriter::create(tmp.path(), chrom_sizes(), WriteOptions::default()).unwrap();
    writer.write(vec![BedEntry::new(0, 0, 10, "")]).unwrap();
    writer.close(None).unwrap();

    let reader = BigBedReader::open(tmp.path()).unwrap();
    let mut names: Vec<&str> = reader.chroms().iter().map(|c| c.key.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["chr1", "chr2"]);
}
