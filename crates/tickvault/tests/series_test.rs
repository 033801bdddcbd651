//! Integration tests for series creation, appends, overlap handling,
//! indexing and range queries through the public file surface.

use std::rc::Rc;
use tempfile::TempDir;
use tickvault::error::Error;
use tickvault::{Database, OpenMode, RecordSet, Timeseries};

fn tick_file() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db = Database::create(dir.path().join("ticks.tvf"), false).unwrap();
    db.create_series("series1", "test series", &[("price", "Double"), ("side", "Int8")])
        .unwrap();
    (dir, db)
}

fn tick_batch(series: &Timeseries, rows: &[(i64, f64, i8)]) -> RecordSet {
    let batch = RecordSet::with_capacity(rows.len(), Rc::clone(series.structure()));
    for (i, &(ts, price, side)) in rows.iter().enumerate() {
        let record = batch.record(i).unwrap();
        record.cell(0).set_i64(ts).unwrap();
        record.cell(1).set_f64(price).unwrap();
        record.cell(2).set_i8(side).unwrap();
    }
    batch
}

fn append(db: &Database, rows: &[(i64, f64, i8)], discard_overlap: bool) -> Result<usize, Error> {
    let mut series = db.series("series1").unwrap();
    let mut batch = tick_batch(&series, rows);
    series.append_records(&mut batch, discard_overlap)
}

fn stored_timestamps(series: &Timeseries) -> Vec<i64> {
    let size = series.size().unwrap();
    if size == 0 {
        return Vec::new();
    }
    let set = series.record_set_by_id(0, size - 1).unwrap();
    (0..set.len())
        .map(|i| set.record(i).unwrap().cell(0).as_timestamp().unwrap())
        .collect()
}

#[test]
fn test_tiny_series() {
    let (_dir, db) = tick_file();
    append(
        &db,
        &[(10_000, 1.5, 1), (10_050, 1.6, 0), (10_100, 1.7, 1)],
        false,
    )
    .unwrap();

    let props = db.series_properties("series1").unwrap();
    assert_eq!(props.count, 3);
    assert_eq!(
        props.first_timestamp.as_deref(),
        Some("1970-01-01T00:00:10.000")
    );

    let series = db.series("series1").unwrap();
    let set = series.record_set(10_050, 10_100).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.record(0).unwrap().cell(1).as_f64().unwrap(), 1.6);
    assert_eq!(set.record(1).unwrap().cell(1).as_f64().unwrap(), 1.7);

    assert_eq!(series.record_id_le(10_000).unwrap(), Some(0));
}

#[test]
fn test_overlap_discard() {
    let (_dir, db) = tick_file();
    append(
        &db,
        &[(10_000, 1.5, 1), (10_050, 1.6, 0), (10_100, 1.7, 1)],
        false,
    )
    .unwrap();

    let discarded = append(&db, &[(9_000, 0.9, 0), (10_500, 1.8, 1)], true).unwrap();
    assert_eq!(discarded, 1);

    let series = db.series("series1").unwrap();
    assert_eq!(series.size().unwrap(), 4);
    let last = series.last_record().unwrap().unwrap();
    assert_eq!(last.cell(0).as_timestamp().unwrap(), 10_500);
}

#[test]
fn test_overlap_reject() {
    let (_dir, db) = tick_file();
    append(
        &db,
        &[(10_000, 1.5, 1), (10_050, 1.6, 0), (10_100, 1.7, 1)],
        false,
    )
    .unwrap();

    let err = append(&db, &[(9_000, 0.9, 0), (10_500, 1.8, 1)], false).unwrap_err();
    assert!(matches!(err, Error::TimestampOverlap(_)));
    assert_eq!(db.series_properties("series1").unwrap().count, 3);
}

#[test]
fn test_sparse_index_trigger() {
    let (_dir, db) = tick_file();
    let mut series = db.series("series1").unwrap();
    series.set_split_index_gt(7);
    series.set_index_step(3);

    let rows: Vec<(i64, f64, i8)> = (1..=16).map(|t| (t, t as f64, 0)).collect();
    let mut batch = tick_batch(&series, &rows);
    series.append_records(&mut batch, false).unwrap();

    let index = series.index().expect("index should exist past the split");
    assert_eq!(index.size().unwrap(), 5);
    let entries: Vec<(i64, u64)> = {
        let set = index.record_set_by_id(0, 4).unwrap();
        (0..5)
            .map(|i| {
                let record = set.record(i).unwrap();
                (
                    record.cell(0).as_timestamp().unwrap(),
                    record.cell(1).as_record_id().unwrap(),
                )
            })
            .collect()
    };
    assert_eq!(entries, vec![(3, 2), (6, 5), (9, 8), (12, 11), (15, 14)]);
}

#[test]
fn test_repeated_timestamps_index_first_of_group() {
    let (_dir, db) = tick_file();
    let mut series = db.series("series1").unwrap();
    series.set_split_index_gt(7);
    series.set_index_step(3);

    let rows: Vec<(i64, f64, i8)> = [1i64, 1, 1, 1, 2, 2, 2, 2]
        .iter()
        .map(|&t| (t, t as f64, 0))
        .collect();
    let mut batch = tick_batch(&series, &rows);
    series.append_records(&mut batch, false).unwrap();

    let index = series.index().expect("index should exist");
    assert_eq!(index.size().unwrap(), 1);
    let entry = index.record_set_by_id(0, 0).unwrap();
    let record = entry.record(0).unwrap();
    assert_eq!(record.cell(0).as_timestamp().unwrap(), 2);
    assert_eq!(record.cell(1).as_record_id().unwrap(), 4);
}

#[test]
fn test_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.tvf");
    {
        let db = Database::create(&path, false).unwrap();
        db.create_series("series1", "test series", &[("price", "Double"), ("side", "Int8")])
            .unwrap();
        let mut series = db.series("series1").unwrap();
        series.set_split_index_gt(7);
        series.set_index_step(3);
        let rows: Vec<(i64, f64, i8)> = (1..=16).map(|t| (t, t as f64, 0)).collect();
        let mut batch = tick_batch(&series, &rows);
        series.append_records(&mut batch, false).unwrap();
        drop(series);
        db.close().unwrap();
    }

    let db = Database::open(&path, OpenMode::Read).unwrap();
    let props = db.series_properties("series1").unwrap();
    assert_eq!(props.count, 16);
    assert_eq!(
        props.first_timestamp.as_deref(),
        Some("1970-01-01T00:00:00.001")
    );
    assert_eq!(
        props.last_timestamp.as_deref(),
        Some("1970-01-01T00:00:00.016")
    );
    assert_eq!(
        props.fields,
        vec![
            ("_TSDB_timestamp".to_string(), "Timestamp".to_string()),
            ("price".to_string(), "Double".to_string()),
            ("side".to_string(), "Int8".to_string()),
        ]
    );
}

#[test]
fn test_unsorted_batch() {
    let (_dir, db) = tick_file();
    append(
        &db,
        &[(5, 0.5, 0), (3, 0.3, 0), (7, 0.7, 0), (1, 0.1, 0)],
        false,
    )
    .unwrap();

    let series = db.series("series1").unwrap();
    assert_eq!(series.size().unwrap(), 4);
    assert_eq!(series.record_id_ge(4).unwrap(), Some(2));
    assert_eq!(stored_timestamps(&series), vec![1, 3, 5, 7]);
}

#[test]
fn test_monotone_invariant_across_appends() {
    let (_dir, db) = tick_file();
    append(&db, &[(30, 1.0, 0), (10, 1.0, 0), (20, 1.0, 0)], false).unwrap();
    append(&db, &[(25, 1.0, 0), (35, 1.0, 0), (31, 1.0, 0)], true).unwrap();
    append(&db, &[(40, 1.0, 0)], false).unwrap();

    let series = db.series("series1").unwrap();
    let timestamps = stored_timestamps(&series);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_persistence_round_trip_bytes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ticks.tvf");
    let before;
    {
        let db = Database::create(&path, false).unwrap();
        db.create_series("series1", "", &[("price", "Double"), ("side", "Int8")])
            .unwrap();
        let mut series = db.series("series1").unwrap();
        let rows: Vec<(i64, f64, i8)> = (0..500).map(|t| (t, t as f64 * 0.25, (t % 2) as i8)).collect();
        let mut batch = tick_batch(&series, &rows);
        series.append_records(&mut batch, false).unwrap();
        before = series.record_set_by_id(0, 499).unwrap().to_vec();
        drop(series);
        db.close().unwrap();
    }

    let db = Database::open(&path, OpenMode::Read).unwrap();
    let series = db.series("series1").unwrap();
    assert_eq!(series.size().unwrap(), 500);
    let after = series.record_set_by_id(0, 499).unwrap().to_vec();
    assert_eq!(before, after);
}

#[test]
fn test_range_idempotence() {
    let (_dir, db) = tick_file();
    let rows: Vec<(i64, f64, i8)> = (0..100).map(|t| (t * 10, t as f64, 0)).collect();
    append(&db, &rows, false).unwrap();

    let series = db.series("series1").unwrap();
    let first = series.record_set(150, 700).unwrap();
    let second = series.record_set(150, 700).unwrap();
    assert_eq!(first.len(), second.len());
    assert_eq!(first.to_vec(), second.to_vec());
}

#[test]
fn test_search_consistency_with_index() {
    let (_dir, db) = tick_file();
    let mut series = db.series("series1").unwrap();
    series.set_split_index_gt(16);
    series.set_index_step(4);

    // Clumps of repeated timestamps spanning many index blocks.
    let timestamps: Vec<i64> = (0..300).map(|i| (i / 7) as i64 * 5).collect();
    let rows: Vec<(i64, f64, i8)> = timestamps.iter().map(|&t| (t, 0.0, 0)).collect();
    let mut batch = tick_batch(&series, &rows);
    series.append_records(&mut batch, false).unwrap();
    assert!(series.index().is_some());

    for probe in [-3i64, 0, 1, 4, 5, 6, 50, 52, 107, 200, 210, 213, 500] {
        let le = series.record_id_le(probe).unwrap();
        let ge = series.record_id_ge(probe).unwrap();

        match le {
            Some(i) => {
                let i = i as usize;
                assert!(timestamps[i] <= probe);
                // Highest record with ts <= probe, broken to the first of
                // the group.
                assert!(i + 1 == timestamps.len()
                    || timestamps[i + 1] > probe
                    || timestamps[i + 1] == timestamps[i]);
                assert!(i == 0 || timestamps[i - 1] < timestamps[i]);
            }
            None => assert!(timestamps.iter().all(|&t| t > probe)),
        }
        match ge {
            Some(i) => {
                let i = i as usize;
                assert!(timestamps[i] >= probe);
                assert!(i == 0 || timestamps[i - 1] < probe);
            }
            None => assert!(timestamps.iter().all(|&t| t < probe)),
        }
    }
}

#[test]
fn test_buffered_record_set_over_range() {
    let (_dir, db) = tick_file();
    let rows: Vec<(i64, f64, i8)> = (0..50).map(|t| (t, t as f64, 0)).collect();
    append(&db, &rows, false).unwrap();

    let series = db.series("series1").unwrap();
    let mut buffered = series.buffered_record_set(10, 19).unwrap();
    assert_eq!(buffered.len(), 10);
    for i in 0..10 {
        let record = buffered.record(i).unwrap();
        assert_eq!(record.cell(0).as_timestamp().unwrap(), 10 + i as i64);
    }
    assert!(buffered.record(10).is_err());
}

#[test]
fn test_single_record_appends_then_flush() {
    let (_dir, db) = tick_file();
    let mut series = db.series("series1").unwrap();

    for t in 0..10i64 {
        let record = tickvault::Record::new(Rc::clone(series.structure()));
        record.cell(0).set_i64(t * 100).unwrap();
        record.cell(1).set_f64(t as f64).unwrap();
        series.append_record(&record).unwrap();
    }
    // Buffered records are not visible until the flush.
    assert_eq!(series.size().unwrap(), 0);
    series.flush().unwrap();
    assert_eq!(series.size().unwrap(), 10);
    assert_eq!(stored_timestamps(&series), (0..10).map(|t| t * 100).collect::<Vec<_>>());
}
