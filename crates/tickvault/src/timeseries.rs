//! Timeseries: append-ordered record tables with a sparse timestamp index.
//!
//! A [`Timeseries`] is a container group holding a data table named
//! `_TSDB_data` whose first field is a Timestamp named `_TSDB_timestamp`,
//! and - once the table grows past [`SPLIT_INDEX_GT`] records - a child
//! timeseries named `_TSDB_index` mapping selected timestamps to the record
//! id of their first occurrence. The child is itself a timeseries, so a
//! sufficiently large series grows an index of its index; each level is
//! smaller by a factor of at least [`INDEX_STEP`], which bounds the depth.
//!
//! # Invariants
//!
//! - Timestamps in the data table are nondecreasing.
//! - Every index entry `(ts, rid)` points at the *first* record of a
//!   timestamp group: `data[rid].ts == ts` and, unless `rid == 0`,
//!   `data[rid - 1].ts < ts`. This is what makes the LE/GE tie-breaks
//!   deterministic (always the lowest record id of a group).

use crate::container::Container;
use crate::error::{Error, Result};
use crate::field::{Field, FieldKind};
use crate::record::{BufferedRecordSet, Record, RecordSet};
use crate::structure::{Structure, DEFAULT_ALIGN};
use crate::table::Table;
use std::rc::Rc;
use tracing::{debug, warn};

/// An index is built once the data table holds more records than this.
pub const SPLIT_INDEX_GT: u64 = 262_144;

/// Spacing between index point candidates, in records.
pub const INDEX_STEP: u64 = 65_536;

/// Name of the data table inside a series group.
pub const DATA_TABLE_NAME: &str = "_TSDB_data";

/// Name of the child index series inside a series group.
pub const INDEX_GROUP_NAME: &str = "_TSDB_index";

/// Name of the leading timestamp field of every series.
pub const TIMESTAMP_FIELD_NAME: &str = "_TSDB_timestamp";

/// An append-ordered, timestamp-keyed record table.
#[derive(Debug)]
pub struct Timeseries {
    container: Container,
    path: String,
    name: String,
    structure: Rc<Structure>,
    data: Table,
    index: Option<Box<Timeseries>>,
    split_index_gt: u64,
    index_step: u64,
    buffer_last_ts: i64,
}

impl Timeseries {
    /// Creates a new series from a list of fields.
    ///
    /// A `_TSDB_timestamp: Timestamp` field is prepended automatically; the
    /// caller's fields follow it. The generated structure uses the default
    /// alignment and is reachable through [`Timeseries::structure`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::SeriesExists`] if the name is taken.
    pub fn create(
        container: &Container,
        parent: Option<&str>,
        name: &str,
        title: &str,
        fields: Vec<Field>,
    ) -> Result<Self> {
        let mut all_fields = Vec::with_capacity(fields.len() + 1);
        all_fields.push(Field::new(TIMESTAMP_FIELD_NAME, FieldKind::Timestamp));
        all_fields.extend(fields);
        let structure = Rc::new(Structure::new(all_fields, DEFAULT_ALIGN)?);
        Self::create_with_structure(container, parent, name, title, structure)
    }

    /// Creates a new series from a pre-built structure.
    ///
    /// The structure must carry `_TSDB_timestamp` as its first field, with
    /// kind Timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SeriesExists`] if the name is taken and
    /// [`Error::FieldSpecInvalid`] if the timestamp field is absent or
    /// misplaced.
    pub fn create_with_structure(
        container: &Container,
        parent: Option<&str>,
        name: &str,
        title: &str,
        structure: Rc<Structure>,
    ) -> Result<Self> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::Storage(format!("invalid series name '{}'", name)));
        }
        if structure.field_index(TIMESTAMP_FIELD_NAME).ok() != Some(0) {
            return Err(Error::FieldSpecInvalid(format!(
                "{} must be the first field",
                TIMESTAMP_FIELD_NAME
            )));
        }
        if structure.field(0).kind() != FieldKind::Timestamp {
            return Err(Error::FieldSpecInvalid(format!(
                "{} must be a Timestamp field",
                TIMESTAMP_FIELD_NAME
            )));
        }

        let path = group_path(parent, name);
        if Self::exists(container, &path) {
            return Err(Error::SeriesExists(name.to_string()));
        }
        container.create_group(&path)?;
        let data = Table::create(container, &path, DATA_TABLE_NAME, title, Rc::clone(&structure))?;

        Ok(Self {
            container: container.clone(),
            path,
            name: name.to_string(),
            structure,
            data,
            index: None,
            split_index_gt: SPLIT_INDEX_GT,
            index_step: INDEX_STEP,
            buffer_last_ts: i64::MIN,
        })
    }

    /// Opens an existing series, including its index chain if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SeriesMissing`] if the group is absent and
    /// [`Error::TableMissing`] if the group exists without a data table.
    pub fn open(container: &Container, parent: Option<&str>, name: &str) -> Result<Self> {
        let path = group_path(parent, name);
        if !container.has_group(&path) {
            return Err(Error::SeriesMissing(name.to_string()));
        }
        if !container.has_table(&path, DATA_TABLE_NAME) {
            return Err(Error::TableMissing(format!("{}/{}", path, DATA_TABLE_NAME)));
        }
        let data = Table::open(container, &path, DATA_TABLE_NAME)?;
        let structure = Rc::clone(data.structure());

        let index = if Self::exists(container, &group_path(Some(&path), INDEX_GROUP_NAME)) {
            Some(Box::new(Self::open(container, Some(&path), INDEX_GROUP_NAME)?))
        } else {
            None
        };

        Ok(Self {
            container: container.clone(),
            path,
            name: name.to_string(),
            structure,
            data,
            index,
            split_index_gt: SPLIT_INDEX_GT,
            index_step: INDEX_STEP,
            buffer_last_ts: i64::MIN,
        })
    }

    /// Returns `true` if a series group with a data table exists at `path`.
    pub fn exists(container: &Container, path: &str) -> bool {
        container.has_group(path) && container.has_table(path, DATA_TABLE_NAME)
    }

    /// Returns the series name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the series title.
    pub fn title(&self) -> &str {
        self.data.title()
    }

    /// Returns the record structure, `_TSDB_timestamp` included.
    pub fn structure(&self) -> &Rc<Structure> {
        &self.structure
    }

    /// Returns the underlying data table.
    pub fn data(&self) -> &Table {
        &self.data
    }

    /// Returns the child index series, if one has been built.
    pub fn index(&self) -> Option<&Timeseries> {
        self.index.as_deref()
    }

    /// Returns the number of records in the series.
    pub fn size(&self) -> Result<u64> {
        self.data.size()
    }

    /// Returns the last record, or `None` for an empty series.
    pub fn last_record(&self) -> Result<Option<Record>> {
        self.data.last_record()
    }

    /// Overrides the index candidate spacing. Values below 2 are clamped;
    /// the override propagates to the index chain.
    pub fn set_index_step(&mut self, step: u64) {
        let step = step.max(2);
        self.index_step = step;
        if let Some(index) = &mut self.index {
            index.set_index_step(step);
        }
    }

    /// Overrides the series size past which an index is built. The
    /// override propagates to the index chain.
    pub fn set_split_index_gt(&mut self, split: u64) {
        self.split_index_gt = split;
        if let Some(index) = &mut self.index {
            index.set_split_index_gt(split);
        }
    }

    /// Appends a batch of records, returning how many were discarded.
    ///
    /// An unsorted batch is first rewritten in timestamp order (the
    /// relative order of equal timestamps is not preserved). If the sorted
    /// batch starts at or after the series' last timestamp it is appended
    /// whole. Otherwise the batch overlaps: with `discard_overlap` the
    /// leading records older than the last timestamp are dropped and the
    /// rest appended; without it nothing is appended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimestampOverlap`] if the batch overlaps and
    /// `discard_overlap` is false, leaving the series unchanged.
    pub fn append_records(&mut self, batch: &mut RecordSet, discard_overlap: bool) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        if !batch.structure().same_layout(&self.structure) {
            return Err(Error::StructureMismatch);
        }
        batch.sort_by_timestamp();

        if let Some(last) = self.data.last_record()? {
            let last_ts = last.raw_timestamp();
            let first_ts = batch.raw_timestamp(0);
            if last_ts > first_ts {
                if !discard_overlap {
                    return Err(Error::TimestampOverlap(first_ts));
                }
                for k in 0..batch.len() {
                    if batch.raw_timestamp(k) >= last_ts {
                        let kept = batch.tail(k);
                        self.data.append_records(&kept)?;
                        self.index_tail()?;
                        debug!(
                            series = %self.name,
                            appended = kept.len(),
                            discarded = k,
                            "discarded overlapping records"
                        );
                        return Ok(k);
                    }
                }
                debug!(series = %self.name, discarded = batch.len(), "batch entirely overlapped");
                return Ok(batch.len());
            }
        }

        self.data.append_records(batch)?;
        self.index_tail()?;
        Ok(0)
    }

    /// Appends one record through the table's append buffer.
    ///
    /// The record must not be older than the newest record accepted into
    /// the buffer since its last flush. When the buffer flushes, the
    /// watermark resets and the index tail is extended.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TimestampOverlap`] if the record is older than the
    /// buffer watermark.
    pub fn append_record(&mut self, record: &Record) -> Result<()> {
        let ts = record.cell(0).as_timestamp()?;
        if ts < self.buffer_last_ts {
            return Err(Error::TimestampOverlap(ts));
        }
        self.data.append_record(record)?;
        self.buffer_last_ts = ts;
        if self.data.append_buffer_len() == 0 {
            self.buffer_last_ts = i64::MIN;
            self.index_tail()?;
        }
        Ok(())
    }

    /// Flushes the append buffer and extends the index tail.
    pub fn flush(&mut self) -> Result<()> {
        self.data.flush_append_buffer()?;
        self.buffer_last_ts = i64::MIN;
        self.index_tail()
    }

    /// Builds the index over the existing data if the series just grew
    /// past the split threshold.
    ///
    /// Returns `true` when there is nothing left for a tail walk to do:
    /// either the series is still too small for an index, or the index was
    /// just built here and already covers all data.
    fn build_index_if_needed(&mut self) -> Result<bool> {
        if self.index.is_some() {
            return Ok(false);
        }
        let size = self.data.size()?;
        if size <= self.split_index_gt {
            return Ok(true);
        }

        debug!(series = %self.name, records = size, "building sparse timestamp index");
        let structure = Rc::new(Structure::new(
            vec![
                Field::new(TIMESTAMP_FIELD_NAME, FieldKind::Timestamp),
                Field::new("record_id", FieldKind::RecordId),
            ],
            DEFAULT_ALIGN,
        )?);
        let mut child = Timeseries::create_with_structure(
            &self.container,
            Some(&self.path),
            INDEX_GROUP_NAME,
            "TSDB: Index",
            structure,
        )?;
        child.split_index_gt = self.split_index_gt;
        child.index_step = self.index_step;
        self.index = Some(Box::new(child));

        let points =
            Self::collect_index_points(&self.data, self.index_step, self.index_step.saturating_sub(1))?;
        self.append_index_points(&points)?;
        Ok(true)
    }

    /// Extends the index over records appended since the last index point.
    fn index_tail(&mut self) -> Result<()> {
        if self.build_index_if_needed()? {
            return Ok(());
        }
        let step = self.index_step;
        let first_candidate = {
            let index = self.index.as_ref().expect("index exists");
            match index.data.last_record()? {
                Some(last) => last.cell(1).as_record_id()? + step,
                None => step.saturating_sub(1),
            }
        };
        let points = Self::collect_index_points(&self.data, step, first_candidate)?;
        self.append_index_points(&points)
    }

    /// Walks index point candidates over the data table.
    ///
    /// Candidates start at `first_candidate` and advance in steps of
    /// `step`. A point is recorded at a candidate only if it is the first
    /// record of its timestamp group; otherwise the repeated run is
    /// scanned (up to `step - 1` records ahead) for the next group start,
    /// and the point lands there. A run extending past the scan window
    /// yields no point and the candidate advances by `step`.
    fn collect_index_points(
        data: &Table,
        step: u64,
        first_candidate: u64,
    ) -> Result<Vec<(i64, u64)>> {
        let size = data.size()?;
        let mut points = Vec::new();
        // Record 0 starts a group by definition; the pair check below
        // needs a predecessor.
        let mut candidate = first_candidate.max(1);

        while candidate < size {
            let pair = data.read_records(candidate - 1, candidate)?;
            let prev_ts = pair.raw_timestamp(0);
            let this_ts = pair.raw_timestamp(1);

            if prev_ts < this_ts {
                points.push((this_ts, candidate));
                candidate += step;
                continue;
            }

            // The candidate repeats the previous timestamp. Scan ahead for
            // the start of the next group.
            let scan_last = (candidate + step - 1).min(size - 1);
            let mut found = None;
            if scan_last > candidate {
                let run = data.read_records(candidate + 1, scan_last)?;
                for j in 0..run.len() {
                    let ts = run.raw_timestamp(j);
                    if ts > this_ts {
                        found = Some((ts, candidate + 1 + j as u64));
                        break;
                    }
                }
            }
            match found {
                Some((ts, record_id)) => {
                    points.push((ts, record_id));
                    candidate = record_id + step;
                }
                None => candidate += step,
            }
        }
        Ok(points)
    }

    /// Appends collected index points to the child series.
    fn append_index_points(&mut self, points: &[(i64, u64)]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let index = self.index.as_mut().expect("index exists");
        let mut batch = RecordSet::with_capacity(points.len(), Rc::clone(&index.structure));
        for (i, &(ts, record_id)) in points.iter().enumerate() {
            let record = batch.record(i)?;
            record.cell(0).set_i64(ts)?;
            record.cell(1).set_record_id(record_id)?;
        }
        let discarded = index.append_records(&mut batch, true)?;
        if discarded > 0 {
            warn!(series = %self.name, discarded, "index points discarded as overlapping");
        }
        Ok(())
    }

    /// Reads index entry `record_id` as a `(timestamp, record_id)` pair.
    fn index_entry(&self, record_id: u64) -> Result<(i64, u64)> {
        let set = self.data.read_records(record_id, record_id)?;
        let record = set.record(0)?;
        Ok((record.cell(0).as_timestamp()?, record.cell(1).as_record_id()?))
    }

    /// Returns the highest record id whose timestamp is `<= timestamp`,
    /// tie-broken to the lowest record id when several records share that
    /// timestamp. `None` if every record is newer than `timestamp`.
    pub fn record_id_le(&self, timestamp: i64) -> Result<Option<u64>> {
        let size = self.data.size()?;
        if size == 0 {
            return Ok(None);
        }

        let (first_id, last_id) = match &self.index {
            Some(index) => {
                let first_id = match index.record_id_le(timestamp)? {
                    None => 0,
                    Some(entry_id) => {
                        let (entry_ts, entry_rid) = index.index_entry(entry_id)?;
                        if entry_ts == timestamp {
                            // The entry already points at the first record
                            // of the group.
                            return Ok(Some(entry_rid));
                        }
                        entry_rid
                    }
                };
                let last_id = match index.record_id_ge(timestamp)? {
                    None => size - 1,
                    Some(entry_id) => index.index_entry(entry_id)?.1,
                };
                (first_id, last_id)
            }
            None => (0, size - 1),
        };

        let block = self.data.read_records(first_id, last_id)?;
        for i in (0..block.len()).rev() {
            let ts = block.raw_timestamp(i);
            if ts <= timestamp {
                // Walk back to the first record of this timestamp group.
                let mut j = i;
                while j > 0 && block.raw_timestamp(j - 1) == ts {
                    j -= 1;
                }
                return Ok(Some(first_id + j as u64));
            }
        }
        Ok(None)
    }

    /// Returns the lowest record id whose timestamp is `>= timestamp`.
    /// `None` if every record is older than `timestamp`.
    ///
    /// Because index entries always sit at the first record of a group,
    /// the forward scan can return the first match directly.
    pub fn record_id_ge(&self, timestamp: i64) -> Result<Option<u64>> {
        let size = self.data.size()?;
        if size == 0 {
            return Ok(None);
        }

        let (first_id, last_id) = match &self.index {
            Some(index) => {
                let first_id = match index.record_id_le(timestamp)? {
                    None => 0,
                    Some(entry_id) => {
                        let (entry_ts, entry_rid) = index.index_entry(entry_id)?;
                        if entry_ts == timestamp {
                            return Ok(Some(entry_rid));
                        }
                        entry_rid
                    }
                };
                let last_id = match index.record_id_ge(timestamp)? {
                    None => size - 1,
                    Some(entry_id) => index.index_entry(entry_id)?.1,
                };
                (first_id, last_id)
            }
            None => (0, size - 1),
        };

        let block = self.data.read_records(first_id, last_id)?;
        for i in 0..block.len() {
            if block.raw_timestamp(i) >= timestamp {
                return Ok(Some(first_id + i as u64));
            }
        }
        Ok(None)
    }

    fn record_id_after(&self, timestamp: i64) -> Result<Option<u64>> {
        if timestamp == i64::MAX {
            return Ok(None);
        }
        self.record_id_ge(timestamp + 1)
    }

    /// Resolves an inclusive timestamp range to record ids, or `None` when
    /// the range selects nothing.
    fn timestamp_range_ids(&self, start: i64, end: i64) -> Result<Option<(u64, u64)>> {
        if start > end {
            return Ok(None);
        }
        let Some(start_id) = self.record_id_ge(start)? else {
            return Ok(None);
        };
        if self.record_id_le(end)?.is_none() {
            return Ok(None);
        }
        let end_id = match self.record_id_after(end)? {
            Some(gt_id) => gt_id - 1,
            None => self.data.size()? - 1,
        };
        if end_id < start_id {
            return Ok(None);
        }
        Ok(Some((start_id, end_id)))
    }

    /// Reads every record with `start <= timestamp <= end`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadRange`] if `start > end`, and
    /// [`Error::NoRecords`] if `start` is newer than the whole series or
    /// `end` is older than it. A range falling between two adjacent
    /// timestamps yields an empty set.
    pub fn record_set(&self, start: i64, end: i64) -> Result<RecordSet> {
        if start > end {
            return Err(Error::BadRange(format!(
                "start timestamp {} is after end timestamp {}",
                start, end
            )));
        }
        let start_id = self.record_id_ge(start)?.ok_or(Error::NoRecords)?;
        self.record_id_le(end)?.ok_or(Error::NoRecords)?;
        let end_id = match self.record_id_after(end)? {
            Some(gt_id) => gt_id - 1,
            None => self.data.size()? - 1,
        };
        if end_id < start_id {
            return Ok(RecordSet::empty(Rc::clone(&self.structure)));
        }
        self.data.read_records(start_id, end_id)
    }

    /// Reads records `first..=last` by record id.
    pub fn record_set_by_id(&self, first: u64, last: u64) -> Result<RecordSet> {
        self.data.read_records(first, last)
    }

    /// Returns a windowed lazy view over the records with
    /// `start <= timestamp <= end`. Ranges that select nothing yield an
    /// empty view.
    pub fn buffered_record_set(&self, start: i64, end: i64) -> Result<BufferedRecordSet<'_>> {
        Ok(match self.timestamp_range_ids(start, end)? {
            Some((first, last)) => self.data.buffered_record_set(first, last),
            None => BufferedRecordSet::empty(),
        })
    }

    /// Returns a windowed lazy view over records `first..=last`.
    pub fn buffered_record_set_by_id(&self, first: u64, last: u64) -> BufferedRecordSet<'_> {
        self.data.buffered_record_set(first, last)
    }

    /// Counts the records with `start <= timestamp <= end`.
    pub fn count(&self, start: i64, end: i64) -> Result<u64> {
        Ok(match self.timestamp_range_ids(start, end)? {
            Some((first, last)) => last - first + 1,
            None => 0,
        })
    }
}

impl Drop for Timeseries {
    fn drop(&mut self) {
        if self.data.append_buffer_len() > 0 {
            if let Err(e) = self.flush() {
                warn!(series = %self.name, "failed to flush series on drop: {}", e);
            }
        }
    }
}

fn group_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) => format!("{}/{}", parent, name),
        None => name.to_string(),
    }
}
