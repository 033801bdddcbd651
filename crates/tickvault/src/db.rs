//! The public file surface: create, open and query series by name.
//!
//! A [`Database`] wraps one open container file. Series are addressed by
//! name; each call opens the series, performs its operation and releases
//! it, which keeps handles cheap and the file layout the single source of
//! truth. Callers that issue many operations against one series should
//! hold a [`Timeseries`](crate::timeseries::Timeseries) from
//! [`Database::series`] instead.

use crate::container::Container;
use crate::error::Result;
use crate::field::{Field, FieldKind};
use crate::record::RecordSet;
use crate::time::format_timestamp;
use crate::timeseries::Timeseries;
use std::path::Path;

/// Access mode for [`Database::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read-only access; write operations fail.
    Read,
    /// Read and append access.
    #[default]
    ReadWrite,
}

/// Summary of a series, as reported by [`Database::series_properties`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesProperties {
    /// Number of records in the series.
    pub count: u64,
    /// Formatted timestamp of the first record, `None` when empty.
    pub first_timestamp: Option<String>,
    /// Formatted timestamp of the last record, `None` when empty.
    pub last_timestamp: Option<String>,
    /// `(name, type string)` for every field, `_TSDB_timestamp` included.
    pub fields: Vec<(String, String)>,
}

/// One column of values returned by [`Database::get_records`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Millisecond timestamps.
    Timestamp(Vec<i64>),
    /// Epoch day counts.
    Date(Vec<i32>),
    /// 32-bit integers.
    Int32(Vec<i32>),
    /// 8-bit integers.
    Int8(Vec<i8>),
    /// Doubles.
    Double(Vec<f64>),
    /// Single bytes.
    Char(Vec<u8>),
    /// Record ids.
    RecordId(Vec<u64>),
    /// Strings, trimmed at the first NUL.
    Str(Vec<String>),
}

impl ColumnValues {
    fn with_capacity(kind: FieldKind, n: usize) -> Self {
        match kind {
            FieldKind::Timestamp => ColumnValues::Timestamp(Vec::with_capacity(n)),
            FieldKind::Date => ColumnValues::Date(Vec::with_capacity(n)),
            FieldKind::Int32 => ColumnValues::Int32(Vec::with_capacity(n)),
            FieldKind::Int8 => ColumnValues::Int8(Vec::with_capacity(n)),
            FieldKind::Double => ColumnValues::Double(Vec::with_capacity(n)),
            FieldKind::Char => ColumnValues::Char(Vec::with_capacity(n)),
            FieldKind::RecordId => ColumnValues::RecordId(Vec::with_capacity(n)),
            FieldKind::Str(_) => ColumnValues::Str(Vec::with_capacity(n)),
        }
    }

    /// Returns the number of values in the column.
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Timestamp(v) => v.len(),
            ColumnValues::Date(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Int8(v) => v.len(),
            ColumnValues::Double(v) => v.len(),
            ColumnValues::Char(v) => v.len(),
            ColumnValues::RecordId(v) => v.len(),
            ColumnValues::Str(v) => v.len(),
        }
    }

    /// Returns `true` if the column holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An open time-series file.
#[derive(Debug, Clone)]
pub struct Database {
    container: Container,
}

impl Database {
    /// Creates a new file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileExists`](crate::error::Error::FileExists) if the path exists and `overwrite_ok`
    /// is false.
    pub fn create(path: impl AsRef<Path>, overwrite_ok: bool) -> Result<Self> {
        Ok(Self {
            container: Container::create(path, overwrite_ok)?,
        })
    }

    /// Opens an existing file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileMissing`](crate::error::Error::FileMissing) if the path does not exist.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Ok(Self {
            container: Container::open(path, mode == OpenMode::ReadWrite)?,
        })
    }

    /// Closes the file, observing any final flush error.
    pub fn close(self) -> Result<()> {
        self.container.close()
    }

    /// Returns the underlying container handle.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Lists the series in the file in sorted order.
    pub fn list_series(&self) -> Vec<String> {
        self.container
            .list_groups()
            .into_iter()
            .filter(|name| Timeseries::exists(&self.container, name))
            .collect()
    }

    /// Creates a new series from `(field name, type string)` pairs.
    ///
    /// A `_TSDB_timestamp: Timestamp` field is prepended automatically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SeriesExists`](crate::error::Error::SeriesExists) if the name is taken and
    /// [`Error::FieldSpecInvalid`](crate::error::Error::FieldSpecInvalid) if a type string does not parse.
    pub fn create_series(
        &self,
        name: &str,
        description: &str,
        fields: &[(&str, &str)],
    ) -> Result<()> {
        let fields = fields
            .iter()
            .map(|(field_name, type_string)| {
                Ok(Field::new(*field_name, FieldKind::parse(type_string)?))
            })
            .collect::<Result<Vec<_>>>()?;
        Timeseries::create(&self.container, None, name, description, fields)?;
        Ok(())
    }

    /// Opens a series for direct engine access.
    pub fn series(&self, name: &str) -> Result<Timeseries> {
        Timeseries::open(&self.container, None, name)
    }

    /// Reports the record count, first/last timestamps and field layout of
    /// a series.
    pub fn series_properties(&self, name: &str) -> Result<SeriesProperties> {
        let series = self.series(name)?;
        let count = series.size()?;
        let (first_timestamp, last_timestamp) = if count == 0 {
            (None, None)
        } else {
            let first = series.record_set_by_id(0, 0)?.record(0)?.cell(0).as_timestamp()?;
            let last = series
                .last_record()?
                .expect("non-empty series")
                .cell(0)
                .as_timestamp()?;
            (Some(format_timestamp(first)), Some(format_timestamp(last)))
        };
        let fields = series
            .structure()
            .fields()
            .iter()
            .map(|f| (f.name().to_string(), f.kind().type_string()))
            .collect();
        Ok(SeriesProperties {
            count,
            first_timestamp,
            last_timestamp,
            fields,
        })
    }

    /// Reads the records with `start <= timestamp <= end` as columns.
    ///
    /// With `wanted_fields`, only the named fields are returned, in the
    /// requested order; otherwise every field is returned in declaration
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldMissing`](crate::error::Error::FieldMissing) for an unknown field name, plus the
    /// range errors of [`Timeseries::record_set`].
    pub fn get_records(
        &self,
        name: &str,
        start: i64,
        end: i64,
        wanted_fields: Option<&[&str]>,
    ) -> Result<Vec<(String, ColumnValues)>> {
        let series = self.series(name)?;
        let structure = series.structure();
        let field_indices: Vec<usize> = match wanted_fields {
            Some(names) => names
                .iter()
                .map(|n| structure.field_index(n))
                .collect::<Result<Vec<_>>>()?,
            None => (0..structure.n_fields()).collect(),
        };

        let set = series.record_set(start, end)?;
        let mut columns: Vec<(String, ColumnValues)> = field_indices
            .iter()
            .map(|&i| {
                let field = structure.field(i);
                (
                    field.name().to_string(),
                    ColumnValues::with_capacity(field.kind(), set.len()),
                )
            })
            .collect();

        for r in 0..set.len() {
            let record = set.record(r)?;
            for (slot, &i) in columns.iter_mut().zip(field_indices.iter()) {
                let cell = record.cell(i);
                match &mut slot.1 {
                    ColumnValues::Timestamp(v) => v.push(cell.as_timestamp()?),
                    ColumnValues::Date(v) => v.push(cell.as_date()?),
                    ColumnValues::Int32(v) => v.push(cell.as_i32()?),
                    ColumnValues::Int8(v) => v.push(cell.as_i8()?),
                    ColumnValues::Double(v) => v.push(cell.as_f64()?),
                    ColumnValues::Char(v) => v.push(cell.as_char()? as u8),
                    ColumnValues::RecordId(v) => v.push(cell.as_record_id()?),
                    ColumnValues::Str(v) => v.push(cell.as_string()),
                }
            }
        }
        Ok(columns)
    }

    /// Appends a batch to a series, returning the discarded-record count.
    ///
    /// See [`Timeseries::append_records`] for the ordering and overlap
    /// semantics.
    pub fn append(
        &self,
        name: &str,
        batch: &mut RecordSet,
        discard_overlap: bool,
    ) -> Result<usize> {
        let mut series = self.series(name)?;
        series.append_records(batch, discard_overlap)
    }
}
