//! tickvault - an embedded, file-backed time-series storage engine.
//!
//! Each file holds one or more named *series*: append-ordered tables of
//! fixed-width records whose first field is a 64-bit millisecond timestamp.
//! Large series get a self-similar sparse index (a child series of
//! `(timestamp, record id)` points) that keeps timestamp lookups sublinear.
//!
//! # Components
//!
//! - [`Database`]: the file surface - create/open files, create series,
//!   columnar range reads, batch appends
//! - [`Timeseries`]: the engine core - the append pipeline with ordering
//!   and overlap semantics, the sparse hierarchical index, and the
//!   timestamp-to-record-id searches
//! - [`Table`], [`Record`], [`RecordSet`], [`Cell`]: typed access to
//!   fixed-width records and their fields
//! - [`container::Container`]: the single-file group/table/attribute store
//!   everything persists into
//!
//! # Example
//!
//! ```rust,ignore
//! use tickvault::{Database, RecordSet};
//!
//! let db = Database::create("ticks.tvf", false)?;
//! db.create_series("usdjpy", "USD/JPY ticks", &[("price", "Double"), ("qty", "Int32")])?;
//!
//! let series = db.series("usdjpy")?;
//! let mut batch = RecordSet::with_capacity(2, series.structure().clone());
//! for (i, (ts, price, qty)) in [(1_000i64, 87.56, 5), (1_250, 87.59, 25)].iter().enumerate() {
//!     let record = batch.record(i)?;
//!     record.cell(0).set_i64(*ts)?;
//!     record.cell(1).set_f64(*price)?;
//!     record.cell(2).set_i32(*qty)?;
//! }
//! db.append("usdjpy", &mut batch, false)?;
//!
//! let columns = db.get_records("usdjpy", 0, 2_000, None)?;
//! ```
//!
//! The engine is single-threaded per file handle: callers serialize
//! operations on one open file, and handles are intentionally not `Send`.

#![deny(missing_docs)]

pub mod block;
pub mod cell;
pub mod container;
pub mod db;
pub mod error;
pub mod field;
pub mod record;
pub mod structure;
pub mod table;
pub mod time;
pub mod timeseries;

pub use cell::Cell;
pub use db::{ColumnValues, Database, OpenMode, SeriesProperties};
pub use error::{Error, Result};
pub use field::{Field, FieldKind};
pub use record::{BufferedRecordSet, Record, RecordSet};
pub use structure::Structure;
pub use table::Table;
pub use timeseries::Timeseries;
