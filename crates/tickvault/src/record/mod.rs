//! Records and contiguous record sets.
//!
//! A [`Record`] is a typed view over one record's bytes; a [`RecordSet`] is
//! a typed view over a contiguous row-major run of records. Both hold a
//! shared [`Structure`] describing the layout and a [`BlockRef`] into the
//! backing buffer.

mod buffered;

pub use buffered::{BufferedRecordSet, WINDOW_SIZE};

use crate::block::{BlockRef, MemoryBlock};
use crate::cell::Cell;
use crate::error::{Error, Result};
use crate::structure::Structure;
use std::rc::Rc;

/// A typed view over the bytes of a single record.
#[derive(Debug, Clone)]
pub struct Record {
    block: BlockRef,
    structure: Rc<Structure>,
}

impl Record {
    /// Allocates a fresh zero-filled record with the given structure.
    pub fn new(structure: Rc<Structure>) -> Self {
        let block = BlockRef::new(MemoryBlock::new(structure.size()), 0);
        Self { block, structure }
    }

    pub(crate) fn from_block(block: BlockRef, structure: Rc<Structure>) -> Self {
        Self { block, structure }
    }

    /// Returns the structure shared by this record.
    pub fn structure(&self) -> &Rc<Structure> {
        &self.structure
    }

    /// Returns a typed cell over field `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is not a valid field index; field indices are fixed by
    /// the structure the record was built from.
    pub fn cell(&self, i: usize) -> Cell {
        Cell::new(
            self.block.offset(self.structure.offset(i)),
            self.structure.field(i).kind(),
        )
    }

    /// Returns a typed cell over the field called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldMissing`] if the structure has no such field.
    pub fn cell_by_name(&self, name: &str) -> Result<Cell> {
        Ok(self.cell(self.structure.field_index(name)?))
    }

    /// Copies all field values from `other` into this record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureMismatch`] unless both records share the
    /// same structure instance (identity, not layout equivalence).
    pub fn copy_values(&self, other: &Record) -> Result<()> {
        if !Rc::ptr_eq(&self.structure, &other.structure) {
            return Err(Error::StructureMismatch);
        }
        self.block.copy_from(&other.block, self.structure.size());
        Ok(())
    }

    /// Reads the timestamp stored at field offset zero.
    ///
    /// Every series record begins with its timestamp, so this avoids going
    /// through a cell on the hot paths.
    pub(crate) fn raw_timestamp(&self) -> i64 {
        self.block.read_i64(0)
    }

    pub(crate) fn block(&self) -> &BlockRef {
        &self.block
    }
}

/// A typed view over a contiguous run of records.
#[derive(Debug, Clone)]
pub struct RecordSet {
    block: BlockRef,
    nrecords: usize,
    structure: Rc<Structure>,
}

impl RecordSet {
    /// Allocates a zero-filled set of `nrecords` records.
    pub fn with_capacity(nrecords: usize, structure: Rc<Structure>) -> Self {
        let block = BlockRef::new(MemoryBlock::new(structure.size() * nrecords), 0);
        Self {
            block,
            nrecords,
            structure,
        }
    }

    /// Creates an empty set still linked to its structure.
    pub fn empty(structure: Rc<Structure>) -> Self {
        Self::with_capacity(0, structure)
    }

    pub(crate) fn from_block(block: BlockRef, nrecords: usize, structure: Rc<Structure>) -> Self {
        Self {
            block,
            nrecords,
            structure,
        }
    }

    /// Returns the number of records in the set.
    pub fn len(&self) -> usize {
        self.nrecords
    }

    /// Returns `true` if the set holds no records.
    pub fn is_empty(&self) -> bool {
        self.nrecords == 0
    }

    /// Returns the structure shared by the records of this set.
    pub fn structure(&self) -> &Rc<Structure> {
        &self.structure
    }

    /// Returns a record view at index `i`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `i >= len()`.
    pub fn record(&self, i: usize) -> Result<Record> {
        if i >= self.nrecords {
            return Err(Error::IndexOutOfRange {
                index: i as u64,
                size: self.nrecords as u64,
            });
        }
        Ok(Record::from_block(
            self.block.offset(self.structure.size() * i),
            Rc::clone(&self.structure),
        ))
    }

    /// Returns a view over records `k..` sharing this set's buffer.
    ///
    /// # Panics
    ///
    /// Panics if `k > len()`.
    pub fn tail(&self, k: usize) -> RecordSet {
        assert!(k <= self.nrecords);
        RecordSet {
            block: self.block.offset(self.structure.size() * k),
            nrecords: self.nrecords - k,
            structure: Rc::clone(&self.structure),
        }
    }

    /// Returns a view over records `..n` sharing this set's buffer.
    ///
    /// # Panics
    ///
    /// Panics if `n > len()`.
    pub fn head(&self, n: usize) -> RecordSet {
        assert!(n <= self.nrecords);
        RecordSet {
            block: self.block.clone(),
            nrecords: n,
            structure: Rc::clone(&self.structure),
        }
    }

    /// Reads the timestamp of record `i` without constructing a cell.
    pub(crate) fn raw_timestamp(&self, i: usize) -> i64 {
        self.block.read_i64(self.structure.size() * i)
    }

    /// Returns `true` if the records are nondecreasing by timestamp.
    pub fn is_sorted_by_timestamp(&self) -> bool {
        for i in 1..self.nrecords {
            if self.raw_timestamp(i - 1) > self.raw_timestamp(i) {
                return false;
            }
        }
        true
    }

    /// Reorders the records to be nondecreasing by timestamp.
    ///
    /// The set is rewritten into a fresh buffer; the relative order of
    /// records with equal timestamps is not specified. Sets that are
    /// already sorted are left untouched.
    pub fn sort_by_timestamp(&mut self) {
        if self.nrecords < 2 || self.is_sorted_by_timestamp() {
            return;
        }
        let stride = self.structure.size();
        let mut order: Vec<usize> = (0..self.nrecords).collect();
        order.sort_by_key(|&i| self.raw_timestamp(i));

        let sorted = BlockRef::new(MemoryBlock::new(stride * self.nrecords), 0);
        for (dst, &src) in order.iter().enumerate() {
            sorted
                .offset(stride * dst)
                .copy_from(&self.block.offset(stride * src), stride);
        }
        self.block = sorted;
    }

    /// Copies the raw record bytes into a fresh vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.block.to_vec(self.structure.size() * self.nrecords)
    }

    /// Renders the records as delimited text: fields joined by
    /// `field_delim`, records joined by `record_delim`.
    pub fn to_delimited(&self, field_delim: &str, record_delim: &str) -> String {
        let mut out = String::new();
        for i in 0..self.nrecords {
            if i > 0 {
                out.push_str(record_delim);
            }
            let record = Record::from_block(
                self.block.offset(self.structure.size() * i),
                Rc::clone(&self.structure),
            );
            for f in 0..self.structure.n_fields() {
                if f > 0 {
                    out.push_str(field_delim);
                }
                out.push_str(&record.cell(f).as_string());
            }
        }
        out
    }
}
