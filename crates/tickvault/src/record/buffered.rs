//! Windowed lazy views over table record ranges.

use crate::block::{BlockRef, MemoryBlock};
use crate::error::{Error, Result};
use crate::record::Record;
use crate::table::Table;
use std::rc::Rc;

/// Number of records materialized per window.
pub const WINDOW_SIZE: u64 = 65_000;

#[derive(Debug)]
struct Window {
    block: BlockRef,
    /// Index of the first buffered record, relative to the range start.
    first: u64,
    len: u64,
}

/// A lazy view over an inclusive record range `[first, last]` of a table.
///
/// Indexing loads a window of up to [`WINDOW_SIZE`] records on demand; the
/// returned [`Record`]s are copies and stay valid across window reloads.
/// The direction flag selects forward windows (the default) or reverse
/// windows ending at the requested index, which avoids reloading on every
/// step when a caller streams backwards.
#[derive(Debug)]
pub struct BufferedRecordSet<'t> {
    table: Option<&'t Table>,
    first: u64,
    last: u64,
    window: Option<Window>,
    reverse: bool,
}

impl<'t> BufferedRecordSet<'t> {
    pub(crate) fn new(table: &'t Table, first: u64, last: u64) -> Self {
        Self {
            table: Some(table),
            first,
            last,
            window: None,
            reverse: false,
        }
    }

    /// Creates an empty set not linked to any table.
    pub fn empty() -> BufferedRecordSet<'static> {
        BufferedRecordSet {
            table: None,
            first: 0,
            last: 0,
            window: None,
            reverse: false,
        }
    }

    /// Returns the number of records addressable through this view.
    pub fn len(&self) -> u64 {
        if self.table.is_none() {
            0
        } else {
            self.last - self.first + 1
        }
    }

    /// Returns `true` if the view addresses no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the table record id of the first record in the range, or
    /// `None` for an empty view.
    pub fn first_record_id(&self) -> Option<u64> {
        self.table.map(|_| self.first)
    }

    /// Selects reverse window loading: subsequent windows end at the
    /// requested index instead of starting at it.
    pub fn set_reverse(&mut self, reverse: bool) {
        self.reverse = reverse;
    }

    /// Returns a copy of the record at index `i`, relative to the start of
    /// the range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `i` is outside the range.
    pub fn record(&mut self, i: u64) -> Result<Record> {
        let table = self.table.ok_or(Error::IndexOutOfRange { index: i, size: 0 })?;
        if i > self.last - self.first {
            return Err(Error::IndexOutOfRange {
                index: i,
                size: self.len(),
            });
        }

        let in_window = self
            .window
            .as_ref()
            .is_some_and(|w| i >= w.first && i < w.first + w.len);
        if !in_window {
            self.load_window(i)?;
        }
        let window = self.window.as_ref().expect("window loaded");

        let stride = table.structure().size();
        let copy = BlockRef::new(MemoryBlock::new(stride), 0);
        copy.copy_from(
            &window.block.offset((i - window.first) as usize * stride),
            stride,
        );
        Ok(Record::from_block(copy, Rc::clone(table.structure())))
    }

    fn load_window(&mut self, i: u64) -> Result<()> {
        let table = self.table.expect("checked by caller");
        let (win_first, win_len) = if self.reverse {
            let len = WINDOW_SIZE.min(i + 1);
            (i - (len - 1), len)
        } else {
            let len = WINDOW_SIZE.min(self.last - (self.first + i) + 1);
            (i, len)
        };
        let block = table.read_block(self.first + win_first, self.first + win_first + win_len - 1)?;
        self.window = Some(Window {
            block,
            first: win_first,
            len: win_len,
        });
        Ok(())
    }
}
