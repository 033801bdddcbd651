//! Shared byte buffers and offset views into them.
//!
//! A [`MemoryBlock`] owns a heap buffer of a fixed size. A [`BlockRef`] is a
//! `(shared block, byte offset)` pair: the light view type that records,
//! record sets and cells are built on. A `BlockRef` keeps its backing block
//! alive, and composing offsets is associative:
//! `r.offset(a).offset(b)` addresses the same bytes as `r.offset(a + b)`.
//!
//! The engine is single-threaded per file handle, so sharing uses `Rc` and
//! interior mutability uses `RefCell`; none of these types are `Send`.

use std::cell::RefCell;
use std::rc::Rc;

/// An owned, fixed-size, interior-mutable byte buffer.
#[derive(Debug)]
pub struct MemoryBlock {
    len: usize,
    data: RefCell<Box<[u8]>>,
}

impl MemoryBlock {
    /// Allocates a zero-filled block of `len` bytes.
    pub fn new(len: usize) -> Rc<Self> {
        Rc::new(Self {
            len,
            data: RefCell::new(vec![0u8; len].into_boxed_slice()),
        })
    }

    /// Wraps an existing buffer without copying.
    pub fn from_vec(bytes: Vec<u8>) -> Rc<Self> {
        Rc::new(Self {
            len: bytes.len(),
            data: RefCell::new(bytes.into_boxed_slice()),
        })
    }

    /// Returns the size of the block in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the block holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A shared view into a [`MemoryBlock`] starting at a byte offset.
#[derive(Debug, Clone)]
pub struct BlockRef {
    block: Rc<MemoryBlock>,
    offset: usize,
}

impl BlockRef {
    /// Creates a view into `block` starting at `offset`.
    pub fn new(block: Rc<MemoryBlock>, offset: usize) -> Self {
        debug_assert!(offset <= block.len());
        Self { block, offset }
    }

    /// Returns a new view advanced by `extra` bytes.
    pub fn offset(&self, extra: usize) -> Self {
        Self::new(Rc::clone(&self.block), self.offset + extra)
    }

    /// Returns the offset of this view within its block.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Returns the number of bytes addressable through this view.
    pub fn remaining(&self) -> usize {
        self.block.len() - self.offset
    }

    /// Returns the backing block handle.
    pub fn memory_block(&self) -> &Rc<MemoryBlock> {
        &self.block
    }

    /// Copies `out.len()` bytes starting at `at` into `out`.
    pub fn read_into(&self, at: usize, out: &mut [u8]) {
        let data = self.block.data.borrow();
        let start = self.offset + at;
        out.copy_from_slice(&data[start..start + out.len()]);
    }

    /// Writes `src` starting at `at`.
    pub fn write_from(&self, at: usize, src: &[u8]) {
        let mut data = self.block.data.borrow_mut();
        let start = self.offset + at;
        data[start..start + src.len()].copy_from_slice(src);
    }

    /// Zeroes `len` bytes starting at `at`.
    pub fn fill_zero(&self, at: usize, len: usize) {
        let mut data = self.block.data.borrow_mut();
        let start = self.offset + at;
        data[start..start + len].fill(0);
    }

    /// Copies `len` bytes from the start of `src` to the start of this view.
    ///
    /// The two views may share a backing block as long as the spans do not
    /// overlap.
    pub fn copy_from(&self, src: &BlockRef, len: usize) {
        if Rc::ptr_eq(&self.block, &src.block) {
            if self.offset == src.offset {
                return;
            }
            let mut data = self.block.data.borrow_mut();
            data.copy_within(src.offset..src.offset + len, self.offset);
        } else {
            let src_data = src.block.data.borrow();
            let mut dst_data = self.block.data.borrow_mut();
            dst_data[self.offset..self.offset + len]
                .copy_from_slice(&src_data[src.offset..src.offset + len]);
        }
    }

    /// Copies `len` bytes starting at the view into a fresh vector.
    pub fn to_vec(&self, len: usize) -> Vec<u8> {
        let data = self.block.data.borrow();
        data[self.offset..self.offset + len].to_vec()
    }

    /// Reads a little-endian `i64` at `at`.
    pub fn read_i64(&self, at: usize) -> i64 {
        let mut buf = [0u8; 8];
        self.read_into(at, &mut buf);
        i64::from_le_bytes(buf)
    }

    /// Reads a little-endian `u64` at `at`.
    pub fn read_u64(&self, at: usize) -> u64 {
        let mut buf = [0u8; 8];
        self.read_into(at, &mut buf);
        u64::from_le_bytes(buf)
    }

    /// Reads a little-endian `i32` at `at`.
    pub fn read_i32(&self, at: usize) -> i32 {
        let mut buf = [0u8; 4];
        self.read_into(at, &mut buf);
        i32::from_le_bytes(buf)
    }

    /// Reads a little-endian `f64` at `at`.
    pub fn read_f64(&self, at: usize) -> f64 {
        let mut buf = [0u8; 8];
        self.read_into(at, &mut buf);
        f64::from_le_bytes(buf)
    }

    /// Reads a single byte at `at`.
    pub fn read_u8(&self, at: usize) -> u8 {
        let mut buf = [0u8; 1];
        self.read_into(at, &mut buf);
        buf[0]
    }

    /// Reads a signed byte at `at`.
    pub fn read_i8(&self, at: usize) -> i8 {
        self.read_u8(at) as i8
    }

    /// Writes a little-endian `i64` at `at`.
    pub fn write_i64(&self, at: usize, value: i64) {
        self.write_from(at, &value.to_le_bytes());
    }

    /// Writes a little-endian `u64` at `at`.
    pub fn write_u64(&self, at: usize, value: u64) {
        self.write_from(at, &value.to_le_bytes());
    }

    /// Writes a little-endian `i32` at `at`.
    pub fn write_i32(&self, at: usize, value: i32) {
        self.write_from(at, &value.to_le_bytes());
    }

    /// Writes a little-endian `f64` at `at`.
    pub fn write_f64(&self, at: usize, value: f64) {
        self.write_from(at, &value.to_le_bytes());
    }

    /// Writes a single byte at `at`.
    pub fn write_u8(&self, at: usize, value: u8) {
        self.write_from(at, &[value]);
    }

    /// Writes a signed byte at `at`.
    pub fn write_i8(&self, at: usize, value: i8) {
        self.write_u8(at, value as u8);
    }
}
