//! Tables: a record structure bound to a persistent container table.
//!
//! A [`Table`] owns the binding between a [`Structure`] and a named table
//! inside a container group. The structure is frozen at creation and
//! serialized into per-table attributes (`FIELD_i_NAME`, `FIELD_i_TYPE`,
//! `TITLE`); opening reconstructs it from those attributes and the stored
//! field offsets. Single-record appends go through a bounded in-memory
//! buffer that flushes on overflow, on demand and on drop.

use crate::block::{BlockRef, MemoryBlock};
use crate::container::{Container, ContainerField, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::field::{Field, FieldKind};
use crate::record::{BufferedRecordSet, Record, RecordSet};
use crate::structure::Structure;
use std::rc::Rc;
use tracing::warn;

/// Capacity of the in-memory append buffer, in records.
pub const APPEND_BUFFER_SIZE: usize = 1000;

/// A persistent table of equally sized records.
#[derive(Debug)]
pub struct Table {
    container: Container,
    group: String,
    name: String,
    title: String,
    structure: Rc<Structure>,
    append_buffer: Option<BlockRef>,
    buffered: usize,
}

impl Table {
    /// Creates a new table under `group` and writes its structure into the
    /// `FIELD_i_NAME` / `FIELD_i_TYPE` attributes and the `TITLE`
    /// attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableExists`] if the name is already taken.
    pub fn create(
        container: &Container,
        group: &str,
        name: &str,
        title: &str,
        structure: Rc<Structure>,
    ) -> Result<Self> {
        let fields: Vec<ContainerField> = (0..structure.n_fields())
            .map(|i| ContainerField {
                name: structure.field(i).name().to_string(),
                offset: structure.offset(i) as u32,
                size: structure.field_size(i) as u32,
                tag: structure.field(i).kind().wire_tag(),
            })
            .collect();
        container.create_table(
            group,
            name,
            &fields,
            structure.size() as u32,
            DEFAULT_CHUNK_SIZE,
        )?;

        container.set_attribute(group, name, "TITLE", title)?;
        for i in 0..structure.n_fields() {
            container.set_attribute(
                group,
                name,
                &format!("FIELD_{}_NAME", i),
                structure.field(i).name(),
            )?;
            container.set_attribute(
                group,
                name,
                &format!("FIELD_{}_TYPE", i),
                &structure.field(i).kind().type_string(),
            )?;
        }

        Ok(Self {
            container: container.clone(),
            group: group.to_string(),
            name: name.to_string(),
            title: title.to_string(),
            structure,
            append_buffer: None,
            buffered: 0,
        })
    }

    /// Opens an existing table, rebuilding its structure from the stored
    /// attributes and field offsets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableMissing`] if the table is absent,
    /// [`Error::TableCorrupt`] if its attributes are incomplete and
    /// [`Error::FieldSpecInvalid`] if a stored type string does not parse.
    pub fn open(container: &Container, group: &str, name: &str) -> Result<Self> {
        if !container.has_table(group, name) {
            return Err(Error::TableMissing(format!("{}/{}", group, name)));
        }
        let (stride, container_fields) = container.table_fields(group, name)?;

        let title = container
            .attribute(group, name, "TITLE")?
            .ok_or_else(|| Error::TableCorrupt(format!("{}/{}: missing TITLE", group, name)))?;

        let mut fields = Vec::with_capacity(container_fields.len());
        let mut offsets = Vec::with_capacity(container_fields.len());
        for (i, container_field) in container_fields.iter().enumerate() {
            let type_string = container
                .attribute(group, name, &format!("FIELD_{}_TYPE", i))?
                .ok_or_else(|| {
                    Error::TableCorrupt(format!("{}/{}: missing FIELD_{}_TYPE", group, name, i))
                })?;
            let field_name = container
                .attribute(group, name, &format!("FIELD_{}_NAME", i))?
                .ok_or_else(|| {
                    Error::TableCorrupt(format!("{}/{}: missing FIELD_{}_NAME", group, name, i))
                })?;
            let kind = FieldKind::parse(&type_string)?;
            if kind.size() != container_field.size as usize {
                return Err(Error::TableCorrupt(format!(
                    "{}/{}: field '{}' is {} declared as {} bytes, stored as {}",
                    group,
                    name,
                    field_name,
                    type_string,
                    kind.size(),
                    container_field.size
                )));
            }
            // The attribute and the table's wire tag describe the same
            // field independently; a disagreement means one of them was
            // rewritten or corrupted.
            if kind.wire_tag() != container_field.tag {
                return Err(Error::TableCorrupt(format!(
                    "{}/{}: field '{}' attribute says {} but wire tag is {}",
                    group, name, field_name, type_string, container_field.tag
                )));
            }
            fields.push(Field::new(field_name, kind));
            offsets.push(container_field.offset as usize);
        }
        let structure = Rc::new(Structure::with_offsets(fields, offsets, stride as usize)?);

        Ok(Self {
            container: container.clone(),
            group: group.to_string(),
            name: name.to_string(),
            title,
            structure,
            append_buffer: None,
            buffered: 0,
        })
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the table title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns the structure shared by all records of this table.
    pub fn structure(&self) -> &Rc<Structure> {
        &self.structure
    }

    /// Returns the number of records stored in the table.
    ///
    /// Records sitting in the append buffer are not counted until flushed.
    pub fn size(&self) -> Result<u64> {
        self.container.row_count(&self.group, &self.name)
    }

    /// Reads the raw bytes of records `first..=last` into a fresh block.
    pub(crate) fn read_block(&self, first: u64, last: u64) -> Result<BlockRef> {
        let size = self.size()?;
        if first >= size || last >= size {
            return Err(Error::IndexOutOfRange {
                index: first.max(last),
                size,
            });
        }
        if last < first {
            return Err(Error::BadRange(format!(
                "last record {} is before first record {}",
                last, first
            )));
        }
        let bytes = self
            .container
            .read_rows(&self.group, &self.name, first, last)?;
        Ok(BlockRef::new(MemoryBlock::from_vec(bytes), 0))
    }

    /// Reads records `first..=last` (inclusive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if either bound is at or beyond
    /// the table size, and [`Error::BadRange`] if `last < first`.
    pub fn read_records(&self, first: u64, last: u64) -> Result<RecordSet> {
        let block = self.read_block(first, last)?;
        Ok(RecordSet::from_block(
            block,
            (last - first + 1) as usize,
            Rc::clone(&self.structure),
        ))
    }

    /// Returns the last record of the table, or `None` if it is empty.
    pub fn last_record(&self) -> Result<Option<Record>> {
        let size = self.size()?;
        if size == 0 {
            return Ok(None);
        }
        let set = self.read_records(size - 1, size - 1)?;
        Ok(Some(set.record(0)?))
    }

    /// Appends a batch of records directly, bypassing the append buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureMismatch`] if the batch layout differs
    /// from the table layout.
    pub fn append_records(&self, records: &RecordSet) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if !records.structure().same_layout(&self.structure) {
            return Err(Error::StructureMismatch);
        }
        self.container.append_rows(
            &self.group,
            &self.name,
            records.len() as u64,
            &records.to_vec(),
        )
    }

    /// Copies one record into the append buffer, flushing the buffer to
    /// the container when it fills.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StructureMismatch`] unless the record was built
    /// from this table's structure instance.
    pub fn append_record(&mut self, record: &Record) -> Result<()> {
        if !Rc::ptr_eq(record.structure(), &self.structure) {
            return Err(Error::StructureMismatch);
        }
        let stride = self.structure.size();
        let buffer = self
            .append_buffer
            .get_or_insert_with(|| BlockRef::new(MemoryBlock::new(stride * APPEND_BUFFER_SIZE), 0));
        buffer
            .offset(stride * self.buffered)
            .copy_from(record.block(), stride);
        self.buffered += 1;

        if self.buffered == APPEND_BUFFER_SIZE {
            self.flush_append_buffer()?;
        }
        Ok(())
    }

    /// Returns the number of records waiting in the append buffer.
    pub fn append_buffer_len(&self) -> usize {
        self.buffered
    }

    /// Flushes the append buffer to the container. A no-op when empty.
    pub fn flush_append_buffer(&mut self) -> Result<()> {
        if self.buffered == 0 {
            return Ok(());
        }
        let stride = self.structure.size();
        let buffer = self.append_buffer.as_ref().expect("buffered > 0");
        let bytes = buffer.to_vec(stride * self.buffered);
        self.container
            .append_rows(&self.group, &self.name, self.buffered as u64, &bytes)?;
        self.buffered = 0;
        Ok(())
    }

    /// Returns a windowed lazy view over records `first..=last`.
    pub fn buffered_record_set(&self, first: u64, last: u64) -> BufferedRecordSet<'_> {
        BufferedRecordSet::new(self, first, last)
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        // Best effort; callers that need to observe flush errors flush
        // explicitly beforehand.
        if let Err(e) = self.flush_append_buffer() {
            warn!(table = %self.name, "failed to flush append buffer on drop: {}", e);
        }
    }
}
