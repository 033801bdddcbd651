//! Record structures: ordered fields with byte offsets and a total size.
//!
//! A [`Structure`] is analogous to a C struct whose layout is defined at
//! runtime: an ordered list of [`Field`]s, the byte offset of each field and
//! the total record size. Structures are immutable once built and are shared
//! by the records, record sets and tables that use them.

use crate::error::{Error, Result};
use crate::field::Field;

/// Default field alignment in bytes.
///
/// Offsets are rounded up to a multiple of this when a structure is built
/// with [`Structure::new`] and `align > 1`.
pub const DEFAULT_ALIGN: usize = 4;

/// The frozen layout of a record.
#[derive(Debug)]
pub struct Structure {
    fields: Vec<Field>,
    offsets: Vec<usize>,
    size: usize,
}

impl Structure {
    /// Builds a structure by placing `fields` sequentially, rounding each
    /// next offset (and the total size) up to a multiple of `align`.
    ///
    /// Pass `align == 1` for a tightly packed layout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldSpecInvalid`] if `align` is zero, `fields` is
    /// empty or a field name repeats.
    pub fn new(fields: Vec<Field>, align: usize) -> Result<Self> {
        if align == 0 {
            return Err(Error::FieldSpecInvalid("alignment must be at least 1".into()));
        }
        Self::check_names(&fields)?;

        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        for field in &fields {
            offsets.push(offset);
            offset += field.kind().size();
            if align > 1 && offset % align != 0 {
                offset += align - offset % align;
            }
        }

        Ok(Self {
            fields,
            offsets,
            size: offset,
        })
    }

    /// Builds a structure from caller-supplied offsets and a total size,
    /// as when reconstructing a layout from storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldSpecInvalid`] if the offsets are not monotone,
    /// a field overruns its successor or the total size, or a name repeats.
    pub fn with_offsets(fields: Vec<Field>, offsets: Vec<usize>, size: usize) -> Result<Self> {
        if fields.len() != offsets.len() {
            return Err(Error::FieldSpecInvalid(
                "offset count does not match field count".into(),
            ));
        }
        Self::check_names(&fields)?;
        for (i, field) in fields.iter().enumerate() {
            let end = offsets[i] + field.kind().size();
            let limit = if i + 1 < fields.len() { offsets[i + 1] } else { size };
            if end > limit {
                return Err(Error::FieldSpecInvalid(format!(
                    "field '{}' overruns its slot",
                    field.name()
                )));
            }
        }

        Ok(Self {
            fields,
            offsets,
            size,
        })
    }

    fn check_names(fields: &[Field]) -> Result<()> {
        if fields.is_empty() {
            return Err(Error::FieldSpecInvalid("structure has no fields".into()));
        }
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name() == field.name()) {
                return Err(Error::FieldSpecInvalid(format!(
                    "duplicate field name '{}'",
                    field.name()
                )));
            }
        }
        Ok(())
    }

    /// Returns the total record size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of fields.
    pub fn n_fields(&self) -> usize {
        self.fields.len()
    }

    /// Returns the field at index `i`.
    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    /// Returns all fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the byte offset of field `i`.
    pub fn offset(&self, i: usize) -> usize {
        self.offsets[i]
    }

    /// Returns the storage size of field `i` in bytes.
    pub fn field_size(&self, i: usize) -> usize {
        self.fields[i].kind().size()
    }

    /// Finds a field index by name. Names are case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldMissing`] if no field has that name.
    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| Error::FieldMissing(name.to_string()))
    }

    /// Returns `true` if `other` has the same field count, kinds, sizes and
    /// offsets. Field names are metadata for lookup only and are ignored.
    pub fn same_layout(&self, other: &Structure) -> bool {
        self.size == other.size
            && self.offsets == other.offsets
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.kind() == b.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldKind;

    fn tick_fields() -> Vec<Field> {
        vec![
            Field::new("ts", FieldKind::Timestamp),
            Field::new("price", FieldKind::Double),
            Field::new("side", FieldKind::Int8),
        ]
    }

    #[test]
    fn test_aligned_layout() {
        let s = Structure::new(tick_fields(), 4).unwrap();
        assert_eq!(s.offset(0), 0);
        assert_eq!(s.offset(1), 8);
        assert_eq!(s.offset(2), 16);
        assert_eq!(s.size(), 20);
    }

    #[test]
    fn test_packed_layout() {
        let s = Structure::new(tick_fields(), 1).unwrap();
        assert_eq!(s.offset(2), 16);
        assert_eq!(s.size(), 17);
    }

    #[test]
    fn test_field_lookup() {
        let s = Structure::new(tick_fields(), 4).unwrap();
        assert_eq!(s.field_index("price").unwrap(), 1);
        assert!(matches!(
            s.field_index("Price"),
            Err(Error::FieldMissing(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let fields = vec![
            Field::new("x", FieldKind::Int32),
            Field::new("x", FieldKind::Double),
        ];
        assert!(matches!(
            Structure::new(fields, 4),
            Err(Error::FieldSpecInvalid(_))
        ));
    }

    #[test]
    fn test_with_offsets_validation() {
        let fields = vec![
            Field::new("ts", FieldKind::Timestamp),
            Field::new("rid", FieldKind::RecordId),
        ];
        let s = Structure::with_offsets(fields.clone(), vec![0, 8], 16).unwrap();
        assert_eq!(s.size(), 16);
        assert!(Structure::with_offsets(fields, vec![0, 4], 16).is_err());
    }

    #[test]
    fn test_same_layout_ignores_names() {
        let a = Structure::new(tick_fields(), 4).unwrap();
        let b = Structure::new(
            vec![
                Field::new("when", FieldKind::Timestamp),
                Field::new("px", FieldKind::Double),
                Field::new("flag", FieldKind::Int8),
            ],
            4,
        )
        .unwrap();
        assert!(a.same_layout(&b));

        let c = Structure::new(
            vec![
                Field::new("when", FieldKind::Timestamp),
                Field::new("px", FieldKind::Double),
                Field::new("flag", FieldKind::Int32),
            ],
            4,
        )
        .unwrap();
        assert!(!a.same_layout(&c));
    }
}
