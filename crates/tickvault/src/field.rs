//! Field kinds and named fields.
//!
//! A [`FieldKind`] is one of the fixed-width cell types a record can carry.
//! Each kind has a fixed byte size and a canonical type string used when the
//! structure is serialized into table attributes:
//! `Timestamp | Date | Int32 | Int8 | Char | Double | Record | String(<n>)`.

use crate::error::{Error, Result};
use std::fmt;

/// The declared type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 64-bit signed integer, milliseconds since 1970-01-01T00:00:00 UTC.
    ///
    /// Integer timestamps are used to eliminate the inaccuracies of
    /// floating-point comparisons.
    Timestamp,
    /// 32-bit signed integer, whole days since 1970-01-01 UTC.
    Date,
    /// 32-bit signed integer.
    Int32,
    /// 8-bit signed integer.
    Int8,
    /// 64-bit IEEE-754 floating point number. Missing values are quiet NaNs.
    Double,
    /// A single 8-bit character.
    Char,
    /// 64-bit unsigned record id referring to another record by index.
    RecordId,
    /// Fixed-size zero-padded string of `n` bytes, `n >= 1`.
    Str(usize),
}

impl FieldKind {
    /// Returns the storage size of the kind in bytes.
    pub fn size(&self) -> usize {
        match self {
            FieldKind::Timestamp => 8,
            FieldKind::Date => 4,
            FieldKind::Int32 => 4,
            FieldKind::Int8 => 1,
            FieldKind::Double => 8,
            FieldKind::Char => 1,
            FieldKind::RecordId => 8,
            FieldKind::Str(n) => *n,
        }
    }

    /// Returns the canonical type string, e.g. `Timestamp` or `String(13)`.
    pub fn type_string(&self) -> String {
        match self {
            FieldKind::Timestamp => "Timestamp".to_string(),
            FieldKind::Date => "Date".to_string(),
            FieldKind::Int32 => "Int32".to_string(),
            FieldKind::Int8 => "Int8".to_string(),
            FieldKind::Double => "Double".to_string(),
            FieldKind::Char => "Char".to_string(),
            FieldKind::RecordId => "Record".to_string(),
            FieldKind::Str(n) => format!("String({})", n),
        }
    }

    /// Parses a canonical type string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldSpecInvalid`] for anything outside the grammar,
    /// including `String(<n>)` with `n < 1`.
    pub fn parse(spec: &str) -> Result<Self> {
        match spec {
            "Timestamp" => Ok(FieldKind::Timestamp),
            "Date" => Ok(FieldKind::Date),
            "Int32" => Ok(FieldKind::Int32),
            "Int8" => Ok(FieldKind::Int8),
            "Double" => Ok(FieldKind::Double),
            "Char" => Ok(FieldKind::Char),
            "Record" => Ok(FieldKind::RecordId),
            other => {
                let inner = other
                    .strip_prefix("String(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| Error::FieldSpecInvalid(other.to_string()))?;
                let n: usize = inner
                    .parse()
                    .map_err(|_| Error::FieldSpecInvalid(other.to_string()))?;
                if n < 1 {
                    return Err(Error::FieldSpecInvalid(other.to_string()));
                }
                Ok(FieldKind::Str(n))
            }
        }
    }

    /// Returns the wire type tag recorded in the container's table metadata.
    pub fn wire_tag(&self) -> u8 {
        match self {
            FieldKind::Timestamp => 1,
            FieldKind::Date => 2,
            FieldKind::Int32 => 3,
            FieldKind::Int8 => 4,
            FieldKind::Double => 5,
            FieldKind::Char => 6,
            FieldKind::RecordId => 7,
            FieldKind::Str(_) => 8,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_string())
    }
}

/// A named field within a record structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    kind: FieldKind,
}

impl Field {
    /// Creates a field from a name and kind.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Returns the field name. Names are case-sensitive.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field kind.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(FieldKind::Timestamp.size(), 8);
        assert_eq!(FieldKind::Date.size(), 4);
        assert_eq!(FieldKind::Int32.size(), 4);
        assert_eq!(FieldKind::Int8.size(), 1);
        assert_eq!(FieldKind::Double.size(), 8);
        assert_eq!(FieldKind::Char.size(), 1);
        assert_eq!(FieldKind::RecordId.size(), 8);
        assert_eq!(FieldKind::Str(13).size(), 13);
    }

    #[test]
    fn test_type_string_roundtrip() {
        let kinds = [
            FieldKind::Timestamp,
            FieldKind::Date,
            FieldKind::Int32,
            FieldKind::Int8,
            FieldKind::Double,
            FieldKind::Char,
            FieldKind::RecordId,
            FieldKind::Str(13),
        ];
        for kind in kinds {
            assert_eq!(FieldKind::parse(&kind.type_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        for bad in [
            "timestamp",
            "INT32",
            "String",
            "String()",
            "String(0)",
            "String(-1)",
            "String(abc)",
            "String(3",
            "Float",
            "",
        ] {
            assert!(
                matches!(FieldKind::parse(bad), Err(Error::FieldSpecInvalid(_))),
                "expected {:?} to be rejected",
                bad
            );
        }
    }
}
