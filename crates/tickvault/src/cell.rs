//! Typed cell views over record bytes.
//!
//! A [`Cell`] is a `(BlockRef, FieldKind)` pair addressing one field of one
//! record. It reads and writes scalars through a fixed conversion matrix;
//! anything outside the matrix fails with
//! [`Error::TypeConversion`](crate::error::Error::TypeConversion).
//!
//! Widening conversions (`Int8 -> Int32`, `Int32 -> Double`, `Date ->
//! Timestamp`) are always exact. Narrowing conversions are bounded:
//! `Double -> Int32` rejects |x| > 2 147 483 647 and truncates the
//! fraction, `Double -> Int8` and `Int32 -> Int8` reject |x| > 127.
//! Assigning an `Int32` to a Timestamp cell treats the value as an epoch
//! day count and writes `days * 86_400_000`.

use crate::block::BlockRef;
use crate::error::{Error, Result};
use crate::field::FieldKind;
use crate::time::{format_date, format_timestamp, MS_PER_DAY};
use std::fmt;

/// A typed view over the bytes of one record field.
#[derive(Debug, Clone)]
pub struct Cell {
    block: BlockRef,
    kind: FieldKind,
}

impl Cell {
    pub(crate) fn new(block: BlockRef, kind: FieldKind) -> Self {
        Self { block, kind }
    }

    /// Returns the kind of the underlying field.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    fn conversion_error(&self, wanted: &str) -> Error {
        Error::TypeConversion(format!("{} -> {}", self.kind.type_string(), wanted))
    }

    fn assign_error(&self, from: &str) -> Error {
        Error::TypeConversion(format!("{} -> {}", from, self.kind.type_string()))
    }

    /// Reads the cell as a double. Supported for Double, Int32, Int8,
    /// Timestamp and Date cells.
    pub fn as_f64(&self) -> Result<f64> {
        match self.kind {
            FieldKind::Double => Ok(self.block.read_f64(0)),
            FieldKind::Int32 => Ok(f64::from(self.block.read_i32(0))),
            FieldKind::Int8 => Ok(f64::from(self.block.read_i8(0))),
            FieldKind::Timestamp => Ok(self.block.read_i64(0) as f64),
            FieldKind::Date => Ok(f64::from(self.block.read_i32(0))),
            _ => Err(self.conversion_error("Double")),
        }
    }

    /// Reads the cell as a 32-bit integer. Supported for Int32, Int8 and
    /// Date cells.
    pub fn as_i32(&self) -> Result<i32> {
        match self.kind {
            FieldKind::Int32 => Ok(self.block.read_i32(0)),
            FieldKind::Int8 => Ok(i32::from(self.block.read_i8(0))),
            FieldKind::Date => Ok(self.block.read_i32(0)),
            _ => Err(self.conversion_error("Int32")),
        }
    }

    /// Reads the cell as an 8-bit integer. Supported for Int8 cells only.
    pub fn as_i8(&self) -> Result<i8> {
        match self.kind {
            FieldKind::Int8 => Ok(self.block.read_i8(0)),
            _ => Err(self.conversion_error("Int8")),
        }
    }

    /// Reads the cell as a character. Supported for Char cells only.
    pub fn as_char(&self) -> Result<char> {
        match self.kind {
            FieldKind::Char => Ok(char::from(self.block.read_u8(0))),
            _ => Err(self.conversion_error("Char")),
        }
    }

    /// Reads the cell as a millisecond timestamp. Supported for Timestamp
    /// cells and Date cells (midnight of the day).
    pub fn as_timestamp(&self) -> Result<i64> {
        match self.kind {
            FieldKind::Timestamp => Ok(self.block.read_i64(0)),
            FieldKind::Date => Ok(i64::from(self.block.read_i32(0)) * MS_PER_DAY),
            _ => Err(self.conversion_error("Timestamp")),
        }
    }

    /// Reads the cell as an epoch day count. Supported for Date cells only.
    pub fn as_date(&self) -> Result<i32> {
        match self.kind {
            FieldKind::Date => Ok(self.block.read_i32(0)),
            _ => Err(self.conversion_error("Date")),
        }
    }

    /// Reads the cell as a record id. Supported for RecordId cells only.
    pub fn as_record_id(&self) -> Result<u64> {
        match self.kind {
            FieldKind::RecordId => Ok(self.block.read_u64(0)),
            _ => Err(self.conversion_error("Record")),
        }
    }

    /// Renders the cell as a string. All kinds can be rendered.
    ///
    /// Timestamps print as `YYYY-MM-DDTHH:MM:SS.mmm` and dates as
    /// `YYYY-MM-DD`, both UTC. Record ids and Int8 values print as decimal
    /// integers. String cells stop at the first NUL byte.
    pub fn as_string(&self) -> String {
        match self.kind {
            FieldKind::Timestamp => format_timestamp(self.block.read_i64(0)),
            FieldKind::Date => format_date(self.block.read_i32(0)),
            FieldKind::Int32 => self.block.read_i32(0).to_string(),
            FieldKind::Int8 => self.block.read_i8(0).to_string(),
            FieldKind::Double => self.block.read_f64(0).to_string(),
            FieldKind::Char => char::from(self.block.read_u8(0)).to_string(),
            FieldKind::RecordId => self.block.read_u64(0).to_string(),
            FieldKind::Str(n) => {
                let mut bytes = vec![0u8; n];
                self.block.read_into(0, &mut bytes);
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(n);
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            }
        }
    }

    /// Assigns a double. Supported for Double, Int32 (bounded, fraction
    /// truncated) and Int8 (bounded) cells.
    pub fn set_f64(&self, value: f64) -> Result<()> {
        match self.kind {
            FieldKind::Double => {
                self.block.write_f64(0, value);
                Ok(())
            }
            FieldKind::Int32 => {
                if !value.is_finite() || value.abs() > 2_147_483_647.0 {
                    return Err(Error::TypeConversion(format!(
                        "double {} out of bounds for Int32",
                        value
                    )));
                }
                self.block.write_i32(0, value.trunc() as i32);
                Ok(())
            }
            FieldKind::Int8 => {
                if !value.is_finite() || value.abs() > 127.0 {
                    return Err(Error::TypeConversion(format!(
                        "double {} out of bounds for Int8",
                        value
                    )));
                }
                self.block.write_i8(0, value.trunc() as i8);
                Ok(())
            }
            _ => Err(self.assign_error("Double")),
        }
    }

    /// Assigns a signed 64-bit integer. Supported for Timestamp cells only.
    pub fn set_i64(&self, value: i64) -> Result<()> {
        match self.kind {
            FieldKind::Timestamp => {
                self.block.write_i64(0, value);
                Ok(())
            }
            _ => Err(self.assign_error("Int64")),
        }
    }

    /// Assigns a signed 32-bit integer. Supported for Int32, Int8
    /// (bounded), Date, Timestamp (value taken as an epoch day count) and
    /// Double cells.
    pub fn set_i32(&self, value: i32) -> Result<()> {
        match self.kind {
            FieldKind::Int32 => {
                self.block.write_i32(0, value);
                Ok(())
            }
            FieldKind::Int8 => {
                if value > 127 || value < -127 {
                    return Err(Error::TypeConversion(format!(
                        "int32 {} out of bounds for Int8",
                        value
                    )));
                }
                self.block.write_i8(0, value as i8);
                Ok(())
            }
            FieldKind::Date => {
                self.block.write_i32(0, value);
                Ok(())
            }
            FieldKind::Timestamp => {
                self.block.write_i64(0, i64::from(value) * MS_PER_DAY);
                Ok(())
            }
            FieldKind::Double => {
                self.block.write_f64(0, f64::from(value));
                Ok(())
            }
            _ => Err(self.assign_error("Int32")),
        }
    }

    /// Assigns a signed 8-bit integer. Supported for Int8, Int32, Double
    /// and Char cells (for Char, the bit pattern is stored).
    pub fn set_i8(&self, value: i8) -> Result<()> {
        match self.kind {
            FieldKind::Int8 => {
                self.block.write_i8(0, value);
                Ok(())
            }
            FieldKind::Int32 => {
                self.block.write_i32(0, i32::from(value));
                Ok(())
            }
            FieldKind::Double => {
                self.block.write_f64(0, f64::from(value));
                Ok(())
            }
            FieldKind::Char => {
                self.block.write_u8(0, value as u8);
                Ok(())
            }
            _ => Err(self.assign_error("Int8")),
        }
    }

    /// Assigns a character. Supported for Char cells only.
    pub fn set_char(&self, value: char) -> Result<()> {
        match self.kind {
            FieldKind::Char => {
                let byte = u8::try_from(u32::from(value)).map_err(|_| {
                    Error::TypeConversion(format!("char {:?} is not an 8-bit character", value))
                })?;
                self.block.write_u8(0, byte);
                Ok(())
            }
            _ => Err(self.assign_error("Char")),
        }
    }

    /// Assigns a record id. Supported for RecordId cells only.
    pub fn set_record_id(&self, value: u64) -> Result<()> {
        match self.kind {
            FieldKind::RecordId => {
                self.block.write_u64(0, value);
                Ok(())
            }
            _ => Err(self.assign_error("Record")),
        }
    }

    /// Parses a string and assigns it.
    ///
    /// Char cells take the first byte of the string (NUL when empty).
    /// Double, Int32 and Int8 cells parse the string as a number and fail
    /// with a conversion error on malformed input. String cells truncate or
    /// zero-pad to the field size. Other kinds reject string assignment.
    pub fn set_str(&self, value: &str) -> Result<()> {
        match self.kind {
            FieldKind::Char => {
                let byte = value.as_bytes().first().copied().unwrap_or(0);
                self.block.write_u8(0, byte);
                Ok(())
            }
            FieldKind::Double => {
                let parsed: f64 = value.trim().parse().map_err(|_| {
                    Error::TypeConversion(format!("cannot parse '{}' as Double", value))
                })?;
                self.set_f64(parsed)
            }
            FieldKind::Int32 => {
                let parsed: i32 = value.trim().parse().map_err(|_| {
                    Error::TypeConversion(format!("cannot parse '{}' as Int32", value))
                })?;
                self.block.write_i32(0, parsed);
                Ok(())
            }
            FieldKind::Int8 => {
                let parsed: i8 = value.trim().parse().map_err(|_| {
                    Error::TypeConversion(format!("cannot parse '{}' as Int8", value))
                })?;
                self.block.write_i8(0, parsed);
                Ok(())
            }
            FieldKind::Str(n) => {
                self.block.fill_zero(0, n);
                let bytes = value.as_bytes();
                let take = bytes.len().min(n);
                self.block.write_from(0, &bytes[..take]);
                Ok(())
            }
            _ => Err(self.assign_error("String")),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MemoryBlock;

    fn cell(kind: FieldKind) -> Cell {
        Cell::new(BlockRef::new(MemoryBlock::new(kind.size()), 0), kind)
    }

    #[test]
    fn test_double_reads() {
        let c = cell(FieldKind::Double);
        c.set_f64(1.5).unwrap();
        assert_eq!(c.as_f64().unwrap(), 1.5);

        let c = cell(FieldKind::Int32);
        c.set_i32(-12).unwrap();
        assert_eq!(c.as_f64().unwrap(), -12.0);

        let c = cell(FieldKind::Date);
        c.set_i32(365).unwrap();
        assert_eq!(c.as_f64().unwrap(), 365.0);

        let c = cell(FieldKind::Timestamp);
        c.set_i64(10_000).unwrap();
        assert_eq!(c.as_f64().unwrap(), 10_000.0);
    }

    #[test]
    fn test_double_to_int32_truncates() {
        let c = cell(FieldKind::Int32);
        c.set_f64(3.9).unwrap();
        assert_eq!(c.as_i32().unwrap(), 3);
        c.set_f64(-3.9).unwrap();
        assert_eq!(c.as_i32().unwrap(), -3);
    }

    #[test]
    fn test_bounded_conversions() {
        let c = cell(FieldKind::Int32);
        assert!(c.set_f64(2_147_483_648.0).is_err());
        assert!(c.set_f64(-2_147_483_648.0).is_err());
        assert!(c.set_f64(f64::NAN).is_err());
        c.set_f64(2_147_483_647.0).unwrap();

        let c = cell(FieldKind::Int8);
        assert!(c.set_f64(128.0).is_err());
        assert!(c.set_i32(128).is_err());
        assert!(c.set_i32(-128).is_err());
        c.set_i32(127).unwrap();
        assert_eq!(c.as_i8().unwrap(), 127);
    }

    #[test]
    fn test_int32_to_timestamp_is_days() {
        let c = cell(FieldKind::Timestamp);
        c.set_i32(2).unwrap();
        assert_eq!(c.as_timestamp().unwrap(), 2 * MS_PER_DAY);
    }

    #[test]
    fn test_int32_to_double_is_widening() {
        let c = cell(FieldKind::Double);
        c.set_i32(7).unwrap();
        assert_eq!(c.as_f64().unwrap(), 7.0);
    }

    #[test]
    fn test_date_to_timestamp() {
        let c = cell(FieldKind::Date);
        c.set_i32(3).unwrap();
        assert_eq!(c.as_timestamp().unwrap(), 3 * MS_PER_DAY);
    }

    #[test]
    fn test_unsupported_pairs_fail() {
        assert!(cell(FieldKind::Timestamp).set_f64(1.0).is_err());
        assert!(cell(FieldKind::Double).set_i64(1).is_err());
        assert!(cell(FieldKind::RecordId).set_i32(1).is_err());
        assert!(cell(FieldKind::Char).as_f64().is_err());
        assert!(cell(FieldKind::Str(4)).as_i32().is_err());
        assert!(cell(FieldKind::Timestamp).set_str("x").is_err());
    }

    #[test]
    fn test_string_field_truncate_and_pad() {
        let c = cell(FieldKind::Str(5));
        c.set_str("hello world").unwrap();
        assert_eq!(c.as_string(), "hello");
        c.set_str("hi").unwrap();
        assert_eq!(c.as_string(), "hi");
    }

    #[test]
    fn test_string_parse_into_numerics() {
        let c = cell(FieldKind::Double);
        c.set_str("1.25").unwrap();
        assert_eq!(c.as_f64().unwrap(), 1.25);
        assert!(c.set_str("not a number").is_err());

        let c = cell(FieldKind::Int32);
        c.set_str("-42").unwrap();
        assert_eq!(c.as_i32().unwrap(), -42);

        let c = cell(FieldKind::Int8);
        c.set_str("7").unwrap();
        assert_eq!(c.as_i8().unwrap(), 7);
    }

    #[test]
    fn test_char_from_string() {
        let c = cell(FieldKind::Char);
        c.set_str("abc").unwrap();
        assert_eq!(c.as_char().unwrap(), 'a');
        c.set_str("").unwrap();
        assert_eq!(c.as_char().unwrap(), '\0');
    }

    #[test]
    fn test_display_formats() {
        let c = cell(FieldKind::Timestamp);
        c.set_i64(10_000).unwrap();
        assert_eq!(c.to_string(), "1970-01-01T00:00:10.000");

        let c = cell(FieldKind::Date);
        c.set_i32(0).unwrap();
        assert_eq!(c.to_string(), "1970-01-01");

        let c = cell(FieldKind::RecordId);
        c.set_record_id(42).unwrap();
        assert_eq!(c.to_string(), "42");

        let c = cell(FieldKind::Int8);
        c.set_i8(65).unwrap();
        assert_eq!(c.to_string(), "65");

        let c = cell(FieldKind::Char);
        c.set_char('A').unwrap();
        assert_eq!(c.to_string(), "A");
    }
}
