use std::fmt;

use crate::common::{Result, StorageError};

/// Represents the data types supported by the engine.
/// Each type has a fixed or variable size and specific serialization rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer: 4 bytes, big-endian
    Integer,

    /// 64-bit floating point: 8 bytes, IEEE 754, big-endian
    Double,

    /// Character string of at most n characters.
    /// Stored as: length (2 bytes) + UTF-8 data
    Char(u32),

    /// Variable-length character string of at most n characters.
    /// Stored as: length (2 bytes) + UTF-8 data
    VarChar(u32),

    /// Boolean type: 1 byte (0 = false, 1 = true)
    Boolean,
}

impl DataType {
    /// Returns true if this type has a fixed size in bytes.
    pub fn is_fixed_size(&self) -> bool {
        self.fixed_size().is_some()
    }

    /// Returns the fixed size in bytes, or None for string types.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            DataType::Integer => Some(4),
            DataType::Double => Some(8),
            DataType::Boolean => Some(1),
            DataType::Char(_) | DataType::VarChar(_) => None,
        }
    }

    /// Declared length: the byte width for fixed types, the character
    /// limit for string types.
    pub fn length(&self) -> u32 {
        match self {
            DataType::Integer => 4,
            DataType::Double => 8,
            DataType::Boolean => 1,
            DataType::Char(n) | DataType::VarChar(n) => *n,
        }
    }

    /// Returns true for the types whose catalog entry carries a length field.
    pub fn has_length(&self) -> bool {
        matches!(self, DataType::Char(_) | DataType::VarChar(_))
    }

    /// Returns the 3-bit type tag used in catalog attribute flags.
    pub fn type_tag(&self) -> u8 {
        match self {
            DataType::Integer => 0,
            DataType::Double => 1,
            DataType::Char(_) => 2,
            DataType::VarChar(_) => 3,
            DataType::Boolean => 4,
        }
    }

    /// Rebuilds a type from its tag. `length` is only consulted for the
    /// string types.
    pub fn from_tag(tag: u8, length: u32) -> Result<Self> {
        match tag {
            0 => Ok(DataType::Integer),
            1 => Ok(DataType::Double),
            2 => Ok(DataType::Char(length)),
            3 => Ok(DataType::VarChar(length)),
            4 => Ok(DataType::Boolean),
            _ => Err(StorageError::UnknownTypeTag(tag)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Double => write!(f, "DOUBLE"),
            DataType::Char(n) => write!(f, "CHAR({})", n),
            DataType::VarChar(n) => write!(f, "VARCHAR({})", n),
            DataType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size_types() {
        assert!(DataType::Boolean.is_fixed_size());
        assert!(DataType::Integer.is_fixed_size());
        assert!(!DataType::Char(10).is_fixed_size());
        assert!(!DataType::VarChar(100).is_fixed_size());
    }

    #[test]
    fn test_lengths() {
        assert_eq!(DataType::Integer.length(), 4);
        assert_eq!(DataType::Double.length(), 8);
        assert_eq!(DataType::Boolean.length(), 1);
        assert_eq!(DataType::Char(20).length(), 20);
        assert_eq!(DataType::VarChar(100).fixed_size(), None);
    }

    #[test]
    fn test_tags() {
        let types = [
            DataType::Integer,
            DataType::Double,
            DataType::Char(5),
            DataType::VarChar(255),
            DataType::Boolean,
        ];

        for dt in types {
            let recovered = DataType::from_tag(dt.type_tag(), dt.length()).unwrap();
            assert_eq!(dt, recovered);
        }
        assert!(matches!(
            DataType::from_tag(7, 0),
            Err(StorageError::UnknownTypeTag(7))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::Integer.to_string(), "INTEGER");
        assert_eq!(DataType::VarChar(100).to_string(), "VARCHAR(100)");
        assert_eq!(DataType::Char(10).to_string(), "CHAR(10)");
    }
}
