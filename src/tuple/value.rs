use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};

use super::DataType;

/// Represents a typed value that can be stored in a record.
/// Each variant corresponds to a DataType and holds the actual data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value - can be any type
    Null,

    /// 32-bit signed integer
    Integer(i32),

    /// 64-bit floating point
    Double(f64),

    /// Boolean value
    Boolean(bool),

    /// String value (used for both Char and VarChar)
    String(String),
}

impl Value {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Double(_) => "DOUBLE",
            Value::Boolean(_) => "BOOLEAN",
            Value::String(_) => "STRING",
        }
    }

    /// Returns true if this non-null value can be stored in a column of the
    /// given type. Length limits are checked separately.
    pub fn matches_type(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Integer(_), DataType::Integer)
                | (Value::Double(_), DataType::Double)
                | (Value::Boolean(_), DataType::Boolean)
                | (Value::String(_), DataType::Char(_))
                | (Value::String(_), DataType::VarChar(_))
        )
    }

    /// Converts the value to the column type where a lossless widening
    /// exists (INTEGER into DOUBLE). Returns None otherwise.
    pub fn coerce(&self, data_type: &DataType) -> Option<Value> {
        match (self, data_type) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Integer(v), DataType::Double) => Some(Value::Double(*v as f64)),
            (v, dt) if v.matches_type(dt) => Some(v.clone()),
            _ => None,
        }
    }

    /// Number of bytes `write_to` produces for this value. Nulls occupy
    /// only their bitmap bit.
    pub fn encoded_len(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Integer(_) => 4,
            Value::Double(_) => 8,
            Value::Boolean(_) => 1,
            Value::String(s) => 2 + s.len(),
        }
    }

    /// Serializes a non-null value. Integers and doubles are big-endian,
    /// strings are a u16 byte length followed by UTF-8 data.
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        match self {
            Value::Null => {}
            Value::Integer(v) => buf.put_i32(*v),
            Value::Double(v) => buf.put_f64(*v),
            Value::Boolean(b) => buf.put_u8(u8::from(*b)),
            Value::String(s) => {
                buf.put_u16(s.len() as u16);
                buf.put_slice(s.as_bytes());
            }
        }
    }

    /// Deserializes a non-null value of the given type.
    /// Returns None if the buffer is too short or the string is not UTF-8.
    pub fn read_from<B: Buf>(buf: &mut B, data_type: &DataType) -> Option<Value> {
        match data_type {
            DataType::Integer => {
                if buf.remaining() < 4 {
                    return None;
                }
                Some(Value::Integer(buf.get_i32()))
            }
            DataType::Double => {
                if buf.remaining() < 8 {
                    return None;
                }
                Some(Value::Double(buf.get_f64()))
            }
            DataType::Boolean => {
                if buf.remaining() < 1 {
                    return None;
                }
                Some(Value::Boolean(buf.get_u8() != 0))
            }
            DataType::Char(_) | DataType::VarChar(_) => {
                if buf.remaining() < 2 {
                    return None;
                }
                let len = buf.get_u16() as usize;
                if buf.remaining() < len {
                    return None;
                }
                let mut bytes = vec![0u8; len];
                buf.copy_to_slice(&mut bytes);
                String::from_utf8(bytes).ok().map(Value::String)
            }
        }
    }

    /// Compares two values for ordering.
    /// Returns None if the values are not comparable (different types or null).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) | (_, Value::Null) => None,

            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),

            (Value::Integer(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),

            _ => None, // Incompatible types
        }
    }

    /// Total order over all values: NULL sorts first, then booleans, then
    /// numbers (integers and doubles compared by value), then strings.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        fn rank(value: &Value) -> u8 {
            match value {
                Value::Null => 0,
                Value::Boolean(_) => 1,
                Value::Integer(_) | Value::Double(_) => 2,
                Value::String(_) => 3,
            }
        }

        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Integer(a), Value::Double(b)) => (*a as f64).total_cmp(b),
            (Value::Double(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => rank(self).cmp(&rank(other)),
        }
    }

    /// Equality used for uniqueness checks: NULL never collides with
    /// anything, everything else is equal under [`Value::total_cmp`].
    pub fn same_key(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        self.total_cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "'{}'", s),
        }
    }
}

// Convenience conversions
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        value.write_to(&mut buf);
        buf
    }

    #[test]
    fn test_integer_serialization() {
        let val = Value::Integer(42);
        let bytes = encode(&val);
        assert_eq!(bytes, vec![0, 0, 0, 42]);
        assert_eq!(bytes.len(), val.encoded_len());

        let recovered = Value::read_from(&mut bytes.as_slice(), &DataType::Integer).unwrap();
        assert_eq!(recovered, val);
    }

    #[test]
    fn test_varchar_serialization() {
        let val = Value::String("hello".to_string());
        let bytes = encode(&val);
        assert_eq!(bytes, vec![0, 5, b'h', b'e', b'l', b'l', b'o']);

        let mut slice = bytes.as_slice();
        let recovered = Value::read_from(&mut slice, &DataType::VarChar(100)).unwrap();
        assert_eq!(recovered, val);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_truncated_input() {
        let bytes = [0u8, 9, b'a'];
        assert_eq!(Value::read_from(&mut &bytes[..], &DataType::Char(9)), None);
        assert_eq!(Value::read_from(&mut &bytes[..2], &DataType::Integer), None);
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            Value::Integer(10).compare(&Value::Integer(20)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::Integer(10).compare(&Value::Double(5.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::String("abc".into()).compare(&Value::String("abd".into())),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Integer(1).compare(&Value::Boolean(true)), None);
    }

    #[test]
    fn test_total_order() {
        assert_eq!(Value::Null.total_cmp(&Value::Integer(i32::MIN)), Ordering::Less);
        assert_eq!(Value::Integer(2).total_cmp(&Value::Double(1.5)), Ordering::Greater);
        assert_eq!(Value::Integer(1).total_cmp(&Value::Double(1.0)), Ordering::Equal);
        assert_eq!(Value::Boolean(true).total_cmp(&Value::Integer(0)), Ordering::Less);
        assert_eq!(Value::from("a").total_cmp(&Value::Integer(9)), Ordering::Greater);
        assert_eq!(Value::Double(f64::NAN).total_cmp(&Value::Double(f64::NAN)), Ordering::Equal);
    }

    #[test]
    fn test_same_key() {
        assert!(Value::Integer(3).same_key(&Value::Integer(3)));
        assert!(Value::Integer(3).same_key(&Value::Double(3.0)));
        assert!(!Value::Null.same_key(&Value::Null));
        assert!(!Value::from("a").same_key(&Value::from("b")));
        assert!(Value::Double(f64::NAN).same_key(&Value::Double(f64::NAN)));
    }

    #[test]
    fn test_coercion() {
        assert_eq!(
            Value::Integer(2).coerce(&DataType::Double),
            Some(Value::Double(2.0))
        );
        assert_eq!(Value::Double(2.0).coerce(&DataType::Integer), None);
        assert_eq!(Value::Null.coerce(&DataType::Boolean), Some(Value::Null));
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from(42i32), Value::Integer(42));
        assert_eq!(Value::from("hello"), Value::String("hello".to_string()));
        assert_eq!(Value::from(true), Value::Boolean(true));
    }
}
