use bytes::{Buf, BufMut};

use super::{Attribute, Value};

/// Represents a single record (row) of a table.
///
/// A record holds one value per schema attribute, positionally aligned.
///
/// ## Record Binary Format
///
/// ```text
/// +----------------+--------------------------------------+
/// | Null Bitmap    | Non-null values in attribute order   |
/// | (N bytes)      | (INT 4, DOUBLE 8, BOOLEAN 1,         |
/// |                |  CHAR/VARCHAR u16 length + UTF-8)    |
/// +----------------+--------------------------------------+
/// ```
///
/// The bitmap is ceil(attribute_count / 8) bytes with bit i set when
/// attribute i is NULL; NULL values occupy no further bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the value at the given attribute index.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Sets the value at the given attribute index.
    pub fn set_value(&mut self, index: usize, value: Value) -> bool {
        if index < self.values.len() {
            self.values[index] = value;
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Size of the null bitmap for a record with `count` attributes.
    pub fn null_bitmap_size(count: usize) -> usize {
        (count + 7) / 8
    }

    /// Number of bytes this record occupies inside a page.
    pub fn encoded_len(&self) -> usize {
        Self::null_bitmap_size(self.values.len())
            + self.values.iter().map(Value::encoded_len).sum::<usize>()
    }

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        let mut bitmap = vec![0u8; Self::null_bitmap_size(self.values.len())];
        for (i, value) in self.values.iter().enumerate() {
            if value.is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        buf.put_slice(&bitmap);

        for value in &self.values {
            value.write_to(buf);
        }
    }

    /// Reads one record laid out for the given attributes.
    /// Returns None if the data is truncated or malformed.
    pub fn read_from<B: Buf>(buf: &mut B, attributes: &[Attribute]) -> Option<Self> {
        let bitmap_size = Self::null_bitmap_size(attributes.len());
        if buf.remaining() < bitmap_size {
            return None;
        }
        let mut bitmap = vec![0u8; bitmap_size];
        buf.copy_to_slice(&mut bitmap);

        let mut values = Vec::with_capacity(attributes.len());
        for (i, attribute) in attributes.iter().enumerate() {
            if bitmap[i / 8] & (1 << (i % 8)) != 0 {
                values.push(Value::Null);
            } else {
                values.push(Value::read_from(buf, attribute.data_type())?);
            }
        }
        Some(Self { values })
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Builds a [`Record`] from a list of values convertible into [`Value`].
///
/// ```
/// use pagedb::record;
/// use pagedb::tuple::Value;
///
/// let r = record![1, "a", Value::Null];
/// assert_eq!(r.len(), 3);
/// ```
#[macro_export]
macro_rules! record {
    ($($value:expr),* $(,)?) => {
        $crate::tuple::Record::new(vec![$($crate::tuple::Value::from($value)),*])
    };
}
