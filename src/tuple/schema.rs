use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use super::{DataType, Record, Value};
use crate::common::{PageIndex, PageNumber, Result, StorageError};

const FLAG_TYPE_MASK: u8 = 0b0000_0111;
const FLAG_HAS_DEFAULT: u8 = 1 << 3;
const FLAG_UNIQUE: u8 = 1 << 4;
const FLAG_NOT_NULL: u8 = 1 << 5;
const FLAG_PRIMARY_KEY: u8 = 1 << 6;

/// Represents a single attribute (column) of a table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    name: String,
    data_type: DataType,
    primary_key: bool,
    not_null: bool,
    unique: bool,
    default_value: Option<Value>,
}

impl Attribute {
    /// Creates a nullable attribute with no constraints.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
            not_null: false,
            unique: false,
            default_value: None,
        }
    }

    /// Marks the attribute as the primary key. A primary key is always
    /// NOT NULL and UNIQUE.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// True if no two records may share a non-null value of this attribute.
    pub fn is_key(&self) -> bool {
        self.primary_key || self.unique
    }

    pub fn length(&self) -> u32 {
        self.data_type.length()
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Checks a value against the attribute's type, length and nullability
    /// and returns it in the attribute's representation.
    pub fn check_value(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            if self.not_null {
                return Err(StorageError::NullViolation(self.name.clone()));
            }
            return Ok(Value::Null);
        }

        let coerced = value
            .coerce(&self.data_type)
            .ok_or_else(|| StorageError::TypeMismatch {
                attribute: self.name.clone(),
                expected: self.data_type.to_string(),
                actual: value.kind().to_string(),
            })?;

        if let (Value::String(s), DataType::Char(max) | DataType::VarChar(max)) =
            (&coerced, &self.data_type)
        {
            if s.chars().count() > *max as usize || s.len() > u16::MAX as usize {
                return Err(StorageError::ValueTooLong {
                    attribute: self.name.clone(),
                    max: *max,
                });
            }
        }

        Ok(coerced)
    }

    /// Catalog flag byte: bits 0-2 type tag, bit 3 default follows,
    /// bit 4 unique, bit 5 not null, bit 6 primary key.
    pub fn flags(&self) -> u8 {
        let mut flags = self.data_type.type_tag() & FLAG_TYPE_MASK;
        if self.default_value.is_some() {
            flags |= FLAG_HAS_DEFAULT;
        }
        if self.unique {
            flags |= FLAG_UNIQUE;
        }
        if self.not_null {
            flags |= FLAG_NOT_NULL;
        }
        if self.primary_key {
            flags |= FLAG_PRIMARY_KEY;
        }
        flags
    }

    /// Serializes the attribute for the catalog.
    /// Format: flags (1 byte) + length (4 bytes, string types only) + name
    /// (u16 length + UTF-8) + default value (only if flagged).
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.flags());
        if self.data_type.has_length() {
            buf.put_i32(self.data_type.length() as i32);
        }
        put_string(buf, &self.name);
        if let Some(default) = &self.default_value {
            if default.is_null() {
                buf.put_u8(0);
            } else {
                buf.put_u8(1);
                default.write_to(buf);
            }
        }
    }

    /// Deserializes an attribute written by [`Attribute::write_to`].
    pub fn read_from<B: Buf>(buf: &mut B) -> Result<Self> {
        let flags = get_u8(buf)?;
        let tag = flags & FLAG_TYPE_MASK;
        let length = if tag == 2 || tag == 3 {
            let raw = get_i32(buf)?;
            if raw < 0 {
                return Err(StorageError::CorruptCatalog(format!(
                    "negative attribute length {}",
                    raw
                )));
            }
            raw as u32
        } else {
            0
        };
        let data_type = DataType::from_tag(tag, length)?;
        let name = get_string(buf)?;

        let default_value = if flags & FLAG_HAS_DEFAULT != 0 {
            if get_u8(buf)? == 0 {
                Some(Value::Null)
            } else {
                let value = Value::read_from(buf, &data_type).ok_or_else(|| {
                    StorageError::CorruptCatalog(format!("bad default for '{}'", name))
                })?;
                Some(value)
            }
        } else {
            None
        };

        let mut attribute = Attribute::new(name, data_type);
        attribute.default_value = default_value;
        attribute.unique = flags & FLAG_UNIQUE != 0;
        attribute.not_null = flags & FLAG_NOT_NULL != 0;
        if flags & FLAG_PRIMARY_KEY != 0 {
            attribute = attribute.primary_key();
        }
        Ok(attribute)
    }
}

/// Writes a u16-length-prefixed UTF-8 string.
pub(crate) fn put_string<B: BufMut>(buf: &mut B, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

/// Reads a u16-length-prefixed UTF-8 string.
pub(crate) fn get_string<B: Buf>(buf: &mut B) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(StorageError::CorruptCatalog("truncated string length".into()));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(StorageError::CorruptCatalog("truncated string".into()));
    }
    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);
    String::from_utf8(bytes).map_err(|e| StorageError::CorruptCatalog(e.to_string()))
}

pub(crate) fn get_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(StorageError::CorruptCatalog("unexpected end of data".into()));
    }
    Ok(buf.get_u8())
}

pub(crate) fn get_i32<B: Buf>(buf: &mut B) -> Result<i32> {
    if buf.remaining() < 4 {
        return Err(StorageError::CorruptCatalog("unexpected end of data".into()));
    }
    Ok(buf.get_i32())
}

/// Represents the schema of a table, its attributes and the extent of its
/// page chain.
#[derive(Debug, Clone)]
pub struct TableSchema {
    /// Table name
    name: String,

    /// Ordered list of attributes
    attributes: Arc<[Attribute]>,

    /// Map from attribute name to attribute index for fast lookup
    name_to_index: HashMap<String, usize>,

    /// Index of the primary key attribute
    primary_key: usize,

    /// Physical index of logical page 0, None while the table is empty
    root_page_index: Option<PageIndex>,

    /// Number of pages in the chain
    page_count: u32,

    /// Number of records over all pages
    record_count: u64,
}

impl TableSchema {
    /// Creates a schema. Fails if two attributes share a name, if the
    /// attributes do not declare exactly one primary key, or if a default
    /// value does not fit its attribute. Defaults are stored converted to
    /// the attribute's type.
    pub fn new(name: impl Into<String>, mut attributes: Vec<Attribute>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(StorageError::InvalidTableName(name));
        }

        for attribute in attributes.iter_mut() {
            if let Some(default) = attribute.default_value.take() {
                attribute.default_value = Some(attribute.check_value(&default)?);
            }
        }

        let mut name_to_index = HashMap::new();
        for (i, attribute) in attributes.iter().enumerate() {
            if name_to_index.insert(attribute.name.clone(), i).is_some() {
                return Err(StorageError::DuplicateAttribute {
                    table: name,
                    attribute: attribute.name.clone(),
                });
            }
        }

        let keys: Vec<usize> = attributes
            .iter()
            .enumerate()
            .filter(|(_, a)| a.primary_key)
            .map(|(i, _)| i)
            .collect();
        let primary_key = match keys.as_slice() {
            [] => return Err(StorageError::MissingPrimaryKey(name)),
            [only] => *only,
            many => {
                return Err(StorageError::MultiplePrimaryKeys {
                    table: name,
                    count: many.len(),
                })
            }
        };

        Ok(Self {
            name,
            attributes: attributes.into(),
            name_to_index,
            primary_key,
            root_page_index: None,
            page_count: 0,
            record_count: 0,
        })
    }

    /// Creates a schema builder for fluent construction.
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Temporary tables are exactly those whose name is purely numeric.
    pub fn is_temp(&self) -> bool {
        is_temp_name(&self.name)
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute(&self, index: usize) -> Option<&Attribute> {
        self.attributes.get(index)
    }

    pub fn attribute_by_name(&self, name: &str) -> Option<&Attribute> {
        self.name_to_index
            .get(name)
            .and_then(|&i| self.attributes.get(i))
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn primary_key_index(&self) -> usize {
        self.primary_key
    }

    pub fn primary_key(&self) -> &Attribute {
        &self.attributes[self.primary_key]
    }

    /// Attributes flagged primary key or unique, with their positions.
    pub fn key_attributes(&self) -> impl Iterator<Item = (usize, &Attribute)> {
        self.attributes.iter().enumerate().filter(|(_, a)| a.is_key())
    }

    pub fn root_page_index(&self) -> Option<PageIndex> {
        self.root_page_index
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Logical number of the last page, None while the table is empty.
    pub fn last_page_number(&self) -> Option<PageNumber> {
        self.page_count.checked_sub(1)
    }

    pub(crate) fn set_extent(&mut self, root: Option<PageIndex>, page_count: u32, record_count: u64) {
        self.root_page_index = root;
        self.page_count = page_count;
        self.record_count = record_count;
    }

    pub(crate) fn set_root_page_index(&mut self, root: Option<PageIndex>) {
        self.root_page_index = root;
    }

    pub(crate) fn set_page_count(&mut self, page_count: u32) {
        self.page_count = page_count;
    }

    pub(crate) fn set_record_count(&mut self, record_count: u64) {
        self.record_count = record_count;
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Validates a record against the schema, filling defaults for NULL
    /// values and widening numeric values to their attribute type.
    pub fn conform(&self, record: Record) -> Result<Record> {
        if record.len() != self.attributes.len() {
            return Err(StorageError::ArityMismatch {
                table: self.name.clone(),
                expected: self.attributes.len(),
                actual: record.len(),
            });
        }

        let mut values = record.into_values();
        for (value, attribute) in values.iter_mut().zip(self.attributes.iter()) {
            if value.is_null() {
                if let Some(default) = attribute.default_value() {
                    *value = default.clone();
                }
            }
            *value = attribute.check_value(value)?;
        }
        Ok(Record::new(values))
    }
}

impl PartialEq for TableSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.attributes == other.attributes
    }
}

/// Returns true for names reserved for temporary tables.
pub fn is_temp_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Builder for constructing schemas fluently.
pub struct SchemaBuilder {
    name: String,
    attributes: Vec<Attribute>,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    /// Adds the primary key attribute.
    pub fn primary_key(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attributes
            .push(Attribute::new(name, data_type).primary_key());
        self
    }

    /// Adds a NOT NULL attribute.
    pub fn column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attributes.push(Attribute::new(name, data_type).not_null());
        self
    }

    /// Adds a nullable attribute.
    pub fn nullable_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attributes.push(Attribute::new(name, data_type));
        self
    }

    /// Adds a UNIQUE NOT NULL attribute.
    pub fn unique_column(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attributes
            .push(Attribute::new(name, data_type).not_null().unique());
        self
    }

    /// Adds a fully configured attribute.
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Returns the table name and attributes without validating them.
    pub fn into_parts(self) -> (String, Vec<Attribute>) {
        (self.name, self.attributes)
    }

    pub fn build(self) -> Result<TableSchema> {
        TableSchema::new(self.name, self.attributes)
    }
}
