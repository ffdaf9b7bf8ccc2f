mod data_type;
mod record;
mod schema;
mod value;

pub use data_type::DataType;
pub use record::Record;
pub use schema::{is_temp_name, Attribute, SchemaBuilder, TableSchema};
pub use value::Value;

pub(crate) use schema::{get_i32, get_string, put_string};
