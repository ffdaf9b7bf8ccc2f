use std::cmp::Ordering;

use crate::tuple::Value;

/// Orders index keys.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &Value, b: &Value) -> Ordering;
}

/// Total order over values, see [`Value::total_cmp`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueComparator;

impl KeyComparator for ValueComparator {
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        a.total_cmp(b)
    }
}
