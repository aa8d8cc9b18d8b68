//! Named field accessors
//!
//! A `Field<T, V>` pairs the column name the remote store knows a field by
//! with a typed getter/setter on the local record. The engines use the
//! accessor to touch local data and the name to talk to the remote side.

use std::fmt;

/// Typed, named accessor for one field of a record
pub struct Field<T, V> {
    name: &'static str,
    get: fn(&T) -> V,
    set: fn(&mut T, V),
}

impl<T, V> Field<T, V> {
    pub fn new(name: &'static str, get: fn(&T) -> V, set: fn(&mut T, V)) -> Self {
        Self { name, get, set }
    }

    /// Column name on the remote side
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, record: &T) -> V {
        (self.get)(record)
    }

    pub fn set(&self, record: &mut T, value: V) {
        (self.set)(record, value)
    }
}

// Manual impls: derives would add `T: Clone` / `V: Clone` bounds.
impl<T, V> Clone for Field<T, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, V> Copy for Field<T, V> {}

impl<T, V> fmt::Debug for Field<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Row {
        count: u32,
    }

    #[test]
    fn test_get_and_set() {
        let field: Field<Row, u32> = Field::new("count", |r| r.count, |r, v| r.count = v);
        let mut row = Row { count: 1 };

        assert_eq!(field.get(&row), 1);
        field.set(&mut row, 5);
        assert_eq!(row.count, 5);
        assert_eq!(field.name(), "count");
    }

    #[test]
    fn test_copy_without_clone_bounds() {
        let field: Field<Row, u32> = Field::new("count", |r| r.count, |r, v| r.count = v);
        let copy = field;
        assert_eq!(copy.name(), field.name());
        assert!(format!("{:?}", field).contains("count"));
    }
}
