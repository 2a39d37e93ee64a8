//! Key/value attribute store backing components and devices.
//!
//! A model is just a JSON object. `Field` descriptors give named access with
//! defaults that are materialized into the object on first read, so a
//! factory-produced default (say, an empty list) is constructed once and
//! every later read observes the same stored value.

use serde_json::{Map, Value};

/// How a field produces a value when the store has none.
#[derive(Clone, Copy)]
pub enum FieldDefault {
    /// No default; unset fields read as `Null` and nothing is stored.
    Unset,
    /// A fixed string default.
    Str(&'static str),
    /// A factory invoked on each access that still finds the field unset.
    Factory(fn() -> Value),
}

/// Descriptor for one named field of a [`Model`].
pub struct Field {
    name: &'static str,
    default: FieldDefault,
    coerce: Option<fn(Value) -> Value>,
}

impl Field {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            default: FieldDefault::Unset,
            coerce: None,
        }
    }

    pub const fn with_default(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            default: FieldDefault::Str(default),
            coerce: None,
        }
    }

    pub const fn with_factory(name: &'static str, factory: fn() -> Value) -> Self {
        Self {
            name,
            default: FieldDefault::Factory(factory),
            coerce: None,
        }
    }

    pub const fn coerced(mut self, coerce: fn(Value) -> Value) -> Self {
        self.coerce = Some(coerce);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The default is resolved per access, not cached across calls.
    fn resolve_default(&self) -> Option<Value> {
        match self.default {
            FieldDefault::Unset => None,
            FieldDefault::Str(s) => Some(Value::String(s.to_string())),
            FieldDefault::Factory(f) => Some(f()),
        }
    }
}

/// Coercion for fields that accept a bare string where a list belongs
/// (device `identifiers`/`connections`): wraps scalars in a one-element list.
pub fn listify(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::Null => Value::Array(Vec::new()),
        other => Value::Array(vec![other]),
    }
}

/// A named-field container over a raw JSON object.
#[derive(Debug, Clone, Default)]
pub struct Model {
    data: Map<String, Value>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_data(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Read a field: get-or-insert the resolved default, then coerce.
    ///
    /// Side effect: the first read of an unset field with a default writes
    /// that default into the backing object (memoization).
    pub fn get(&mut self, field: &Field) -> Value {
        let stored = match self.data.get(field.name) {
            Some(value) => value.clone(),
            None => match field.resolve_default() {
                Some(default) => {
                    self.data.insert(field.name.to_string(), default.clone());
                    default
                }
                None => Value::Null,
            },
        };
        match field.coerce {
            Some(coerce) => coerce(stored),
            None => stored,
        }
    }

    /// Write a field unconditionally.
    pub fn set(&mut self, field: &Field, value: impl Into<Value>) {
        self.data.insert(field.name.to_string(), value.into());
    }

    /// Write by raw key, for overrides outside the declared fields.
    pub fn set_raw(&mut self, name: &str, value: Value) {
        self.data.insert(name.to_string(), value);
    }

    /// Read the stored value without materializing any default.
    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Read a field as a string, `None` when unset or not a string.
    pub fn get_str(&mut self, field: &Field) -> Option<String> {
        match self.get(field) {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_set(&self, field: &Field) -> bool {
        self.data.contains_key(field.name)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static PLAIN: Field = Field::new("plain");
    static GREETING: Field = Field::with_default("greeting", "hello");
    static TAGS: Field = Field::with_factory("tags", || Value::Array(Vec::new()));
    static IDS: Field = Field::with_factory("ids", || Value::Array(Vec::new())).coerced(listify);

    #[test]
    fn test_unset_field_reads_null_without_materializing() {
        let mut model = Model::new();
        assert_eq!(model.get(&PLAIN), Value::Null);
        assert!(!model.is_set(&PLAIN));
    }

    #[test]
    fn test_static_default_materializes_on_first_read() {
        let mut model = Model::new();
        assert_eq!(model.get(&GREETING), json!("hello"));
        assert_eq!(model.peek("greeting"), Some(&json!("hello")));
    }

    #[test]
    fn test_factory_default_is_memoized() {
        let mut model = Model::new();
        assert_eq!(model.get(&TAGS), json!([]));
        // Mutate the materialized value in place; a fresh factory call would
        // have produced another empty list and hidden the mutation.
        model
            .data
            .get_mut("tags")
            .and_then(Value::as_array_mut)
            .unwrap()
            .push(json!("a"));
        assert_eq!(model.get(&TAGS), json!(["a"]));
    }

    #[test]
    fn test_consecutive_default_reads_are_value_equal() {
        let mut model = Model::new();
        let first = model.get(&TAGS);
        let second = model.get(&TAGS);
        assert_eq!(first, second);
    }

    #[test]
    fn test_set_overwrites_unconditionally() {
        let mut model = Model::new();
        model.set(&GREETING, "hi");
        model.set(&GREETING, "hey");
        assert_eq!(model.get(&GREETING), json!("hey"));
    }

    #[test]
    fn test_coercion_wraps_scalars_in_a_list() {
        let mut model = Model::new();
        model.set(&IDS, "abc");
        assert_eq!(model.get(&IDS), json!(["abc"]));
        // The stored value stays a scalar; coercion happens on read.
        assert_eq!(model.peek("ids"), Some(&json!("abc")));
        model.set(&IDS, json!(["a", "b"]));
        assert_eq!(model.get(&IDS), json!(["a", "b"]));
    }
}
