//! Decoded parameters of a single marker occurrence.

use std::collections::BTreeMap;
use std::fmt;

/// A single marker parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// String constant
    Text(String),
    /// Integral constant (all integer widths, chars)
    Int(i64),
    /// Boolean constant
    Bool(bool),
    /// Reference to a type, as a binary descriptor (`Ljava/lang/String;`)
    TypeRef(String),
    /// Enum constant: descriptor of the enum type and the constant name
    Enum {
        /// Binary descriptor of the enum type
        type_descriptor: String,
        /// Constant name
        constant: String,
    },
    /// Ordered array of values
    Array(Vec<Value>),
}

impl Value {
    /// Returns the string if this is a [`Value::Text`]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is a [`Value::Int`]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean if this is a [`Value::Bool`]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the descriptor if this is a [`Value::TypeRef`]
    pub fn as_type_ref(&self) -> Option<&str> {
        match self {
            Value::TypeRef(d) => Some(d),
            _ => None,
        }
    }

    /// Returns the elements if this is a [`Value::Array`]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "\"{}\"", s.escape_default()),
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
            Value::TypeRef(d) => write!(f, "{}", d),
            Value::Enum {
                type_descriptor,
                constant,
            } => write!(f, "{}.{}", type_descriptor, constant),
            Value::Array(values) => {
                write!(f, "{{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Parameter name to value mapping for one marker occurrence.
///
/// Only parameters that were explicitly present in the source occurrence are
/// stored; defaults declared by the marker type are not materialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBag {
    values: BTreeMap<String, Value>,
}

impl PropertyBag {
    /// Creates an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any previous value under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Builder-style variant of [`PropertyBag::insert`]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the raw value of a parameter
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns a string parameter
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_text)
    }

    /// Returns an integer parameter
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    /// Returns a boolean parameter
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    /// Returns a type reference parameter
    pub fn type_ref(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_type_ref)
    }

    /// Returns the elements of an array parameter in declaration order.
    ///
    /// A scalar stored under an array-typed name is returned as a one-element
    /// slice, since single-element arrays may be written without braces.
    pub fn array(&self, name: &str) -> Option<&[Value]> {
        match self.get(name)? {
            Value::Array(values) => Some(values),
            scalar => Some(std::slice::from_ref(scalar)),
        }
    }

    /// Returns the descriptors of an array of type references, skipping
    /// elements of any other kind
    pub fn type_refs(&self, name: &str) -> Vec<&str> {
        self.array(name)
            .map(|values| values.iter().filter_map(Value::as_type_ref).collect())
            .unwrap_or_default()
    }

    /// Iterates parameters in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no parameters were decoded
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_accessors() {
        let bag = PropertyBag::new()
            .with("name", Value::Text("x".into()))
            .with("count", Value::Int(3))
            .with("strict", Value::Bool(true));

        assert_eq!(bag.text("name"), Some("x"));
        assert_eq!(bag.int("count"), Some(3));
        assert_eq!(bag.bool("strict"), Some(true));
        assert_eq!(bag.text("count"), None);
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn test_type_refs_skip_other_elements() {
        let bag = PropertyBag::new().with(
            "annotations",
            Value::Array(vec![
                Value::TypeRef("Ljavax/annotation/Nonnull;".into()),
                Value::Text("noise".into()),
                Value::TypeRef("Lcom/example/NotNull;".into()),
            ]),
        );

        assert_eq!(
            bag.type_refs("annotations"),
            vec!["Ljavax/annotation/Nonnull;", "Lcom/example/NotNull;"]
        );
        assert!(bag.type_refs("missing").is_empty());
    }

    #[test]
    fn test_scalar_read_as_single_element_array() {
        let bag = PropertyBag::new().with("value", Value::TypeRef("LFoo;".into()));
        assert_eq!(bag.array("value").map(<[Value]>::len), Some(1));
    }

    #[test]
    fn test_display() {
        let value = Value::Array(vec![Value::Text("a\"b".into()), Value::Int(-1)]);
        assert_eq!(value.to_string(), "{\"a\\\"b\", -1}");
    }
}
