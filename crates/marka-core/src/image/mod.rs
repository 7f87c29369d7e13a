//! Compiled type images.
//!
//! A type image is the serialized form of a type as produced by its build
//! toolchain. It is a protobuf message ([`TypeImage`]) holding:
//!
//! 1. The qualified type name and the qualified name of its super type
//! 2. Marker records attached to the type
//! 3. Declared fields with their own marker records
//!
//! Every [`MarkerRecord`] keeps its [`Retention`]. Records with
//! [`Retention::Class`] only exist in the image: loading a type into the
//! runtime strips them (see [`crate::runtime`]), so they can only be found by
//! decoding the image again.
//!
//! ## Building images
//!
//! ```
//! use marka_core::image::{MarkerRecord, Target, TypeImage};
//! use prost::Message;
//!
//! let image = TypeImage::named("com.example.Point")
//!     .with_marker(MarkerRecord::class("Lcom/example/Immutable;").applicable_to([Target::Type]))
//!     .with_field("x", [MarkerRecord::runtime("Ljavax/annotation/Nonnull;")]);
//!
//! let bytes = image.encode_to_vec();
//! assert_eq!(TypeImage::decode(bytes.as_slice()).unwrap(), image);
//! ```

mod render;

use crate::property::{PropertyBag, Value};

pub use render::{ImageRenderer, RenderConfig};

/// File extension used for images stored on disk
pub const IMAGE_EXTENSION: &str = "timg";

/// Serialized form of a type
#[derive(Clone, PartialEq, prost::Message)]
pub struct TypeImage {
    /// Qualified name (`com.example.Point`)
    #[prost(string, tag = "1")]
    pub name: String,
    /// Qualified name of the super type; absent for direct root descendants
    #[prost(string, optional, tag = "2")]
    pub super_name: Option<String>,
    /// Markers attached to the type
    #[prost(message, repeated, tag = "3")]
    pub markers: Vec<MarkerRecord>,
    /// Declared fields, in declaration order
    #[prost(message, repeated, tag = "4")]
    pub fields: Vec<FieldImage>,
}

/// A field declared by a [`TypeImage`]
#[derive(Clone, PartialEq, prost::Message)]
pub struct FieldImage {
    /// Field name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Binary descriptor of the field type
    #[prost(string, tag = "2")]
    pub descriptor: String,
    /// Markers attached to the field
    #[prost(message, repeated, tag = "3")]
    pub markers: Vec<MarkerRecord>,
}

/// One marker occurrence as stored in an image
#[derive(Clone, PartialEq, prost::Message)]
pub struct MarkerRecord {
    /// Binary descriptor of the marker type (`Ljavax/annotation/Nonnull;`)
    #[prost(string, tag = "1")]
    pub descriptor: String,
    /// How far the marker survives
    #[prost(enumeration = "Retention", tag = "2")]
    pub retention: i32,
    /// Element kinds the marker may be applied to; empty means all
    #[prost(enumeration = "Target", repeated, tag = "3")]
    pub targets: Vec<i32>,
    /// Explicitly written parameters
    #[prost(message, repeated, tag = "4")]
    pub properties: Vec<PropertyRecord>,
}

/// Named parameter of a [`MarkerRecord`]
#[derive(Clone, PartialEq, prost::Message)]
pub struct PropertyRecord {
    /// Parameter name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Parameter value
    #[prost(message, optional, tag = "2")]
    pub value: Option<ElementValue>,
}

/// Encoded parameter value
#[derive(Clone, PartialEq, prost::Message)]
pub struct ElementValue {
    /// The value itself
    #[prost(oneof = "element_value::Kind", tags = "1, 2, 3, 4, 5, 6")]
    pub kind: Option<element_value::Kind>,
}

/// Nested types of [`ElementValue`]
pub mod element_value {
    /// Encoded value variants
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        /// String constant
        #[prost(string, tag = "1")]
        Text(String),
        /// Integral constant
        #[prost(sint64, tag = "2")]
        Int(i64),
        /// Boolean constant
        #[prost(bool, tag = "3")]
        Bool(bool),
        /// Type reference descriptor
        #[prost(string, tag = "4")]
        TypeRef(String),
        /// Enum constant
        #[prost(message, tag = "5")]
        Enum(super::EnumConstant),
        /// Array of values
        #[prost(message, tag = "6")]
        Array(super::ElementArray),
    }
}

/// Encoded enum constant
#[derive(Clone, PartialEq, prost::Message)]
pub struct EnumConstant {
    /// Binary descriptor of the enum type
    #[prost(string, tag = "1")]
    pub type_descriptor: String,
    /// Constant name
    #[prost(string, tag = "2")]
    pub constant: String,
}

/// Encoded array value
#[derive(Clone, PartialEq, prost::Message)]
pub struct ElementArray {
    /// Elements in declaration order
    #[prost(message, repeated, tag = "1")]
    pub values: Vec<ElementValue>,
}

/// Marker retention policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Retention {
    /// Unset; treated like [`Retention::Class`]
    Unspecified = 0,
    /// Kept in the image, stripped on load
    Class = 1,
    /// Kept in the image and visible on the loaded type
    Runtime = 2,
}

impl Retention {
    /// Returns the lowercase name used in rendered output
    pub fn as_str(&self) -> &'static str {
        match self {
            Retention::Unspecified | Retention::Class => "class",
            Retention::Runtime => "runtime",
        }
    }
}

/// Element kinds a marker may be applied to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Target {
    /// Unset; ignored when checking applicability
    Unspecified = 0,
    /// Type declarations
    Type = 1,
    /// Field declarations
    Field = 2,
    /// Method declarations
    Method = 3,
    /// Method parameters
    Parameter = 4,
    /// Local variables
    LocalVariable = 5,
    /// Type uses
    TypeUse = 6,
}

impl Target {
    /// Returns the lowercase name used in rendered output
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Unspecified => "unspecified",
            Target::Type => "type",
            Target::Field => "field",
            Target::Method => "method",
            Target::Parameter => "parameter",
            Target::LocalVariable => "local_variable",
            Target::TypeUse => "type_use",
        }
    }
}

impl TypeImage {
    /// Creates an image for a type directly below the root
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the super type
    pub fn extending(mut self, super_name: impl Into<String>) -> Self {
        self.super_name = Some(super_name.into());
        self
    }

    /// Adds a type-level marker
    pub fn with_marker(mut self, marker: MarkerRecord) -> Self {
        self.markers.push(marker);
        self
    }

    /// Adds a field with an `Ljava/lang/Object;` descriptor
    pub fn with_field(
        self,
        name: impl Into<String>,
        markers: impl IntoIterator<Item = MarkerRecord>,
    ) -> Self {
        self.with_typed_field(name, "Ljava/lang/Object;", markers)
    }

    /// Adds a field with an explicit type descriptor
    pub fn with_typed_field(
        mut self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        markers: impl IntoIterator<Item = MarkerRecord>,
    ) -> Self {
        self.fields.push(FieldImage {
            name: name.into(),
            descriptor: descriptor.into(),
            markers: markers.into_iter().collect(),
        });
        self
    }

    /// Returns the declared field with the given name
    pub fn field(&self, name: &str) -> Option<&FieldImage> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl MarkerRecord {
    /// Creates a record with the given retention and no target restriction
    pub fn new(descriptor: impl Into<String>, retention: Retention) -> Self {
        Self {
            descriptor: descriptor.into(),
            retention: retention as i32,
            targets: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Creates a record that only survives in the image
    pub fn class(descriptor: impl Into<String>) -> Self {
        Self::new(descriptor, Retention::Class)
    }

    /// Creates a record that survives into the loaded type
    pub fn runtime(descriptor: impl Into<String>) -> Self {
        Self::new(descriptor, Retention::Runtime)
    }

    /// Restricts the record to the given targets
    pub fn applicable_to(mut self, targets: impl IntoIterator<Item = Target>) -> Self {
        self.targets = targets.into_iter().map(|t| t as i32).collect();
        self
    }

    /// Adds a parameter
    pub fn property(mut self, name: impl Into<String>, value: Value) -> Self {
        self.properties.push(PropertyRecord {
            name: name.into(),
            value: Some(ElementValue::from(value)),
        });
        self
    }

    /// Decoded retention; unknown values fall back to [`Retention::Class`]
    pub fn retention_policy(&self) -> Retention {
        match Retention::try_from(self.retention) {
            Ok(Retention::Runtime) => Retention::Runtime,
            _ => Retention::Class,
        }
    }

    /// Known targets, skipping unset and unknown values
    pub fn target_kinds(&self) -> impl Iterator<Item = Target> + '_ {
        self.targets
            .iter()
            .filter_map(|&t| Target::try_from(t).ok())
            .filter(|t| *t != Target::Unspecified)
    }

    /// Returns true if the marker may be applied to `target`
    pub fn applies_to(&self, target: Target) -> bool {
        let mut kinds = self.target_kinds().peekable();
        kinds.peek().is_none() || kinds.any(|t| t == target)
    }

    /// Converts the stored parameters into a [`PropertyBag`]
    pub fn property_bag(&self) -> PropertyBag {
        self.properties
            .iter()
            .filter_map(|p| {
                let value = p.value.as_ref().and_then(ElementValue::to_value)?;
                Some((p.name.clone(), value))
            })
            .collect()
    }
}

impl ElementValue {
    /// Converts to a [`Value`]; `None` when the value is unset
    pub fn to_value(&self) -> Option<Value> {
        use element_value::Kind;

        Some(match self.kind.as_ref()? {
            Kind::Text(s) => Value::Text(s.clone()),
            Kind::Int(i) => Value::Int(*i),
            Kind::Bool(b) => Value::Bool(*b),
            Kind::TypeRef(d) => Value::TypeRef(d.clone()),
            Kind::Enum(e) => Value::Enum {
                type_descriptor: e.type_descriptor.clone(),
                constant: e.constant.clone(),
            },
            Kind::Array(array) => {
                Value::Array(array.values.iter().filter_map(Self::to_value).collect())
            }
        })
    }
}

impl From<Value> for ElementValue {
    fn from(value: Value) -> Self {
        use element_value::Kind;

        let kind = match value {
            Value::Text(s) => Kind::Text(s),
            Value::Int(i) => Kind::Int(i),
            Value::Bool(b) => Kind::Bool(b),
            Value::TypeRef(d) => Kind::TypeRef(d),
            Value::Enum {
                type_descriptor,
                constant,
            } => Kind::Enum(EnumConstant {
                type_descriptor,
                constant,
            }),
            Value::Array(values) => Kind::Array(ElementArray {
                values: values.into_iter().map(Self::from).collect(),
            }),
        };
        Self { kind: Some(kind) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use prost::Message;

    #[test]
    fn test_image_encodes_and_decodes() {
        let image = TypeImage::named("com.example.Point")
            .extending("com.example.Base")
            .with_marker(
                MarkerRecord::class("Lcom/example/Immutable;")
                    .applicable_to([Target::Type])
                    .property("since", Value::Int(3)),
            )
            .with_typed_field("x", "I", [MarkerRecord::runtime("Lcom/example/Id;")]);

        let decoded = TypeImage::decode(image.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, image);
        assert_eq!(decoded.field("x").map(|f| f.descriptor.as_str()), Some("I"));
    }

    #[test]
    fn test_retention_policy_defaults_to_class() {
        let mut record = MarkerRecord::runtime("LTag;");
        assert_eq!(record.retention_policy(), Retention::Runtime);

        record.retention = Retention::Unspecified as i32;
        assert_eq!(record.retention_policy(), Retention::Class);

        record.retention = 42;
        assert_eq!(record.retention_policy(), Retention::Class);
    }

    #[test]
    fn test_applies_to() {
        let unrestricted = MarkerRecord::class("LTag;");
        assert!(unrestricted.applies_to(Target::Type));
        assert!(unrestricted.applies_to(Target::Field));

        let field_only = MarkerRecord::class("LTag;").applicable_to([Target::Field]);
        assert!(field_only.applies_to(Target::Field));
        assert!(!field_only.applies_to(Target::Type));

        let method_only = MarkerRecord::class("LTag;").applicable_to([Target::Method, Target::Parameter]);
        assert!(!method_only.applies_to(Target::Type));
        assert!(!method_only.applies_to(Target::Field));
    }

    #[test]
    fn test_property_bag_conversion() {
        let record = MarkerRecord::runtime("LWithValues;")
            .property(
                "annotations",
                Value::Array(vec![
                    Value::TypeRef("Ljavax/annotation/Nonnull;".into()),
                    Value::TypeRef("Lcom/example/NotNull;".into()),
                ]),
            )
            .property(
                "when",
                Value::Enum {
                    type_descriptor: "Ljavax/annotation/meta/When;".into(),
                    constant: "ALWAYS".into(),
                },
            );

        let bag = record.property_bag();
        assert_eq!(
            bag.type_refs("annotations"),
            vec!["Ljavax/annotation/Nonnull;", "Lcom/example/NotNull;"]
        );
        assert_eq!(
            bag.get("when"),
            Some(&Value::Enum {
                type_descriptor: "Ljavax/annotation/meta/When;".into(),
                constant: "ALWAYS".into(),
            })
        );
    }

    #[test]
    fn test_unset_property_values_are_skipped() {
        let mut record = MarkerRecord::runtime("LTag;");
        record.properties.push(PropertyRecord {
            name: "empty".into(),
            value: None,
        });
        assert!(record.property_bag().is_empty());
    }
}
