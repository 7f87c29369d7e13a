//! Binary metadata decoding.
//!
//! Turns raw image bytes into marker occurrence tables for a type and each of
//! its declared fields. Occurrences are filtered by target applicability here,
//! so a field-only marker never shows up in the type table and vice versa.
//!
//! The [`ImageDecoder`] trait allows plugging in other image formats:
//!
//! ```
//! use marka_core::decode::{DecodedType, ImageDecoder};
//! use marka_core::Result;
//!
//! struct EmptyDecoder;
//!
//! impl ImageDecoder for EmptyDecoder {
//!     fn decode(&self, _bytes: &[u8]) -> Result<DecodedType> {
//!         Ok(DecodedType::default())
//!     }
//! }
//! ```

use crate::error::{Error, Result};
use crate::image::{MarkerRecord, Target, TypeImage};
use crate::property::PropertyBag;
use prost::Message;
use std::collections::HashMap;
use tracing::trace;

/// A marker found on a type or field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    /// Binary descriptor of the marker type
    pub descriptor: String,
    /// Explicitly written parameters
    pub properties: PropertyBag,
}

impl Occurrence {
    /// Creates an occurrence
    pub fn new(descriptor: impl Into<String>, properties: PropertyBag) -> Self {
        Self {
            descriptor: descriptor.into(),
            properties,
        }
    }

    fn from_record(record: &MarkerRecord) -> Self {
        Self::new(record.descriptor.clone(), record.property_bag())
    }
}

/// Marker tables decoded from one image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedType {
    /// Qualified type name
    pub name: String,
    /// Qualified super type name
    pub super_name: Option<String>,
    /// Type-applicable occurrences on the type
    pub type_markers: Vec<Occurrence>,
    /// Field-applicable occurrences per declared field
    pub field_markers: HashMap<String, Vec<Occurrence>>,
}

impl DecodedType {
    /// Builds the tables from an already parsed image
    pub fn from_image(image: &TypeImage) -> Self {
        let type_markers = applicable(&image.markers, Target::Type);
        let field_markers = image
            .fields
            .iter()
            .map(|field| (field.name.clone(), applicable(&field.markers, Target::Field)))
            .collect();

        Self {
            name: image.name.clone(),
            super_name: image.super_name.clone(),
            type_markers,
            field_markers,
        }
    }

    /// Occurrences on a field; empty if the image does not declare it
    pub fn field(&self, name: &str) -> &[Occurrence] {
        self.field_markers
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn applicable(records: &[MarkerRecord], target: Target) -> Vec<Occurrence> {
    records
        .iter()
        .filter(|record| {
            let applies = record.applies_to(target);
            if !applies {
                trace!(
                    "Dropping {} (not applicable to {})",
                    record.descriptor,
                    target.as_str()
                );
            }
            applies
        })
        .map(Occurrence::from_record)
        .collect()
}

/// Trait for decoding raw image bytes into marker tables
pub trait ImageDecoder: Send + Sync {
    /// Decode the provided bytes
    fn decode(&self, bytes: &[u8]) -> Result<DecodedType>;
}

impl<D: ImageDecoder + ?Sized> ImageDecoder for &D {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedType> {
        (**self).decode(bytes)
    }
}

/// Configuration for the protobuf image decoder
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Maximum accepted image size in bytes (0 = unlimited)
    pub max_image_size: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_image_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl DecoderConfig {
    /// Creates a new decoder config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum image size
    pub fn max_image_size(mut self, size: usize) -> Self {
        self.max_image_size = size;
        self
    }
}

/// Decoder for protobuf-encoded [`TypeImage`]s
#[derive(Debug, Clone, Default)]
pub struct ProtoImageDecoder {
    config: DecoderConfig,
}

impl ProtoImageDecoder {
    /// Creates a decoder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder with custom configuration
    pub fn with_config(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Parse the bytes into a [`TypeImage`] without building tables
    pub fn parse(&self, bytes: &[u8]) -> Result<TypeImage> {
        if self.config.max_image_size > 0 && bytes.len() > self.config.max_image_size {
            return Err(Error::ImageTooLarge {
                size: bytes.len(),
                max: self.config.max_image_size,
            });
        }

        let image = TypeImage::decode(bytes)?;
        if image.name.is_empty() {
            return Err(Error::UnnamedImage);
        }
        Ok(image)
    }
}

impl ImageDecoder for ProtoImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedType> {
        let image = self.parse(bytes)?;
        trace!(
            "Decoded image for {} ({} bytes, {} fields)",
            image.name,
            bytes.len(),
            image.fields.len()
        );
        Ok(DecodedType::from_image(&image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptors(occurrences: &[Occurrence]) -> Vec<&str> {
        occurrences.iter().map(|o| o.descriptor.as_str()).collect()
    }

    #[test]
    fn test_decode_filters_by_applicability() {
        let image = TypeImage::named("com.example.Inapplicable")
            .with_marker(MarkerRecord::class("LTypeOnly;").applicable_to([Target::Type]))
            .with_marker(MarkerRecord::class("LFieldOnly;").applicable_to([Target::Field]))
            .with_marker(MarkerRecord::class("LAnywhere;"))
            .with_field(
                "f",
                [
                    MarkerRecord::runtime("LTypeOnly;").applicable_to([Target::Type]),
                    MarkerRecord::runtime("LFieldOnly;").applicable_to([Target::Field]),
                    MarkerRecord::runtime("LMethodOnly;").applicable_to([Target::Method]),
                ],
            );

        let decoded = ProtoImageDecoder::new()
            .decode(&image.encode_to_vec())
            .unwrap();

        assert_eq!(decoded.name, "com.example.Inapplicable");
        assert_eq!(descriptors(&decoded.type_markers), vec!["LTypeOnly;", "LAnywhere;"]);
        assert_eq!(descriptors(decoded.field("f")), vec!["LFieldOnly;"]);
        assert!(decoded.field("missing").is_empty());
    }

    #[test]
    fn test_decode_keeps_both_retentions() {
        let image = TypeImage::named("Both")
            .with_marker(MarkerRecord::runtime("LRuntimeTag;"))
            .with_marker(MarkerRecord::class("LClassTag;"));

        let decoded = ProtoImageDecoder::new()
            .decode(&image.encode_to_vec())
            .unwrap();
        assert_eq!(
            descriptors(&decoded.type_markers),
            vec!["LRuntimeTag;", "LClassTag;"]
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = ProtoImageDecoder::new()
            .decode(&[0xFF, 0xFF, 0xFF])
            .unwrap_err();
        assert!(matches!(err, Error::ImageDecode(_)));
    }

    #[test]
    fn test_decode_rejects_unnamed_image() {
        let err = ProtoImageDecoder::new().decode(&[]).unwrap_err();
        assert!(matches!(err, Error::UnnamedImage));
    }

    #[test]
    fn test_decode_size_limit() {
        let bytes = TypeImage::named("com.example.Large").encode_to_vec();
        let decoder = ProtoImageDecoder::with_config(DecoderConfig::new().max_image_size(4));

        let err = decoder.decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::ImageTooLarge { max: 4, .. }));
    }
}
