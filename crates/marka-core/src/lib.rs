//! # marka-core
//!
//! Marker (annotation) lookup on types and fields across two visibility tiers.
//!
//! Some markers survive into the live runtime representation of a type and can
//! be read by reflection. Others are only kept in the compiled image of the
//! type and disappear once it is loaded. This crate answers "does type T, or
//! field F of T, carry marker M?" for both kinds:
//!
//! - The **reflection tier** queries live [`runtime::RuntimeType`]s through a
//!   [`ReflectionProbe`]
//! - The **binary tier** fetches the compiled image from an [`ImageSource`]
//!   and decodes it with an [`ImageDecoder`]
//!
//! ## Architecture
//!
//! - [`accessor`]: The [`MarkerAccessor`] orchestrating both tiers
//! - [`marker`]: Marker descriptors and descriptor matching
//! - [`image`]: The compiled image format and its text renderer
//! - [`decode`]: Decoding images into marker tables
//! - [`source`]: Fetching images by type name
//! - [`runtime`]: Live types, the type registry and reflection
//! - [`property`]: Marker parameter values
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use marka_core::runtime::{LiveReflection, TypeRegistry};
//! use marka_core::{AccessorConfig, DirectoryImageSource, MarkerAccessor, NamedMarker};
//!
//! let source = DirectoryImageSource::new("./images");
//! let mut registry = TypeRegistry::new();
//! let point = registry.load(&source, "com.example.Point")?;
//!
//! let nonnull = NamedMarker::from_qualified("javax.annotation.Nonnull");
//! let mut accessor = MarkerAccessor::new(vec![nonnull.clone().shared()], point, &LiveReflection, &source)
//!     .with_config(AccessorConfig::new().suppress_decode_errors(true));
//!
//! if accessor.field_has("x", &nonnull)? {
//!     println!("x is non-null");
//! }
//! # Ok::<(), marka_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`Marker`]: Custom matching and parameter validation
//! - [`ReflectionProbe`]: A different live type model
//! - [`ImageSource`]: Custom image storage
//! - [`ImageDecoder`]: A different compiled image format

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod accessor;
pub mod decode;
pub mod error;
pub mod image;
pub mod marker;
pub mod property;
pub mod runtime;
pub mod source;

// Re-export primary types for convenience
pub use accessor::{AccessorConfig, BinaryTier, MarkerAccessor, MarkerMatch, Tier};
pub use decode::{DecodedType, DecoderConfig, ImageDecoder, Occurrence, ProtoImageDecoder};
pub use error::{Error, Result};
pub use image::{ImageRenderer, RenderConfig, TypeImage};
pub use marker::{Catalog, Marker, NamedMarker};
pub use property::{PropertyBag, Value};
pub use runtime::{LiveReflection, ReflectionProbe, TypeRegistry};
pub use source::{DirectoryImageSource, ImageSource, MemoryImageSource};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
