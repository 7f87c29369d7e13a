//! Marker lookup over both visibility tiers.
//!
//! [`MarkerAccessor`] answers "does this type, or this field, carry marker M?"
//! by combining two sources:
//!
//! 1. The reflection tier: markers visible on the live [`RuntimeType`],
//!    queried through a [`ReflectionProbe`]
//! 2. The binary tier: markers recovered by fetching the type's compiled image
//!    from an [`ImageSource`] and decoding it with an [`ImageDecoder`]
//!
//! Both tiers of a type are gathered once per accessor and kept in a per-type
//! table. Inheritable markers extend the search to ancestors, each of which
//! gets its own table.
//!
//! ## Example
//!
//! ```
//! use marka_core::image::{MarkerRecord, TypeImage};
//! use marka_core::runtime::{LiveReflection, TypeRegistry};
//! use marka_core::{MarkerAccessor, MemoryImageSource, NamedMarker};
//! use prost::Message;
//!
//! let image = TypeImage::named("com.example.Point")
//!     .with_marker(MarkerRecord::class("Lcom/example/Immutable;"));
//!
//! let source = MemoryImageSource::new().with("com.example.Point", image.encode_to_vec());
//! let mut registry = TypeRegistry::new();
//! let point = registry.load(&source, "com.example.Point")?;
//!
//! // Stripped on load, so invisible to reflection
//! assert!(point.markers().is_empty());
//!
//! let immutable = NamedMarker::from_qualified("com.example.Immutable");
//! let mut accessor = MarkerAccessor::new(vec![], point, &LiveReflection, &source);
//! assert!(accessor.type_has(&immutable)?);
//! # Ok::<(), marka_core::Error>(())
//! ```

use crate::decode::{DecodedType, ImageDecoder, Occurrence, ProtoImageDecoder};
use crate::error::{Error, Result};
use crate::marker::{is_ignored, Catalog, Marker};
use crate::property::PropertyBag;
use crate::runtime::{ReflectionProbe, RuntimeType};
use crate::source::ImageSource;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Configuration for a [`MarkerAccessor`]
#[derive(Debug, Clone, Default)]
pub struct AccessorConfig {
    /// Names treated as absent even when present
    pub ignored_names: HashSet<String>,
    /// Treat an unavailable image as an empty binary tier instead of failing
    pub suppress_decode_errors: bool,
}

impl AccessorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a name to the ignore-list
    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored_names.insert(name.into());
        self
    }

    /// Adds several names to the ignore-list
    pub fn ignored_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Sets whether decode failures are suppressed
    pub fn suppress_decode_errors(mut self, suppress: bool) -> Self {
        self.suppress_decode_errors = suppress;
        self
    }
}

/// Visibility tier an occurrence was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Visible on the live type
    Reflection,
    /// Only recovered from the compiled image
    Binary,
}

/// State of the binary tier for a cached type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryTier {
    /// The image was fetched and decoded
    Decoded,
    /// The image could not be read and the failure was suppressed
    Unavailable,
}

/// A validated marker occurrence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatch {
    /// Qualified name of the type the occurrence sits on or whose field it
    /// sits on
    pub owner: String,
    /// Field name for field-level matches
    pub field: Option<String>,
    /// Descriptor of the matched occurrence
    pub descriptor: String,
    /// Tier the occurrence was found in
    pub tier: Tier,
    /// Properties captured by [`Marker::validate`]
    pub properties: PropertyBag,
}

#[derive(Debug, Clone)]
struct Entry {
    tier: Tier,
    occurrence: Occurrence,
}

/// Union of both tiers for one type
#[derive(Debug)]
struct TypeTable {
    type_markers: Vec<Entry>,
    field_markers: HashMap<String, Vec<Entry>>,
    binary: BinaryTier,
}

impl TypeTable {
    fn field(&self, name: &str) -> &[Entry] {
        self.field_markers
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn merge_binary(&mut self, decoded: DecodedType) {
        union(&mut self.type_markers, decoded.type_markers);
        for (name, occurrences) in decoded.field_markers {
            union(self.field_markers.entry(name).or_default(), occurrences);
        }
    }
}

/// Adds binary-tier occurrences that the reflection tier does not already hold
fn union(entries: &mut Vec<Entry>, occurrences: Vec<Occurrence>) {
    for occurrence in occurrences {
        if !entries.iter().any(|e| e.occurrence == occurrence) {
            entries.push(Entry {
                tier: Tier::Binary,
                occurrence,
            });
        }
    }
}

fn reflected(occurrences: Vec<Occurrence>) -> Vec<Entry> {
    occurrences
        .into_iter()
        .map(|occurrence| Entry {
            tier: Tier::Reflection,
            occurrence,
        })
        .collect()
}

/// Answers marker presence queries for one target type.
///
/// The per-type cache starts empty, is filled lazily by the query methods and
/// lives as long as the accessor. Queries take `&mut self`; use one accessor
/// per thread.
pub struct MarkerAccessor<'a> {
    catalog: Catalog,
    target: Arc<RuntimeType>,
    probe: &'a dyn ReflectionProbe,
    source: &'a dyn ImageSource,
    decoder: Box<dyn ImageDecoder + 'a>,
    config: AccessorConfig,
    cache: HashMap<String, TypeTable>,
}

impl fmt::Debug for MarkerAccessor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkerAccessor")
            .field("catalog", &self.catalog)
            .field("target", &self.target.name())
            .field("config", &self.config)
            .field("cached_types", &self.cache.len())
            .finish()
    }
}

impl<'a> MarkerAccessor<'a> {
    /// Creates an accessor with default configuration and the protobuf image
    /// decoder
    pub fn new(
        catalog: Catalog,
        target: Arc<RuntimeType>,
        probe: &'a dyn ReflectionProbe,
        source: &'a dyn ImageSource,
    ) -> Self {
        Self {
            catalog,
            target,
            probe,
            source,
            decoder: Box::new(ProtoImageDecoder::new()),
            config: AccessorConfig::default(),
            cache: HashMap::new(),
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: AccessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the image decoder
    pub fn with_decoder(mut self, decoder: impl ImageDecoder + 'a) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    /// The type under inspection
    pub fn target(&self) -> &Arc<RuntimeType> {
        &self.target
    }

    /// The markers this accessor was created with
    pub fn catalog(&self) -> &[Arc<dyn Marker>] {
        &self.catalog
    }

    /// The active configuration
    pub fn config(&self) -> &AccessorConfig {
        &self.config
    }

    /// Binary tier state of a type, if it has been looked at
    pub fn binary_tier(&self, type_name: &str) -> Option<BinaryTier> {
        self.cache.get(type_name).map(|t| t.binary)
    }

    /// Returns true if the target type, or an ancestor for inheritable
    /// markers, carries the marker
    pub fn type_has(&mut self, marker: &dyn Marker) -> Result<bool> {
        Ok(self.find_on_type(marker)?.is_some())
    }

    /// Returns true if the named field carries the marker.
    ///
    /// Fails with [`Error::FieldNotFound`] when no type in the searched chain
    /// declares the field, regardless of the suppression policy.
    pub fn field_has(&mut self, field_name: &str, marker: &dyn Marker) -> Result<bool> {
        Ok(self.find_on_field(field_name, marker)?.is_some())
    }

    /// Like [`MarkerAccessor::type_has`], returning the validated match
    pub fn find_on_type(&mut self, marker: &dyn Marker) -> Result<Option<MarkerMatch>> {
        for ty in self.chain(marker.inherits()) {
            self.ensure_table(&ty)?;
            let table = &self.cache[ty.name()];
            let found = first_match(
                ty.name(),
                None,
                &table.type_markers,
                marker,
                &self.config.ignored_names,
            );
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Like [`MarkerAccessor::field_has`], returning the validated match
    pub fn find_on_field(
        &mut self,
        field_name: &str,
        marker: &dyn Marker,
    ) -> Result<Option<MarkerMatch>> {
        let owners = self.declaring_types(field_name, marker.inherits());
        if owners.is_empty() {
            return Err(Error::field_not_found(self.target.name(), field_name));
        }

        for ty in owners {
            self.ensure_table(&ty)?;
            let table = &self.cache[ty.name()];
            let found = first_match(
                ty.name(),
                Some(field_name),
                table.field(field_name),
                marker,
                &self.config.ignored_names,
            );
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Every catalog marker present on the target type
    pub fn catalog_on_type(&mut self) -> Result<Vec<(Arc<dyn Marker>, MarkerMatch)>> {
        let mut present = Vec::new();
        for marker in self.catalog.clone() {
            if let Some(found) = self.find_on_type(marker.as_ref())? {
                present.push((marker, found));
            }
        }
        Ok(present)
    }

    /// Every catalog marker present on the named field.
    ///
    /// The field must be declared by the target or one of its ancestors.
    /// Non-inheritable markers are only looked up when the target declares
    /// the field itself.
    pub fn catalog_on_field(
        &mut self,
        field_name: &str,
    ) -> Result<Vec<(Arc<dyn Marker>, MarkerMatch)>> {
        if self.declaring_types(field_name, true).is_empty() {
            return Err(Error::field_not_found(self.target.name(), field_name));
        }

        let mut present = Vec::new();
        for marker in self.catalog.clone() {
            match self.find_on_field(field_name, marker.as_ref()) {
                Ok(Some(found)) => present.push((marker, found)),
                Ok(None) | Err(Error::FieldNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(present)
    }

    /// Target followed by its ancestors when `inherits` is set
    fn chain(&self, inherits: bool) -> Vec<Arc<RuntimeType>> {
        let mut chain = vec![Arc::clone(&self.target)];
        if inherits {
            chain.extend(self.probe.ancestors_of(&self.target));
        }
        chain
    }

    fn declaring_types(&self, field_name: &str, inherits: bool) -> Vec<Arc<RuntimeType>> {
        self.chain(inherits)
            .into_iter()
            .filter(|ty| {
                self.probe
                    .declared_fields(ty)
                    .iter()
                    .any(|f| f == field_name)
            })
            .collect()
    }

    fn fetch_and_decode(&self, type_name: &str) -> Result<DecodedType> {
        let bytes = self.source.fetch_compiled_bytes(type_name)?;
        self.decoder.decode(&bytes)
    }

    /// Builds the table for `ty` unless it is cached
    fn ensure_table(&mut self, ty: &RuntimeType) -> Result<()> {
        if self.cache.contains_key(ty.name()) {
            return Ok(());
        }

        let mut table = TypeTable {
            type_markers: reflected(self.probe.visible_markers_of(ty)),
            field_markers: self
                .probe
                .declared_fields(ty)
                .into_iter()
                .map(|name| {
                    let markers = reflected(self.probe.visible_markers_of_field(ty, &name));
                    (name, markers)
                })
                .collect(),
            binary: BinaryTier::Decoded,
        };

        match self.fetch_and_decode(ty.name()) {
            Ok(decoded) => {
                if decoded.name != ty.name() {
                    trace!("Image for {} is named {}", ty.name(), decoded.name);
                }
                table.merge_binary(decoded);
            }
            Err(e) if self.config.suppress_decode_errors && e.is_recoverable() => {
                warn!(
                    "Skipping binary tier of {}: {} (decode errors suppressed)",
                    ty.name(),
                    e
                );
                table.binary = BinaryTier::Unavailable;
            }
            Err(e) => return Err(Error::binary_form_unavailable(ty.name(), e)),
        }

        debug!(
            "Cached {}: {} type markers, {} fields, binary tier {:?}",
            ty.name(),
            table.type_markers.len(),
            table.field_markers.len(),
            table.binary
        );
        self.cache.insert(ty.name().to_string(), table);
        Ok(())
    }
}

fn first_match(
    owner: &str,
    field: Option<&str>,
    entries: &[Entry],
    marker: &dyn Marker,
    ignored: &HashSet<String>,
) -> Option<MarkerMatch> {
    entries
        .iter()
        .filter(|e| marker.matches(&e.occurrence.descriptor))
        .filter(|e| {
            let skip = is_ignored(&e.occurrence.descriptor, ignored);
            if skip {
                trace!("Ignoring {} on {}", e.occurrence.descriptor, owner);
            }
            !skip
        })
        .find_map(|e| {
            let properties = marker.validate(&e.occurrence.properties, ignored)?;
            trace!(
                "Matched {} on {} ({:?} tier)",
                e.occurrence.descriptor,
                owner,
                e.tier
            );
            Some(MarkerMatch {
                owner: owner.to_string(),
                field: field.map(str::to_string),
                descriptor: e.occurrence.descriptor.clone(),
                tier: e.tier,
                properties,
            })
        })
}
