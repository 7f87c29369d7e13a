//! In-process runtime model.
//!
//! Types live in a [`TypeRegistry`] as [`RuntimeType`]s. A type gets there in
//! one of two ways:
//!
//! - **Loaded** from a compiled [`TypeImage`]. Loading keeps only markers with
//!   [`Retention::Runtime`] that apply to the element they sit on; every
//!   class-retention marker is stripped and can only be recovered by decoding
//!   the image again.
//! - **Synthesized** from a [`SyntheticType`]. Such types have no image at
//!   all; fetching their compiled bytes fails.
//!
//! Every type implicitly descends from a universal root that carries no
//! fields and no markers and is never materialized.

mod probe;

use crate::decode::{Occurrence, ProtoImageDecoder};
use crate::error::{Error, Result};
use crate::image::{MarkerRecord, Retention, Target, TypeImage};
use crate::source::ImageSource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

pub use probe::{LiveReflection, ReflectionProbe};

/// How a runtime type came into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Loaded from a compiled image
    Image,
    /// Generated at runtime, no compiled image exists
    Synthetic,
}

/// A field of a live type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeField {
    /// Field name
    pub name: String,
    /// Binary descriptor of the field type
    pub descriptor: String,
    /// Markers visible at runtime
    pub markers: Vec<Occurrence>,
}

/// Live representation of a type
#[derive(Debug)]
pub struct RuntimeType {
    name: String,
    super_type: Option<Arc<RuntimeType>>,
    markers: Vec<Occurrence>,
    fields: Vec<RuntimeField>,
    origin: Origin,
}

impl RuntimeType {
    /// Qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct super type; `None` below the universal root
    pub fn super_type(&self) -> Option<&Arc<RuntimeType>> {
        self.super_type.as_ref()
    }

    /// Markers visible at runtime
    pub fn markers(&self) -> &[Occurrence] {
        &self.markers
    }

    /// Declared fields, in declaration order
    pub fn fields(&self) -> &[RuntimeField] {
        &self.fields
    }

    /// Returns the declared field with the given name
    pub fn field(&self, name: &str) -> Option<&RuntimeField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// How the type was created
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Returns true if the type was generated at runtime
    pub fn is_synthetic(&self) -> bool {
        self.origin == Origin::Synthetic
    }

    /// Iterates the ancestor chain, nearest first, stopping before the root
    pub fn ancestors(&self) -> impl Iterator<Item = &Arc<RuntimeType>> {
        std::iter::successors(self.super_type.as_ref(), |ty| ty.super_type.as_ref())
    }
}

fn live_markers(records: &[MarkerRecord], target: Target) -> Vec<Occurrence> {
    records
        .iter()
        .filter(|r| r.retention_policy() == Retention::Runtime && r.applies_to(target))
        .map(|r| Occurrence::new(r.descriptor.clone(), r.property_bag()))
        .collect()
}

/// Description of a type generated at runtime
#[derive(Debug, Clone, Default)]
pub struct SyntheticType {
    name: String,
    super_name: Option<String>,
    markers: Vec<Occurrence>,
    fields: Vec<RuntimeField>,
}

impl SyntheticType {
    /// Starts a synthetic type directly below the root
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the super type, which must already be defined
    pub fn extending(mut self, super_name: impl Into<String>) -> Self {
        self.super_name = Some(super_name.into());
        self
    }

    /// Adds a runtime-visible marker
    pub fn with_marker(mut self, marker: Occurrence) -> Self {
        self.markers.push(marker);
        self
    }

    /// Adds a field with runtime-visible markers
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        markers: impl IntoIterator<Item = Occurrence>,
    ) -> Self {
        self.fields.push(RuntimeField {
            name: name.into(),
            descriptor: descriptor.into(),
            markers: markers.into_iter().collect(),
        });
        self
    }
}

/// Registry of live types
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<RuntimeType>>,
    decoder: ProtoImageDecoder,
}

impl TypeRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that parses images with the given decoder
    pub fn with_decoder(decoder: ProtoImageDecoder) -> Self {
        Self {
            types: HashMap::new(),
            decoder,
        }
    }

    /// Looks up a defined type
    pub fn get(&self, name: &str) -> Option<Arc<RuntimeType>> {
        self.types.get(name).cloned()
    }

    /// Looks up a defined type, failing with [`Error::UnknownType`]
    pub fn require(&self, name: &str) -> Result<Arc<RuntimeType>> {
        self.get(name).ok_or_else(|| Error::unknown_type(name))
    }

    /// Returns true if the type is defined
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of defined types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if nothing is defined
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Defined type names, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn resolve_super(&self, name: &str, super_name: Option<&str>) -> Result<Option<Arc<RuntimeType>>> {
        if self.contains(name) {
            return Err(Error::duplicate_type(name));
        }
        super_name
            .map(|s| {
                self.get(s)
                    .ok_or_else(|| Error::unresolved_super_type(name, s))
            })
            .transpose()
    }

    fn insert(&mut self, ty: RuntimeType) -> Arc<RuntimeType> {
        let ty = Arc::new(ty);
        self.types.insert(ty.name.clone(), Arc::clone(&ty));
        ty
    }

    /// Defines a type from a parsed image, stripping class-retention markers
    pub fn define(&mut self, image: &TypeImage) -> Result<Arc<RuntimeType>> {
        if image.name.is_empty() {
            return Err(Error::UnnamedImage);
        }
        let super_type = self.resolve_super(&image.name, image.super_name.as_deref())?;

        let markers = live_markers(&image.markers, Target::Type);
        let fields = image
            .fields
            .iter()
            .map(|f| RuntimeField {
                name: f.name.clone(),
                descriptor: f.descriptor.clone(),
                markers: live_markers(&f.markers, Target::Field),
            })
            .collect();

        debug!(
            "Defined {} ({} of {} type markers visible at runtime)",
            image.name,
            markers.len(),
            image.markers.len()
        );

        Ok(self.insert(RuntimeType {
            name: image.name.clone(),
            super_type,
            markers,
            fields,
            origin: Origin::Image,
        }))
    }

    /// Parses and defines a type from raw image bytes
    pub fn define_bytes(&mut self, bytes: &[u8]) -> Result<Arc<RuntimeType>> {
        let image = self.decoder.parse(bytes)?;
        self.define(&image)
    }

    /// Defines a type that has no compiled image
    pub fn define_synthetic(&mut self, synthetic: SyntheticType) -> Result<Arc<RuntimeType>> {
        let super_type = self.resolve_super(&synthetic.name, synthetic.super_name.as_deref())?;
        debug!("Defined synthetic type {}", synthetic.name);
        Ok(self.insert(RuntimeType {
            name: synthetic.name,
            super_type,
            markers: synthetic.markers,
            fields: synthetic.fields,
            origin: Origin::Synthetic,
        }))
    }

    /// Loads a type and any missing super types from `source`.
    ///
    /// Already defined types are returned as is. Every fetched image must
    /// declare the name it was fetched under.
    pub fn load(&mut self, source: &dyn ImageSource, name: &str) -> Result<Arc<RuntimeType>> {
        if let Some(ty) = self.get(name) {
            return Ok(ty);
        }

        // Collect images from `name` up to the first defined ancestor
        let mut pending: Vec<TypeImage> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut next = Some(name.to_string());

        while let Some(current) = next.take() {
            if self.contains(&current) {
                break;
            }
            if !seen.insert(current.clone()) {
                let child = pending.last().map(|i| i.name.clone()).unwrap_or_default();
                return Err(Error::unresolved_super_type(child, current));
            }

            trace!("Loading {}", current);
            let bytes = source.fetch_compiled_bytes(&current)?;
            let image = self.decoder.parse(&bytes)?;
            if image.name != current {
                return Err(Error::image_name_mismatch(current, image.name));
            }
            next = image.super_name.clone();
            pending.push(image);
        }

        let mut loaded = None;
        while let Some(image) = pending.pop() {
            loaded = Some(self.define(&image)?);
        }
        loaded.ok_or_else(|| Error::unknown_type(name))
    }
}
