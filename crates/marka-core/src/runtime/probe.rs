//! Reflection over live types.

use super::RuntimeType;
use crate::decode::Occurrence;
use std::sync::Arc;

/// Queries the live representation of a type for markers that are visible
/// without decoding its image
pub trait ReflectionProbe: Send + Sync {
    /// Markers visible on the type itself
    fn visible_markers_of(&self, ty: &RuntimeType) -> Vec<Occurrence>;

    /// Markers visible on a field declared by the type; empty if the type does
    /// not declare it
    fn visible_markers_of_field(&self, ty: &RuntimeType, field_name: &str) -> Vec<Occurrence>;

    /// Names of the fields the type declares itself
    fn declared_fields(&self, ty: &RuntimeType) -> Vec<String>;

    /// Ancestors, nearest first, ending before the universal root
    fn ancestors_of(&self, ty: &RuntimeType) -> Vec<Arc<RuntimeType>>;
}

/// Probe backed by [`RuntimeType`] data
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveReflection;

impl ReflectionProbe for LiveReflection {
    fn visible_markers_of(&self, ty: &RuntimeType) -> Vec<Occurrence> {
        ty.markers().to_vec()
    }

    fn visible_markers_of_field(&self, ty: &RuntimeType, field_name: &str) -> Vec<Occurrence> {
        ty.field(field_name)
            .map(|f| f.markers.clone())
            .unwrap_or_default()
    }

    fn declared_fields(&self, ty: &RuntimeType) -> Vec<String> {
        ty.fields().iter().map(|f| f.name.clone()).collect()
    }

    fn ancestors_of(&self, ty: &RuntimeType) -> Vec<Arc<RuntimeType>> {
        ty.ancestors().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{MarkerRecord, TypeImage};
    use crate::runtime::TypeRegistry;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_live_reflection() {
        let mut registry = TypeRegistry::new();
        registry
            .define(&TypeImage::named("Base").with_field("inherited", []))
            .unwrap();
        let ty = registry
            .define(
                &TypeImage::named("Sub")
                    .extending("Base")
                    .with_marker(MarkerRecord::runtime("LTag;"))
                    .with_field("own", [MarkerRecord::runtime("LFieldTag;")]),
            )
            .unwrap();

        let probe = LiveReflection;
        assert_eq!(probe.visible_markers_of(&ty).len(), 1);
        assert_eq!(probe.visible_markers_of_field(&ty, "own").len(), 1);
        assert!(probe.visible_markers_of_field(&ty, "inherited").is_empty());
        assert_eq!(probe.declared_fields(&ty), vec!["own".to_string()]);

        let ancestors: Vec<String> = probe
            .ancestors_of(&ty)
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(ancestors, vec!["Base".to_string()]);
    }
}
