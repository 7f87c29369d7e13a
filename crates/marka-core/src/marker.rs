//! Marker descriptors and descriptor matching.
//!
//! A [`Marker`] is the capability implemented once per recognized marker
//! kind. It names the textual forms an occurrence may carry, says whether the
//! marker is inherited by subtypes, and decides whether a concrete occurrence
//! counts as a match.
//!
//! ## Textual forms
//!
//! Occurrences carry binary descriptors such as `Ljavax/annotation/Nonnull;`.
//! A marker may be looked up with varying specificity:
//!
//! - a short name: `Nonnull`
//! - a partial binary form: `annotation/Nonnull`
//! - a fully qualified descriptor: `Ljavax/annotation/Nonnull;`
//!
//! Dotted names (`javax.annotation.Nonnull`) are accepted as well. Both sides
//! are normalized to an internal name (`javax/annotation/Nonnull`), and a form
//! matches when the internal name equals, ends with or contains it.
//!
//! The looser rule lets `Nonnull` match `CheckForNonnull` as well. Markers
//! that need exact segments can opt into [`descriptor_matches_segment`]
//! through [`NamedMarker::segment_bounded`]. The ignore-list always uses the
//! segment rule, so ignoring `Nonnull` never hides `CheckForNonnull`.

use crate::property::{PropertyBag, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// A catalog of marker descriptors shared between accessors
pub type Catalog = Vec<Arc<dyn Marker>>;

/// Capability implemented by every recognized marker kind
pub trait Marker: fmt::Debug + Send + Sync {
    /// Textual forms identifying this marker, most specific last by convention
    fn textual_forms(&self) -> Vec<&str>;

    /// Whether presence on an ancestor counts as presence on a descendant
    fn inherits(&self) -> bool;

    /// Decide whether a matched occurrence counts, returning the captured
    /// properties when it does.
    ///
    /// Only called for occurrences that already matched one of
    /// [`Marker::textual_forms`] and whose descriptor is not ignored.
    fn validate(&self, properties: &PropertyBag, ignored: &HashSet<String>) -> Option<PropertyBag> {
        let _ = ignored;
        Some(properties.clone())
    }

    /// Returns true if the descriptor matches any textual form
    fn matches(&self, descriptor: &str) -> bool {
        self.textual_forms()
            .iter()
            .any(|form| descriptor_matches(descriptor, form))
    }

    /// Display name, the first textual form
    fn name(&self) -> &str {
        self.textual_forms().first().copied().unwrap_or("")
    }
}

/// Normalize a descriptor or textual form to an internal name.
///
/// `Lcom/example/Foo;`, `com.example.Foo` and `com/example/Foo` all become
/// `com/example/Foo`.
pub fn internal_name(form: &str) -> String {
    let form = form.trim();
    let form = match form.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
        Some(inner) if !inner.is_empty() => inner,
        _ => form,
    };
    form.replace('.', "/")
}

/// Convert a qualified or internal name into a binary descriptor
pub fn to_descriptor(name: &str) -> String {
    format!("L{};", internal_name(name))
}

/// Returns true if `descriptor` equals, ends with or contains `form`
pub fn descriptor_matches(descriptor: &str, form: &str) -> bool {
    let form = internal_name(form);
    !form.is_empty() && internal_name(descriptor).contains(&form)
}

/// Returns true if `descriptor` equals `form` or ends with it on a `/` or `$`
/// boundary
pub fn descriptor_matches_segment(descriptor: &str, form: &str) -> bool {
    let descriptor = internal_name(descriptor);
    let form = internal_name(form);
    if form.is_empty() {
        return false;
    }
    if descriptor == form {
        return true;
    }
    descriptor.len() > form.len()
        && descriptor.ends_with(&form)
        && matches!(
            descriptor.as_bytes()[descriptor.len() - form.len() - 1],
            b'/' | b'$'
        )
}

/// Returns true if `descriptor` is covered by any name in the ignore-list
pub fn is_ignored(descriptor: &str, ignored: &HashSet<String>) -> bool {
    ignored
        .iter()
        .any(|name| descriptor_matches_segment(descriptor, name))
}

/// Data-driven marker descriptor.
///
/// Covers markers that need no custom validation. Optionally rejects
/// occurrences whose array parameter references an ignored marker, which is
/// how "default" meta-markers that delegate to other markers behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedMarker {
    forms: Vec<String>,
    inherits: bool,
    segment_bounded: bool,
    delegating_parameter: Option<String>,
}

impl NamedMarker {
    /// Creates a non-inherited marker identified by the given forms
    pub fn new<I, S>(forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            forms: forms.into_iter().map(Into::into).collect(),
            inherits: false,
            segment_bounded: false,
            delegating_parameter: None,
        }
    }

    /// Creates a marker from a qualified name, registering its short name,
    /// partial form and full descriptor
    pub fn from_qualified(name: &str) -> Self {
        let internal = internal_name(name);
        let mut segments = internal.rsplit('/');
        let short = segments.next().unwrap_or_default().to_string();
        let partial = match segments.next() {
            Some(package) => format!("{}/{}", package, short),
            None => short.clone(),
        };
        let mut forms = vec![short];
        if partial != forms[0] {
            forms.push(partial);
        }
        forms.push(to_descriptor(&internal));
        Self::new(forms)
    }

    /// Sets whether the marker is inherited
    pub fn inheritable(mut self, inherits: bool) -> Self {
        self.inherits = inherits;
        self
    }

    /// Only match forms that end on a `/` or `$` boundary of the descriptor
    pub fn segment_bounded(mut self, bounded: bool) -> Self {
        self.segment_bounded = bounded;
        self
    }

    /// Rejects occurrences whose named array parameter references an ignored
    /// marker
    pub fn delegating_through(mut self, parameter: impl Into<String>) -> Self {
        self.delegating_parameter = Some(parameter.into());
        self
    }

    /// Wraps the marker for use in a [`Catalog`]
    pub fn shared(self) -> Arc<dyn Marker> {
        Arc::new(self)
    }
}

impl Marker for NamedMarker {
    fn textual_forms(&self) -> Vec<&str> {
        self.forms.iter().map(String::as_str).collect()
    }

    fn inherits(&self) -> bool {
        self.inherits
    }

    fn matches(&self, descriptor: &str) -> bool {
        if !self.segment_bounded {
            return self.forms.iter().any(|form| descriptor_matches(descriptor, form));
        }
        self.forms
            .iter()
            .any(|form| descriptor_matches_segment(descriptor, form))
    }

    fn validate(&self, properties: &PropertyBag, ignored: &HashSet<String>) -> Option<PropertyBag> {
        if let Some(parameter) = &self.delegating_parameter {
            let references_ignored = properties
                .array(parameter)
                .unwrap_or_default()
                .iter()
                .filter_map(Value::as_type_ref)
                .any(|descriptor| is_ignored(descriptor, ignored));
            if references_ignored {
                return None;
            }
        }
        Some(properties.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_internal_name() {
        assert_eq!(internal_name("Ljavax/annotation/Nonnull;"), "javax/annotation/Nonnull");
        assert_eq!(internal_name("javax.annotation.Nonnull"), "javax/annotation/Nonnull");
        assert_eq!(internal_name("Nonnull"), "Nonnull");
        assert_eq!(internal_name("Lombok"), "Lombok");
        assert_eq!(to_descriptor("javax.annotation.Nonnull"), "Ljavax/annotation/Nonnull;");
    }

    #[test]
    fn test_descriptor_matches_by_specificity() {
        let descriptor = "Ljavax/annotation/Nonnull;";
        assert!(descriptor_matches(descriptor, "Nonnull"));
        assert!(descriptor_matches(descriptor, "annotation/Nonnull"));
        assert!(descriptor_matches(descriptor, "Ljavax/annotation/Nonnull;"));
        assert!(descriptor_matches(descriptor, "javax.annotation.Nonnull"));
    }

    #[test]
    fn test_descriptor_matches_contained_forms() {
        assert!(descriptor_matches("Lcom/example/NotNonnull;", "Nonnull"));
        assert!(descriptor_matches("Ljavax/annotation/Nonnull;", "annotation"));
        assert!(descriptor_matches("Lcom/example/Outer$Nonnull;", "Nonnull"));
        assert!(!descriptor_matches("Lcom/example/Nonnull;", "other/Nonnull"));
        assert!(!descriptor_matches("Lcom/example/Nonnull;", ""));
    }

    #[test]
    fn test_descriptor_matches_segment_boundary() {
        assert!(!descriptor_matches_segment("Lcom/example/NotNonnull;", "Nonnull"));
        assert!(!descriptor_matches_segment("Ljavax/annotation/Nonnull;", "annotation"));
        assert!(descriptor_matches_segment("Lcom/example/Outer$Nonnull;", "Nonnull"));
        assert!(descriptor_matches_segment("Lcom/example/Nonnull;", "Lcom/example/Nonnull;"));
        assert!(!descriptor_matches_segment("Lcom/example/Nonnull;", ""));
    }

    #[test]
    fn test_named_marker_matching_rules() {
        let loose = NamedMarker::new(["Nonnull"]);
        assert!(loose.matches("Lcom/example/CheckForNonnull;"));
        assert!(NamedMarker::new(["annotation"]).matches("Ljavax/annotation/Nonnull;"));

        let bounded = NamedMarker::new(["Nonnull"]).segment_bounded(true);
        assert!(!bounded.matches("Lcom/example/CheckForNonnull;"));
        assert!(bounded.matches("Ljavax/annotation/Nonnull;"));
    }

    #[test]
    fn test_from_qualified_forms() {
        let marker = NamedMarker::from_qualified("javax.annotation.Nonnull");
        assert_eq!(
            marker.textual_forms(),
            vec!["Nonnull", "annotation/Nonnull", "Ljavax/annotation/Nonnull;"]
        );
        assert_eq!(marker.name(), "Nonnull");
        assert!(!marker.inherits());
    }

    #[test]
    fn test_from_qualified_without_package() {
        let marker = NamedMarker::from_qualified("Tag");
        assert_eq!(marker.textual_forms(), vec!["Tag", "LTag;"]);
    }

    #[test]
    fn test_is_ignored() {
        let ignored: HashSet<String> = ["Ljavax/annotation/Nonnull;".to_string()].into();
        assert!(is_ignored("Ljavax/annotation/Nonnull;", &ignored));
        assert!(!is_ignored("Lcom/example/Nonnull;", &ignored));

        let short: HashSet<String> = ["Nonnull".to_string()].into();
        assert!(is_ignored("Ljavax/annotation/Nonnull;", &short));
        assert!(!is_ignored("Lcom/example/CheckForNonnull;", &short));
    }

    #[test]
    fn test_delegating_marker_rejects_ignored_references() {
        let marker = NamedMarker::new(["DefaultNonnull"]).delegating_through("value");
        let properties = PropertyBag::new().with(
            "value",
            Value::Array(vec![Value::TypeRef("Ljavax/annotation/Nonnull;".into())]),
        );

        assert!(marker.validate(&properties, &HashSet::new()).is_some());

        let ignored: HashSet<String> = ["Nonnull".to_string()].into();
        assert!(marker.validate(&properties, &ignored).is_none());
    }
}
