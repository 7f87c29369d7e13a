//! Human-readable rendering of type images.

use super::{FieldImage, MarkerRecord, TypeImage};
use std::fmt::Write as FmtWrite;

/// Configuration for image rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Indentation string (default: 2 spaces)
    pub indent_str: String,
    /// Print parameter values of marker records
    pub include_properties: bool,
    /// Print `Retention::Class` records, which the loaded type never shows
    pub include_class_retention: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            indent_str: "  ".to_string(),
            include_properties: true,
            include_class_retention: true,
        }
    }
}

impl RenderConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets whether to print parameter values
    pub fn include_properties(mut self, include: bool) -> Self {
        self.include_properties = include;
        self
    }

    /// Sets whether to print class-retention records
    pub fn include_class_retention(mut self, include: bool) -> Self {
        self.include_class_retention = include;
        self
    }
}

/// Renders a [`TypeImage`] as text.
///
/// ```text
/// type com.example.Point extends com.example.Base {
///   @Lcom/example/Immutable; [class] (targets: type)
///
///   field x: I {
///     @Lcom/example/Id; [runtime]
///   }
/// }
/// ```
#[derive(Debug)]
pub struct ImageRenderer<'a> {
    image: &'a TypeImage,
    config: RenderConfig,
}

impl<'a> ImageRenderer<'a> {
    /// Creates a renderer with default configuration
    pub fn new(image: &'a TypeImage) -> Self {
        Self {
            image,
            config: RenderConfig::default(),
        }
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Render to a string
    pub fn render(&self) -> String {
        let mut output = String::new();
        // Writing into a String never fails
        let _ = self.write_to(&mut output);
        output
    }

    /// Render to any `fmt::Write` sink
    pub fn write_to(&self, w: &mut impl FmtWrite) -> std::fmt::Result {
        let mut writer = IndentWriter {
            writer: w,
            config: &self.config,
            indent_level: 0,
        };
        writer.write_type(self.image)
    }
}

struct IndentWriter<'a, W: FmtWrite> {
    writer: &'a mut W,
    config: &'a RenderConfig,
    indent_level: usize,
}

impl<W: FmtWrite> IndentWriter<'_, W> {
    fn indent(&mut self) {
        self.indent_level += 1;
    }

    fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    fn write_indent(&mut self) -> std::fmt::Result {
        for _ in 0..self.indent_level {
            write!(self.writer, "{}", self.config.indent_str)?;
        }
        Ok(())
    }

    fn writeln(&mut self, s: &str) -> std::fmt::Result {
        self.write_indent()?;
        writeln!(self.writer, "{}", s)
    }

    fn write_type(&mut self, image: &TypeImage) -> std::fmt::Result {
        match &image.super_name {
            Some(super_name) => {
                writeln!(self.writer, "type {} extends {} {{", image.name, super_name)?
            }
            None => writeln!(self.writer, "type {} {{", image.name)?,
        }
        self.indent();

        let wrote_markers = self.write_markers(&image.markers)?;

        for (i, field) in image.fields.iter().enumerate() {
            if i > 0 || wrote_markers {
                writeln!(self.writer)?;
            }
            self.write_field(field)?;
        }

        self.dedent();
        self.writeln("}")
    }

    fn write_field(&mut self, field: &FieldImage) -> std::fmt::Result {
        if self.visible(&field.markers).next().is_none() {
            return self.writeln(&format!("field {}: {}", field.name, field.descriptor));
        }

        self.writeln(&format!("field {}: {} {{", field.name, field.descriptor))?;
        self.indent();
        self.write_markers(&field.markers)?;
        self.dedent();
        self.writeln("}")
    }

    /// Returns whether anything was written
    fn write_markers(&mut self, markers: &[MarkerRecord]) -> Result<bool, std::fmt::Error> {
        let mut wrote = false;
        let visible: Vec<&MarkerRecord> = self.visible(markers).collect();
        for marker in visible {
            self.write_marker(marker)?;
            wrote = true;
        }
        Ok(wrote)
    }

    fn write_marker(&mut self, marker: &MarkerRecord) -> std::fmt::Result {
        self.write_indent()?;
        write!(
            self.writer,
            "@{} [{}]",
            marker.descriptor,
            marker.retention_policy().as_str()
        )?;

        let targets: Vec<&str> = marker.target_kinds().map(|t| t.as_str()).collect();
        if !targets.is_empty() {
            write!(self.writer, " (targets: {})", targets.join(", "))?;
        }

        if self.config.include_properties {
            let properties = marker.property_bag();
            if !properties.is_empty() {
                write!(self.writer, " {{")?;
                for (i, (name, value)) in properties.iter().enumerate() {
                    if i > 0 {
                        write!(self.writer, ",")?;
                    }
                    write!(self.writer, " {} = {}", name, value)?;
                }
                write!(self.writer, " }}")?;
            }
        }

        writeln!(self.writer)
    }

    fn visible<'m>(&self, markers: &'m [MarkerRecord]) -> impl Iterator<Item = &'m MarkerRecord> {
        let include_class = self.config.include_class_retention;
        markers.iter().filter(move |m| {
            include_class || m.retention_policy() == super::Retention::Runtime
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Target;
    use crate::property::Value;
    use pretty_assertions::assert_eq;

    fn sample() -> TypeImage {
        TypeImage::named("com.example.Point")
            .extending("com.example.Base")
            .with_marker(MarkerRecord::class("Lcom/example/Immutable;").applicable_to([Target::Type]))
            .with_typed_field("x", "I", [MarkerRecord::runtime("Lcom/example/Id;")])
            .with_typed_field(
                "label",
                "Ljava/lang/String;",
                [MarkerRecord::class("Lcom/example/Tag;").property("value", Value::Text("l".into()))],
            )
    }

    #[test]
    fn test_render() {
        let expected = "\
type com.example.Point extends com.example.Base {
  @Lcom/example/Immutable; [class] (targets: type)

  field x: I {
    @Lcom/example/Id; [runtime]
  }

  field label: Ljava/lang/String; {
    @Lcom/example/Tag; [class] { value = \"l\" }
  }
}
";
        assert_eq!(ImageRenderer::new(&sample()).render(), expected);
    }

    #[test]
    fn test_render_runtime_only() {
        let config = RenderConfig::new()
            .indent_str("    ")
            .include_class_retention(false);
        let expected = "\
type com.example.Point extends com.example.Base {
    field x: I {
        @Lcom/example/Id; [runtime]
    }

    field label: Ljava/lang/String;
}
";
        assert_eq!(
            ImageRenderer::new(&sample()).with_config(config).render(),
            expected
        );
    }

    #[test]
    fn test_render_empty_type() {
        let image = TypeImage::named("Empty");
        assert_eq!(ImageRenderer::new(&image).render(), "type Empty {\n}\n");
    }
}
