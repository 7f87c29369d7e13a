//! Lookup of compiled type images by qualified name.

use crate::error::{Error, Result};
use crate::image::IMAGE_EXTENSION;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::trace;

/// Trait for fetching the compiled bytes of a type
pub trait ImageSource: Send + Sync {
    /// Fetch the image of the type with the given qualified name.
    ///
    /// Returns [`Error::ImageNotFound`] when the type has no stored image.
    fn fetch_compiled_bytes(&self, type_name: &str) -> Result<Bytes>;
}

impl<S: ImageSource + ?Sized> ImageSource for &S {
    fn fetch_compiled_bytes(&self, type_name: &str) -> Result<Bytes> {
        (**self).fetch_compiled_bytes(type_name)
    }
}

/// In-memory image storage
#[derive(Debug, Clone, Default)]
pub struct MemoryImageSource {
    images: HashMap<String, Bytes>,
}

impl MemoryImageSource {
    /// Creates an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an image under the given type name
    pub fn insert(&mut self, type_name: impl Into<String>, bytes: impl Into<Bytes>) {
        self.images.insert(type_name.into(), bytes.into());
    }

    /// Builder-style variant of [`MemoryImageSource::insert`]
    pub fn with(mut self, type_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.insert(type_name, bytes);
        self
    }

    /// Returns true if an image is stored for the type
    pub fn contains(&self, type_name: &str) -> bool {
        self.images.contains_key(type_name)
    }

    /// Number of stored images
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Returns true if no images are stored
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ImageSource for MemoryImageSource {
    fn fetch_compiled_bytes(&self, type_name: &str) -> Result<Bytes> {
        self.images
            .get(type_name)
            .cloned()
            .ok_or_else(|| Error::image_not_found(type_name))
    }
}

/// Image storage rooted at a directory.
///
/// `com.example.Point` is stored at `<root>/com/example/Point.timg`.
#[derive(Debug, Clone)]
pub struct DirectoryImageSource {
    root: PathBuf,
}

impl DirectoryImageSource {
    /// Creates a source rooted at the given directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path where the image of `type_name` is expected.
    ///
    /// Fails with [`Error::PathTraversal`] unless every dot-separated segment
    /// is a single plain path component.
    pub fn path_for(&self, type_name: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for segment in type_name.split('.') {
            if !is_plain_segment(segment) {
                return Err(Error::path_traversal(type_name));
            }
            path.push(segment);
        }
        path.set_extension(IMAGE_EXTENSION);
        Ok(path)
    }

    /// Reverse of [`DirectoryImageSource::path_for`]
    pub fn type_name_for(&self, path: &Path) -> Option<String> {
        if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXTENSION) {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?.with_extension("");
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect();
        let segments = segments?;
        if segments.is_empty() {
            return None;
        }
        Some(segments.join("."))
    }
}

fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    !segment.contains(['/', '\\'])
        && matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
}

impl ImageSource for DirectoryImageSource {
    fn fetch_compiled_bytes(&self, type_name: &str) -> Result<Bytes> {
        let path = self.path_for(type_name)?;
        trace!("Reading image {}", path.display());
        match std::fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::image_not_found(type_name)),
            Err(e) => Err(Error::file_read(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_source() {
        let source = MemoryImageSource::new().with("a.B", vec![1u8, 2, 3]);
        assert_eq!(source.fetch_compiled_bytes("a.B").unwrap().as_ref(), &[1, 2, 3]);
        assert!(matches!(
            source.fetch_compiled_bytes("a.C"),
            Err(Error::ImageNotFound { type_name }) if type_name == "a.C"
        ));
        assert_eq!(source.len(), 1);
    }

    #[test]
    fn test_directory_paths() {
        let source = DirectoryImageSource::new("/images");
        let path = source.path_for("com.example.Point").unwrap();
        assert_eq!(path, PathBuf::from("/images/com/example/Point.timg"));
        assert_eq!(source.type_name_for(&path).as_deref(), Some("com.example.Point"));
        assert_eq!(source.type_name_for(Path::new("/images/com/README.md")), None);
        assert_eq!(source.type_name_for(Path::new("/elsewhere/A.timg")), None);
    }

    #[test]
    fn test_directory_paths_stay_inside_root() {
        let source = DirectoryImageSource::new("/images");
        for name in ["x./etc/passwd", "a...b", "..", "a.b/c", "a.b\\c", "", "a."] {
            assert!(
                matches!(source.path_for(name), Err(Error::PathTraversal { .. })),
                "accepted {:?}",
                name
            );
        }
        assert!(source.path_for("com.example.Point$Generated").is_ok());
    }

    #[test]
    fn test_directory_source_rejects_escaping_names() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("images");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(dir.path().join("secret.timg"), b"outside").unwrap();

        let source = DirectoryImageSource::new(&root);
        let escaping = format!("x.{}", dir.path().join("secret").display());
        assert!(matches!(
            source.fetch_compiled_bytes(&escaping),
            Err(Error::PathTraversal { .. })
        ));
    }

    #[test]
    fn test_directory_source_reads_files() {
        let dir = TempDir::new().unwrap();
        let source = DirectoryImageSource::new(dir.path());

        let path = source.path_for("com.example.Point").unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"image").unwrap();

        assert_eq!(
            source.fetch_compiled_bytes("com.example.Point").unwrap().as_ref(),
            b"image"
        );
        assert!(matches!(
            source.fetch_compiled_bytes("com.example.Missing"),
            Err(Error::ImageNotFound { .. })
        ));
    }
}
