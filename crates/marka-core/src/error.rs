//! Error types for the marka-core library.
//!
//! Two variants belong to the marker accessor itself ([`Error::FieldNotFound`]
//! and [`Error::BinaryFormUnavailable`]); the rest are raised by the
//! collaborators that fetch, decode and load type images.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for marka operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all marka operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A field lookup found no declaring type in the searched chain
    #[error("type '{type_name}' does not have field '{field_name}'")]
    FieldNotFound {
        /// Qualified name of the queried type
        type_name: String,
        /// Name of the missing field
        field_name: String,
    },

    /// The compiled form of a type could not be fetched or decoded
    #[error(
        "cannot read compiled form of type '{type_name}': {source}\n\
         enable decode error suppression to skip the binary tier for such types"
    )]
    BinaryFormUnavailable {
        /// Qualified name of the type whose image was needed
        type_name: String,
        /// What went wrong while fetching or decoding
        #[source]
        source: Box<Error>,
    },

    /// No image is stored under the requested type name
    #[error("no compiled image found for type '{type_name}'")]
    ImageNotFound {
        /// Qualified name of the requested type
        type_name: String,
    },

    /// Failed to read an image file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Image bytes are not a valid type image
    #[error("failed to decode type image: {0}")]
    ImageDecode(#[from] prost::DecodeError),

    /// Image exceeds the configured size limit
    #[error("type image is {size} bytes, limit is {max}")]
    ImageTooLarge {
        /// Actual image size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Image decoded but carries no type name
    #[error("type image has an empty type name")]
    UnnamedImage,

    /// A type name does not map to a location inside the image directory
    #[error("path traversal detected: type name '{type_name}' would escape the image directory")]
    PathTraversal {
        /// The offending type name
        type_name: String,
    },

    /// A fetched image declares a different type than the one requested
    #[error("image fetched for type '{requested}' declares type '{declared}'")]
    ImageNameMismatch {
        /// Name the image was fetched under
        requested: String,
        /// Name stored in the image
        declared: String,
    },

    /// A type names a super type that is not defined in the registry
    #[error("type '{type_name}' extends '{super_name}', which is not defined")]
    UnresolvedSuperType {
        /// Type being defined
        type_name: String,
        /// Missing super type
        super_name: String,
    },

    /// A type with the same name is already defined
    #[error("type '{type_name}' is already defined")]
    DuplicateType {
        /// The duplicated name
        type_name: String,
    },

    /// Lookup of a type that the registry does not know
    #[error("unknown type '{type_name}'")]
    UnknownType {
        /// The requested name
        type_name: String,
    },
}

impl Error {
    /// Creates a new field-not-found error
    pub fn field_not_found(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self::FieldNotFound {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }

    /// Wraps a fetch or decode failure for the given type
    pub fn binary_form_unavailable(type_name: impl Into<String>, source: Error) -> Self {
        Self::BinaryFormUnavailable {
            type_name: type_name.into(),
            source: Box::new(source),
        }
    }

    /// Creates a new image-not-found error
    pub fn image_not_found(type_name: impl Into<String>) -> Self {
        Self::ImageNotFound {
            type_name: type_name.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new path traversal error
    pub fn path_traversal(type_name: impl Into<String>) -> Self {
        Self::PathTraversal {
            type_name: type_name.into(),
        }
    }

    /// Creates a new image name mismatch error
    pub fn image_name_mismatch(
        requested: impl Into<String>,
        declared: impl Into<String>,
    ) -> Self {
        Self::ImageNameMismatch {
            requested: requested.into(),
            declared: declared.into(),
        }
    }

    /// Creates a new unresolved super type error
    pub fn unresolved_super_type(
        type_name: impl Into<String>,
        super_name: impl Into<String>,
    ) -> Self {
        Self::UnresolvedSuperType {
            type_name: type_name.into(),
            super_name: super_name.into(),
        }
    }

    /// Creates a new duplicate type error
    pub fn duplicate_type(type_name: impl Into<String>) -> Self {
        Self::DuplicateType {
            type_name: type_name.into(),
        }
    }

    /// Creates a new unknown type error
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    /// Returns true if this error only means the binary tier of a type is
    /// missing, so a suppression policy may treat it as empty
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::BinaryFormUnavailable { .. }
                | Self::ImageNotFound { .. }
                | Self::FileRead { .. }
                | Self::ImageDecode(_)
                | Self::ImageTooLarge { .. }
                | Self::UnnamedImage
        )
    }
}
