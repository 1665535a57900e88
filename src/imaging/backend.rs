//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the rest of the crate
//! needs: `identify` (header-only read used while rendering gallery HTML) and
//! `render` (the full decode → place → sharpen → encode pipeline used when a
//! thumbnail is actually fetched).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::geometry::GeometryError;
use super::params::ThumbnailSpec;
use std::fmt;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("format {0} not supported")]
    UnsupportedFormat(String),
    #[error("Failed to decode {0}")]
    Decode(String),
    #[error("JPEG encode failed: {0}")]
    Encode(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Source formats a thumbnail can be made from.
///
/// The numeric tags are the conventional image-type codes (as reported by
/// `getimagesize`-style checks) and show up in user-facing error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Gif,
    Jpeg,
    Png,
    Wbmp,
    Xbm,
}

impl SourceFormat {
    pub fn tag(self) -> u8 {
        match self {
            SourceFormat::Gif => 1,
            SourceFormat::Jpeg => 2,
            SourceFormat::Png => 3,
            SourceFormat::Wbmp => 15,
            SourceFormat::Xbm => 16,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::Gif => "gif",
            SourceFormat::Jpeg => "jpeg",
            SourceFormat::Png => "png",
            SourceFormat::Wbmp => "wbmp",
            SourceFormat::Xbm => "xbm",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
}

/// Trait for thumbnail backends.
///
/// `Sync` so a single backend can be shared by rayon workers when warming a
/// whole page.
pub trait ImageBackend: Sync {
    /// Read dimensions and format from the file header.
    fn identify(&self, path: &Path) -> Result<SourceInfo, BackendError>;

    /// Render a thumbnail and return the encoded JPEG bytes.
    fn render(&self, path: &Path, spec: &ThumbnailSpec) -> Result<Vec<u8>, BackendError>;
}
