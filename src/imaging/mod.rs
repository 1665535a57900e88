//! Image processing: pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions`, legacy header checks |
//! | **IPTC caption** | custom parser (JPEG APP13) |
//! | **Thumbnail** | crop + Lanczos3 resample + 3x3 sharpen → JPEG |
//!
//! The module is split into:
//! - **Geometry**: pure placement math for the crop window (unit testable)
//! - **Parameters**: data structures describing one thumbnail
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Legacy**: WBMP and XBM decoders the `image` crate does not ship

pub mod backend;
pub mod geometry;
pub(crate) mod iptc_parser;
mod legacy;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, SourceFormat, SourceInfo};
pub use geometry::{GeometryError, MAX_THUMBNAIL_SIDE, Placement, Rect};
pub use iptc_parser::{read_caption, read_file_caption};
pub use params::{Anchor, Quality, ThumbnailSpec};
pub use rust_backend::{Capabilities, Resampling, RustBackend};
