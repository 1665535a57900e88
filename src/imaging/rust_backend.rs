//! Pure Rust thumbnail backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff format | `image::guess_format`, then [`legacy`](super::legacy) header checks |
//! | Decode (GIF, JPEG, PNG) | `image` crate decoders |
//! | Decode (WBMP, XBM) | [`legacy`](super::legacy) |
//! | Crop + resample | `DynamicImage::crop_imm` + `resize_exact` (Lanczos3 or Nearest) |
//! | Letterbox | `imageops::overlay` onto a background-filled canvas |
//! | Sharpening | fixed 3x3 convolution, see [`SHARPEN_KERNEL`] |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` |

use super::backend::{BackendError, ImageBackend, SourceFormat, SourceInfo};
use super::geometry::Placement;
use super::legacy;
use super::params::{Quality, ThumbnailSpec};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{
    DynamicImage, ExtendedColorType, ImageEncoder, ImageFormat, ImageReader, Rgb, RgbImage, Rgba,
    RgbaImage,
};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Sharpening kernel applied to every thumbnail. Its weights sum to 8, the
/// divisor, so flat areas are left unchanged.
pub const SHARPEN_KERNEL: [[f32; 3]; 3] = [[-1.0, -1.0, -1.0], [-1.0, 16.0, -1.0], [-1.0, -1.0, -1.0]];
pub const SHARPEN_DIVISOR: f32 = 8.0;
pub const SHARPEN_OFFSET: f32 = 0.0;

/// Bytes read from the start of a file to identify it.
const HEADER_BYTES: u64 = 4096;

/// Resampling quality available to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    /// Lanczos3 filtered resampling.
    Filtered,
    /// Nearest-neighbour copy.
    Nearest,
}

/// What the backend may use while rendering.
///
/// Reduced capabilities degrade quality but never fail a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub resampling: Resampling,
    pub convolution: bool,
}

impl Capabilities {
    pub fn full() -> Self {
        Self {
            resampling: Resampling::Filtered,
            convolution: true,
        }
    }

    pub fn degraded() -> Self {
        Self {
            resampling: Resampling::Nearest,
            convolution: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Pure Rust backend built on the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct RustBackend {
    capabilities: Capabilities,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

fn raster_format(format: SourceFormat) -> Option<ImageFormat> {
    match format {
        SourceFormat::Gif => Some(ImageFormat::Gif),
        SourceFormat::Jpeg => Some(ImageFormat::Jpeg),
        SourceFormat::Png => Some(ImageFormat::Png),
        SourceFormat::Wbmp | SourceFormat::Xbm => None,
    }
}

/// Determine the source format from the file contents.
pub fn sniff_format(data: &[u8]) -> Result<SourceFormat, BackendError> {
    match image::guess_format(data) {
        Ok(ImageFormat::Gif) => Ok(SourceFormat::Gif),
        Ok(ImageFormat::Jpeg) => Ok(SourceFormat::Jpeg),
        Ok(ImageFormat::Png) => Ok(SourceFormat::Png),
        Ok(other) => Err(BackendError::UnsupportedFormat(
            format!("{other:?}").to_lowercase(),
        )),
        Err(_) if legacy::is_xbm(data) => Ok(SourceFormat::Xbm),
        Err(_) if legacy::is_wbmp(data) => Ok(SourceFormat::Wbmp),
        Err(_) => Err(BackendError::UnsupportedFormat("unknown".into())),
    }
}

/// Read the dimensions of a source without decoding its pixels.
///
/// Only the first [`HEADER_BYTES`] are sniffed. GIF, JPEG and PNG are then
/// parsed by the `image` decoders, which stop after the header.
fn read_header(path: &Path) -> Result<SourceInfo, BackendError> {
    let mut file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut head = Vec::new();
    file.by_ref().take(HEADER_BYTES).read_to_end(&mut head)?;

    let bad_header = || BackendError::Decode(path.display().to_string());
    let (format, (width, height)) = if image::guess_format(&head).is_ok() {
        let format = sniff_format(&head)?;
        file.seek(SeekFrom::Start(0))?;
        let reader = ImageReader::new(BufReader::new(file)).with_guessed_format()?;
        let dims = reader.into_dimensions().map_err(|_| bad_header())?;
        (format, dims)
    } else if let Some(dims) = legacy::xbm_header_dimensions(&head) {
        (SourceFormat::Xbm, dims)
    } else if let Some(dims) = legacy::wbmp_header_dimensions(&head, file_len) {
        (SourceFormat::Wbmp, dims)
    } else {
        return Err(BackendError::UnsupportedFormat("unknown".into()));
    };

    Ok(SourceInfo {
        width,
        height,
        format,
    })
}

fn decode(data: &[u8], format: SourceFormat, path: &Path) -> Result<DynamicImage, BackendError> {
    let decoded = match (format, raster_format(format)) {
        (_, Some(fmt)) => image::load_from_memory_with_format(data, fmt)
            .map_err(|e| BackendError::Decode(format!("{}: {}", path.display(), e)))?,
        (SourceFormat::Wbmp, None) => legacy::decode_wbmp(data)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| BackendError::Decode(format!("{}: malformed WBMP", path.display())))?,
        (_, None) => legacy::decode_xbm(data)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| BackendError::Decode(format!("{}: malformed XBM", path.display())))?,
    };
    Ok(decoded)
}

/// Copy the placed source region onto a background-filled canvas.
fn compose(img: &DynamicImage, spec: &ThumbnailSpec, resampling: Resampling) -> Result<RgbImage, BackendError> {
    let canvas_size = spec.canvas();
    let placement = Placement::compute(
        (img.width(), img.height()),
        canvas_size,
        (spec.anchor.x, spec.anchor.y),
    )?;

    let [r, g, b] = spec.background;
    let mut canvas = RgbaImage::from_pixel(canvas_size.0, canvas_size.1, Rgba([r, g, b, 255]));

    let filter = match resampling {
        Resampling::Filtered => FilterType::Lanczos3,
        Resampling::Nearest => FilterType::Nearest,
    };
    let src = placement.src;
    let dst = placement.dst;
    let region = img
        .crop_imm(src.x, src.y, src.width, src.height)
        .resize_exact(dst.width, dst.height, filter)
        .to_rgba8();
    image::imageops::overlay(&mut canvas, &region, i64::from(dst.x), i64::from(dst.y));

    Ok(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

/// Apply a 3x3 convolution with clamped edges, per RGB channel.
pub fn convolve3x3(img: &RgbImage, kernel: &[[f32; 3]; 3], divisor: f32, offset: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    let max_x = i64::from(w) - 1;
    let max_y = i64::from(h) - 1;
    RgbImage::from_fn(w, h, |x, y| {
        let mut acc = [0f32; 3];
        for (ky, row) in kernel.iter().enumerate() {
            let sy = (i64::from(y) + ky as i64 - 1).clamp(0, max_y) as u32;
            for (kx, weight) in row.iter().enumerate() {
                let sx = (i64::from(x) + kx as i64 - 1).clamp(0, max_x) as u32;
                let px = img.get_pixel(sx, sy);
                for (sum, channel) in acc.iter_mut().zip(px.0) {
                    *sum += f32::from(channel) * weight;
                }
            }
        }
        Rgb(acc.map(|v| (v / divisor + offset).round().clamp(0.0, 255.0) as u8))
    })
}

fn encode_jpeg(img: &RgbImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.value())
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .map_err(|e| BackendError::Encode(e.to_string()))?;
    Ok(buf)
}

impl ImageBackend for RustBackend {
    fn identify(&self, path: &Path) -> Result<SourceInfo, BackendError> {
        read_header(path)
    }

    fn render(&self, path: &Path, spec: &ThumbnailSpec) -> Result<Vec<u8>, BackendError> {
        let data = std::fs::read(path)?;
        let format = sniff_format(&data)?;
        let img = decode(&data, format, path)?;

        let mut thumb = compose(&img, spec, self.capabilities.resampling)?;
        if spec.sharpen && self.capabilities.convolution {
            thumb = convolve3x3(&thumb, &SHARPEN_KERNEL, SHARPEN_DIVISOR, SHARPEN_OFFSET);
        }

        encode_jpeg(&thumb, spec.quality)
    }
}
