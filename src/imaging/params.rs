//! Parameter types for thumbnail rendering.
//!
//! These structs describe *what* to render, not *how*. They are the interface
//! between the callers that decide which thumbnail to build (the
//! [`store`](crate::store) and the CLI) and the [`backend`](super::backend)
//! that does the pixel work.
//!
//! - [`Quality`]: JPEG quality (1–100, default 90). Clamped on construction.
//! - [`Anchor`]: crop anchor, both axes in [0, 1].
//! - [`ThumbnailSpec`]: full description of one thumbnail.

use crate::config::ThumbnailConfig;

/// Quality setting for JPEG encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Fraction of the overflow trimmed from the left (`x`) and top (`y`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

impl Anchor {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }

    pub fn center() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::center()
    }
}

/// Everything the renderer needs to know to build one thumbnail.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailSpec {
    pub width: u32,
    /// Zero means square (`height = width`).
    pub height: u32,
    pub quality: Quality,
    pub anchor: Anchor,
    pub background: [u8; 3],
    pub sharpen: bool,
}

impl ThumbnailSpec {
    pub fn from_config(config: &ThumbnailConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            quality: Quality::new(config.quality),
            anchor: Anchor::new(config.crop_x, config.crop_y),
            background: config.background,
            sharpen: config.sharpen,
        }
    }

    /// Output canvas size with the square shorthand resolved.
    pub fn canvas(&self) -> (u32, u32) {
        super::geometry::target_box(self.width, self.height)
    }
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self::from_config(&ThumbnailConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_90() {
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn anchor_clamps() {
        let a = Anchor::new(-1.0, 2.0);
        assert_eq!(a, Anchor { x: 0.0, y: 1.0 });
    }

    #[test]
    fn default_spec_is_square_100() {
        let spec = ThumbnailSpec::default();
        assert_eq!(spec.canvas(), (100, 100));
        assert_eq!(spec.quality.value(), 90);
        assert_eq!(spec.anchor, Anchor::center());
        assert_eq!(spec.background, [255, 255, 255]);
        assert!(spec.sharpen);
    }
}
