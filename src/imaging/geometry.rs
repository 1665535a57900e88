//! Pure placement math for square (or fixed-box) thumbnails.
//!
//! Everything here is pure and testable without any I/O or images.
//!
//! A thumbnail is produced by copying a rectangle of the source (`src`) into a
//! rectangle of the output canvas (`dst`), resampling on the way. The source
//! rectangle is the largest window with the target's aspect ratio that fits the
//! source, positioned by the crop anchor. Sources smaller than the target are
//! never upscaled: they are copied 1:1 and centered, the rest of the canvas
//! keeps its background colour.
//!
//! ```text
//! source 1200x800, target 100x100, anchor (0.5, 0.5)
//!
//!   scale  = max(1, min(800/100, 1200/100)) = 8
//!   window = 800x800
//!   src    = x 200, y 0, 800x800
//!   dst    = x 0,   y 0, 100x100
//! ```

use thiserror::Error;

/// Largest thumbnail side, in pixels. Bigger boxes are rejected before any
/// canvas is allocated.
pub const MAX_THUMBNAIL_SIDE: u32 = 4096;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Invalid dimensions: source {source_w}x{source_h}, target {target_w}x{target_h}")]
    InvalidDimensions {
        source_w: u32,
        source_h: u32,
        target_w: u32,
        target_h: u32,
    },
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where a thumbnail's pixels come from and where they land.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Source pixels per output pixel. Never below 1.
    pub scale: f64,
    /// Crop window size in source space, before clipping to the source.
    pub window: (u32, u32),
    /// Rectangle read from the source image.
    pub src: Rect,
    /// Rectangle written on the output canvas.
    pub dst: Rect,
}

/// Resolve the effective target box: a zero height means a square thumbnail.
pub fn target_box(width: u32, height: u32) -> (u32, u32) {
    if height == 0 { (width, width) } else { (width, height) }
}

impl Placement {
    /// Compute the placement of a `source` image into a `target` box.
    ///
    /// `anchor` is the fraction of the overflow trimmed from the left/top:
    /// `0.0` keeps the left (top) edge, `1.0` the right (bottom) edge.
    /// Values outside [0, 1] are clamped.
    pub fn compute(
        source: (u32, u32),
        target: (u32, u32),
        anchor: (f64, f64),
    ) -> Result<Self, GeometryError> {
        let (src_w, src_h) = source;
        let (tgt_w, tgt_h) = target_box(target.0, target.1);

        if src_w == 0
            || src_h == 0
            || tgt_w == 0
            || tgt_w > MAX_THUMBNAIL_SIDE
            || tgt_h > MAX_THUMBNAIL_SIDE
        {
            return Err(GeometryError::InvalidDimensions {
                source_w: src_w,
                source_h: src_h,
                target_w: target.0,
                target_h: target.1,
            });
        }

        let (sw, sh, tw, th) = (src_w as f64, src_h as f64, tgt_w as f64, tgt_h as f64);
        let cx = anchor.0.clamp(0.0, 1.0);
        let cy = anchor.1.clamp(0.0, 1.0);

        let scale = (sh / th).min(sw / tw).max(1.0);
        let win_w = (scale * tw).round();
        let win_h = (scale * th).round();

        let src = Rect {
            x: ((sw - win_w) * cx).round().max(0.0) as u32,
            y: ((sh - win_h) * cy).round().max(0.0) as u32,
            width: src_w.min(win_w as u32),
            height: src_h.min(win_h as u32),
        };

        let dst = Rect {
            x: ((tw - sw) / 2.0).round().max(0.0) as u32,
            y: ((th - sh) / 2.0).round().max(0.0) as u32,
            width: tgt_w.min(src_w),
            height: tgt_h.min(src_h),
        };

        Ok(Self {
            scale,
            window: (win_w as u32, win_h as u32),
            src,
            dst,
        })
    }

    /// True when the copied pixels cover the whole canvas (no letterboxing).
    pub fn fills(&self, target: (u32, u32)) -> bool {
        let (w, h) = target_box(target.0, target.1);
        self.dst == Rect { x: 0, y: 0, width: w, height: h }
    }
}
