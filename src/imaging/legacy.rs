//! Decoders for the two monochrome bitmap formats the `image` crate lacks.
//!
//! - **WBMP** (type 0): multi-byte integer header, 1 bit per pixel, MSB first,
//!   rows padded to a byte, `1` = white.
//! - **XBM**: X11 bitmap C source (`#define foo_width 16` … `foo_bits[] = {…}`),
//!   1 bit per pixel, LSB first, rows padded to the element size, `1` = black.
//!   Both `char` (X11) and `short` (X10) element arrays are accepted.
//!
//! Both return an 8-bit grayscale image.

use image::GrayImage;
use regex::Regex;
use std::sync::LazyLock;

static XBM_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#define\s+\S*width\s+(\d+)").unwrap());
static XBM_HEIGHT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#define\s+\S*height\s+(\d+)").unwrap());
static XBM_VALUE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"0[xX]([0-9a-fA-F]+)").unwrap());

/// Upper bound on decoded pixels; rejects absurd headers before allocating.
const MAX_PIXELS: u64 = 1 << 28;

// ---------------------------------------------------------------------------
// WBMP
// ---------------------------------------------------------------------------

/// Parsed WBMP header: dimensions and offset of the pixel data.
struct WbmpHeader {
    width: u32,
    height: u32,
    data_offset: usize,
}

/// Read a WBMP multi-byte integer (7 bits per byte, high bit = continue).
fn read_multibyte(data: &[u8], pos: &mut usize) -> Option<u32> {
    let mut value: u32 = 0;
    for _ in 0..5 {
        let byte = *data.get(*pos)?;
        *pos += 1;
        value = value.checked_mul(128)? | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Some(value);
        }
    }
    None
}

/// Header fields only. The pixel data after them is not checked.
fn read_wbmp_header(data: &[u8]) -> Option<WbmpHeader> {
    let mut pos = 0;
    if read_multibyte(data, &mut pos)? != 0 {
        return None;
    }
    let fix_header = *data.get(pos)?;
    pos += 1;
    // Extension headers are not used by type 0 bitmaps
    if fix_header & 0x80 != 0 {
        return None;
    }
    let width = read_multibyte(data, &mut pos)?;
    let height = read_multibyte(data, &mut pos)?;
    if width == 0 || height == 0 || u64::from(width) * u64::from(height) > MAX_PIXELS {
        return None;
    }
    Some(WbmpHeader {
        width,
        height,
        data_offset: pos,
    })
}

impl WbmpHeader {
    /// Size of a complete file with this header.
    fn file_len(&self) -> u64 {
        self.data_offset as u64 + u64::from(self.width.div_ceil(8)) * u64::from(self.height)
    }
}

fn parse_wbmp_header(data: &[u8]) -> Option<WbmpHeader> {
    read_wbmp_header(data).filter(|h| data.len() as u64 >= h.file_len())
}

/// Whether `data` looks like a complete type-0 WBMP.
pub fn is_wbmp(data: &[u8]) -> bool {
    parse_wbmp_header(data).is_some()
}

/// Dimensions of a WBMP file of `file_len` bytes, read from its first bytes.
pub fn wbmp_header_dimensions(head: &[u8], file_len: u64) -> Option<(u32, u32)> {
    read_wbmp_header(head)
        .filter(|h| file_len >= h.file_len())
        .map(|h| (h.width, h.height))
}

pub fn decode_wbmp(data: &[u8]) -> Option<GrayImage> {
    let header = parse_wbmp_header(data)?;
    let row_bytes = header.width.div_ceil(8) as usize;
    let pixels = &data[header.data_offset..];
    Some(GrayImage::from_fn(header.width, header.height, |x, y| {
        let byte = pixels[y as usize * row_bytes + (x / 8) as usize];
        let bit = (byte >> (7 - (x % 8))) & 1;
        image::Luma([if bit == 1 { 255 } else { 0 }])
    }))
}

// ---------------------------------------------------------------------------
// XBM
// ---------------------------------------------------------------------------

struct XbmHeader<'a> {
    width: u32,
    height: u32,
    /// Text after the opening brace of the bits array.
    body: &'a str,
    /// Bits per array element: 8 for `char`, 16 for `short`.
    element_bits: u32,
}

/// Width and height from the `#define` lines at the top of the source.
fn xbm_defines(text: &str) -> Option<(u32, u32)> {
    if !text.trim_start().starts_with("#define") {
        return None;
    }
    let width: u32 = XBM_WIDTH.captures(text)?[1].parse().ok()?;
    let height: u32 = XBM_HEIGHT.captures(text)?[1].parse().ok()?;
    if width == 0 || height == 0 || u64::from(width) * u64::from(height) > MAX_PIXELS {
        return None;
    }
    Some((width, height))
}

fn parse_xbm_header(data: &[u8]) -> Option<XbmHeader<'_>> {
    let text = std::str::from_utf8(data).ok()?;
    let (width, height) = xbm_defines(text)?;
    let brace = text.find('{')?;
    let element_bits = if text[..brace].contains("short") { 16 } else { 8 };
    Some(XbmHeader {
        width,
        height,
        body: &text[brace + 1..],
        element_bits,
    })
}

/// Whether `data` looks like X11 bitmap source.
pub fn is_xbm(data: &[u8]) -> bool {
    parse_xbm_header(data).is_some()
}

/// Dimensions of an XBM read from its first bytes. The bits array may lie
/// past the end of `head`.
pub fn xbm_header_dimensions(head: &[u8]) -> Option<(u32, u32)> {
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // Cut inside a multi-byte character
        Err(e) => std::str::from_utf8(&head[..e.valid_up_to()]).ok()?,
    };
    xbm_defines(text)
}

pub fn decode_xbm(data: &[u8]) -> Option<GrayImage> {
    let header = parse_xbm_header(data)?;
    let values: Vec<u32> = XBM_VALUE
        .captures_iter(header.body)
        .map(|c| u32::from_str_radix(&c[1], 16))
        .collect::<Result<_, _>>()
        .ok()?;

    let per_row = header.width.div_ceil(header.element_bits) as usize;
    if values.len() < per_row * header.height as usize {
        return None;
    }

    Some(GrayImage::from_fn(header.width, header.height, |x, y| {
        let element = values[y as usize * per_row + (x / header.element_bits) as usize];
        let bit = (element >> (x % header.element_bits)) & 1;
        image::Luma([if bit == 1 { 0 } else { 255 }])
    }))
}
