//! Minimal IPTC-IIM reader for JPEG captions.
//!
//! Only Caption-Abstract (2:120) is extracted; it is offered as thumbnail alt
//! text when `gallery.iptc_caption` is enabled. The data lives in the JPEG
//! APP13 marker, inside Photoshop 8BIM resource 0x0404.
//!
//! Captions written by older tools are often Latin-1. Bytes that are not valid
//! UTF-8 are therefore mapped one byte per character.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const BIM_MARKER: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;
const CAPTION_DATASET: u8 = 120;

/// Extract the IPTC caption from JPEG bytes, if any.
pub fn read_caption(jpeg: &[u8]) -> Option<String> {
    let iim = find_jpeg_app13_iptc(jpeg)?;
    parse_caption(iim)
}

/// Read the IPTC caption of a JPEG file.
///
/// Walks the marker segments up to the start of scan and loads only APP13
/// bodies; the compressed image data is never read.
pub fn read_file_caption(path: &Path) -> io::Result<Option<String>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut metadata = vec![0u8; 2];
    reader.read_exact(&mut metadata)?;
    if metadata != [0xFF, 0xD8] {
        return Ok(None);
    }

    let mut segment = [0u8; 4];
    while reader.read_exact(&mut segment).is_ok() {
        let marker = segment[1];
        if segment[0] != 0xFF || marker == 0xDA || marker == 0xD9 {
            break;
        }
        let seg_len = u16::from_be_bytes([segment[2], segment[3]]);
        if seg_len < 2 {
            break;
        }
        let body_len = usize::from(seg_len - 2);
        if marker == 0xED {
            metadata.extend_from_slice(&segment);
            let start = metadata.len();
            metadata.resize(start + body_len, 0);
            reader.read_exact(&mut metadata[start..])?;
        } else {
            reader.seek_relative(body_len as i64)?;
        }
    }
    Ok(read_caption(&metadata))
}

/// Walk IIM datasets and return the first non-empty Record 2 caption.
///
/// Dataset layout: `0x1C`, record, dataset, big-endian u16 length, data.
fn parse_caption(data: &[u8]) -> Option<String> {
    let mut pos = 0;
    while pos + 5 <= data.len() {
        if data[pos] != 0x1C {
            pos += 1;
            continue;
        }
        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        pos += 5;
        if pos + length > data.len() {
            return None;
        }
        if record == 2 && dataset == CAPTION_DATASET {
            let value = decode_text(&data[pos..pos + length]);
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
        pos += length;
    }
    None
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Find the raw IPTC-IIM bytes inside a JPEG's APP13 segment.
fn find_jpeg_app13_iptc(data: &[u8]) -> Option<&[u8]> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        // Start of scan: no more metadata segments
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        if seg_len < 2 {
            return None;
        }
        let seg_end = (pos + 2 + seg_len).min(data.len());
        if marker == 0xED
            && let Some(iim) = extract_iptc_from_8bim(&data[pos + 4..seg_end])
        {
            return Some(iim);
        }
        pos += 2 + seg_len;
    }
    None
}

/// Extract IPTC-IIM bytes from a Photoshop 8BIM resource block.
fn extract_iptc_from_8bim(segment: &[u8]) -> Option<&[u8]> {
    let data = segment.strip_prefix(PHOTOSHOP_HEADER).unwrap_or(segment);

    let mut pos = 0;
    while pos + 12 <= data.len() {
        if &data[pos..pos + 4] != BIM_MARKER {
            pos += 1;
            continue;
        }
        let resource_id = u16::from_be_bytes([data[pos + 4], data[pos + 5]]);
        pos += 6;

        // Pascal string name, padded to an even total length
        let name_len = data[pos] as usize;
        pos += 1 + name_len + ((1 + name_len) % 2);
        if pos + 4 > data.len() {
            return None;
        }
        let res_len =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;
        if pos + res_len > data.len() {
            return None;
        }
        if resource_id == IPTC_RESOURCE_ID {
            return Some(&data[pos..pos + res_len]);
        }
        pos += res_len + (res_len % 2);
    }
    None
}
