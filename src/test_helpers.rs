//! Shared test utilities for the mini-gallery test suite.
//!
//! Provides fixture image writers, an uploads tree builder, and mtime helpers
//! for the staleness tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = TestSite::new();
//! let page = site.page("Main.Photos");
//! site.add_png(&page, "dawn.png", 400, 300);
//! bump_mtime(&site.uploads.file_path(&page, "dawn.png"), 60);
//! ```

use crate::config::UploadPrefix;
use crate::naming::PageName;
use crate::store::{FsUploads, UploadStore};
use image::{ImageFormat, Rgb, RgbImage};
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// =========================================================================
// Fixture images
// =========================================================================

/// A gradient so resampling and cropping produce non-trivial pixels.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    })
}

/// Encode a gradient as PNG bytes.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    std::fs::write(path, png_bytes(width, height)).unwrap();
}

pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    gradient(width, height)
        .save_with_format(path, ImageFormat::Jpeg)
        .unwrap();
}

// =========================================================================
// Modification times
// =========================================================================

pub fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

pub fn set_mtime(path: &Path, time: SystemTime) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

/// Move a file's mtime `secs` seconds into the future.
pub fn bump_mtime(path: &Path, secs: u64) {
    set_mtime(path, mtime(path) + Duration::from_secs(secs));
}

/// Move a file's mtime `secs` seconds into the past.
pub fn age(path: &Path, secs: u64) {
    set_mtime(path, mtime(path) - Duration::from_secs(secs));
}

// =========================================================================
// Uploads tree
// =========================================================================

/// A temporary uploads directory with the default group layout.
pub struct TestSite {
    pub dir: TempDir,
    pub uploads: FsUploads,
}

impl TestSite {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let uploads = FsUploads::new(dir.path().join("uploads"), UploadPrefix::Group);
        Self { dir, uploads }
    }

    pub fn page(&self, name: &str) -> PageName {
        PageName::parse(name).unwrap()
    }

    pub fn upload_dir(&self, page: &PageName) -> PathBuf {
        let dir = self.uploads.upload_dir(page);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn add_png(&self, page: &PageName, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.upload_dir(page).join(name);
        write_png(&path, width, height);
        path
    }

    pub fn add_jpeg(&self, page: &PageName, name: &str, width: u32, height: u32) -> PathBuf {
        let path = self.upload_dir(page).join(name);
        write_jpeg(&path, width, height);
        path
    }

    pub fn add_file(&self, page: &PageName, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.upload_dir(page).join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// File names currently in the page's upload directory, sorted.
    pub fn files(&self, page: &PageName) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.uploads.upload_dir(page))
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}
