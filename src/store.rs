//! Thumbnail store: freshness checks and lazy regeneration.
//!
//! Thumbnails are written next to their source image:
//!
//! ```text
//! uploads/Main/
//! ├── dawn.jpg
//! ├── th00---dawn.jpg.jpg     # thumbnail of dawn.jpg
//! └── .Main.Photos.mini-cache.txt
//! ```
//!
//! A thumbnail is valid while its mtime is not older than the source's. The
//! gallery renderer only asks [`ThumbnailStore::freshness`] (a `stat`, no
//! pixel work); the fetch path calls [`ThumbnailStore::get_or_create`], which
//! renders only when the thumbnail is missing or stale.
//!
//! Writes go to a temporary file in the same directory that is then renamed
//! over the thumbnail path, so a concurrent reader never sees a partial JPEG.
//! Two concurrent regenerations both succeed; the last rename wins.

use crate::config::{SiteConfig, UploadPrefix};
use crate::imaging::{BackendError, ImageBackend, ThumbnailSpec};
use crate::naming::{self, PageName};
use rayon::prelude::*;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("file '{}' not found", .0.display())]
    SourceNotFound(PathBuf),
    #[error(transparent)]
    Imaging(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Size and modification time of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: SystemTime,
}

/// Stat a regular file. Directories and missing paths give `None`.
pub fn stat_path(path: &Path) -> Option<FileStat> {
    let meta = fs::metadata(path).ok().filter(|m| m.is_file())?;
    Some(FileStat {
        size: meta.len(),
        modified: meta.modified().ok()?,
    })
}

/// Where a page's uploads live.
///
/// Only the directory mapping is required; file access defaults to the
/// local filesystem.
pub trait UploadStore: Sync {
    fn upload_dir(&self, page: &PageName) -> PathBuf;

    fn file_path(&self, page: &PageName, upname: &str) -> PathBuf {
        self.upload_dir(page).join(upname)
    }

    fn stat(&self, page: &PageName, upname: &str) -> Option<FileStat> {
        stat_path(&self.file_path(page, upname))
    }

    /// Names of the regular files in the page's upload directory.
    /// A missing directory is an empty listing.
    fn list(&self, page: &PageName) -> io::Result<Vec<String>> {
        let entries = match fs::read_dir(self.upload_dir(page)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

/// Uploads stored in a directory tree on disk.
#[derive(Debug, Clone)]
pub struct FsUploads {
    root: PathBuf,
    prefix: UploadPrefix,
}

impl FsUploads {
    pub fn new(root: impl Into<PathBuf>, prefix: UploadPrefix) -> Self {
        Self {
            root: root.into(),
            prefix,
        }
    }

    pub fn from_config(site: &SiteConfig) -> Self {
        Self::new(&site.uploads_dir, site.upload_prefix)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl UploadStore for FsUploads {
    fn upload_dir(&self, page: &PageName) -> PathBuf {
        match self.prefix {
            UploadPrefix::Group => self.root.join(&page.group),
            UploadPrefix::Page => self.root.join(&page.group).join(&page.name),
        }
    }
}

/// State of a thumbnail relative to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Thumbnail exists and is at least as new as the source.
    Fresh,
    /// Thumbnail is missing or older than the source.
    Stale,
    /// The source upload does not exist.
    SourceMissing,
}

/// Result of [`ThumbnailStore::get_or_create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub path: PathBuf,
    /// Whether the renderer ran for this call.
    pub regenerated: bool,
}

/// Outcome of warming every image of a page.
#[derive(Debug, Default)]
pub struct WarmReport {
    pub regenerated: Vec<String>,
    pub fresh: Vec<String>,
    pub failed: Vec<(String, StoreError)>,
}

fn is_fresh(source: &FileStat, thumbnail: Option<FileStat>) -> bool {
    thumbnail.is_some_and(|t| t.modified >= source.modified)
}

pub struct ThumbnailStore<'a, B: ImageBackend, U: UploadStore> {
    backend: &'a B,
    uploads: &'a U,
    spec: ThumbnailSpec,
}

impl<'a, B: ImageBackend, U: UploadStore> ThumbnailStore<'a, B, U> {
    pub fn new(backend: &'a B, uploads: &'a U, spec: ThumbnailSpec) -> Self {
        Self {
            backend,
            uploads,
            spec,
        }
    }

    pub fn uploads(&self) -> &U {
        self.uploads
    }

    pub fn thumbnail_path(&self, page: &PageName, upname: &str) -> PathBuf {
        self.uploads
            .upload_dir(page)
            .join(naming::thumbnail_name(upname))
    }

    pub fn freshness(&self, page: &PageName, upname: &str) -> Freshness {
        let Some(source) = self.uploads.stat(page, upname) else {
            return Freshness::SourceMissing;
        };
        if is_fresh(&source, stat_path(&self.thumbnail_path(page, upname))) {
            Freshness::Fresh
        } else {
            Freshness::Stale
        }
    }

    /// Return the thumbnail path, rendering it first when missing or stale.
    ///
    /// Nothing is written when rendering fails.
    pub fn get_or_create(&self, page: &PageName, upname: &str) -> Result<Generated, StoreError> {
        let source_path = self.uploads.file_path(page, upname);
        let source = stat_path(&source_path)
            .ok_or_else(|| StoreError::SourceNotFound(source_path.clone()))?;
        let path = self.thumbnail_path(page, upname);

        if is_fresh(&source, stat_path(&path)) {
            debug!(thumbnail = %path.display(), "thumbnail fresh");
            return Ok(Generated {
                path,
                regenerated: false,
            });
        }

        let bytes = self.backend.render(&source_path, &self.spec)?;
        write_thumbnail(&path, &bytes, source.modified)?;
        info!(
            source = %source_path.display(),
            thumbnail = %path.display(),
            bytes = bytes.len(),
            "generated thumbnail"
        );
        Ok(Generated {
            path,
            regenerated: true,
        })
    }

    /// Regenerate every stale thumbnail of a page, in parallel.
    ///
    /// Each image is independent; one failure does not stop the others.
    pub fn warm(&self, page: &PageName) -> io::Result<WarmReport> {
        let mut names: Vec<String> = self
            .uploads
            .list(page)?
            .into_iter()
            .filter(|n| naming::is_image_name(n))
            .collect();
        names.sort_by(|a, b| natord::compare_ignore_case(a, b));

        let results: Vec<(String, Result<Generated, StoreError>)> = names
            .into_par_iter()
            .map(|name| {
                let result = self.get_or_create(page, &name);
                (name, result)
            })
            .collect();

        let mut report = WarmReport::default();
        for (name, result) in results {
            match result {
                Ok(g) if g.regenerated => report.regenerated.push(name),
                Ok(_) => report.fresh.push(name),
                Err(e) => report.failed.push((name, e)),
            }
        }
        Ok(report)
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
///
/// The thumbnail's mtime is never left older than `source_modified`, so a
/// source with a future timestamp does not cause endless regeneration.
fn write_thumbnail(path: &Path, bytes: &[u8], source_modified: SystemTime) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    let now = SystemTime::now();
    if source_modified > now {
        tmp.as_file().set_modified(source_modified)?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
