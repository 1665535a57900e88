//! Deletion of generated files.
//!
//! Removes every thumbnail (`th<NN>---*`) and the page's fragment cache file
//! from the page's upload directory. Uploads themselves are never touched.
//! With the default group layout the upload directory is shared by every
//! page of the group, so their thumbnails go too; they are regenerated on
//! the next fetch.

use crate::naming::{self, PageName};
use crate::store::UploadStore;
use std::fs;
use std::io;
use tracing::info;

/// Files removed by [`purge`], sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub removed: Vec<String>,
}

/// Delete the generated files of `page`.
///
/// A missing upload directory or nothing to delete is a successful no-op.
pub fn purge<U: UploadStore>(
    uploads: &U,
    page: &PageName,
    cache_filename: &str,
) -> io::Result<PurgeReport> {
    let dir = uploads.upload_dir(page);
    let mut removed = Vec::new();

    for name in uploads.list(page)? {
        if !naming::is_thumbnail_name(&name) && name != cache_filename {
            continue;
        }
        match fs::remove_file(dir.join(&name)) {
            Ok(()) => removed.push(name),
            // Removed concurrently
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }

    removed.sort();
    info!(page = %page, dir = %dir.display(), removed = removed.len(), "purged thumbnails");
    Ok(PurgeReport { removed })
}
