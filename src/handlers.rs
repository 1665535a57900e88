//! Request handlers for the `mini` and `purgethumbs` actions.
//!
//! These are the entry points a wiki front end calls:
//!
//! - [`Handlers::fetch_thumbnail`] serves a thumbnail, generating it when
//!   missing or stale. Needs read access to the page.
//! - [`Handlers::purge_thumbnails`] deletes a page's generated files and says
//!   where to redirect. Needs edit access.
//!
//! Errors carry the HTTP status the front end should answer with, and their
//! messages are the short `? …` lines shown to the visitor.

use crate::config::MiniConfig;
use crate::imaging::{BackendError, ImageBackend, ThumbnailSpec};
use crate::links::Urls;
use crate::naming::{self, PageName};
use crate::purge::{PurgeReport, purge};
use crate::store::{StoreError, ThumbnailStore, UploadStore};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Kind of access an action needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Edit,
}

/// Permission check supplied by the wiki.
pub trait Authorizer {
    fn allowed(&self, page: &PageName, access: Access) -> bool;
}

/// Grants everything. Used by the command line tool.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn allowed(&self, _page: &PageName, _access: Access) -> bool {
        true
    }
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("? access to {0} denied.")]
    Forbidden(PageName),
    #[error("? file '{}' not found.", .0.display())]
    NotFound(PathBuf),
    #[error("? format {0} not supported.")]
    UnsupportedFormat(String),
    #[error("? cannot read image: {0}")]
    Decode(String),
    #[error("? {0}")]
    Io(#[from] io::Error),
}

impl HandlerError {
    /// HTTP status for the response.
    pub fn status(&self) -> u16 {
        match self {
            HandlerError::Forbidden(_) => 403,
            HandlerError::NotFound(_) => 404,
            HandlerError::UnsupportedFormat(_) => 415,
            HandlerError::Decode(_) => 422,
            HandlerError::Io(_) => 500,
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SourceNotFound(path) => HandlerError::NotFound(path),
            StoreError::Io(e) | StoreError::Imaging(BackendError::Io(e)) => HandlerError::Io(e),
            StoreError::Imaging(BackendError::UnsupportedFormat(format)) => {
                HandlerError::UnsupportedFormat(format)
            }
            StoreError::Imaging(other) => HandlerError::Decode(other.to_string()),
        }
    }
}

/// A thumbnail ready to send.
#[derive(Debug, Clone)]
pub struct ThumbnailResponse {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    pub path: PathBuf,
    /// Whether this request generated the file.
    pub regenerated: bool,
}

/// Outcome of a purge request.
#[derive(Debug, Clone)]
pub struct Redirect {
    pub location: String,
    pub report: PurgeReport,
}

/// Shared context for handling requests against one site.
pub struct Handlers<'a, B: ImageBackend, U: UploadStore, A: Authorizer> {
    pub config: &'a MiniConfig,
    pub backend: &'a B,
    pub uploads: &'a U,
    pub auth: &'a A,
}

impl<'a, B: ImageBackend, U: UploadStore, A: Authorizer> Handlers<'a, B, U, A> {
    /// Serve the thumbnail of `upname` on `page`.
    ///
    /// `page_text` is the page source; its `(:mini …:)` directives decide the
    /// thumbnail geometry just as they do when the page is rendered.
    pub fn fetch_thumbnail(
        &self,
        page: &PageName,
        upname: &str,
        page_text: &str,
    ) -> Result<ThumbnailResponse, HandlerError> {
        self.authorize(page, Access::Read)?;

        let config = self.config.apply_page_directives(page_text);
        let spec = ThumbnailSpec::from_config(&config.thumbnail);
        let upname = naming::make_upload_name(upname);
        let store = ThumbnailStore::new(self.backend, self.uploads, spec);

        let generated = store.get_or_create(page, &upname).inspect_err(|e| {
            warn!(page = %page, upname = %upname, error = %e, "thumbnail request failed")
        })?;
        let bytes = fs::read(&generated.path)?;
        Ok(ThumbnailResponse {
            content_type: "image/jpeg",
            bytes,
            path: generated.path,
            regenerated: generated.regenerated,
        })
    }

    /// Delete the generated files of `page`.
    ///
    /// Redirects to `redirect` when it names a page, otherwise to the page's
    /// upload form.
    pub fn purge_thumbnails(
        &self,
        page: &PageName,
        redirect: Option<&str>,
    ) -> Result<Redirect, HandlerError> {
        self.authorize(page, Access::Edit)?;

        let cache_file = naming::cache_filename(&self.config.cache.filename, page);
        let report = purge(self.uploads, page, &cache_file)?;

        let urls = Urls::new(&self.config.site);
        let location = match redirect.and_then(|r| page.resolve(r)) {
            Some(target) => urls.page(&target),
            None => urls.upload_form(page, None),
        };
        Ok(Redirect { location, report })
    }

    fn authorize(&self, page: &PageName, access: Access) -> Result<(), HandlerError> {
        if self.auth.allowed(page, access) {
            Ok(())
        } else {
            info!(page = %page, ?access, "access denied");
            Err(HandlerError::Forbidden(page.clone()))
        }
    }
}
