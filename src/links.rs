//! URLs for uploads, thumbnails, and wiki actions.
//!
//! URLs are returned unescaped for HTML (`&` stays `&`); the templates escape
//! them when writing attributes. File names are percent-escaped with
//! [`pue`](crate::naming::pue).
//!
//! | URL | Shape |
//! |---|---|
//! | page | `{script_url}?n=Group.Name` |
//! | action | `{script_url}?n=Group.Name&action=mini&upname=dawn.jpg` |
//! | upload (direct) | `{upload_url}/Group/dawn.jpg` |
//! | upload (no direct download) | `{script_url}?n=Group.Name&action=download&upname=dawn.jpg` |

use crate::config::{SiteConfig, UploadPrefix};
use crate::naming::{self, PageName};

/// Wiki actions this crate links to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Serve (and if needed generate) a thumbnail.
    Mini,
    Upload,
    Download,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Mini => "mini",
            Action::Upload => "upload",
            Action::Download => "download",
        }
    }
}

/// URL builder for one site configuration.
#[derive(Debug, Clone, Copy)]
pub struct Urls<'a> {
    site: &'a SiteConfig,
}

impl<'a> Urls<'a> {
    pub fn new(site: &'a SiteConfig) -> Self {
        Self { site }
    }

    pub fn page(&self, page: &PageName) -> String {
        format!("{}?n={}", self.site.script_url, page)
    }

    pub fn action(&self, page: &PageName, action: Action, upname: Option<&str>) -> String {
        let mut url = format!("{}&action={}", self.page(page), action.as_str());
        if let Some(upname) = upname {
            url.push_str("&upname=");
            url.push_str(upname);
        }
        naming::pue(&url)
    }

    /// URL of a file in the page's upload directory.
    pub fn upload(&self, page: &PageName, file: &str) -> String {
        if self.site.direct_download {
            let dir = match self.site.upload_prefix {
                UploadPrefix::Group => page.group.clone(),
                UploadPrefix::Page => format!("{}/{}", page.group, page.name),
            };
            naming::pue(&format!("{}/{}/{}", self.site.upload_url, dir, file))
        } else {
            self.action(page, Action::Download, Some(file))
        }
    }

    /// URL of an up-to-date thumbnail file.
    pub fn thumbnail(&self, page: &PageName, upname: &str) -> String {
        self.upload(page, &naming::thumbnail_name(upname))
    }

    /// URL that generates the thumbnail on request.
    pub fn thumbnail_action(&self, page: &PageName, upname: &str) -> String {
        self.action(page, Action::Mini, Some(upname))
    }

    /// Upload form, pre-filled with `upname` when given.
    pub fn upload_form(&self, page: &PageName, upname: Option<&str>) -> String {
        self.action(page, Action::Upload, upname)
    }
}
