//! Centralized naming rules for pages, uploads, and generated files.
//!
//! ## Page names
//!
//! Pages are addressed as `Group.Name`; `Group/Name` is accepted too. A
//! reference without a group stays in the current page's group:
//!
//! - `Main.Photos` resolving `Trips` → `Main.Trips`
//! - `Main.Photos` resolving `Travel/Japan` → `Travel.Japan`
//!
//! ## Upload names
//!
//! [`make_upload_name`] reduces a user-supplied file name to the characters an
//! upload may carry (`[-A-Za-z0-9_. ]`), lowercases the extension, and trims
//! leading/trailing punctuation.
//!
//! ## Generated files
//!
//! Thumbnails live next to their source as `th00---<upload name>.jpg`. The
//! `00` is the profile index; every thumbnail currently uses profile 0.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Prefix of every generated thumbnail for profile 0.
pub const THUMBNAIL_PREFIX: &str = "th00---";

static THUMBNAIL_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^th\d+---").unwrap());
static IMAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(gif|png|jpe|jpe?g|wbmp|xbm)$").unwrap());
static UPLOAD_FORBIDDEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^-A-Za-z0-9_. ]").unwrap());
static EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.[^.]*$").unwrap());
static LEADING_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^A-Za-z0-9_]+").unwrap());
static TRAILING_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]+$").unwrap());

/// A wiki page name, `Group.Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageName {
    pub group: String,
    pub name: String,
}

impl PageName {
    /// Parse `Group.Name` or `Group/Name`. Both parts must be non-empty.
    pub fn parse(s: &str) -> Option<PageName> {
        let (group, name) = s.trim().split_once(['.', '/'])?;
        PageName::new(group, name)
    }

    fn new(group: &str, name: &str) -> Option<PageName> {
        let clean = |s: &str| -> Option<String> {
            let s = s.trim();
            let valid = !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-');
            valid.then(|| s.to_string())
        };
        Some(PageName {
            group: clean(group)?,
            name: clean(name)?,
        })
    }

    /// Resolve a page reference relative to this page.
    ///
    /// A bare name stays in this page's group. Returns `None` when the
    /// reference is not a valid page name.
    pub fn resolve(&self, reference: &str) -> Option<PageName> {
        let reference = reference.trim();
        if reference.contains(['.', '/']) {
            PageName::parse(reference)
        } else {
            PageName::new(&self.group, reference)
        }
    }
}

impl fmt::Display for PageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Sanitize a file name the way uploads are stored.
///
/// ```text
/// "My Photo.JPG"     → "My Photo.jpg"
/// "../etc/passwd"    → "etcpasswd"
/// "  -draft-.Png-"   → "draft-.png"
/// ```
pub fn make_upload_name(name: &str) -> String {
    let kept = UPLOAD_FORBIDDEN.replace_all(name, "");
    let lowered = EXTENSION.replace(&kept, |caps: &regex::Captures| caps[0].to_lowercase());
    let trimmed = LEADING_PUNCT.replace(&lowered, "");
    TRAILING_PUNCT.replace(&trimmed, "").into_owned()
}

/// File name of the thumbnail generated for `upname`.
pub fn thumbnail_name(upname: &str) -> String {
    format!("{THUMBNAIL_PREFIX}{upname}.jpg")
}

/// Whether `name` is a generated thumbnail (any profile index).
pub fn is_thumbnail_name(name: &str) -> bool {
    THUMBNAIL_NAME.is_match(name)
}

/// Whether `name` is an upload a thumbnail can be made from.
///
/// Dotfiles and generated thumbnails are excluded. Extensions are matched
/// case-sensitively since [`make_upload_name`] lowercases them on upload.
pub fn is_image_name(name: &str) -> bool {
    !name.starts_with('.') && IMAGE_NAME.is_match(name) && !is_thumbnail_name(name)
}

/// Fragment cache file name for `page` from a `{page}` template.
pub fn cache_filename(template: &str, page: &PageName) -> String {
    template.replace("{page}", &page.to_string())
}

/// Percent-escape the characters that break an HTML attribute or URL.
///
/// Spaces, quotes, `<`, `>` and every non-ASCII byte are escaped; everything
/// else, including `&` and `&amp;`, is left alone.
pub fn pue(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for &b in url.as_bytes() {
        match b {
            b' ' | b'"' | b'\'' | b'<' | b'>' | 0x80..=0xFF => {
                out.push_str(&format!("%{b:02x}"));
            }
            _ => out.push(b as char),
        }
    }
    out
}
