//! Gallery configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! serialized to a TOML table and the user's file is deep-merged on top, so a
//! config file only needs the keys it wants to change.
//!
//! On top of the file, page text can adjust thumbnail geometry for the rest of
//! a render pass with a configuration directive:
//!
//! ```text
//! (:mini x=160 y=120 XPos=0 YPos=0.25:)
//! ```
//!
//! `x`/`y` set the thumbnail width/height (integers, `y=0` means square) and
//! `XPos`/`YPos` the crop anchor (clamped to `[0, 1]`). See
//! [`MiniConfig::with_directive`].
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [thumbnail]
//! width = 100                   # Thumbnail width in pixels, 1-4096
//! height = 0                    # Thumbnail height, 0 = same as width
//! quality = 90                  # JPEG quality (0-100)
//! crop_x = 0.5                  # Horizontal crop anchor, 0 = left, 1 = right
//! crop_y = 0.5                  # Vertical crop anchor, 0 = top, 1 = bottom
//! background = [255, 255, 255]  # Letterbox colour
//! sharpen = true
//!
//! [gallery]
//! iptc_caption = false
//! header_footer = false
//! lightbox = "off"              # off | gallery | directive | single
//! lightbox_max_width = 0
//! lightbox_max_height = 0
//! lightbox_url = "/pub/lb"
//!
//! [cache]
//! enabled = false
//! filename = ".{page}.mini-cache.txt"
//!
//! [site]
//! uploads_dir = "uploads"
//! upload_prefix = "group"       # group | page
//! script_url = "/pmwiki.php"
//! upload_url = "/uploads"
//! direct_download = true
//!
//! [processing]
//! max_processes = 4             # Max parallel workers for `warm`
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::MAX_THUMBNAIL_SIDE;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiniConfig {
    /// Thumbnail geometry and encoding.
    pub thumbnail: ThumbnailConfig,
    /// Gallery HTML: alt text, captions, lightbox.
    pub gallery: GalleryConfig,
    /// Per-page fragment cache.
    pub cache: CacheConfig,
    /// Upload layout and URLs.
    pub site: SiteConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl MiniConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thumbnail.width == 0 {
            return Err(ConfigError::Validation(
                "thumbnail.width must be positive".into(),
            ));
        }
        if self.thumbnail.width > MAX_THUMBNAIL_SIDE
            || self.thumbnail.height > MAX_THUMBNAIL_SIDE
        {
            return Err(ConfigError::Validation(format!(
                "thumbnail.width and thumbnail.height must be at most {MAX_THUMBNAIL_SIDE}"
            )));
        }
        if self.thumbnail.quality > 100 {
            return Err(ConfigError::Validation(
                "thumbnail.quality must be 0-100".into(),
            ));
        }
        for (name, value) in [
            ("crop_x", self.thumbnail.crop_x),
            ("crop_y", self.thumbnail.crop_y),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Validation(format!(
                    "thumbnail.{name} must be between 0 and 1"
                )));
            }
        }
        if !self.cache.filename.contains("{page}") {
            return Err(ConfigError::Validation(
                "cache.filename must contain {page}".into(),
            ));
        }
        if self.cache.filename.contains(['/', '\\']) {
            return Err(ConfigError::Validation(
                "cache.filename must be a plain file name".into(),
            ));
        }
        Ok(())
    }

    /// Apply the arguments of one `(:mini …:)` directive.
    ///
    /// `x` and `y` are read like integers with trailing garbage ignored; a
    /// width that does not parse to a positive number is ignored, as is any
    /// side above [`MAX_THUMBNAIL_SIDE`]. `XPos` and
    /// `YPos` are clamped to `[0, 1]`. Unknown arguments are ignored.
    pub fn with_directive(&self, args: &DirectiveArgs) -> MiniConfig {
        let mut config = self.clone();
        let thumb = &mut config.thumbnail;
        let max_side = i64::from(MAX_THUMBNAIL_SIDE);
        if let Some(x) = args.get("x").map(leading_int)
            && (1..=max_side).contains(&x)
        {
            thumb.width = x as u32;
        }
        if let Some(y) = args.get("y").map(leading_int)
            && (0..=max_side).contains(&y)
        {
            thumb.height = y as u32;
        }
        if let Some(cx) = args.get("XPos") {
            thumb.crop_x = leading_float(cx).clamp(0.0, 1.0);
        }
        if let Some(cy) = args.get("YPos") {
            thumb.crop_y = leading_float(cy).clamp(0.0, 1.0);
        }
        config
    }

    /// Apply every `(:mini …:)` directive found in `text`, in order.
    pub fn apply_page_directives(&self, text: &str) -> MiniConfig {
        MINI_DIRECTIVE
            .captures_iter(text)
            .fold(self.clone(), |config, caps| {
                config.with_directive(&DirectiveArgs::parse(&caps[1]))
            })
    }
}

/// Remove every `(:mini …:)` directive from page text; they render as nothing.
pub fn strip_page_directives(text: &str) -> String {
    MINI_DIRECTIVE.replace_all(text, "").into_owned()
}

/// Thumbnail generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailConfig {
    pub width: u32,
    /// Zero means square.
    pub height: u32,
    pub quality: u32,
    pub crop_x: f64,
    pub crop_y: f64,
    pub background: [u8; 3],
    pub sharpen: bool,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 100,
            height: 0,
            quality: 90,
            crop_x: 0.5,
            crop_y: 0.5,
            background: [255, 255, 255],
            sharpen: true,
        }
    }
}

/// Lightbox grouping mode for linked thumbnails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lightbox {
    #[default]
    Off,
    /// All galleries on the page form one slideshow.
    Gallery,
    /// Each directive forms its own slideshow.
    Directive,
    /// Every image opens on its own.
    Single,
}

impl Lightbox {
    /// The `rel` attribute value for the `seq`-th directive of a pass.
    pub fn rel(self, seq: u32) -> Option<String> {
        match self {
            Lightbox::Off => None,
            Lightbox::Gallery => Some("lightbox[mini]".to_string()),
            Lightbox::Directive => Some(format!("lightbox[mini{seq}]")),
            Lightbox::Single => Some("lightbox".to_string()),
        }
    }
}

/// Gallery HTML settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GalleryConfig {
    /// Use the JPEG IPTC caption as alt text when no caption is given.
    pub iptc_caption: bool,
    /// Split `head|foot` captions into spans around the gallery.
    pub header_footer: bool,
    pub lightbox: Lightbox,
    /// Images wider than this are not put in the lightbox (0 = no limit).
    pub lightbox_max_width: u32,
    /// Images taller than this are not put in the lightbox (0 = no limit).
    pub lightbox_max_height: u32,
    /// Base URL of the lightbox scripts and stylesheet.
    pub lightbox_url: String,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            iptc_caption: false,
            header_footer: false,
            lightbox: Lightbox::Off,
            lightbox_max_width: 0,
            lightbox_max_height: 0,
            lightbox_url: "/pub/lb".to_string(),
        }
    }
}

/// Fragment cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// File name template, `{page}` is replaced by the full page name.
    pub filename: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: ".{page}.mini-cache.txt".to_string(),
        }
    }
}

/// How upload directories are laid out under `uploads_dir`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPrefix {
    /// `uploads/<Group>/`
    #[default]
    Group,
    /// `uploads/<Group>/<Name>/`
    Page,
}

/// Upload storage and URL layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub uploads_dir: String,
    pub upload_prefix: UploadPrefix,
    pub script_url: String,
    pub upload_url: String,
    /// Link images directly under `upload_url` instead of the download action.
    pub direct_download: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            uploads_dir: "uploads".to_string(),
            upload_prefix: UploadPrefix::Group,
            script_url: "/pmwiki.php".to_string(),
            upload_url: "/uploads".to_string(),
            direct_download: true,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel thumbnail workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Directive arguments
// =============================================================================

static MINI_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(:mini\s+(.+?):\)").unwrap());
static ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?:([\w-]+)[:=])?("[^"]*"|'[^']*'|\S+)"#).unwrap());
static LEADING_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[+-]?\d+").unwrap());
static LEADING_FLOAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap());

/// Parsed `key=value` arguments of a directive.
///
/// Values may be quoted with `"` or `'`; `key:value` is accepted as well.
/// Arguments without a key are kept in order in `positional`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectiveArgs {
    pub named: BTreeMap<String, String>,
    pub positional: Vec<String>,
}

impl DirectiveArgs {
    pub fn parse(input: &str) -> Self {
        let mut args = DirectiveArgs::default();
        for caps in ARG.captures_iter(input) {
            let raw = &caps[2];
            let value = unquote(raw).to_string();
            match caps.get(1) {
                Some(key) => {
                    args.named.insert(key.as_str().to_string(), value);
                }
                None => args.positional.push(value),
            }
        }
        args
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.named.get(key).map(String::as_str)
    }
}

fn unquote(raw: &str) -> &str {
    let quoted = raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')));
    if quoted { &raw[1..raw.len() - 1] } else { raw }
}

/// Integer prefix of `s`, 0 when there is none. Saturates on overflow.
fn leading_int(s: &str) -> i64 {
    LEADING_INT
        .find(s)
        .map(|m| {
            let digits = m.as_str().trim();
            digits.parse::<i64>().unwrap_or(if digits.starts_with('-') {
                i64::MIN
            } else {
                i64::MAX
            })
        })
        .map(|n| n.clamp(i64::from(i32::MIN), i64::from(u32::MAX)))
        .unwrap_or(0)
}

/// Float prefix of `s`, 0.0 when there is none.
fn leading_float(s: &str) -> f64 {
    LEADING_FLOAT
        .find(s)
        .and_then(|m| m.as_str().trim().parse().ok())
        .unwrap_or(0.0)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(MiniConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<MiniConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MiniConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<MiniConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Mini Gallery Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.
#
# Page text can override the thumbnail geometry for the rest of a page with
#   (:mini x=160 y=120 XPos=0.5 YPos=0:)

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
[thumbnail]
# Thumbnail box in pixels, at most 4096 a side. A height of 0 makes square thumbnails.
width = 100
height = 0

# JPEG quality (0 = worst, 100 = best).
quality = 90

# Which part of an oversized image is kept: 0 = left/top, 1 = right/bottom.
crop_x = 0.5
crop_y = 0.5

# Colour behind images smaller than the thumbnail box, as [r, g, b].
background = [255, 255, 255]

# Apply a light sharpening pass after resampling.
sharpen = true

# ---------------------------------------------------------------------------
# Gallery HTML
# ---------------------------------------------------------------------------
[gallery]
# Use the IPTC caption of JPEG files as alt text when none is given.
iptc_caption = false

# Captions like "Before|After" become a header and a footer around the gallery.
header_footer = false

# Lightbox grouping for linked thumbnails (Mini:):
#   off       - no lightbox
#   gallery   - one slideshow for the whole page
#   directive - one slideshow per gallery
#   single    - every image on its own
lightbox = "off"

# Images larger than these are linked normally (0 = no limit).
lightbox_max_width = 0
lightbox_max_height = 0

# Base URL of lightbox.js, lightbox.css and friends.
lightbox_url = "/pub/lb"

# ---------------------------------------------------------------------------
# Fragment cache
# ---------------------------------------------------------------------------
[cache]
# Cache rendered gallery HTML per page, next to the page's uploads.
enabled = false

# Cache file name; {page} is replaced by the page name (Group.Name).
filename = ".{page}.mini-cache.txt"

# ---------------------------------------------------------------------------
# Site layout
# ---------------------------------------------------------------------------
[site]
# Directory holding the uploads.
uploads_dir = "uploads"

# One upload directory per group, or one per page (uploads/Group/Name/).
upload_prefix = "group"

# URL of the wiki script, used for action links.
script_url = "/pmwiki.php"

# Public URL of uploads_dir.
upload_url = "/uploads"

# Link uploads directly; when false, links go through ?action=download.
direct_download = true

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for `warm`.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
