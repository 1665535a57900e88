//! Gallery markup rendering.
//!
//! Turns `Mini:` directives in page text into thumbnail galleries:
//!
//! ```text
//! Mini:dawn.jpg,dusk.jpg"Evening walk"     linked thumbnails
//! mini:Other/*.jpg,!draft*                 plain thumbnails from another page
//! ```
//!
//! A directive is a comma-separated list of file names and glob patterns,
//! optionally prefixed by a page reference and followed by a quoted caption.
//! `Mini:` links each thumbnail to its full-size upload, `mini:` does not.
//!
//! ## Items
//!
//! Literal names are kept in the order given. Patterns (`*`, `?`) add the
//! matching images of the upload directory in natural order, and `!`/`-`
//! prefixed patterns exclude matches. A name is shown once, at its first
//! position.
//!
//! ## Thumbnail URLs
//!
//! A thumbnail that is already fresh on disk is linked directly. Otherwise the
//! `mini` action URL is used so the first request generates it, and the page
//! is marked not cacheable by the wiki.
//!
//! ## Fragment cache
//!
//! When enabled, each directive's HTML is stored in the page's cache file
//! keyed by its position on the page. A directive that references a missing
//! upload or a stale thumbnail is never stored and drops the cache file, so
//! the next render starts from scratch.

use crate::config::{self, MiniConfig};
use crate::fragment_cache::FragmentCache;
use crate::imaging::{ImageBackend, SourceFormat, SourceInfo, ThumbnailSpec, read_file_caption};
use crate::links::Urls;
use crate::naming::{self, PageName};
use crate::store::{FileStat, Freshness, ThumbnailStore, UploadStore};
use maud::{Markup, PreEscaped, html};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;
use std::time::SystemTime;
use tracing::{debug, warn};

static DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b([Mm])ini:([^\s"|\[\]]+)(?:"([^"]*)")?"#).unwrap());
static PAGE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.*)/([^/]+)$").unwrap());

/// Key under which the lightbox scripts are registered in the page head.
pub const LIGHTBOX_HEAD_KEY: &str = "lightbox";

/// One parsed `Mini:`/`mini:` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// `Mini:` links thumbnails to their uploads.
    pub links: bool,
    /// Page whose uploads are shown, relative to the current page.
    pub page_ref: Option<String>,
    pub items: Vec<String>,
    pub caption: Option<String>,
}

impl Directive {
    /// Parse the first directive in `text`.
    pub fn parse(text: &str) -> Option<Directive> {
        DIRECTIVE.captures(text).map(|caps| Self::from_captures(&caps))
    }

    fn from_captures(caps: &regex::Captures<'_>) -> Directive {
        let path = &caps[2];
        let (page_ref, list) = match PAGE_PREFIX.captures(path) {
            Some(split) => (
                Some(split[1].to_string()),
                split.get(2).map_or("", |m| m.as_str()),
            ),
            None => (None, path),
        };
        Directive {
            links: &caps[1] == "M",
            page_ref: page_ref.filter(|p| !p.is_empty()),
            items: list
                .split(',')
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            caption: caps.get(3).map(|m| m.as_str().to_string()),
        }
    }
}

/// Every directive in `text`, with the byte range it occupies.
pub fn find_directives(text: &str) -> Vec<(Range<usize>, Directive)> {
    DIRECTIVE
        .captures_iter(text)
        .filter_map(|caps| {
            let range = caps.get(0)?.range();
            Some((range, Directive::from_captures(&caps)))
        })
        .collect()
}

/// Per-pass render switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Preview renders bypass the fragment cache entirely.
    pub preview: bool,
    /// Ignore a fresh cache file and rebuild it.
    pub recache: bool,
}

/// Counts for one render pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    /// Directives served from the fragment cache.
    pub cached: u32,
    /// Directives rendered from the uploads.
    pub rendered: u32,
    /// Thumbnails linked through the generate action.
    pub stale: u32,
}

impl RenderStats {
    pub fn hit(&mut self) {
        self.cached += 1;
    }

    pub fn render(&mut self) {
        self.rendered += 1;
    }

    pub fn total(&self) -> u32 {
        self.cached + self.rendered
    }
}

impl fmt::Display for RenderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cached > 0 {
            write!(
                f,
                "{} cached, {} rendered ({} total)",
                self.cached,
                self.rendered,
                self.total()
            )?;
        } else {
            write!(f, "{} rendered", self.rendered)?;
        }
        if self.stale > 0 {
            write!(f, ", {} thumbnails pending", self.stale)?;
        }
        Ok(())
    }
}

/// Result of a render pass.
#[derive(Debug, Clone, Serialize)]
pub struct RenderOutput {
    pub html: String,
    /// Snippets for the page head, keyed so each is added once.
    pub head: BTreeMap<String, String>,
    /// The page links a thumbnail that does not exist yet.
    pub no_cache: bool,
    pub stats: RenderStats,
}

/// Rendering state for one page view.
///
/// Directives are numbered in the order they are rendered; the number keys
/// the fragment cache and the per-directive lightbox group.
pub struct RenderSession<'a, B: ImageBackend, U: UploadStore> {
    config: MiniConfig,
    page: PageName,
    backend: &'a B,
    uploads: &'a U,
    seq: u32,
    cache: Option<FragmentCache>,
    no_cache: bool,
    head: BTreeMap<String, String>,
    stats: RenderStats,
}

struct RenderedItem {
    markup: Markup,
    stale: bool,
    missing: bool,
    header_footer: Option<(String, String)>,
}

impl RenderedItem {
    fn plain(markup: Markup) -> Self {
        Self {
            markup,
            stale: false,
            missing: false,
            header_footer: None,
        }
    }
}

impl<'a, B: ImageBackend, U: UploadStore> RenderSession<'a, B, U> {
    pub fn new(
        config: MiniConfig,
        page: PageName,
        page_modified: SystemTime,
        backend: &'a B,
        uploads: &'a U,
        options: RenderOptions,
    ) -> Self {
        let cache = (config.cache.enabled && !options.preview).then(|| {
            let path = uploads
                .upload_dir(&page)
                .join(naming::cache_filename(&config.cache.filename, &page));
            let cache = FragmentCache::new(path, page_modified);
            if options.recache { cache.recache() } else { cache }
        });
        Self {
            config,
            page,
            backend,
            uploads,
            seq: 0,
            cache,
            no_cache: false,
            head: BTreeMap::new(),
            stats: RenderStats::default(),
        }
    }

    /// Configuration in effect, including page directives applied so far.
    pub fn config(&self) -> &MiniConfig {
        &self.config
    }

    /// Render a whole page: apply its `(:mini …:)` directives, drop them from
    /// the text, and replace every gallery directive with its HTML.
    pub fn render_text(&mut self, text: &str) -> String {
        self.config = self.config.apply_page_directives(text);
        let text = config::strip_page_directives(text);

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for (range, directive) in find_directives(&text) {
            out.push_str(&text[last..range.start]);
            out.push_str(&self.render_directive(&directive));
            last = range.end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Render the next directive of the pass.
    pub fn render_directive(&mut self, directive: &Directive) -> String {
        self.seq += 1;
        let seq = self.seq;
        let rel = self.config.gallery.lightbox.rel(seq);
        if rel.is_some() {
            self.register_lightbox();
        }

        if let Some(cache) = self.cache.as_mut()
            && let Some(html) = cache.lookup(seq)
        {
            self.stats.hit();
            return html;
        }

        let page = directive
            .page_ref
            .as_deref()
            .and_then(|r| self.page.resolve(r))
            .unwrap_or_else(|| self.page.clone());
        let names = self.expand_items(&page, &directive.items);

        let mut cacheable = true;
        let mut header_footer = None;
        let mut items = Vec::with_capacity(names.len());
        for name in &names {
            let item = self.render_item(&page, name, directive, rel.as_deref());
            if item.stale {
                self.no_cache = true;
                self.stats.stale += 1;
            }
            cacheable &= !item.stale && !item.missing;
            if item.header_footer.is_some() {
                header_footer = item.header_footer;
            }
            items.push(item.markup);
        }
        let html = gallery_markup(&items, header_footer).into_string();

        if let Some(cache) = self.cache.as_mut() {
            if cacheable {
                cache.store(seq, &html);
            } else {
                cache.invalidate();
            }
        }
        self.stats.render();
        debug!(page = %page, seq, images = names.len(), cacheable, "rendered gallery");
        html
    }

    pub fn finish(self, html: String) -> RenderOutput {
        RenderOutput {
            html,
            head: self.head,
            no_cache: self.no_cache,
            stats: self.stats,
        }
    }

    fn register_lightbox(&mut self) {
        self.head
            .entry(LIGHTBOX_HEAD_KEY.to_string())
            .or_insert_with(|| lightbox_head(&self.config.gallery.lightbox_url).into_string());
    }

    /// Literal names first, then pattern matches from the upload directory.
    fn expand_items(&self, page: &PageName, items: &[String]) -> Vec<String> {
        let is_pattern = |item: &str| item.starts_with(['!', '-']) || item.contains(['*', '?']);

        let mut names: Vec<String> = items
            .iter()
            .filter(|i| !is_pattern(i.as_str()))
            .cloned()
            .collect();
        if items.iter().any(|i| is_pattern(i.as_str())) {
            let matcher = NameMatcher::new(items);
            let listed = self.uploads.list(page).unwrap_or_else(|e| {
                warn!(page = %page, error = %e, "cannot list uploads");
                Vec::new()
            });
            let mut matched: Vec<String> = listed
                .into_iter()
                .filter(|name| naming::is_image_name(name) && matcher.matches(name))
                .collect();
            matched.sort_by(|a, b| natord::compare_ignore_case(a, b));
            names.extend(matched);
        }

        // Items naming the same upload collapse to the first one
        let mut seen = HashSet::new();
        names.retain(|name| seen.insert(naming::make_upload_name(name)));
        names
    }

    fn render_item(
        &self,
        page: &PageName,
        name: &str,
        directive: &Directive,
        rel: Option<&str>,
    ) -> RenderedItem {
        let urls = Urls::new(&self.config.site);
        let upname = naming::make_upload_name(name);

        let Some(stat) = self.uploads.stat(page, &upname) else {
            let url = urls.upload_form(page, Some(&upname));
            return RenderedItem {
                markup: html! {
                    a.createlinktext rel="nofollow" href=(url) { (name) }
                    a.createlink rel="nofollow" href=(url) { "\u{a0}\u{394}" }
                },
                stale: false,
                missing: true,
                header_footer: None,
            };
        };

        let path = self.uploads.file_path(page, &upname);
        let info = match self.backend.identify(&path) {
            Ok(info) => info,
            Err(e) => {
                debug!(file = %path.display(), error = %e, "not a thumbnailable image");
                let href = urls.upload(page, &upname);
                return RenderedItem::plain(html! {
                    a.urllink href=(href) rel="nofollow" { "Attach:" (name) }
                });
            }
        };

        let alt = self.alt_text(name, &path, &info, &stat, directive.caption.as_deref());
        let (alt, header_footer) = match alt.split_once('|') {
            Some((head, foot)) if self.config.gallery.header_footer => (
                format!("{head} {foot}").trim().to_string(),
                Some((head.to_string(), foot.to_string())),
            ),
            _ => (alt, None),
        };

        let store = ThumbnailStore::new(
            self.backend,
            self.uploads,
            ThumbnailSpec::from_config(&self.config.thumbnail),
        );
        let stale = store.freshness(page, &upname) != Freshness::Fresh;
        let src = if stale {
            urls.thumbnail_action(page, &upname)
        } else {
            urls.thumbnail(page, &upname)
        };

        let img = html! { img.mini src=(src) title=(alt) alt=(alt) border="0"; };
        let markup = if directive.links {
            let lightbox = rel.filter(|_| self.fits_lightbox(&info));
            let href = urls.upload(page, &upname);
            html! {
                a.minilink href=(href) rel=[lightbox] title=[lightbox.map(|_| alt.as_str())] {
                    (img)
                }
            }
        } else {
            img
        };

        RenderedItem {
            markup,
            stale,
            missing: false,
            header_footer,
        }
    }

    /// Explicit caption, `-` for none, else IPTC caption, else a summary line.
    fn alt_text(
        &self,
        name: &str,
        path: &Path,
        info: &SourceInfo,
        stat: &FileStat,
        caption: Option<&str>,
    ) -> String {
        let caption = caption.unwrap_or("");
        if caption.trim() == "-" {
            return String::new();
        }
        if !caption.is_empty() {
            return caption.to_string();
        }
        if self.config.gallery.iptc_caption
            && info.format == SourceFormat::Jpeg
            && let Ok(Some(iptc)) = read_file_caption(path)
        {
            return iptc;
        }
        let kb = (stat.size as f64 / 1024.0).round() as u64;
        format!("{name}: {}x{}, {kb}k", info.width, info.height)
    }

    fn fits_lightbox(&self, info: &SourceInfo) -> bool {
        let gallery = &self.config.gallery;
        (gallery.lightbox_max_width == 0 || info.width <= gallery.lightbox_max_width)
            && (gallery.lightbox_max_height == 0 || info.height <= gallery.lightbox_max_height)
    }
}

fn gallery_markup(items: &[Markup], header_footer: Option<(String, String)>) -> Markup {
    let (head, foot) = header_footer.unwrap_or_default();
    html! {
        @if !head.is_empty() {
            span.miniH { (head) } " "
        }
        @for (i, item) in items.iter().enumerate() {
            @if i > 0 { " " }
            (item)
        }
        @if !foot.is_empty() {
            " " span.miniF { (foot) }
        }
    }
}

fn lightbox_head(base: &str) -> Markup {
    let dir_url = serde_json::to_string(base).unwrap_or_default();
    html! {
        script type="text/javascript" src={ (base) "/prototype.js" } {}
        script type="text/javascript" src={ (base) "/scriptaculous.js?load=effects" } {}
        script type="text/javascript" { (PreEscaped(format!("LightboxDirUrl = {dir_url};"))) }
        script type="text/javascript" src={ (base) "/lightbox.js" } {}
        link rel="stylesheet" href={ (base) "/lightbox.css" } type="text/css" media="screen";
    }
}

/// Include/exclude glob filter over file names.
///
/// Matching is anchored and case-insensitive. Items without a wildcard act as
/// exact includes, so `a.jpg,!b*` lists `a.jpg` only.
struct NameMatcher {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl NameMatcher {
    fn new(items: &[String]) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for item in items {
            match item.strip_prefix(['!', '-']) {
                Some(glob) => exclude.extend(glob_regex(glob)),
                None => include.extend(glob_regex(item)),
            }
        }
        Self { include, exclude }
    }

    fn matches(&self, name: &str) -> bool {
        (self.include.is_empty() || self.include.iter().any(|re| re.is_match(name)))
            && !self.exclude.iter().any(|re| re.is_match(name))
    }
}

fn glob_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::from("(?i)^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Lightbox;
    use crate::imaging::RustBackend;
    use crate::imaging::iptc_parser::tests::{caption_iim, jpeg_with_iim};
    use crate::test_helpers::*;

    fn session<'a>(
        site: &'a TestSite,
        backend: &'a RustBackend,
        config: MiniConfig,
    ) -> RenderSession<'a, RustBackend, crate::store::FsUploads> {
        RenderSession::new(
            config,
            site.page("Main.Photos"),
            SystemTime::UNIX_EPOCH,
            backend,
            &site.uploads,
            RenderOptions::default(),
        )
    }

    fn render(site: &TestSite, config: MiniConfig, text: &str) -> RenderOutput {
        let backend = RustBackend::new();
        let mut session = session(site, &backend, config);
        let html = session.render_text(text);
        session.finish(html)
    }

    /// Add a PNG together with an up-to-date thumbnail.
    fn add_fresh_png(site: &TestSite, page: &PageName, name: &str, w: u32, h: u32) {
        site.add_png(page, name, w, h);
        let thumb = site.add_file(page, &naming::thumbnail_name(name), b"jpeg");
        bump_mtime(&thumb, 5);
    }

    fn cache_config() -> MiniConfig {
        let mut config = MiniConfig::default();
        config.cache.enabled = true;
        config
    }

    // =========================================================================
    // Directive parsing
    // =========================================================================

    #[test]
    fn parse_linked_directive_with_caption() {
        let d = Directive::parse(r#"see Mini:a.jpg,b.png"Evening walk" here"#).unwrap();
        assert!(d.links);
        assert_eq!(d.page_ref, None);
        assert_eq!(d.items, vec!["a.jpg", "b.png"]);
        assert_eq!(d.caption.as_deref(), Some("Evening walk"));
    }

    #[test]
    fn parse_page_reference() {
        let d = Directive::parse("mini:Travel.Rome/*.jpg,!draft*").unwrap();
        assert!(!d.links);
        assert_eq!(d.page_ref.as_deref(), Some("Travel.Rome"));
        assert_eq!(d.items, vec!["*.jpg", "!draft*"]);
        assert_eq!(d.caption, None);
    }

    #[test]
    fn parse_ignores_empty_items() {
        let d = Directive::parse("mini:a.jpg,,b.jpg,").unwrap();
        assert_eq!(d.items, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn parse_requires_word_boundary() {
        assert_eq!(Directive::parse("Gemini:a.jpg"), None);
        assert_eq!(Directive::parse("no directives"), None);
    }

    #[test]
    fn find_directives_reports_ranges() {
        let text = "x mini:a.jpg y Mini:b.jpg";
        let found = find_directives(text);
        assert_eq!(found.len(), 2);
        assert_eq!(&text[found[0].0.clone()], "mini:a.jpg");
        assert_eq!(&text[found[1].0.clone()], "Mini:b.jpg");
    }

    // =========================================================================
    // Item expansion
    // =========================================================================

    #[test]
    fn glob_lists_images_in_natural_order() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        for name in ["b10.png", "b2.png", "A.png"] {
            add_fresh_png(&site, &page, name, 8, 8);
        }
        site.add_file(&page, "notes.txt", b"text");

        let out = render(&site, MiniConfig::default(), "mini:*");
        let a = out.html.find("th00---A.png.jpg").unwrap();
        let b2 = out.html.find("th00---b2.png.jpg").unwrap();
        let b10 = out.html.find("th00---b10.png.jpg").unwrap();
        assert!(a < b2 && b2 < b10);
        assert!(!out.html.contains("notes.txt"));
        assert_eq!(out.html.matches("<img").count(), 3);
    }

    #[test]
    fn exclusion_without_include_lists_everything_else() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "keep.png", 8, 8);
        add_fresh_png(&site, &page, "draft1.png", 8, 8);

        let out = render(&site, MiniConfig::default(), "mini:!DRAFT*");
        assert!(out.html.contains("keep.png"));
        assert!(!out.html.contains("draft1.png"));
    }

    #[test]
    fn literal_names_act_as_includes_for_patterns() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "a.png", 8, 8);
        add_fresh_png(&site, &page, "b.png", 8, 8);

        let out = render(&site, MiniConfig::default(), "mini:a.png,!b*");
        assert_eq!(out.html.matches("<img").count(), 1);
        assert!(out.html.contains("th00---a.png.jpg"));
    }

    #[test]
    fn duplicates_keep_first_position() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "a.png", 8, 8);
        add_fresh_png(&site, &page, "b.png", 8, 8);

        let out = render(&site, MiniConfig::default(), "mini:b.png,*.png");
        assert_eq!(out.html.matches("<img").count(), 2);
        assert!(out.html.find("b.png").unwrap() < out.html.find("a.png").unwrap());
    }

    #[test]
    fn items_naming_the_same_upload_collapse() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "Dawn.png", 8, 8);

        let out = render(&site, MiniConfig::default(), "mini:Dawn.PNG,*.png");
        assert_eq!(out.html.matches("<img").count(), 1);
        assert!(out.html.contains("th00---Dawn.png.jpg"));
    }

    #[test]
    fn page_reference_uses_other_group() {
        let site = TestSite::new();
        let other = site.page("Travel.Rome");
        add_fresh_png(&site, &other, "forum.png", 8, 8);

        let out = render(&site, MiniConfig::default(), "mini:Travel.Rome/forum.png");
        assert!(out.html.contains("/uploads/Travel/th00---forum.png.jpg"));
    }

    // =========================================================================
    // Item markup
    // =========================================================================

    #[test]
    fn fresh_thumbnail_is_linked_directly() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "dawn.png", 40, 30);

        let out = render(&site, MiniConfig::default(), "mini:dawn.png");
        assert!(out.html.contains(r#"src="/uploads/Main/th00---dawn.png.jpg""#));
        assert!(out.html.contains(r#"class="mini""#));
        assert!(!out.no_cache);
        assert_eq!(out.stats.stale, 0);
    }

    #[test]
    fn stale_thumbnail_uses_action_and_disables_page_cache() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        site.add_png(&page, "dawn.png", 40, 30);

        let out = render(&site, MiniConfig::default(), "mini:dawn.png");
        assert!(
            out.html
                .contains(r#"src="/pmwiki.php?n=Main.Photos&amp;action=mini&amp;upname=dawn.png""#)
        );
        assert!(out.no_cache);
        assert_eq!(out.stats.stale, 1);
    }

    #[test]
    fn default_alt_text_summarises_the_image() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "dawn.png", 40, 30);
        let size = std::fs::metadata(site.uploads.file_path(&page, "dawn.png"))
            .unwrap()
            .len();
        let kb = (size as f64 / 1024.0).round() as u64;

        let out = render(&site, MiniConfig::default(), "mini:dawn.png");
        assert!(
            out.html
                .contains(&format!(r#"alt="dawn.png: 40x30, {kb}k""#))
        );
    }

    #[test]
    fn caption_is_escaped_into_alt() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "dawn.png", 8, 8);

        let out = render(&site, MiniConfig::default(), r#"mini:dawn.png"Sun <rise> & tea""#);
        assert!(out.html.contains(r#"alt="Sun &lt;rise&gt; &amp; tea""#));
    }

    #[test]
    fn dash_caption_means_empty_alt() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "dawn.png", 8, 8);

        let out = render(&site, MiniConfig::default(), r#"mini:dawn.png"-""#);
        assert!(out.html.contains(r#"alt="""#));
    }

    #[test]
    fn iptc_caption_used_when_enabled() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        let path = site.add_jpeg(&page, "dawn.jpg", 16, 16);

        // Splice an APP13 segment right after SOI
        let plain = std::fs::read(&path).unwrap();
        let iptc = jpeg_with_iim(&caption_iim(b"Harbour at dawn"));
        let mut bytes = plain[..2].to_vec();
        bytes.extend_from_slice(&iptc[2..iptc.len() - 2]);
        bytes.extend_from_slice(&plain[2..]);
        std::fs::write(&path, bytes).unwrap();

        let mut config = MiniConfig::default();
        config.gallery.iptc_caption = true;
        let out = render(&site, config, "mini:dawn.jpg");
        assert!(out.html.contains(r#"alt="Harbour at dawn""#));

        let out = render(&site, MiniConfig::default(), "mini:dawn.jpg");
        assert!(out.html.contains(r#"alt="dawn.jpg: 16x16"#));
    }

    #[test]
    fn missing_upload_links_to_upload_form() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        site.upload_dir(&page);

        let out = render(&site, MiniConfig::default(), "mini:Ghost.JPG");
        assert!(out.html.contains(r#"class="createlinktext""#));
        assert!(out.html.contains("action=upload&amp;upname=Ghost.jpg"));
        assert!(out.html.contains(">Ghost.JPG</a>"));
        assert!(out.html.contains("\u{a0}\u{394}"));
        assert!(!out.html.contains("<img"));
    }

    #[test]
    fn unsupported_file_becomes_attach_link() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        site.add_file(&page, "fake.gif", b"not an image at all");

        let out = render(&site, MiniConfig::default(), "mini:fake.gif");
        assert!(out.html.contains(r#"class="urllink""#));
        assert!(out.html.contains(r#"href="/uploads/Main/fake.gif""#));
        assert!(out.html.contains(">Attach:fake.gif</a>"));
    }

    #[test]
    fn linked_thumbnails_point_at_uploads() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "dawn.png", 8, 8);

        let out = render(&site, MiniConfig::default(), "Mini:dawn.png");
        assert!(
            out.html
                .contains(r#"<a class="minilink" href="/uploads/Main/dawn.png"><img"#)
        );
        assert!(out.head.is_empty());
    }

    #[test]
    fn header_footer_split_into_spans() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "dawn.png", 8, 8);
        let mut config = MiniConfig::default();
        config.gallery.header_footer = true;

        let out = render(&site, config, r#"mini:dawn.png"Morning|by the sea""#);
        assert!(out.html.starts_with(r#"<span class="miniH">Morning</span> <img"#));
        assert!(out.html.ends_with(r#" <span class="miniF">by the sea</span>"#));
        assert!(out.html.contains(r#"alt="Morning by the sea""#));
    }

    #[test]
    fn pipe_kept_when_header_footer_disabled() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "dawn.png", 8, 8);

        let out = render(&site, MiniConfig::default(), r#"mini:dawn.png"a|b""#);
        assert!(out.html.contains(r#"alt="a|b""#));
        assert!(!out.html.contains("miniH"));
    }

    // =========================================================================
    // Lightbox
    // =========================================================================

    #[test]
    fn lightbox_per_directive_groups() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "a.png", 8, 8);
        let mut config = MiniConfig::default();
        config.gallery.lightbox = Lightbox::Directive;

        let out = render(&site, config, "Mini:a.png and Mini:a.png");
        assert!(out.html.contains(r#"rel="lightbox[mini1]""#));
        assert!(out.html.contains(r#"rel="lightbox[mini2]""#));
        let head = &out.head[LIGHTBOX_HEAD_KEY];
        assert!(head.contains(r#"src="/pub/lb/lightbox.js""#));
        assert!(head.contains(r#"LightboxDirUrl = "/pub/lb";"#));
        assert_eq!(out.head.len(), 1);
    }

    #[test]
    fn oversized_images_stay_out_of_lightbox() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "small.png", 8, 8);
        add_fresh_png(&site, &page, "wide.png", 64, 8);
        let mut config = MiniConfig::default();
        config.gallery.lightbox = Lightbox::Gallery;
        config.gallery.lightbox_max_width = 32;

        let out = render(&site, config, "Mini:small.png,wide.png");
        assert_eq!(out.html.matches(r#"rel="lightbox[mini]""#).count(), 1);
        assert!(out.html.contains(r#"href="/uploads/Main/wide.png"><img"#));
    }

    // =========================================================================
    // Page directives
    // =========================================================================

    #[test]
    fn page_directives_apply_and_vanish() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "a.png", 8, 8);

        let backend = RustBackend::new();
        let mut session = session(&site, &backend, MiniConfig::default());
        let html = session.render_text("(:mini x=160 y=120:)mini:a.png");
        assert!(html.starts_with("<img"));
        assert_eq!(session.config().thumbnail.width, 160);
        assert_eq!(session.config().thumbnail.height, 120);
    }

    // =========================================================================
    // Fragment cache
    // =========================================================================

    #[test]
    fn second_pass_is_served_from_cache() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "a.png", 8, 8);

        let first = render(&site, cache_config(), "mini:a.png");
        assert_eq!(first.stats.rendered, 1);
        assert!(site.files(&page).contains(&".Main.Photos.mini-cache.txt".to_string()));

        // Drop the upload; a cached pass never looks at it
        std::fs::remove_file(site.uploads.file_path(&page, "a.png")).unwrap();
        let second = render(&site, cache_config(), "mini:a.png");
        assert_eq!(second.stats, RenderStats { cached: 1, rendered: 0, stale: 0 });
        assert_eq!(second.html, first.html);
    }

    #[test]
    fn stale_thumbnail_removes_cache_file() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "a.png", 8, 8);
        site.add_png(&page, "b.png", 8, 8);

        let out = render(&site, cache_config(), "mini:a.png mini:b.png");
        assert_eq!(out.stats.rendered, 2);
        assert!(!site.files(&page).iter().any(|f| f.ends_with(".mini-cache.txt")));
    }

    #[test]
    fn missing_upload_removes_cache_file() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "a.png", 8, 8);
        site.add_file(&page, ".Main.Photos.mini-cache.txt", b"<Mini1>old gallery</Mini1>\n");

        let out = render(&site, cache_config(), "mini:a.png mini:ghost.png");
        assert_eq!(out.stats.cached, 1);
        assert_eq!(out.stats.rendered, 1);
        assert!(out.html.starts_with("old gallery "));
        assert!(out.html.contains("action=upload"));
        assert!(!out.no_cache);
        assert!(!site.files(&page).contains(&".Main.Photos.mini-cache.txt".to_string()));
    }

    #[test]
    fn preview_bypasses_cache() {
        let site = TestSite::new();
        let page = site.page("Main.Photos");
        add_fresh_png(&site, &page, "a.png", 8, 8);

        let backend = RustBackend::new();
        let mut session = RenderSession::new(
            cache_config(),
            page.clone(),
            SystemTime::now(),
            &backend,
            &site.uploads,
            RenderOptions {
                preview: true,
                recache: false,
            },
        );
        let html = session.render_text("mini:a.png");
        assert!(html.contains("<img"));
        assert!(!site.files(&page).iter().any(|f| f.ends_with(".mini-cache.txt")));
    }

    // =========================================================================
    // RenderStats
    // =========================================================================

    #[test]
    fn render_stats_display() {
        let mut s = RenderStats::default();
        s.rendered = 2;
        assert_eq!(s.to_string(), "2 rendered");
        s.cached = 3;
        assert_eq!(s.to_string(), "3 cached, 2 rendered (5 total)");
        s.stale = 4;
        assert_eq!(
            s.to_string(),
            "3 cached, 2 rendered (5 total), 4 thumbnails pending"
        );
    }
}
