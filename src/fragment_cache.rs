//! Per-page cache of rendered gallery HTML.
//!
//! Each page has one cache file in its upload directory holding one block per
//! gallery directive, keyed by the directive's position in the page:
//!
//! ```text
//! <Mini1><a class='minilink' …>…</a></Mini1>
//! <Mini2><img class='mini' …/></Mini2>
//! ```
//!
//! The file is only trusted while it is at least as new as the page text; an
//! edit to the page silently retires it. A [`FragmentCache`] lives for one
//! render pass: the file is read at most once, on the first lookup.
//!
//! ## Write policy
//!
//! A block is stored only when every thumbnail of its directive was fresh.
//! The first write of a pass truncates the file unless a fresh file was loaded
//! this pass, in which case blocks are appended after the ones already there.
//! A directive that had to regenerate anything deletes the whole file.
//!
//! ## Errors
//!
//! The cache never fails a render. Malformed blocks are skipped, and I/O
//! errors on read, write, or delete are logged and otherwise ignored.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

const OPEN: &str = "<Mini";
const CLOSE: &str = "</Mini";

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt cache block at byte {offset}: {reason}")]
    Corrupt { offset: usize, reason: &'static str },
}

/// Parse every well-formed block of a cache file.
///
/// Returns the entries and one [`CacheError::Corrupt`] per skipped block.
/// When a key appears twice the later block wins.
pub fn parse_blocks(text: &str) -> (BTreeMap<u32, String>, Vec<CacheError>) {
    let mut entries = BTreeMap::new();
    let mut errors = Vec::new();
    let mut pos = 0;

    while let Some(found) = text[pos..].find(OPEN) {
        let start = pos + found;
        let corrupt = |reason| CacheError::Corrupt {
            offset: start,
            reason,
        };
        let key_start = start + OPEN.len();
        let Some(gt) = text[key_start..].find('>') else {
            errors.push(corrupt("unterminated open tag"));
            break;
        };
        let key_text = &text[key_start..key_start + gt];
        let body_start = key_start + gt + 1;

        let key = match key_text.parse::<u32>() {
            Ok(key) if key_text.bytes().all(|b| b.is_ascii_digit()) => key,
            _ => {
                errors.push(corrupt("non-numeric key"));
                pos = key_start;
                continue;
            }
        };

        let Some(close) = text[body_start..].find(CLOSE) else {
            errors.push(corrupt("unterminated block"));
            break;
        };
        let body = &text[body_start..body_start + close];

        if let Some(nested) = body.find(OPEN) {
            errors.push(corrupt("nested open tag"));
            pos = body_start + nested;
            continue;
        }

        let tail = body_start + close + CLOSE.len();
        let expected = format!("{key}>");
        if !text[tail..].starts_with(&expected) {
            errors.push(corrupt("mismatched close tag"));
            pos = tail;
            continue;
        }

        entries.insert(key, body.to_string());
        pos = tail + expected.len();
    }

    (entries, errors)
}

/// Render one block in the on-disk format.
pub fn format_block(seq: u32, html: &str) -> String {
    format!("<Mini{seq}>{html}</Mini{seq}>\n")
}

/// The fragment cache of one page for one render pass.
#[derive(Debug)]
pub struct FragmentCache {
    path: PathBuf,
    page_modified: SystemTime,
    /// Ignore whatever is on disk (the file is rewritten from scratch).
    recache: bool,
    /// `None` until the first lookup or store.
    entries: Option<BTreeMap<u32, String>>,
    /// A fresh file was read this pass.
    loaded_fresh: bool,
    /// A block was written this pass.
    written: bool,
}

impl FragmentCache {
    pub fn new(path: impl Into<PathBuf>, page_modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            page_modified,
            recache: false,
            entries: None,
            loaded_fresh: false,
            written: false,
        }
    }

    /// Skip loading the existing file; the first store truncates it.
    pub fn recache(mut self) -> Self {
        self.recache = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached HTML for the `seq`-th directive, if any.
    pub fn lookup(&mut self, seq: u32) -> Option<String> {
        let hit = self.entries().get(&seq).cloned();
        debug!(
            cache = %self.path.display(),
            seq,
            hit = hit.is_some(),
            "fragment cache lookup"
        );
        hit
    }

    /// Persist the HTML of the `seq`-th directive.
    pub fn store(&mut self, seq: u32, html: &str) {
        self.entries();
        let truncate = !self.written && !self.loaded_fresh;
        match self.write_block(seq, html, truncate) {
            Ok(()) => {
                self.written = true;
                if let Some(entries) = self.entries.as_mut() {
                    entries.insert(seq, html.to_string());
                }
            }
            Err(e) => {
                warn!(cache = %self.path.display(), error = %e, "fragment cache write failed")
            }
        }
    }

    /// Delete the page's cache file.
    ///
    /// Entries already loaded stay available for the rest of this pass.
    pub fn invalidate(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(cache = %self.path.display(), "fragment cache invalidated"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(cache = %self.path.display(), error = %e, "fragment cache delete failed")
            }
        }
        self.loaded_fresh = false;
        self.written = false;
    }

    fn entries(&mut self) -> &BTreeMap<u32, String> {
        if self.entries.is_none() {
            let entries = if self.recache {
                BTreeMap::new()
            } else {
                self.load()
            };
            self.entries = Some(entries);
        }
        self.entries.get_or_insert_with(BTreeMap::new)
    }

    fn load(&mut self) -> BTreeMap<u32, String> {
        match self.read_if_fresh() {
            Ok(Some(text)) => {
                self.loaded_fresh = true;
                let (entries, errors) = parse_blocks(&text);
                for e in errors {
                    debug!(cache = %self.path.display(), error = %e, "skipped cache block");
                }
                entries
            }
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(cache = %self.path.display(), error = %e, "fragment cache read failed");
                BTreeMap::new()
            }
        }
    }

    /// Read the file if it exists and is not older than the page.
    fn read_if_fresh(&self) -> Result<Option<String>, CacheError> {
        let modified = match fs::metadata(&self.path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if modified < self.page_modified {
            debug!(cache = %self.path.display(), "fragment cache stale");
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn write_block(&self, seq: u32, html: &str, truncate: bool) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut options = OpenOptions::new();
        options.create(true);
        if truncate {
            options.write(true).truncate(true);
        } else {
            options.append(true);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(format_block(seq, html).as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn long_ago() -> SystemTime {
        SystemTime::UNIX_EPOCH
    }

    fn in_the_future() -> SystemTime {
        SystemTime::now() + Duration::from_secs(3600)
    }

    fn cache_path(tmp: &TempDir) -> PathBuf {
        tmp.path().join("Main").join(".Main.Photos.mini-cache.txt")
    }

    // =========================================================================
    // Block parser
    // =========================================================================

    #[test]
    fn parse_well_formed_blocks() {
        let (entries, errors) = parse_blocks("<Mini1>a</Mini1>\n<Mini2><b>x</b></Mini2>\n");
        assert!(errors.is_empty());
        assert_eq!(entries.get(&1).map(String::as_str), Some("a"));
        assert_eq!(entries.get(&2).map(String::as_str), Some("<b>x</b>"));
    }

    #[test]
    fn parse_empty_block() {
        let (entries, _) = parse_blocks("<Mini3></Mini3>\n");
        assert_eq!(entries.get(&3).map(String::as_str), Some(""));
    }

    #[test]
    fn parse_skips_mismatched_close() {
        let (entries, errors) = parse_blocks("<Mini1>a</Mini2>\n<Mini3>c</Mini3>\n");
        assert_eq!(entries.keys().copied().collect::<Vec<_>>(), vec![3]);
        assert!(matches!(
            errors[0],
            CacheError::Corrupt {
                reason: "mismatched close tag",
                ..
            }
        ));
    }

    #[test]
    fn parse_skips_unterminated_block() {
        let (entries, errors) = parse_blocks("<Mini1>a</Mini1>\n<Mini2>truncated");
        assert_eq!(entries.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn parse_skips_non_numeric_key() {
        let (entries, errors) = parse_blocks("<Minix>a</Minix>\n<Mini2>b</Mini2>\n");
        assert_eq!(entries.keys().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn parse_resyncs_after_nested_open_tag() {
        let (entries, errors) = parse_blocks("<Mini1>a<Mini2>b</Mini2>\n");
        assert_eq!(entries.get(&2).map(String::as_str), Some("b"));
        assert!(!entries.contains_key(&1));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn parse_garbage_yields_nothing() {
        let (entries, _) = parse_blocks("not a cache file at all");
        assert!(entries.is_empty());
    }

    #[test]
    fn block_format() {
        assert_eq!(format_block(7, "<img/>"), "<Mini7><img/></Mini7>\n");
    }

    // =========================================================================
    // Lookup / store
    // =========================================================================

    #[test]
    fn lookup_without_file_misses_and_creates_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut cache = FragmentCache::new(cache_path(&tmp), long_ago());
        assert_eq!(cache.lookup(1), None);
        assert!(!cache_path(&tmp).exists());
    }

    #[test]
    fn round_trip_across_passes() {
        let tmp = TempDir::new().unwrap();
        let mut first = FragmentCache::new(cache_path(&tmp), long_ago());
        assert_eq!(first.lookup(1), None);
        first.store(1, "<img a/>");
        first.store(2, "<img b/>");

        let mut second = FragmentCache::new(cache_path(&tmp), long_ago());
        assert_eq!(second.lookup(1).as_deref(), Some("<img a/>"));
        assert_eq!(second.lookup(2).as_deref(), Some("<img b/>"));
        assert_eq!(
            fs::read_to_string(cache_path(&tmp)).unwrap(),
            "<Mini1><img a/></Mini1>\n<Mini2><img b/></Mini2>\n"
        );
    }

    #[test]
    fn stale_file_is_ignored_and_truncated() {
        let tmp = TempDir::new().unwrap();
        let mut first = FragmentCache::new(cache_path(&tmp), long_ago());
        first.store(1, "old");
        first.store(2, "old");

        // Page edited after the cache file was written
        let mut second = FragmentCache::new(cache_path(&tmp), in_the_future());
        assert_eq!(second.lookup(1), None);
        second.store(1, "new");
        assert_eq!(
            fs::read_to_string(cache_path(&tmp)).unwrap(),
            "<Mini1>new</Mini1>\n"
        );
    }

    #[test]
    fn fresh_file_is_appended_to() {
        let tmp = TempDir::new().unwrap();
        let mut first = FragmentCache::new(cache_path(&tmp), long_ago());
        first.store(1, "one");

        let mut second = FragmentCache::new(cache_path(&tmp), long_ago());
        assert_eq!(second.lookup(1).as_deref(), Some("one"));
        assert_eq!(second.lookup(2), None);
        second.store(2, "two");
        assert_eq!(
            fs::read_to_string(cache_path(&tmp)).unwrap(),
            "<Mini1>one</Mini1>\n<Mini2>two</Mini2>\n"
        );
    }

    #[test]
    fn recache_ignores_fresh_file() {
        let tmp = TempDir::new().unwrap();
        let mut first = FragmentCache::new(cache_path(&tmp), long_ago());
        first.store(1, "old");

        let mut second = FragmentCache::new(cache_path(&tmp), long_ago()).recache();
        assert_eq!(second.lookup(1), None);
        second.store(1, "new");
        assert_eq!(
            fs::read_to_string(cache_path(&tmp)).unwrap(),
            "<Mini1>new</Mini1>\n"
        );
    }

    #[test]
    fn corrupt_blocks_are_skipped_on_load() {
        let tmp = TempDir::new().unwrap();
        let path = cache_path(&tmp);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "<Mini1>broken</Mini9>\n<Mini2>ok</Mini2>\n").unwrap();

        let mut cache = FragmentCache::new(&path, long_ago());
        assert_eq!(cache.lookup(1), None);
        assert_eq!(cache.lookup(2).as_deref(), Some("ok"));
    }

    // =========================================================================
    // Invalidation and I/O failures
    // =========================================================================

    #[test]
    fn invalidate_deletes_file() {
        let tmp = TempDir::new().unwrap();
        let mut cache = FragmentCache::new(cache_path(&tmp), long_ago());
        cache.store(1, "x");
        assert!(cache_path(&tmp).exists());

        cache.invalidate();
        assert!(!cache_path(&tmp).exists());
        // Nothing to delete is fine too
        cache.invalidate();
    }

    #[test]
    fn store_after_invalidate_starts_a_new_file() {
        let tmp = TempDir::new().unwrap();
        let mut first = FragmentCache::new(cache_path(&tmp), long_ago());
        first.store(1, "one");

        let mut second = FragmentCache::new(cache_path(&tmp), long_ago());
        second.lookup(1);
        second.invalidate();
        second.store(3, "three");
        assert_eq!(
            fs::read_to_string(cache_path(&tmp)).unwrap(),
            "<Mini3>three</Mini3>\n"
        );
    }

    #[test]
    fn unwritable_location_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("Main");
        fs::write(&blocker, "a file where the directory should be").unwrap();

        let mut cache = FragmentCache::new(cache_path(&tmp), long_ago());
        cache.store(1, "x");
        assert_eq!(cache.lookup(2), None);
        cache.invalidate();
    }
}
