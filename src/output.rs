//! CLI output formatting for every command.
//!
//! Output is **page-centric**: each report leads with the page name, and the
//! files it touched follow as indented lines. File names are always the
//! stored upload names, so a line can be matched to the uploads directory.
//!
//! # Output Format
//!
//! ## Render (stderr; the HTML goes to stdout)
//!
//! ```text
//! Main.Photos
//!     Galleries: 1 cached, 2 rendered (3 total)
//!     Head: lightbox
//!     Page cache: off (thumbnails pending)
//! ```
//!
//! ## Fetch
//!
//! ```text
//! Main.Photos
//!     th00---dawn.jpg.jpg: generated (5321 bytes)
//!         Saved: dawn-thumb.jpg
//! ```
//!
//! ## Warm
//!
//! ```text
//! Main.Photos (3 images)
//!     001 dawn.jpg: generated
//!     002 dusk.jpg: cached
//!     003 odd.gif: failed (format bmp not supported)
//! 1 generated, 1 cached, 1 failed
//! ```
//!
//! ## Purge
//!
//! ```text
//! Main.Photos
//!     Removed: .Main.Photos.mini-cache.txt
//!     Removed: th00---dawn.jpg.jpg
//! Purged 2 files
//!     Redirect: /pmwiki.php?n=Main.Photos&action=upload
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes it out. Format functions
//! are pure: no I/O, no side effects.

use crate::gallery::RenderOutput;
use crate::handlers::{Redirect, ThumbnailResponse};
use crate::naming::PageName;
use crate::store::WarmReport;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Render
// ============================================================================

pub fn format_render_summary(page: &PageName, output: &RenderOutput) -> Vec<String> {
    let mut lines = vec![page.to_string()];
    lines.push(format!("{}Galleries: {}", indent(1), output.stats));
    if !output.head.is_empty() {
        let keys: Vec<&str> = output.head.keys().map(String::as_str).collect();
        lines.push(format!("{}Head: {}", indent(1), keys.join(", ")));
    }
    if output.no_cache {
        lines.push(format!("{}Page cache: off (thumbnails pending)", indent(1)));
    }
    lines
}

/// Print the render summary to stderr, keeping stdout for the HTML.
pub fn print_render_summary(page: &PageName, output: &RenderOutput) {
    for line in format_render_summary(page, output) {
        eprintln!("{}", line);
    }
}

// ============================================================================
// Fetch
// ============================================================================

pub fn format_fetch_output(
    page: &PageName,
    response: &ThumbnailResponse,
    saved_to: Option<&Path>,
) -> Vec<String> {
    let name = response
        .path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| response.path.display().to_string());
    let status = if response.regenerated {
        "generated"
    } else {
        "cached"
    };

    let mut lines = vec![page.to_string()];
    lines.push(format!(
        "{}{}: {} ({} bytes)",
        indent(1),
        name,
        status,
        response.bytes.len()
    ));
    if let Some(saved) = saved_to {
        lines.push(format!("{}Saved: {}", indent(2), saved.display()));
    }
    lines
}

pub fn print_fetch_output(page: &PageName, response: &ThumbnailResponse, saved_to: Option<&Path>) {
    for line in format_fetch_output(page, response, saved_to) {
        println!("{}", line);
    }
}

// ============================================================================
// Warm
// ============================================================================

/// One line per image in natural order, then a totals line.
pub fn format_warm_output(page: &PageName, report: &WarmReport) -> Vec<String> {
    let mut entries: Vec<(&str, String)> = report
        .regenerated
        .iter()
        .map(|n| (n.as_str(), "generated".to_string()))
        .chain(report.fresh.iter().map(|n| (n.as_str(), "cached".to_string())))
        .chain(
            report
                .failed
                .iter()
                .map(|(n, e)| (n.as_str(), format!("failed ({})", e))),
        )
        .collect();
    entries.sort_by(|a, b| natord::compare_ignore_case(a.0, b.0));

    let mut lines = vec![format!(
        "{} ({})",
        page,
        plural(entries.len(), "image", "images")
    )];
    for (i, (name, status)) in entries.iter().enumerate() {
        lines.push(format!(
            "{}{} {}: {}",
            indent(1),
            format_index(i + 1),
            name,
            status
        ));
    }
    lines.push(format!(
        "{} generated, {} cached, {} failed",
        report.regenerated.len(),
        report.fresh.len(),
        report.failed.len()
    ));
    lines
}

pub fn print_warm_output(page: &PageName, report: &WarmReport) {
    for line in format_warm_output(page, report) {
        println!("{}", line);
    }
}

// ============================================================================
// Purge
// ============================================================================

pub fn format_purge_output(page: &PageName, redirect: &Redirect) -> Vec<String> {
    let mut lines = vec![page.to_string()];
    for name in &redirect.report.removed {
        lines.push(format!("{}Removed: {}", indent(1), name));
    }
    lines.push(format!(
        "Purged {}",
        plural(redirect.report.removed.len(), "file", "files")
    ));
    lines.push(format!("{}Redirect: {}", indent(1), redirect.location));
    lines
}

pub fn print_purge_output(page: &PageName, redirect: &Redirect) {
    for line in format_purge_output(page, redirect) {
        println!("{}", line);
    }
}
