//! # Mini Gallery
//!
//! Square thumbnails and thumbnail galleries for wiki pages. Editors write
//! `Mini:dawn.jpg,dusk.jpg` in page text and readers get a row of small,
//! uniformly sized thumbnails linking to the full uploads.
//!
//! # Architecture: Render, Fetch, Purge
//!
//! The work is split across three requests so rendering a page never waits
//! on image processing:
//!
//! ```text
//! 1. Render   page text  →  HTML         (gallery markup, fragment cache)
//! 2. Fetch    upload     →  th00---*.jpg (thumbnail generated on first request)
//! 3. Purge    page       →  (nothing)    (drop thumbnails and cache)
//! ```
//!
//! A render only checks whether each thumbnail is fresh. A fresh thumbnail is
//! linked as a plain file; a missing or stale one is linked through the fetch
//! action, which generates it when the browser asks for it.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`gallery`] | Parses `Mini:` directives and renders gallery HTML with Maud |
//! | [`fragment_cache`] | Per-page file of rendered directive HTML, keyed by position |
//! | [`store`] | Upload layout, thumbnail freshness, get-or-create, parallel warm-up |
//! | [`imaging`] | Crop geometry, pure-Rust rendering backend, IPTC caption reader |
//! | [`handlers`] | Fetch and purge request handlers with access checks and statuses |
//! | [`purge`] | Deletes a page's generated files |
//! | [`config`] | `config.toml` loading, validation, and `(:mini …:)` page directives |
//! | [`naming`] | Page names, upload name sanitizing, thumbnail and cache file names |
//! | [`links`] | URLs for uploads, thumbnails, and wiki actions |
//! | [`output`] | CLI output formatting for every command |
//!
//! # Design Decisions
//!
//! ## Thumbnails Are Files
//!
//! A thumbnail is an ordinary file next to its source, named
//! `th00---<upload>.jpg`. Freshness is a modification time comparison, so the
//! web server can serve fresh thumbnails directly and an upload replaced
//! under the same name is picked up on the next request without bookkeeping.
//!
//! ## Crop to Fill
//!
//! Thumbnails always fill their box. The source is scaled so the shorter side
//! fits and the overflow is trimmed around a configurable anchor; images
//! smaller than the box are centred on a background colour instead of being
//! enlarged. See [`imaging::geometry`].
//!
//! ## Maud for Markup
//!
//! Gallery HTML is built with [Maud](https://maud.lambda.xyz/), so captions
//! and file names are escaped by construction and a malformed template is a
//! build error.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling, sharpening and JPEG encoding use the `image` crate,
//! with small hand-written readers for the legacy WBMP and XBM formats. No
//! system image library is needed.

pub mod config;
pub mod fragment_cache;
pub mod gallery;
pub mod handlers;
pub mod imaging;
pub mod links;
pub mod naming;
pub mod output;
pub mod purge;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
