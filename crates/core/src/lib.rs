//! Core engine for scanning local media collections into a catalog.
//!
//! Three media kinds are supported: comics (paginated image archives in
//! folders, ZIP/CBZ, RAR/CBR, or PDF), novels (plain text in any common
//! encoding, or EPUB), and albums (folders of audio tracks). The scanner
//! walks a library root incrementally, the archive adapters expose every
//! container through one trait, and the extraction cache keeps decoded
//! pages and covers on disk keyed by content hashes.

pub mod archive;
pub mod cache;
pub mod catalog;
pub mod chapter;
pub mod config;
pub mod detect;
pub mod encoding;
pub mod error;
pub mod natsort;
pub mod position;
pub mod progress;
pub mod scanner;

pub mod prelude {
    pub use crate::catalog::{CatalogEntry, ChapterRef, TextSpan};
    pub use crate::detect::{ArchiveKind, MediaKind};
    pub use crate::error::{ArchiveError, CacheError, DetectError, ScanError};
    pub use crate::scanner::{CancelToken, ScanSummary, Scanner};
}
