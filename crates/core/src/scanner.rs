//! Incremental scan planner.
//!
//! One scan session walks the immediate children of a library root,
//! skips anything unchanged since the last recorded scan, decomposes the
//! rest into chapters/tracks, and emits merged catalog entries one at a
//! time. A failure on one child never aborts its siblings, and a child
//! that produced zero chapters is dropped without updating its scan
//! timestamp, so it is naturally retried next time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::archive::{epub::EpubBook, open_archive, pdf::PdfReader, ArchiveEntry, ArchiveReader};
use crate::cache::ExtractionCache;
use crate::catalog::{CatalogEntry, ChapterRef};
use crate::chapter::{leaf_chapter_dirs, HeadingDetector};
use crate::config::ScanConfig;
use crate::detect::{classify_path, is_audio_entry, is_image_entry, ArchiveKind, MediaKind};
use crate::encoding::decode_text;
use crate::error::ScanError;
use crate::natsort;
use crate::progress::{emit_progress, ProgressHandler};

/// Cooperative cancellation flag, checked between children rather than
/// mid-item, so a partially processed child is always finished as a unit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ScanDecision {
    Skip,
    Rescan,
}

fn decide(prior: Option<&CatalogEntry>, mtime_millis: u64) -> ScanDecision {
    match prior {
        Some(entry) if entry.last_scanned_at >= mtime_millis => ScanDecision::Skip,
        _ => ScanDecision::Rescan,
    }
}

/// Counts for one finished (or cancelled) scan session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub emitted: u32,
    pub skipped: u32,
    pub dropped: u32,
    pub cancelled: bool,
}

/// (chapters, total units, cover) for one successfully decoded child, or
/// `None` when the child has nothing readable in it.
type ScanOutcome = Option<(Vec<ChapterRef>, u32, Option<PathBuf>)>;

/// One scan session over one library root. Holds the per-session state
/// (compiled heading patterns, cancellation flag) so nothing leaks across
/// sessions.
pub struct Scanner<'a> {
    cache: &'a ExtractionCache,
    config: ScanConfig,
    cancel: CancelToken,
    headings: HeadingDetector,
}

impl<'a> Scanner<'a> {
    pub fn new(cache: &'a ExtractionCache, config: ScanConfig) -> Self {
        Self {
            cache,
            config,
            cancel: CancelToken::new(),
            headings: HeadingDetector::new(),
        }
    }

    /// Token for cancelling this session from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Walk the root's immediate children and emit one merged entry per
    /// successfully processed child. Children whose modification time is
    /// not newer than their recorded scan are skipped untouched.
    pub fn scan(
        &self,
        root: &Path,
        kind: MediaKind,
        existing: &HashMap<String, CatalogEntry>,
        progress: Option<&dyn ProgressHandler>,
        emit: &mut dyn FnMut(CatalogEntry),
    ) -> Result<ScanSummary, ScanError> {
        let mut summary = ScanSummary::default();
        let children: Vec<PathBuf> = std::fs::read_dir(root)?
            .flatten()
            .map(|e| e.path())
            .collect();
        let total = children.len() as u32;

        let mut processed = 0u32;
        for child in children {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            processed += 1;

            let name = display_name(&child);
            if self.config.skip_hidden && name.starts_with('.') {
                continue;
            }
            emit_progress(progress, &name, processed, Some(total));

            let id = source_id(&child);
            let mtime = match file_mtime_millis(&child) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(item = %name, "unreadable child, skipping: {e}");
                    summary.dropped += 1;
                    continue;
                }
            };
            let prior = existing.get(&id);
            if decide(prior, mtime) == ScanDecision::Skip {
                summary.skipped += 1;
                continue;
            }

            match self.process_child(&child, kind, &id, &name) {
                Ok(Some(fresh)) => {
                    emit(CatalogEntry::merge(prior, fresh));
                    summary.emitted += 1;
                }
                Ok(None) => {
                    tracing::debug!(item = %name, "no chapters resolved, dropped");
                    summary.dropped += 1;
                }
                Err(e) => {
                    tracing::warn!(item = %name, "scan failed, skipping: {e}");
                    summary.dropped += 1;
                }
            }
        }

        emit_progress(progress, "", processed, Some(total));
        Ok(summary)
    }

    /// Decode one child into a fresh entry. `Ok(None)` means the child is
    /// not a library item (wrong format or zero chapters), an expected and
    /// common outcome.
    fn process_child(
        &self,
        path: &Path,
        kind: MediaKind,
        id: &str,
        name: &str,
    ) -> Result<Option<CatalogEntry>, ScanError> {
        let Some(archive_kind) = classify_path(path) else {
            return Ok(None);
        };
        let scanned = match (kind, archive_kind) {
            (MediaKind::Comic, ArchiveKind::Folder) => self.scan_comic_folder(path, id, name)?,
            (MediaKind::Comic, ArchiveKind::Zip | ArchiveKind::Rar) => {
                self.scan_comic_archive(path, archive_kind, id, name)?
            }
            (MediaKind::Comic, ArchiveKind::Pdf) => self.scan_comic_pdf(path, id, name)?,
            (MediaKind::Novel, ArchiveKind::Text) => self.scan_novel_text(path, id)?,
            (MediaKind::Novel, ArchiveKind::Epub) => self.scan_novel_epub(path, id)?,
            (MediaKind::Audio, ArchiveKind::Folder) => self.scan_album(path, id)?,
            _ => return Ok(None),
        };
        let Some((chapters, total_units, cover_path)) = scanned else {
            return Ok(None);
        };
        debug_assert!(!chapters.is_empty());

        Ok(Some(CatalogEntry {
            id: id.to_string(),
            name: name.to_string(),
            cover_path,
            chapters,
            last_scanned_at: now_millis(),
            favorite: false,
            hidden: false,
            last_read_chapter: 0,
            last_read_unit: 0,
            total_units,
            current_unit: 0,
        }))
    }

    fn scan_comic_folder(
        &self,
        path: &Path,
        id: &str,
        name: &str,
    ) -> Result<ScanOutcome, ScanError> {
        let mut reader = open_archive(path, ArchiveKind::Folder, self.cache)?;
        let entries = reader.list_entries()?;

        // Chapters are immediate subdirectories that directly contain
        // image files; otherwise the folder itself is one chapter.
        let mut chapter_dirs: Vec<String> = entries
            .iter()
            .filter(|e| !e.is_dir && is_image_entry(&e.path))
            .filter_map(|e| match e.path.rfind('/') {
                Some(i) if !e.path[..i].contains('/') => Some(e.path[..i].to_string()),
                _ => None,
            })
            .collect();
        chapter_dirs.sort_unstable();
        chapter_dirs.dedup();
        chapter_dirs.sort_by(|a, b| natsort::compare(a, b));

        let total_images = entries
            .iter()
            .filter(|e| !e.is_dir && is_image_entry(&e.path))
            .count() as u32;

        let chapters: Vec<ChapterRef> = if chapter_dirs.is_empty() {
            if total_images == 0 {
                return Ok(None);
            }
            vec![whole_item_chapter(name, id, ArchiveKind::Folder)]
        } else {
            chapter_dirs
                .iter()
                .map(|dir| ChapterRef {
                    name: dir.clone(),
                    source_uri: id.to_string(),
                    kind: ArchiveKind::Folder,
                    internal_path: Some(format!("{dir}/")),
                    span: None,
                })
                .collect()
        };

        let cover = self.comic_cover(id, reader.as_mut(), &entries);
        Ok(Some((chapters, total_images, cover)))
    }

    fn scan_comic_archive(
        &self,
        path: &Path,
        kind: ArchiveKind,
        id: &str,
        name: &str,
    ) -> Result<ScanOutcome, ScanError> {
        let mut reader = open_archive(path, kind, self.cache)?;
        let entries = reader.list_entries()?;
        let total_images = entries
            .iter()
            .filter(|e| !e.is_dir && is_image_entry(&e.path))
            .count() as u32;
        if total_images == 0 {
            return Ok(None);
        }

        let leaf_dirs = leaf_chapter_dirs(&entries);
        let chapters: Vec<ChapterRef> = if leaf_dirs.is_empty() {
            vec![whole_item_chapter(name, id, kind)]
        } else {
            leaf_dirs
                .iter()
                .map(|dir| ChapterRef {
                    name: chapter_display_name(dir),
                    source_uri: id.to_string(),
                    kind,
                    internal_path: Some(dir.clone()),
                    span: None,
                })
                .collect()
        };

        let cover = self.comic_cover(id, reader.as_mut(), &entries);
        Ok(Some((chapters, total_images, cover)))
    }

    fn scan_comic_pdf(&self, path: &Path, id: &str, name: &str) -> Result<ScanOutcome, ScanError> {
        let reader = PdfReader::open(path)?;
        let pages = reader.page_count() as u32;
        // A PDF is always exactly one chapter.
        let chapters = vec![whole_item_chapter(name, id, ArchiveKind::Pdf)];
        let cover = self
            .cache
            .find_cover(id)
            .or_else(|| match reader.render_page(0) {
                Ok(png) => self.store_cover_logged(id, "png", &png),
                Err(e) => {
                    tracing::warn!(item = %id, "cover render failed: {e}");
                    None
                }
            });
        Ok(Some((chapters, pages, cover)))
    }

    fn scan_novel_text(&self, path: &Path, id: &str) -> Result<ScanOutcome, ScanError> {
        let bytes = std::fs::read(path)?;
        let (text, encoding) = decode_text(&bytes);
        tracing::debug!(item = %id, encoding = encoding.name(), "decoded novel text");
        if text.trim().is_empty() {
            return Ok(None);
        }
        let detected = self.headings.detect(&text);
        if detected.is_empty() {
            return Ok(None);
        }
        let total = detected.len() as u32;
        let chapters = detected
            .into_iter()
            .map(|c| ChapterRef {
                name: c.title,
                source_uri: id.to_string(),
                kind: ArchiveKind::Text,
                internal_path: None,
                span: Some(c.span),
            })
            .collect();
        Ok(Some((chapters, total, None)))
    }

    fn scan_novel_epub(&self, path: &Path, id: &str) -> Result<ScanOutcome, ScanError> {
        let mut book = EpubBook::open(path)?;
        if book.chapters().is_empty() {
            return Ok(None);
        }
        let chapters: Vec<ChapterRef> = book
            .chapters()
            .iter()
            .map(|c| ChapterRef {
                name: c.title.clone(),
                source_uri: id.to_string(),
                kind: ArchiveKind::Epub,
                internal_path: Some(c.href.clone()),
                span: None,
            })
            .collect();
        let total = chapters.len() as u32;

        let cover = self.cache.find_cover(id).or_else(|| {
            let href = book.cover_href()?.to_string();
            match book.read_resource(&href) {
                Ok(bytes) => {
                    let ext = entry_extension(&href);
                    self.store_cover_logged(id, &ext, &bytes)
                }
                Err(e) => {
                    tracing::warn!(item = %id, "cover read failed: {e}");
                    None
                }
            }
        });
        Ok(Some((chapters, total, cover)))
    }

    fn scan_album(&self, path: &Path, id: &str) -> Result<ScanOutcome, ScanError> {
        let mut tracks = Vec::new();
        let mut images = Vec::new();
        for item in std::fs::read_dir(path)?.flatten() {
            if !item.path().is_file() {
                continue;
            }
            let name = item.file_name().to_string_lossy().into_owned();
            if is_audio_entry(&name) {
                tracks.push(name);
            } else if is_image_entry(&name) {
                images.push(name);
            }
        }
        if tracks.is_empty() {
            return Ok(None);
        }
        natsort::sort_strings(&mut tracks);

        let chapters = tracks
            .iter()
            .map(|t| ChapterRef {
                name: t.clone(),
                source_uri: id.to_string(),
                kind: ArchiveKind::Folder,
                internal_path: Some(t.clone()),
                span: None,
            })
            .collect();
        let total = tracks.len() as u32;

        let cover = self.cache.find_cover(id).or_else(|| {
            let file = album_cover_file(&mut images)?;
            let ext = entry_extension(&file);
            match std::fs::read(path.join(&file)) {
                Ok(bytes) => self.store_cover_logged(id, &ext, &bytes),
                Err(_) => None,
            }
        });
        Ok(Some((chapters, total, cover)))
    }

    /// First page by natural order becomes the cover, unless one is
    /// already cached for this source.
    fn comic_cover(
        &self,
        id: &str,
        reader: &mut dyn ArchiveReader,
        entries: &[ArchiveEntry],
    ) -> Option<PathBuf> {
        if let Some(existing) = self.cache.find_cover(id) {
            return Some(existing);
        }
        let mut images: Vec<&str> = entries
            .iter()
            .filter(|e| !e.is_dir && is_image_entry(&e.path))
            .map(|e| e.path.as_str())
            .collect();
        images.sort_by(|a, b| natsort::compare(a, b));
        let first = images.first()?;
        let ext = entry_extension(first);
        match reader.read_entry(first) {
            Ok(bytes) => self.store_cover_logged(id, &ext, &bytes),
            Err(e) => {
                tracing::warn!(item = %id, "cover extraction failed: {e}");
                None
            }
        }
    }

    /// Cache write failure degrades to "no cover"; the caller decodes on
    /// demand instead.
    fn store_cover_logged(&self, id: &str, ext: &str, bytes: &[u8]) -> Option<PathBuf> {
        match self.cache.store_cover(id, ext, bytes) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(item = %id, "cover cache write failed: {e}");
                None
            }
        }
    }
}

/// Pick the album cover: a file named cover.* or folder.* wins, otherwise
/// the first image in natural order.
fn album_cover_file(images: &mut Vec<String>) -> Option<String> {
    if images.is_empty() {
        return None;
    }
    natsort::sort_strings(images);
    for name in images.iter() {
        let lower = name.to_lowercase();
        if lower.starts_with("cover.") || lower.starts_with("folder.") {
            return Some(name.clone());
        }
    }
    images.first().cloned()
}

fn whole_item_chapter(name: &str, id: &str, kind: ArchiveKind) -> ChapterRef {
    ChapterRef {
        name: name.to_string(),
        source_uri: id.to_string(),
        kind,
        internal_path: None,
        span: None,
    }
}

fn chapter_display_name(dir: &str) -> String {
    dir.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(dir)
        .to_string()
}

fn entry_extension(name: &str) -> String {
    name.rsplit('.').next().unwrap_or("bin").to_lowercase()
}

fn display_name(path: &Path) -> String {
    let component = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    component
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Stable identity for a source: the canonical path when resolvable.
fn source_id(path: &Path) -> String {
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn file_mtime_millis(path: &Path) -> Result<u64, std::io::Error> {
    let mtime = path.metadata()?.modified()?;
    Ok(unix_millis(mtime))
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn now_millis() -> u64 {
    unix_millis(SystemTime::now())
}
