//! Catalog records: one entry per comic/novel/album, plus the merge policy
//! applied on rescan.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::detect::ArchiveKind;

/// Byte span into the original novel text. End is exclusive; the text is
/// never copied, so edits can be round-tripped by splicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: u64,
    pub end: u64,
}

/// One chapter (comic), text chapter (novel), or track (album) of a
/// catalog entry. Created fresh on every scan pass; never mutated, only
/// superseded when the source changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub name: String,
    pub source_uri: String,
    pub kind: ArchiveKind,
    /// Internal path prefix selecting this chapter inside a multi-chapter
    /// archive. `None` means the whole archive is one chapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_path: Option<String>,
    /// Byte range for text chapters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<TextSpan>,
}

/// One library item. The id is the canonical source path and stays stable
/// across rescans. User-owned fields survive rescans verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_path: Option<PathBuf>,
    pub chapters: Vec<ChapterRef>,
    /// Unix milliseconds of the scan that produced the structural fields.
    pub last_scanned_at: u64,

    // User-owned fields. The scanner copies these forward on merge and
    // never overwrites them.
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub last_read_chapter: u32,
    #[serde(default)]
    pub last_read_unit: u32,

    /// Refreshed on each scan: total pages/chapters/tracks.
    #[serde(default)]
    pub total_units: u32,
    /// Refreshed on each scan when recomputed; otherwise carried forward.
    #[serde(default)]
    pub current_unit: u32,
}

impl CatalogEntry {
    /// Merge a freshly scanned entry with its prior record, if any.
    ///
    /// Structural fields (`name`, `chapters`, unit counts,
    /// `last_scanned_at`) come from the fresh scan; user-owned fields come
    /// from the prior record; `cover_path` is only replaced when the fresh
    /// scan actually found one.
    pub fn merge(prior: Option<&CatalogEntry>, fresh: CatalogEntry) -> CatalogEntry {
        let Some(prior) = prior else { return fresh };
        CatalogEntry {
            id: prior.id.clone(),
            name: fresh.name,
            cover_path: fresh.cover_path.or_else(|| prior.cover_path.clone()),
            chapters: fresh.chapters,
            last_scanned_at: fresh.last_scanned_at,
            favorite: prior.favorite,
            hidden: prior.hidden,
            last_read_chapter: prior.last_read_chapter,
            last_read_unit: prior.last_read_unit,
            total_units: fresh.total_units,
            current_unit: fresh.current_unit.max(prior.current_unit.min(fresh.total_units)),
        }
    }
}
