//! Format classification via file extension and magic bytes.

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DetectError;

/// What a library root is scanned as. Decides which container formats and
/// chapter detection algorithms apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Comic,
    Novel,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Comic => "comic",
            MediaKind::Novel => "novel",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "comic" => Ok(MediaKind::Comic),
            "novel" => Ok(MediaKind::Novel),
            "audio" | "album" => Ok(MediaKind::Audio),
            other => Err(DetectError::Unknown(format!("unknown media kind: {other}"))),
        }
    }
}

/// Container format of one library item. One case per supported archive
/// kind, dispatched by extension; no subclass chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveKind {
    Folder,
    Zip,
    Rar,
    Pdf,
    Epub,
    Text,
}

impl ArchiveKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Folder => "",
            ArchiveKind::Zip => "zip",
            ArchiveKind::Rar => "rar",
            ArchiveKind::Pdf => "pdf",
            ArchiveKind::Epub => "epub",
            ArchiveKind::Text => "txt",
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArchiveKind::Folder => "FOLDER",
            ArchiveKind::Zip => "ZIP",
            ArchiveKind::Rar => "RAR",
            ArchiveKind::Pdf => "PDF",
            ArchiveKind::Epub => "EPUB",
            ArchiveKind::Text => "TEXT",
        };
        write!(f, "{name}")
    }
}

/// Classify a path by extension (directories are Folder). Returns `None`
/// for anything the scanner should ignore.
pub fn classify_path(path: &Path) -> Option<ArchiveKind> {
    if path.is_dir() {
        return Some(ArchiveKind::Folder);
    }
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "zip" | "cbz" => Some(ArchiveKind::Zip),
        "rar" | "cbr" => Some(ArchiveKind::Rar),
        "pdf" => Some(ArchiveKind::Pdf),
        "epub" => Some(ArchiveKind::Epub),
        "txt" | "text" => Some(ArchiveKind::Text),
        _ => None,
    }
}

const HEADER_SIZE: usize = 8;

/// Verify a file's magic bytes against its extension-derived kind.
/// Extension wins when the header is too short to tell.
pub fn verify_file(path: &Path, kind: ArchiveKind) -> Result<bool, DetectError> {
    if kind == ArchiveKind::Folder {
        return Ok(path.is_dir());
    }
    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; HEADER_SIZE];
    let n = file.read(&mut header)?;
    let header = &header[..n];
    if header.len() < 4 {
        return Ok(true);
    }
    Ok(match kind {
        ArchiveKind::Zip | ArchiveKind::Epub => header.starts_with(b"PK\x03\x04"),
        ArchiveKind::Rar => header.starts_with(b"Rar!\x1a\x07"),
        ArchiveKind::Pdf => header.starts_with(b"%PDF-"),
        // Plain text has no magic bytes.
        ArchiveKind::Text => true,
        ArchiveKind::Folder => unreachable!(),
    })
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "m4a", "wav", "opus", "aac"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "text"];

fn has_extension(name: &str, set: &[&str]) -> bool {
    let lower = name.to_lowercase();
    set.iter().any(|ext| {
        lower.ends_with(ext) && lower[..lower.len() - ext.len()].ends_with('.')
    })
}

/// Whether an entry name (inside an archive or folder) is a page image.
pub fn is_image_entry(name: &str) -> bool {
    has_extension(name, IMAGE_EXTENSIONS)
}

/// Whether an entry name is an audio track.
pub fn is_audio_entry(name: &str) -> bool {
    has_extension(name, AUDIO_EXTENSIONS)
}

/// Whether a file name is plain/structured text readable as a novel.
pub fn is_text_entry(name: &str) -> bool {
    has_extension(name, TEXT_EXTENSIONS)
}
