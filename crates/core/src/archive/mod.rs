//! Archive adapters — every container format implements [`ArchiveReader`]
//! so the scanner and cache never care which format an item uses.

pub mod epub;
pub mod folder;
pub mod pdf;
pub mod rar;
pub mod zip;

use std::path::Path;

use crate::cache::ExtractionCache;
use crate::detect::ArchiveKind;
use crate::error::ArchiveError;

/// One entry in an archive's listing. Paths use forward slashes and are
/// relative to the archive root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Uniform contract over folder, ZIP, RAR, and PDF containers: list the
/// ordered entries, read one entry's bytes. Entries within one handle are
/// read via a single sequential stream per pass; callers must not share a
/// handle across threads.
pub trait ArchiveReader {
    /// Enumerate entries in archive order.
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError>;

    /// Read one entry's bytes by its listed path.
    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError>;
}

/// Open the right adapter for a source. RAR sources are copied into the
/// cache's archive namespace first (the format needs random access).
pub fn open_archive(
    path: &Path,
    kind: ArchiveKind,
    cache: &ExtractionCache,
) -> Result<Box<dyn ArchiveReader>, ArchiveError> {
    match kind {
        ArchiveKind::Folder => Ok(Box::new(folder::FolderReader::open(path)?)),
        ArchiveKind::Zip => Ok(Box::new(zip::ZipReader::open(path)?)),
        ArchiveKind::Rar => Ok(Box::new(rar::RarReader::open(path, cache)?)),
        ArchiveKind::Pdf => Ok(Box::new(pdf::PdfReader::open(path)?)),
        ArchiveKind::Epub => Err(ArchiveError::UnsupportedFormat(
            "EPUB is read through archive::epub::EpubBook".into(),
        )),
        ArchiveKind::Text => Err(ArchiveError::UnsupportedFormat(
            "plain text is not a container".into(),
        )),
    }
}
