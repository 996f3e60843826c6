//! ZIP/CBZ adapter. The archive is enumerated once on open; entry names
//! are decoded with a per-archive charset decision (see
//! [`crate::encoding::ZipNameDecoder`]) that is reused for every pass over
//! the same handle.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::encoding::ZipNameDecoder;
use crate::error::ArchiveError;

pub struct ZipReader {
    archive: zip::ZipArchive<BufReader<File>>,
    /// Decoded entry names, aligned with archive indices.
    names: Vec<String>,
}

fn malformed(detail: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Malformed {
        format: "ZIP".into(),
        detail: detail.to_string(),
    }
}

impl ZipReader {
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(malformed)?;

        // Charset decided once per archive, from the first entry name.
        let mut decoder: Option<ZipNameDecoder> = None;
        let mut names = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i).map_err(malformed)?;
            let raw = entry.name_raw();
            let decoder =
                decoder.get_or_insert_with(|| ZipNameDecoder::detect(raw));
            names.push(decoder.decode(raw).replace('\\', "/"));
        }
        Ok(Self { archive, names })
    }
}

impl ArchiveReader for ZipReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let mut entries = Vec::with_capacity(self.names.len());
        for i in 0..self.archive.len() {
            let entry = self.archive.by_index_raw(i).map_err(malformed)?;
            entries.push(ArchiveEntry {
                path: self.names[i].trim_end_matches('/').to_string(),
                is_dir: entry.is_dir(),
                size: entry.size(),
            });
        }
        Ok(entries)
    }

    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let index = self
            .names
            .iter()
            .position(|n| n.trim_end_matches('/') == path)
            .ok_or_else(|| ArchiveError::MissingEntry(path.to_string()))?;
        let mut entry = self.archive.by_index(index).map_err(malformed)?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).map_err(ArchiveError::from)?;
        Ok(buf)
    }
}
