//! RAR/CBR adapter. The format needs random access, so the source is
//! copied into the cache's archive namespace once and every open reuses
//! the cached copy unless it is missing or empty.

use std::path::{Path, PathBuf};

use unrar::Archive;

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::cache::ExtractionCache;
use crate::error::ArchiveError;

pub struct RarReader {
    cached: PathBuf,
}

fn malformed(detail: impl std::fmt::Display) -> ArchiveError {
    ArchiveError::Malformed {
        format: "RAR".into(),
        detail: detail.to_string(),
    }
}

fn normalize(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

impl RarReader {
    pub fn open(source: &Path, cache: &ExtractionCache) -> Result<Self, ArchiveError> {
        let cached = cache.archive_copy_path(&source.to_string_lossy(), "rar")?;
        let reuse = cached
            .metadata()
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !reuse {
            std::fs::copy(source, &cached)?;
            tracing::debug!(source = %source.display(), copy = %cached.display(), "cached rar archive");
        }
        Ok(Self { cached })
    }
}

impl ArchiveReader for RarReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let archive = Archive::new(&self.cached)
            .open_for_listing()
            .map_err(malformed)?;
        let mut entries = Vec::new();
        for header in archive {
            let header = header.map_err(malformed)?;
            entries.push(ArchiveEntry {
                path: normalize(&header.filename),
                is_dir: header.is_directory(),
                size: header.unpacked_size as u64,
            });
        }
        Ok(entries)
    }

    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut archive = Archive::new(&self.cached)
            .open_for_processing()
            .map_err(malformed)?;
        while let Some(header) = archive.read_header().map_err(malformed)? {
            let name = normalize(&header.entry().filename);
            archive = if name == path {
                let (data, _rest) = header.read().map_err(malformed)?;
                return Ok(data);
            } else {
                header.skip().map_err(malformed)?
            };
        }
        Err(ArchiveError::MissingEntry(path.to_string()))
    }
}
