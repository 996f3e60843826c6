//! Folder adapter: a plain directory treated as an archive.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::error::ArchiveError;

pub struct FolderReader {
    root: PathBuf,
}

impl FolderReader {
    pub fn open(root: &Path) -> Result<Self, ArchiveError> {
        if !root.is_dir() {
            return Err(ArchiveError::Malformed {
                format: "FOLDER".into(),
                detail: format!("not a directory: {}", root.display()),
            });
        }
        Ok(Self { root: root.to_path_buf() })
    }
}

impl ArchiveReader for FolderReader {
    fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let mut entries = Vec::new();
        for item in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
            let item = item.map_err(|e| ArchiveError::Malformed {
                format: "FOLDER".into(),
                detail: e.to_string(),
            })?;
            let rel = item
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(item.path());
            let path = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size = item.metadata().map(|m| m.len()).unwrap_or(0);
            entries.push(ArchiveEntry {
                path,
                is_dir: item.file_type().is_dir(),
                size,
            });
        }
        Ok(entries)
    }

    fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
        let full = self.root.join(path);
        if !full.starts_with(&self.root) {
            return Err(ArchiveError::MissingEntry(path.to_string()));
        }
        std::fs::read(&full).map_err(|_| ArchiveError::MissingEntry(path.to_string()))
    }
}
