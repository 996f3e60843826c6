//! Content-addressed extraction cache.
//!
//! Three disjoint namespaces under one root:
//!
//! * `pages/<hash>/NNNN.<ext>` — transient extracted pages, one directory
//!   per (source, internal path) key;
//! * `covers/<hash>_cover.<ext>` — durable covers, retained when the
//!   transient namespace is swept;
//! * `archives/<hash>.<ext>` — local copies of random-access formats.
//!
//! Keys are SHA-256 of the logical identity, so identical inputs always
//! map to the same location. All writers for a given key are scheduled
//! sequentially by the scan pipeline; the only guard needed on disk is
//! "present and non-zero size" (a crash mid-write leaves a partial file,
//! which must read as absent).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::archive::{ArchiveEntry, ArchiveReader};
use crate::error::CacheError;
use crate::natsort;

pub struct ExtractionCache {
    root: PathBuf,
}

fn hash_key(source_id: &str, internal: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(internal.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn entry_extension(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or("bin")
}

/// Present-and-usable check: zero-size files count as absent.
fn is_valid_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

impl ExtractionCache {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        for ns in ["pages", "covers", "archives"] {
            std::fs::create_dir_all(root.join(ns))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the extracted pages for one (source, internal
    /// path) key.
    pub fn pages_dir(&self, source_id: &str, internal: &str) -> PathBuf {
        self.root.join("pages").join(hash_key(source_id, internal))
    }

    /// Location for the local copy of a random-access archive. The parent
    /// directory exists after this call; the file itself may not.
    pub fn archive_copy_path(&self, source_id: &str, ext: &str) -> Result<PathBuf, std::io::Error> {
        let dir = self.root.join("archives");
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}.{ext}", hash_key(source_id, ""))))
    }

    fn cover_file(&self, source_id: &str, ext: &str) -> PathBuf {
        self.root
            .join("covers")
            .join(format!("{}_cover.{ext}", hash_key(source_id, "_cover")))
    }

    /// Look for an already-extracted cover for a source, any extension.
    pub fn find_cover(&self, source_id: &str) -> Option<PathBuf> {
        let prefix = format!("{}_cover.", hash_key(source_id, "_cover"));
        let dir = self.root.join("covers");
        for item in std::fs::read_dir(dir).ok()?.flatten() {
            let name = item.file_name();
            if name.to_string_lossy().starts_with(&prefix) && is_valid_file(&item.path()) {
                return Some(item.path());
            }
        }
        None
    }

    /// Store cover bytes for a source. Covers are durable: they survive
    /// [`ExtractionCache::clear_transient`].
    pub fn store_cover(
        &self,
        source_id: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, CacheError> {
        let path = self.cover_file(source_id, ext);
        write_file(&path, bytes)?;
        Ok(path)
    }

    /// Expected sequential file names for a natural-sorted page listing.
    fn expected_names(pages: &[&str]) -> Vec<String> {
        pages
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{:04}.{}", i + 1, entry_extension(name)))
            .collect()
    }

    /// Extract every page of one chapter into its cache directory.
    ///
    /// Page entries are natural-sorted once and assigned zero-padded
    /// sequential names by sort position, so cached content matches the
    /// current sort order. A directory holding exactly the expected names
    /// (all non-empty) is complete and causes zero writes; anything less,
    /// or anything extra left by a larger previous extraction, is
    /// repopulated from the archive in one pass.
    pub fn populate_pages(
        &self,
        source_id: &str,
        internal: &str,
        reader: &mut dyn ArchiveReader,
        page_entries: &[ArchiveEntry],
    ) -> Result<Vec<PathBuf>, CacheError> {
        let mut pages: Vec<&str> = page_entries
            .iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.path.as_str())
            .collect();
        pages.sort_by(|a, b| natsort::compare(a, b));

        let dir = self.pages_dir(source_id, internal);
        let names = Self::expected_names(&pages);
        let paths: Vec<PathBuf> = names.iter().map(|n| dir.join(n)).collect();

        if !paths.is_empty()
            && paths.iter().all(|p| is_valid_file(p))
            && file_count(&dir) == paths.len()
        {
            return Ok(paths);
        }

        std::fs::create_dir_all(&dir)?;
        remove_unexpected(&dir, &names)?;
        for (page, path) in pages.iter().zip(&paths) {
            let bytes = reader.read_entry(page)?;
            write_file(path, &bytes)?;
        }
        Ok(paths)
    }

    /// Store one standalone resource (EPUB chapter image) under the pages
    /// namespace. Reuses an existing valid copy without writing.
    pub fn store_resource(
        &self,
        source_id: &str,
        internal: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, CacheError> {
        let dir = self.pages_dir(source_id, internal);
        let path = dir.join(format!("0001.{}", entry_extension(internal)));
        if is_valid_file(&path) {
            return Ok(path);
        }
        std::fs::create_dir_all(&dir)?;
        write_file(&path, bytes)?;
        Ok(path)
    }

    /// Free disk space: drop extracted pages and archive copies, keep
    /// covers.
    pub fn clear_transient(&self) -> Result<(), CacheError> {
        for ns in ["pages", "archives"] {
            let dir = self.root.join(ns);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Approximate disk usage per namespace, in bytes.
    pub fn usage(&self) -> (u64, u64, u64) {
        let sum = |ns: &str| -> u64 {
            walkdir::WalkDir::new(self.root.join(ns))
                .into_iter()
                .flatten()
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        };
        (sum("pages"), sum("covers"), sum("archives"))
    }
}

fn file_count(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|it| it.flatten().count())
        .unwrap_or(0)
}

/// Drop leftovers from a previous, larger extraction of the same key.
fn remove_unexpected(dir: &Path, names: &[String]) -> Result<(), CacheError> {
    for item in std::fs::read_dir(dir)?.flatten() {
        let name = item.file_name();
        if !names.iter().any(|n| name.to_string_lossy() == n.as_str()) {
            std::fs::remove_file(item.path())?;
        }
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    std::fs::write(path, bytes).map_err(|e| CacheError::WriteFailed {
        path: path.display().to_string(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::error::ArchiveError;

    /// In-memory archive for exercising the cache without real files.
    struct MemoryReader {
        files: HashMap<String, Vec<u8>>,
        reads: usize,
    }

    impl MemoryReader {
        fn new(files: &[(&str, &[u8])]) -> Self {
            Self {
                files: files
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_vec()))
                    .collect(),
                reads: 0,
            }
        }
    }

    impl ArchiveReader for MemoryReader {
        fn list_entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
            Ok(self
                .files
                .keys()
                .map(|k| ArchiveEntry { path: k.clone(), is_dir: false, size: 1 })
                .collect())
        }

        fn read_entry(&mut self, path: &str) -> Result<Vec<u8>, ArchiveError> {
            self.reads += 1;
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| ArchiveError::MissingEntry(path.to_string()))
        }
    }

    fn entries(reader: &mut MemoryReader) -> Vec<ArchiveEntry> {
        reader.list_entries().unwrap()
    }

    #[test]
    fn pages_get_sequential_names_in_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::open(dir.path()).unwrap();
        let mut reader =
            MemoryReader::new(&[("10.jpg", b"j"), ("2.jpg", b"b"), ("1.jpg", b"a")]);
        let list = entries(&mut reader);
        let paths = cache.populate_pages("src", "", &mut reader, &list).unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["0001.jpg", "0002.jpg", "0003.jpg"]);
        // 1.jpg sorts first, so 0001.jpg holds its bytes.
        assert_eq!(std::fs::read(&paths[0]).unwrap(), b"a");
        assert_eq!(std::fs::read(&paths[2]).unwrap(), b"j");
    }

    #[test]
    fn complete_directory_causes_zero_reads() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::open(dir.path()).unwrap();
        let mut reader = MemoryReader::new(&[("1.jpg", b"a"), ("2.jpg", b"b")]);
        let list = entries(&mut reader);

        cache.populate_pages("src", "", &mut reader, &list).unwrap();
        let reads_after_first = reader.reads;
        cache.populate_pages("src", "", &mut reader, &list).unwrap();
        assert_eq!(reader.reads, reads_after_first);
    }

    #[test]
    fn missing_or_empty_page_triggers_full_repopulation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::open(dir.path()).unwrap();
        let mut reader = MemoryReader::new(&[("1.jpg", b"a"), ("2.jpg", b"b")]);
        let list = entries(&mut reader);

        let paths = cache.populate_pages("src", "", &mut reader, &list).unwrap();
        // Simulate a crash mid-write: one file truncated to zero bytes.
        std::fs::write(&paths[1], b"").unwrap();
        let reads_before = reader.reads;
        let paths = cache.populate_pages("src", "", &mut reader, &list).unwrap();
        assert!(reader.reads > reads_before);
        assert!(paths.iter().all(|p| is_valid_file(p)));
    }

    #[test]
    fn shrunken_listing_drops_stale_pages() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::open(dir.path()).unwrap();
        let mut reader =
            MemoryReader::new(&[("1.jpg", b"a"), ("2.jpg", b"b"), ("3.jpg", b"c")]);
        let list = entries(&mut reader);
        let paths = cache.populate_pages("src", "", &mut reader, &list).unwrap();
        assert_eq!(paths.len(), 3);

        // The source lost a page; the cache must match the new listing.
        let mut reader = MemoryReader::new(&[("1.jpg", b"a"), ("2.jpg", b"b")]);
        let list = entries(&mut reader);
        let paths = cache.populate_pages("src", "", &mut reader, &list).unwrap();
        assert_eq!(paths.len(), 2);

        let pages_dir = cache.pages_dir("src", "");
        assert!(!pages_dir.join("0003.jpg").exists());
        let remaining = std::fs::read_dir(&pages_dir).unwrap().flatten().count();
        assert_eq!(remaining, 2);
    }

    #[test]
    fn clear_transient_keeps_covers() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::open(dir.path()).unwrap();
        let mut reader = MemoryReader::new(&[("1.jpg", b"a")]);
        let list = entries(&mut reader);
        let pages = cache.populate_pages("src", "", &mut reader, &list).unwrap();
        let cover = cache.store_cover("src", "jpg", b"coverbytes").unwrap();

        cache.clear_transient().unwrap();
        assert!(!pages[0].exists());
        assert!(cover.exists());
        assert_eq!(cache.find_cover("src"), Some(cover));
        assert_eq!(cache.find_cover("other"), None);
    }

    #[test]
    fn identical_inputs_map_to_identical_locations() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExtractionCache::open(dir.path()).unwrap();
        assert_eq!(cache.pages_dir("a", "x/"), cache.pages_dir("a", "x/"));
        assert_ne!(cache.pages_dir("a", "x/"), cache.pages_dir("a", "y/"));
        assert_ne!(cache.pages_dir("a", "x/"), cache.pages_dir("b", "x/"));
    }
}
