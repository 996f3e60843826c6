/// Top-level error type. All public API functions return this.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Format detection failed: {0}")]
    Detect(#[from] DetectError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Could not determine format: {0}")]
    Unknown(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Malformed {format} archive: {detail}")]
    Malformed { format: String, detail: String },

    #[error("Missing entry: {0}")]
    MissingEntry(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache write failed for {path}: {detail}")]
    WriteFailed { path: String, detail: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
