use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::{FileKind, VolumeKey};

#[derive(Debug, Error, Diagnostic)]
pub enum DatasetError {
    #[error("archive {name} is corrupt: {reason}")]
    ArchiveCorrupt { name: String, reason: String },

    #[error("archive {name} exceeds the nesting limit of {limit}")]
    #[diagnostic(help("raise archive.max_depth in medview-ds.json if the nesting is legitimate"))]
    ArchiveDepthExceeded { name: String, limit: usize },

    #[error("archive expansion produced more than {limit} files")]
    #[diagnostic(help("raise archive.max_entries in medview-ds.json if the batch is legitimate"))]
    ArchiveTooManyEntries { limit: usize },

    #[error("archive {name} holds a member larger than {limit} bytes")]
    #[diagnostic(help("raise archive.max_entry_bytes in medview-ds.json if the member is legitimate"))]
    ArchiveTooLarge { name: String, limit: u64 },

    #[error("archive entry path traversal detected: {0}")]
    UnsafeArchivePath(String),

    #[error("No reader for {filename} (kind {kind})")]
    NoReader { filename: String, kind: FileKind },

    #[error("failed to decode {filename}: {reason}")]
    Decode { filename: String, reason: String },

    #[error("DICOM error: {0}")]
    Dicom(String),

    #[error("volume not found: {0}")]
    VolumeNotFound(VolumeKey),

    #[error("invalid state file: {0}")]
    InvalidStateFile(String),

    #[error("failed to parse session manifest: {0}")]
    ManifestParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl DatasetError {
    pub(crate) fn decode(filename: &str, reason: impl ToString) -> Self {
        DatasetError::Decode {
            filename: filename.to_string(),
            reason: reason.to_string(),
        }
    }
}
