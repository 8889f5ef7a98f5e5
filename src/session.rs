//! Session archive: a zip holding per-store dataset entries plus
//! `manifest.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::sync::Arc;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::archive::read_capped;
use crate::config::ArchiveLimits;
use crate::domain::{DataSelection, SourceFile};
use crate::error::DatasetError;
use crate::fs_util::write_bytes_atomic;

pub const MANIFEST_PATH: &str = "manifest.json";
pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSetType {
    Dicom,
    Image,
}

/// One dataset in the archive. Its files are every archive path under `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSetEntry {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: DataSetType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub data_sets: Vec<DataSetEntry>,
    /// Bare id or volume key of the primary selection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_selection: Option<String>,
    /// Which namespace `primary_selection` belongs to. Absent in older
    /// archives, in which case readers try both.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_selection_type: Option<DataSetType>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            created_at: Some(chrono::Utc::now().to_rfc3339()),
            data_sets: Vec::new(),
            primary_selection: None,
            primary_selection_type: None,
        }
    }
}

impl Manifest {
    pub fn set_primary_selection(&mut self, selection: Option<&DataSelection>) {
        self.primary_selection = selection.map(|sel| sel.key_str().to_string());
        self.primary_selection_type = selection.map(|sel| match sel {
            DataSelection::Dicom { .. } => DataSetType::Dicom,
            DataSelection::Image { .. } => DataSetType::Image,
        });
    }
}

/// In-memory session archive. Paths are kept sorted so the written zip is
/// byte-identical for identical contents.
#[derive(Debug, Clone, Default)]
pub struct StateFile {
    pub manifest: Manifest,
    files: BTreeMap<String, Arc<[u8]>>,
}

impl StateFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, entry: DataSetEntry) {
        self.manifest.data_sets.push(entry);
    }

    pub fn add_file(&mut self, path: String, bytes: impl Into<Arc<[u8]>>) {
        self.files.insert(path, bytes.into());
    }

    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Files belonging to `entry`, named by their last path component.
    pub fn files_for(&self, entry: &DataSetEntry) -> Vec<SourceFile> {
        self.files
            .range(entry.path.clone()..)
            .take_while(|(path, _)| path.starts_with(&entry.path))
            .map(|(path, bytes)| {
                let name = path.rsplit('/').next().unwrap_or(path.as_str());
                SourceFile::new(name, bytes.clone())
            })
            .collect()
    }

    pub fn write_zip<W: Write + Seek>(&self, writer: W) -> Result<W, DatasetError> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        let mut zip = ZipWriter::new(writer);

        let manifest = serde_json::to_vec_pretty(&self.manifest)
            .map_err(|err| DatasetError::ManifestParse(err.to_string()))?;
        zip.start_file(MANIFEST_PATH, options)
            .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        zip.write_all(&manifest)
            .map_err(|err| DatasetError::Filesystem(err.to_string()))?;

        for (path, bytes) in &self.files {
            zip.start_file(path.as_str(), options)
                .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
            zip.write_all(bytes)
                .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
        }
        zip.finish()
            .map_err(|err| DatasetError::Filesystem(err.to_string()))
    }

    pub fn to_zip_bytes(&self) -> Result<Vec<u8>, DatasetError> {
        Ok(self.write_zip(Cursor::new(Vec::new()))?.into_inner())
    }

    pub fn read_zip<R: Read + Seek>(reader: R) -> Result<Self, DatasetError> {
        Self::read_zip_limited(reader, ArchiveLimits::default().max_entry_bytes)
    }

    /// Like [`StateFile::read_zip`], rejecting any member that inflates past
    /// `max_entry_bytes`.
    pub fn read_zip_limited<R: Read + Seek>(
        reader: R,
        max_entry_bytes: u64,
    ) -> Result<Self, DatasetError> {
        let invalid = |err: zip::result::ZipError| DatasetError::InvalidStateFile(err.to_string());
        let mut archive = ZipArchive::new(reader).map_err(invalid)?;

        let mut manifest = None;
        let mut files: BTreeMap<String, Arc<[u8]>> = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(invalid)?;
            if entry.is_dir() {
                continue;
            }
            let path = entry.name().to_string();
            if entry.enclosed_name().is_none() {
                return Err(DatasetError::UnsafeArchivePath(path));
            }
            let bytes = read_capped(&mut entry, &path, max_entry_bytes)?;

            if path == MANIFEST_PATH {
                let parsed: Manifest = serde_json::from_slice(&bytes)
                    .map_err(|err| DatasetError::ManifestParse(err.to_string()))?;
                manifest = Some(parsed);
            } else {
                files.insert(path, Arc::from(bytes));
            }
        }

        let manifest = manifest
            .ok_or_else(|| DatasetError::InvalidStateFile(format!("missing {MANIFEST_PATH}")))?;
        Ok(Self { manifest, files })
    }

    pub fn from_zip_bytes(bytes: &[u8]) -> Result<Self, DatasetError> {
        Self::read_zip(Cursor::new(bytes))
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), DatasetError> {
        write_bytes_atomic(path, &self.to_zip_bytes()?)
    }

    pub fn open(path: &Utf8Path) -> Result<Self, DatasetError> {
        let bytes = fs::read(path.as_std_path())
            .map_err(|err| DatasetError::Filesystem(format!("read {path}: {err}")))?;
        Self::from_zip_bytes(&bytes)
    }
}
