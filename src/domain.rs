use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Handle into the image or model store. Uniqueness is owned by the store
/// that allocated it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a group of DICOM slices. Resolves to a [`DatasetId`] only once
/// the volume has been built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeKey(String);

impl VolumeKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VolumeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detected type tag of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Dicom,
    Zip,
    Gzip,
    Nrrd,
    Nifti,
    Stl,
    Vtk,
    Vti,
    Png,
    Jpeg,
    Unknown,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            FileKind::Dicom => "dcm",
            FileKind::Zip => "zip",
            FileKind::Gzip => "gz",
            FileKind::Nrrd => "nrrd",
            FileKind::Nifti => "nii",
            FileKind::Stl => "stl",
            FileKind::Vtk => "vtk",
            FileKind::Vti => "vti",
            FileKind::Png => "png",
            FileKind::Jpeg => "jpeg",
            FileKind::Unknown => "unknown",
        };
        write!(f, "{tag}")
    }
}

/// Which store a decoded file lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    Image,
    Model,
}

/// Raw user-supplied file. Contents are shared so that archive members,
/// provenance records, and session entries never copy the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn extension(&self) -> Option<String> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    pub file: SourceFile,
    pub kind: FileKind,
}

/// The primary selection: either a DICOM volume or a plain image.
///
/// Equality is per variant, so `Dicom { "x" }` never equals `Image { "x" }`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataSelection {
    Dicom {
        #[serde(rename = "volumeKey")]
        volume_key: VolumeKey,
    },
    Image {
        #[serde(rename = "dataID")]
        data_id: DatasetId,
    },
}

impl DataSelection {
    pub fn dicom(volume_key: VolumeKey) -> Self {
        DataSelection::Dicom { volume_key }
    }

    pub fn image(data_id: DatasetId) -> Self {
        DataSelection::Image { data_id }
    }

    /// The bare id or key, as written to the session manifest.
    pub fn key_str(&self) -> &str {
        match self {
            DataSelection::Dicom { volume_key } => volume_key.as_str(),
            DataSelection::Image { data_id } => data_id.as_str(),
        }
    }
}

pub fn selection_equals(a: &DataSelection, b: &DataSelection) -> bool {
    match (a, b) {
        (DataSelection::Dicom { volume_key: x }, DataSelection::Dicom { volume_key: y }) => x == y,
        (DataSelection::Image { data_id: x }, DataSelection::Image { data_id: y }) => x == y,
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LoadResult {
    File(FileLoadResult),
    Dicom(DicomLoadResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileLoadResult {
    Loaded {
        filename: String,
        data_id: DatasetId,
        data_type: DatasetType,
    },
    Failed {
        filename: String,
        reason: String,
    },
}

/// DICOM results carry no filename: an import failure is batch-level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DicomLoadResult {
    Loaded { volume_key: VolumeKey },
    Failed { reason: String },
}

impl LoadResult {
    pub fn file_loaded(filename: &str, data_id: DatasetId, data_type: DatasetType) -> Self {
        LoadResult::File(FileLoadResult::Loaded {
            filename: filename.to_string(),
            data_id,
            data_type,
        })
    }

    pub fn file_failed(filename: &str, reason: impl Into<String>) -> Self {
        LoadResult::File(FileLoadResult::Failed {
            filename: filename.to_string(),
            reason: reason.into(),
        })
    }

    pub fn dicom_loaded(volume_key: VolumeKey) -> Self {
        LoadResult::Dicom(DicomLoadResult::Loaded { volume_key })
    }

    pub fn dicom_failed(reason: impl Into<String>) -> Self {
        LoadResult::Dicom(DicomLoadResult::Failed {
            reason: reason.into(),
        })
    }

    pub fn is_loaded(&self) -> bool {
        matches!(
            self,
            LoadResult::File(FileLoadResult::Loaded { .. })
                | LoadResult::Dicom(DicomLoadResult::Loaded { .. })
        )
    }

    /// Selection a successful result can become. Models are never selectable.
    pub fn to_selection(&self) -> Option<DataSelection> {
        match self {
            LoadResult::Dicom(DicomLoadResult::Loaded { volume_key }) => {
                Some(DataSelection::dicom(volume_key.clone()))
            }
            LoadResult::File(FileLoadResult::Loaded {
                data_id,
                data_type: DatasetType::Image,
                ..
            }) => Some(DataSelection::image(data_id.clone())),
            _ => None,
        }
    }
}
