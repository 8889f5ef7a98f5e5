use crate::domain::{ClassifiedFile, FileKind, SourceFile};

const DICOM_PREAMBLE_LEN: usize = 128;

/// Tags a file with its dataset kind. Never fails: anything unrecognized is
/// tagged [`FileKind::Unknown`] so later stages can report it per file.
pub fn retype(file: SourceFile) -> ClassifiedFile {
    let kind = sniff_content(&file.bytes).unwrap_or_else(|| kind_from_extension(file.extension()));
    ClassifiedFile { file, kind }
}

pub fn retype_all(files: impl IntoIterator<Item = SourceFile>) -> Vec<ClassifiedFile> {
    files.into_iter().map(retype).collect()
}

fn sniff_content(bytes: &[u8]) -> Option<FileKind> {
    if bytes.len() >= DICOM_PREAMBLE_LEN + 4
        && &bytes[DICOM_PREAMBLE_LEN..DICOM_PREAMBLE_LEN + 4] == b"DICM"
    {
        return Some(FileKind::Dicom);
    }
    if bytes.starts_with(b"NRRD000") {
        return Some(FileKind::Nrrd);
    }
    let kind = infer::get(bytes)?;
    match kind.mime_type() {
        "application/zip" => Some(FileKind::Zip),
        "application/gzip" => Some(FileKind::Gzip),
        "image/png" => Some(FileKind::Png),
        "image/jpeg" => Some(FileKind::Jpeg),
        "application/dicom" => Some(FileKind::Dicom),
        _ => None,
    }
}

fn kind_from_extension(ext: Option<String>) -> FileKind {
    let Some(ext) = ext else {
        return FileKind::Unknown;
    };
    match ext.as_str() {
        "dcm" | "dicom" => FileKind::Dicom,
        "nrrd" | "nhdr" => FileKind::Nrrd,
        "nii" => FileKind::Nifti,
        "stl" => FileKind::Stl,
        "vtk" => FileKind::Vtk,
        "vti" => FileKind::Vti,
        "zip" => FileKind::Zip,
        "gz" => FileKind::Gzip,
        "png" => FileKind::Png,
        "jpg" | "jpeg" => FileKind::Jpeg,
        _ => FileKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_wins_over_extension() {
        let mut bytes = vec![0u8; 132];
        bytes[128..132].copy_from_slice(b"DICM");
        let classified = retype(SourceFile::new("slice.bin", bytes));
        assert_eq!(classified.kind, FileKind::Dicom);
    }

    #[test]
    fn unrecognized_is_unknown() {
        let classified = retype(SourceFile::new("notes", b"hello".to_vec()));
        assert_eq!(classified.kind, FileKind::Unknown);
    }
}
