use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::SourceFile;
use crate::error::DatasetError;

/// Writes through a temp file in the destination directory so readers never
/// observe a partially written file.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), DatasetError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("medview-ds")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| DatasetError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Reads input files from disk, naming each by its file name.
pub fn read_source_files(paths: &[Utf8PathBuf]) -> Result<Vec<SourceFile>, DatasetError> {
    paths
        .iter()
        .map(|path| {
            let bytes = fs::read(path.as_std_path())
                .map_err(|err| DatasetError::Filesystem(format!("read {path}: {err}")))?;
            let name = path.file_name().unwrap_or(path.as_str());
            Ok(SourceFile::new(name, bytes))
        })
        .collect()
}
