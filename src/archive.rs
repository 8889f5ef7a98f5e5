use std::io::{Cursor, Read};

use flate2::read::GzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::classify::retype;
use crate::config::ArchiveLimits;
use crate::domain::{ClassifiedFile, FileKind, SourceFile};
use crate::error::DatasetError;

/// Flattens container files into their leaf members.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveExpander {
    limits: ArchiveLimits,
}

impl Default for ArchiveExpander {
    fn default() -> Self {
        Self::new(ArchiveLimits::default())
    }
}

impl ArchiveExpander {
    pub fn new(limits: ArchiveLimits) -> Self {
        Self { limits }
    }

    /// Expands every archive in depth-first order. Members take the place of
    /// the archive they came from; everything else passes through unchanged.
    pub fn expand(&self, files: Vec<ClassifiedFile>) -> Result<Vec<ClassifiedFile>, DatasetError> {
        let mut out = Vec::with_capacity(files.len());
        for file in files {
            self.expand_into(file, 0, &mut out)?;
        }
        Ok(out)
    }

    fn expand_into(
        &self,
        entry: ClassifiedFile,
        depth: usize,
        out: &mut Vec<ClassifiedFile>,
    ) -> Result<(), DatasetError> {
        let unpack: fn(&SourceFile, u64) -> Result<Vec<SourceFile>, DatasetError> = match entry.kind {
            FileKind::Zip => unzip,
            FileKind::Gzip => gunzip,
            _ => {
                if out.len() >= self.limits.max_entries {
                    return Err(DatasetError::ArchiveTooManyEntries {
                        limit: self.limits.max_entries,
                    });
                }
                out.push(entry);
                return Ok(());
            }
        };

        if depth >= self.limits.max_depth {
            return Err(DatasetError::ArchiveDepthExceeded {
                name: entry.file.name,
                limit: self.limits.max_depth,
            });
        }

        let members = unpack(&entry.file, self.limits.max_entry_bytes)?;
        debug!(
            archive = %entry.file.name,
            members = members.len(),
            depth,
            "expanded archive"
        );

        for member in members {
            self.expand_into(retype(member), depth + 1, out)?;
        }
        Ok(())
    }
}

/// Reads at most `limit` bytes; anything longer is rejected rather than
/// buffered.
pub(crate) fn read_capped(
    reader: impl Read,
    name: &str,
    limit: u64,
) -> Result<Vec<u8>, DatasetError> {
    let mut bytes = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes)
        .map_err(|err| DatasetError::ArchiveCorrupt {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
    if bytes.len() as u64 > limit {
        return Err(DatasetError::ArchiveTooLarge {
            name: name.to_string(),
            limit,
        });
    }
    Ok(bytes)
}

fn unzip(file: &SourceFile, limit: u64) -> Result<Vec<SourceFile>, DatasetError> {
    let corrupt = |reason: String| DatasetError::ArchiveCorrupt {
        name: file.name.clone(),
        reason,
    };
    let mut archive =
        ZipArchive::new(Cursor::new(file.bytes.as_ref())).map_err(|err| corrupt(err.to_string()))?;

    let mut members = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| corrupt(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let path = entry
            .enclosed_name()
            .ok_or_else(|| DatasetError::UnsafeArchivePath(entry.name().to_string()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.name().to_string());

        let bytes = read_capped(&mut entry, &file.name, limit)?;
        members.push(SourceFile::new(name, bytes));
    }
    Ok(members)
}

fn gunzip(file: &SourceFile, limit: u64) -> Result<Vec<SourceFile>, DatasetError> {
    let bytes = read_capped(GzDecoder::new(file.bytes.as_ref()), &file.name, limit)?;
    let name = match file.name.rsplit_once('.') {
        Some((stem, ext)) if ext.eq_ignore_ascii_case("gz") => stem.to_string(),
        _ => file.name.clone(),
    };
    Ok(vec![SourceFile::new(name, bytes)])
}
