mod common;

use assert_matches::assert_matches;

use common::{SERIES_A, SliceSpec, ascii_stl, dicom_slice, gzip_bytes, nrrd_bytes, zip_bytes};
use medview_datasets::archive::ArchiveExpander;
use medview_datasets::classify::retype_all;
use medview_datasets::config::ArchiveLimits;
use medview_datasets::domain::{FileKind, SourceFile};
use medview_datasets::error::DatasetError;

fn names_and_kinds(expander: &ArchiveExpander, files: Vec<SourceFile>) -> Vec<(String, FileKind)> {
    expander
        .expand(retype_all(files))
        .unwrap()
        .into_iter()
        .map(|entry| (entry.file.name, entry.kind))
        .collect()
}

#[test]
fn members_replace_their_archive_in_order() {
    let slice = dicom_slice(&SliceSpec::new(SERIES_A, "1.1", 1));
    let archive = zip_bytes(vec![("series/a.dcm", slice), ("mesh.stl", ascii_stl())]);
    let files = vec![
        SourceFile::new("before.nrrd", nrrd_bytes()),
        SourceFile::new("bundle.zip", archive),
        SourceFile::new("after.nrrd", nrrd_bytes()),
    ];

    let expanded = names_and_kinds(&ArchiveExpander::default(), files);

    assert_eq!(
        expanded,
        vec![
            ("before.nrrd".to_string(), FileKind::Nrrd),
            ("a.dcm".to_string(), FileKind::Dicom),
            ("mesh.stl".to_string(), FileKind::Stl),
            ("after.nrrd".to_string(), FileKind::Nrrd),
        ]
    );
}

#[test]
fn nested_zip_and_gzip_are_flattened() {
    let gz = gzip_bytes(&nrrd_bytes());
    let inner = zip_bytes(vec![("ct.nrrd.gz", gz)]);
    let outer = zip_bytes(vec![("inner.zip", inner), ("readme.txt", b"notes".to_vec())]);

    let expanded = names_and_kinds(
        &ArchiveExpander::default(),
        vec![SourceFile::new("outer.zip", outer)],
    );

    assert_eq!(
        expanded,
        vec![
            ("ct.nrrd".to_string(), FileKind::Nrrd),
            ("readme.txt".to_string(), FileKind::Unknown),
        ]
    );
}

#[test]
fn empty_archive_contributes_nothing() {
    let expanded = names_and_kinds(
        &ArchiveExpander::default(),
        vec![SourceFile::new("empty.zip", zip_bytes(Vec::new()))],
    );
    assert!(expanded.is_empty());
}

#[test]
fn depth_limit_is_enforced() {
    let innermost = zip_bytes(vec![("ct.nrrd", nrrd_bytes())]);
    let middle = zip_bytes(vec![("innermost.zip", innermost)]);
    let outer = zip_bytes(vec![("middle.zip", middle)]);
    let expander = ArchiveExpander::new(ArchiveLimits {
        max_depth: 2,
        ..ArchiveLimits::default()
    });

    let err = expander
        .expand(retype_all(vec![SourceFile::new("outer.zip", outer)]))
        .unwrap_err();

    assert_matches!(
        err,
        DatasetError::ArchiveDepthExceeded { name, limit: 2 } if name == "innermost.zip"
    );
}

#[test]
fn entry_limit_is_enforced() {
    let archive = zip_bytes(vec![
        ("a.nrrd", nrrd_bytes()),
        ("b.nrrd", nrrd_bytes()),
        ("c.nrrd", nrrd_bytes()),
    ]);
    let expander = ArchiveExpander::new(ArchiveLimits {
        max_entries: 2,
        ..ArchiveLimits::default()
    });

    let err = expander
        .expand(retype_all(vec![SourceFile::new("many.zip", archive)]))
        .unwrap_err();

    assert_matches!(err, DatasetError::ArchiveTooManyEntries { limit: 2 });
}

#[test]
fn truncated_zip_is_corrupt() {
    let mut archive = zip_bytes(vec![("ct.nrrd", nrrd_bytes())]);
    archive.truncate(archive.len() / 2);

    let err = ArchiveExpander::default()
        .expand(retype_all(vec![SourceFile::new("broken.zip", archive)]))
        .unwrap_err();

    assert_matches!(err, DatasetError::ArchiveCorrupt { name, .. } if name == "broken.zip");
}

#[test]
fn oversized_gzip_member_is_rejected() {
    let expander = ArchiveExpander::new(ArchiveLimits {
        max_entry_bytes: 1024,
        ..ArchiveLimits::default()
    });
    let bomb = gzip_bytes(&vec![0u8; 64 * 1024]);

    let err = expander
        .expand(retype_all(vec![SourceFile::new("zeros.gz", bomb)]))
        .unwrap_err();

    assert_matches!(
        err,
        DatasetError::ArchiveTooLarge { name, limit: 1024 } if name == "zeros.gz"
    );
}

#[test]
fn oversized_zip_member_is_rejected() {
    let expander = ArchiveExpander::new(ArchiveLimits {
        max_entry_bytes: 1024,
        ..ArchiveLimits::default()
    });
    let archive = zip_bytes(vec![("zeros.raw", vec![0u8; 64 * 1024])]);

    let err = expander
        .expand(retype_all(vec![SourceFile::new("zeros.zip", archive)]))
        .unwrap_err();

    assert_matches!(err, DatasetError::ArchiveTooLarge { limit: 1024, .. });
}

#[test]
fn member_at_the_size_limit_is_accepted() {
    let expander = ArchiveExpander::new(ArchiveLimits {
        max_entry_bytes: nrrd_bytes().len() as u64,
        ..ArchiveLimits::default()
    });
    let archive = zip_bytes(vec![("ct.nrrd", nrrd_bytes())]);

    let expanded = names_and_kinds(&expander, vec![SourceFile::new("ct.zip", archive)]);
    assert_eq!(expanded, vec![("ct.nrrd".to_string(), FileKind::Nrrd)]);
}

#[test]
fn traversing_member_path_is_rejected() {
    let archive = zip_bytes(vec![("../evil.nrrd", nrrd_bytes())]);

    let err = ArchiveExpander::default()
        .expand(retype_all(vec![SourceFile::new("evil.zip", archive)]))
        .unwrap_err();

    assert_matches!(err, DatasetError::UnsafeArchivePath(path) if path == "../evil.nrrd");
}
