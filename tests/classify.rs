mod common;

use common::{SERIES_A, SliceSpec, ascii_stl, dicom_slice, gzip_bytes, nrrd_bytes, zip_bytes};
use medview_datasets::classify::{retype, retype_all};
use medview_datasets::domain::{FileKind, SourceFile};

fn kind_of(name: &str, bytes: Vec<u8>) -> FileKind {
    retype(SourceFile::new(name, bytes)).kind
}

#[test]
fn magic_bytes_identify_content() {
    let slice = dicom_slice(&SliceSpec::new(SERIES_A, "1.1", 1));
    assert_eq!(kind_of("IM0001", slice), FileKind::Dicom);
    assert_eq!(kind_of("volume", nrrd_bytes()), FileKind::Nrrd);
    assert_eq!(kind_of("bundle", zip_bytes(vec![("a", b"a".to_vec())])), FileKind::Zip);
    assert_eq!(kind_of("blob", gzip_bytes(b"payload")), FileKind::Gzip);
}

#[test]
fn extension_is_the_fallback() {
    assert_eq!(kind_of("mesh.STL", ascii_stl()), FileKind::Stl);
    assert_eq!(kind_of("brain.nii", vec![0; 16]), FileKind::Nifti);
    assert_eq!(kind_of("surface.vtk", vec![0; 16]), FileKind::Vtk);
    assert_eq!(kind_of("grid.vti", vec![0; 16]), FileKind::Vti);
    assert_eq!(kind_of("header.nhdr", vec![0; 16]), FileKind::Nrrd);
    assert_eq!(kind_of("slice.dcm", vec![0; 16]), FileKind::Dicom);
}

#[test]
fn empty_and_nameless_files_are_unknown() {
    assert_eq!(kind_of("", Vec::new()), FileKind::Unknown);
    assert_eq!(kind_of("README", b"plain text".to_vec()), FileKind::Unknown);
}

#[test]
fn retype_all_keeps_order_and_files() {
    let classified = retype_all(vec![
        SourceFile::new("a.stl", ascii_stl()),
        SourceFile::new("b.nrrd", nrrd_bytes()),
    ]);
    let names = classified
        .iter()
        .map(|entry| entry.file.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["a.stl", "b.nrrd"]);
}
