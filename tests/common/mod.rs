#![allow(dead_code)]

use std::io::{Cursor, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use medview_datasets::domain::SourceFile;

pub const SERIES_A: &str = "1.2.826.0.1.3680043.2.1125.1";
pub const SERIES_B: &str = "1.2.826.0.1.3680043.2.1125.2";

/// One 16-bit monochrome slice in explicit VR little endian.
pub struct SliceSpec<'a> {
    pub series_uid: &'a str,
    pub sop_uid: &'a str,
    pub instance: i64,
    pub z: f64,
    pub rows: u16,
    pub columns: u16,
}

impl<'a> SliceSpec<'a> {
    pub fn new(series_uid: &'a str, sop_uid: &'a str, instance: i64) -> Self {
        Self {
            series_uid,
            sop_uid,
            instance,
            z: instance as f64 * 2.5,
            rows: 2,
            columns: 3,
        }
    }
}

pub fn dicom_slice(spec: &SliceSpec<'_>) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");
    short_element(&mut out, (0x0002, 0x0010), b"UI", &padded(b"1.2.840.10008.1.2.1", 0));

    short_element(&mut out, (0x0008, 0x0018), b"UI", &padded(spec.sop_uid.as_bytes(), 0));
    short_element(&mut out, (0x0008, 0x103E), b"LO", &padded(b"AXIAL", b' '));
    short_element(&mut out, (0x0018, 0x0050), b"DS", &padded(b"2.5", b' '));
    short_element(&mut out, (0x0020, 0x000E), b"UI", &padded(spec.series_uid.as_bytes(), 0));
    short_element(
        &mut out,
        (0x0020, 0x0013),
        b"IS",
        &padded(spec.instance.to_string().as_bytes(), b' '),
    );
    short_element(
        &mut out,
        (0x0020, 0x0032),
        b"DS",
        &padded(format!("0\\0\\{}", spec.z).as_bytes(), b' '),
    );
    short_element(&mut out, (0x0028, 0x0002), b"US", &1u16.to_le_bytes());
    short_element(&mut out, (0x0028, 0x0010), b"US", &spec.rows.to_le_bytes());
    short_element(&mut out, (0x0028, 0x0011), b"US", &spec.columns.to_le_bytes());
    short_element(&mut out, (0x0028, 0x0030), b"DS", &padded(b"0.5\\0.75", b' '));
    short_element(&mut out, (0x0028, 0x0100), b"US", &16u16.to_le_bytes());
    short_element(&mut out, (0x0028, 0x0103), b"US", &0u16.to_le_bytes());

    let pixels = (0..spec.rows as usize * spec.columns as usize)
        .flat_map(|i| (spec.instance as u16 * 100 + i as u16).to_le_bytes())
        .collect::<Vec<_>>();
    out.extend_from_slice(&0x7FE0u16.to_le_bytes());
    out.extend_from_slice(&0x0010u16.to_le_bytes());
    out.extend_from_slice(b"OW");
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
    out.extend_from_slice(&pixels);
    out
}

fn short_element(out: &mut Vec<u8>, tag: (u16, u16), vr: &[u8; 2], value: &[u8]) {
    out.extend_from_slice(&tag.0.to_le_bytes());
    out.extend_from_slice(&tag.1.to_le_bytes());
    out.extend_from_slice(vr);
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
}

fn padded(value: &[u8], pad: u8) -> Vec<u8> {
    let mut value = value.to_vec();
    if value.len() % 2 == 1 {
        value.push(pad);
    }
    value
}

pub fn dicom_file(name: &str, spec: &SliceSpec<'_>) -> SourceFile {
    SourceFile::new(name, dicom_slice(spec))
}

pub fn zip_bytes(entries: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(&bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

pub fn gzip_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// A 2x2x2 uint8 volume.
pub fn nrrd_bytes() -> Vec<u8> {
    let mut out = b"NRRD0004\n\
type: uint8\n\
dimension: 3\n\
sizes: 2 2 2\n\
spacings: 1 1 2\n\
endian: little\n\
encoding: raw\n\n"
        .to_vec();
    out.extend_from_slice(&[0, 1, 2, 3, 4, 5, 6, 7]);
    out
}

pub fn nrrd_file(name: &str) -> SourceFile {
    SourceFile::new(name, nrrd_bytes())
}

pub fn ascii_stl() -> Vec<u8> {
    b"solid tri\n\
facet normal 0 0 1\n\
outer loop\n\
vertex 0 0 0\n\
vertex 1 0 0\n\
vertex 0 1 0\n\
endloop\n\
endfacet\n\
endsolid tri\n"
        .to_vec()
}

pub fn stl_file(name: &str) -> SourceFile {
    SourceFile::new(name, ascii_stl())
}

pub fn corrupt_file(name: &str) -> SourceFile {
    SourceFile::new(name, b"\x00\x01not a dataset".to_vec())
}
