use async_trait::async_trait;

use crate::data::PolyData;
use crate::domain::SourceFile;
use crate::error::DatasetError;
use crate::readers::ModelReader;

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

pub struct StlReader;

#[async_trait]
impl ModelReader for StlReader {
    async fn read(&self, file: &SourceFile) -> Result<PolyData, DatasetError> {
        parse_stl(&file.name, &file.bytes)
    }
}

/// Parses binary or ASCII STL. Vertices are not merged across facets.
pub fn parse_stl(name: &str, bytes: &[u8]) -> Result<PolyData, DatasetError> {
    // Binary files may also begin with "solid", so the size check goes first.
    if let Some(count) = binary_facet_count(bytes) {
        return Ok(parse_binary(bytes, count));
    }
    if bytes.trim_ascii_start().starts_with(b"solid") {
        return parse_ascii(name, bytes);
    }
    Err(DatasetError::decode(name, "not a binary or ASCII STL file"))
}

fn binary_facet_count(bytes: &[u8]) -> Option<usize> {
    let raw = bytes.get(HEADER_LEN..HEADER_LEN + 4)?;
    let count = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
    (bytes.len() == HEADER_LEN + 4 + count * FACET_LEN).then_some(count)
}

fn parse_binary(bytes: &[u8], count: usize) -> PolyData {
    let mut poly = PolyData {
        points: Vec::with_capacity(count * 3),
        triangles: Vec::with_capacity(count),
    };
    for facet in bytes[HEADER_LEN + 4..].chunks_exact(FACET_LEN) {
        // 12-byte normal, three 12-byte vertices, 2-byte attribute count
        let base = poly.points.len() as u32;
        for vertex in facet[12..48].chunks_exact(12) {
            poly.points.push([
                read_f32(&vertex[0..4]),
                read_f32(&vertex[4..8]),
                read_f32(&vertex[8..12]),
            ]);
        }
        poly.triangles.push([base, base + 1, base + 2]);
    }
    poly
}

fn parse_ascii(name: &str, bytes: &[u8]) -> Result<PolyData, DatasetError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| DatasetError::decode(name, "ASCII STL is not valid UTF-8"))?;

    let mut points = Vec::new();
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        if token != "vertex" {
            continue;
        }
        let mut point = [0f32; 3];
        for component in &mut point {
            *component = tokens
                .next()
                .and_then(|value| value.parse().ok())
                .ok_or_else(|| DatasetError::decode(name, "malformed vertex"))?;
        }
        points.push(point);
    }

    if points.is_empty() {
        return Err(DatasetError::decode(name, "STL contains no facets"));
    }
    if points.len() % 3 != 0 {
        return Err(DatasetError::decode(name, "facet with fewer than three vertices"));
    }

    let triangles = (0..points.len() as u32 / 3)
        .map(|facet| [facet * 3, facet * 3 + 1, facet * 3 + 2])
        .collect();
    Ok(PolyData { points, triangles })
}

fn read_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
