use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Read;

use async_trait::async_trait;
use flate2::read::GzDecoder;

use crate::data::{ImageData, ScalarType};
use crate::domain::SourceFile;
use crate::error::DatasetError;
use crate::readers::ImageReader;

pub struct NrrdReader;

#[async_trait]
impl ImageReader for NrrdReader {
    async fn read(&self, file: &SourceFile) -> Result<ImageData, DatasetError> {
        parse_nrrd(&file.name, &file.bytes)
    }
}

/// Parses an attached-header NRRD with raw or gzip encoding.
pub fn parse_nrrd(name: &str, bytes: &[u8]) -> Result<ImageData, DatasetError> {
    let (lines, data_start) = split_header(name, bytes)?;
    let magic = lines.first().copied().unwrap_or_default();
    if !magic.starts_with("NRRD000") {
        return Err(DatasetError::decode(name, "missing NRRD magic"));
    }

    let mut fields = HashMap::new();
    for line in &lines[1..] {
        if line.starts_with('#') {
            continue;
        }
        // `key:=value` pairs are free-form metadata
        if let Some((key, value)) = line.split_once(": ") {
            fields.insert(key.trim().to_ascii_lowercase(), value.trim());
        }
    }
    let field = |key: &str| {
        fields
            .get(key)
            .copied()
            .ok_or_else(|| DatasetError::decode(name, format!("missing field '{key}'")))
    };

    if fields.contains_key("data file") || fields.contains_key("datafile") {
        return Err(DatasetError::decode(name, "detached data files are not supported"));
    }

    let raw_type = field("type")?;
    let scalar_type: ScalarType = raw_type
        .parse()
        .map_err(|_| DatasetError::decode(name, format!("unsupported type {raw_type}")))?;
    let dimension: usize = field("dimension")?
        .parse()
        .map_err(|_| DatasetError::decode(name, "invalid dimension"))?;
    if !(2..=3).contains(&dimension) {
        return Err(DatasetError::decode(
            name,
            format!("unsupported dimension {dimension}"),
        ));
    }

    let sizes = field("sizes")?
        .split_whitespace()
        .map(|value| value.parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| DatasetError::decode(name, "invalid sizes"))?;
    if sizes.len() != dimension {
        return Err(DatasetError::decode(name, "sizes do not match dimension"));
    }
    if sizes.contains(&0) {
        return Err(DatasetError::decode(name, "sizes must be positive"));
    }

    let mut spacing = [1.0; 3];
    if let Some(value) = fields.get("spacings") {
        for (axis, token) in value.split_whitespace().take(dimension).enumerate() {
            spacing[axis] = match token {
                "nan" | "NaN" => 1.0,
                other => other
                    .parse()
                    .map_err(|_| DatasetError::decode(name, "invalid spacings"))?,
            };
        }
    } else if let Some(value) = fields.get("space directions") {
        for (axis, token) in value.split_whitespace().take(dimension).enumerate() {
            if token == "none" {
                continue;
            }
            let vector = parse_vector(token)
                .ok_or_else(|| DatasetError::decode(name, "invalid space directions"))?;
            let nonzero = vector.iter().filter(|c| **c != 0.0).collect::<Vec<_>>();
            spacing[axis] = match nonzero.as_slice() {
                [single] => single.abs(),
                _ => vector.iter().map(|c| c * c).sum::<f64>().sqrt(),
            };
        }
    }

    let mut origin = [0.0; 3];
    if let Some(value) = fields.get("space origin") {
        let vector = parse_vector(value)
            .ok_or_else(|| DatasetError::decode(name, "invalid space origin"))?;
        for (axis, component) in vector.into_iter().take(3).enumerate() {
            origin[axis] = component;
        }
    }

    if scalar_type.byte_size() > 1 {
        if let Some(endian) = fields.get("endian") {
            if *endian != "little" {
                return Err(DatasetError::decode(name, "big-endian data is not supported"));
            }
        }
    }

    let mut dimensions = [1usize; 3];
    dimensions[..dimension].copy_from_slice(&sizes);

    let image = ImageData {
        dimensions,
        spacing,
        origin,
        scalar_type,
        scalars: Vec::new(),
    };
    let expected = image
        .expected_len()
        .ok_or_else(|| DatasetError::decode(name, "image size overflows"))?;

    let payload = &bytes[data_start..];
    let mut scalars = match field("encoding")? {
        "raw" => payload.get(..expected).unwrap_or(payload).to_vec(),
        "gzip" | "gz" => {
            // Never inflate past what the header says the image holds.
            let mut decoded = Vec::new();
            GzDecoder::new(payload)
                .take(expected as u64)
                .read_to_end(&mut decoded)
                .map_err(|err| DatasetError::decode(name, err))?;
            decoded
        }
        other => {
            return Err(DatasetError::decode(
                name,
                format!("unsupported encoding {other}"),
            ));
        }
    };

    if scalars.len() < expected {
        return Err(DatasetError::decode(
            name,
            format!("expected {expected} bytes of data, found {}", scalars.len()),
        ));
    }
    scalars.truncate(expected);

    Ok(ImageData { scalars, ..image })
}

/// Serializes an image as a raw little-endian NRRD.
pub fn write_nrrd(image: &ImageData) -> Vec<u8> {
    let [sx, sy, sz] = image.spacing;
    let [ox, oy, oz] = image.origin;
    let [dx, dy, dz] = image.dimensions;

    let mut header = String::from("NRRD0004\n");
    let _ = writeln!(header, "type: {}", image.scalar_type);
    let _ = writeln!(header, "dimension: 3");
    let _ = writeln!(header, "space: left-posterior-superior");
    let _ = writeln!(header, "sizes: {dx} {dy} {dz}");
    let _ = writeln!(
        header,
        "space directions: ({sx},0,0) (0,{sy},0) (0,0,{sz})"
    );
    let _ = writeln!(header, "space origin: ({ox},{oy},{oz})");
    let _ = writeln!(header, "endian: little");
    let _ = writeln!(header, "encoding: raw");
    header.push('\n');

    let mut out = header.into_bytes();
    out.extend_from_slice(&image.scalars);
    out
}

fn split_header<'a>(name: &str, bytes: &'a [u8]) -> Result<(Vec<&'a str>, usize), DatasetError> {
    let mut lines = Vec::new();
    let mut offset = 0;
    loop {
        let rest = &bytes[offset..];
        let end = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| DatasetError::decode(name, "truncated header"))?;
        let line = std::str::from_utf8(&rest[..end])
            .map_err(|_| DatasetError::decode(name, "header is not valid UTF-8"))?
            .trim_end_matches('\r');
        offset += end + 1;
        if line.is_empty() {
            return Ok((lines, offset));
        }
        lines.push(line);
    }
}

fn parse_vector(value: &str) -> Option<Vec<f64>> {
    let inner = value.trim().strip_prefix('(')?.strip_suffix(')')?;
    inner
        .split(',')
        .map(|component| component.trim().parse().ok())
        .collect()
}
