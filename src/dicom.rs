//! Minimal DICOM Part 10 reader: just enough header to group slices into
//! series and stack native (uncompressed) pixel data into a volume.

use std::ops::Range;

use crate::data::{ImageData, ScalarType};
use crate::domain::SourceFile;
use crate::error::DatasetError;

const PREAMBLE_LEN: usize = 128;
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;
const MAX_SEQUENCE_DEPTH: usize = 64;

const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

type Tag = (u16, u16);

const TRANSFER_SYNTAX_UID: Tag = (0x0002, 0x0010);
const SOP_INSTANCE_UID: Tag = (0x0008, 0x0018);
const SERIES_DESCRIPTION: Tag = (0x0008, 0x103E);
const SLICE_THICKNESS: Tag = (0x0018, 0x0050);
const SERIES_INSTANCE_UID: Tag = (0x0020, 0x000E);
const INSTANCE_NUMBER: Tag = (0x0020, 0x0013);
const IMAGE_POSITION_PATIENT: Tag = (0x0020, 0x0032);
const SAMPLES_PER_PIXEL: Tag = (0x0028, 0x0002);
const ROWS: Tag = (0x0028, 0x0010);
const COLUMNS: Tag = (0x0028, 0x0011);
const PIXEL_SPACING: Tag = (0x0028, 0x0030);
const BITS_ALLOCATED: Tag = (0x0028, 0x0100);
const PIXEL_REPRESENTATION: Tag = (0x0028, 0x0103);
const PIXEL_DATA: Tag = (0x7FE0, 0x0010);

const ITEM: Tag = (0xFFFE, 0xE000);
const ITEM_DELIMITATION: Tag = (0xFFFE, 0xE00D);
const SEQUENCE_DELIMITATION: Tag = (0xFFFE, 0xE0DD);

/// Header fields of one slice plus the location of its pixel data.
#[derive(Debug, Clone)]
pub struct DicomSlice {
    pub source: SourceFile,
    pub series_uid: String,
    pub sop_instance_uid: Option<String>,
    pub series_description: Option<String>,
    pub instance_number: Option<i64>,
    pub image_position: Option<[f64; 3]>,
    pub pixel_spacing: Option<[f64; 2]>,
    pub slice_thickness: Option<f64>,
    pub samples_per_pixel: u16,
    pub rows: u16,
    pub columns: u16,
    pub bits_allocated: u16,
    pub pixel_representation: u16,
    pixel_range: Range<usize>,
}

impl DicomSlice {
    pub fn pixel_data(&self) -> &[u8] {
        &self.source.bytes[self.pixel_range.clone()]
    }
}

pub fn parse_slice(file: &SourceFile) -> Result<DicomSlice, DatasetError> {
    let fail = |reason: &str| DatasetError::Dicom(format!("{}: {reason}", file.name));

    let bytes: &[u8] = &file.bytes;
    if bytes.len() < PREAMBLE_LEN + 4 || &bytes[PREAMBLE_LEN..PREAMBLE_LEN + 4] != b"DICM" {
        return Err(fail("missing DICM preamble"));
    }

    let mut cursor = Cursor {
        bytes,
        pos: PREAMBLE_LEN + 4,
        explicit: true,
    };

    let mut transfer_syntax = EXPLICIT_VR_LITTLE_ENDIAN.to_string();
    while cursor.peek_tag().is_some_and(|(group, _)| group == 0x0002) {
        let element = cursor.read_element(0).map_err(|reason| fail(&reason))?;
        if element.tag == TRANSFER_SYNTAX_UID {
            transfer_syntax = text(element.value);
        }
    }
    cursor.explicit = match transfer_syntax.as_str() {
        EXPLICIT_VR_LITTLE_ENDIAN => true,
        IMPLICIT_VR_LITTLE_ENDIAN => false,
        other => return Err(fail(&format!("unsupported transfer syntax {other}"))),
    };

    let mut header = Header::default();
    let mut pixel_range = None;
    while cursor.peek_tag().is_some() {
        let element = cursor.read_element(0).map_err(|reason| fail(&reason))?;
        match element.tag {
            SOP_INSTANCE_UID => header.sop_instance_uid = non_empty(text(element.value)),
            SERIES_DESCRIPTION => header.series_description = non_empty(text(element.value)),
            SLICE_THICKNESS => header.slice_thickness = decimals(element.value).first().copied(),
            SERIES_INSTANCE_UID => header.series_uid = non_empty(text(element.value)),
            INSTANCE_NUMBER => header.instance_number = text(element.value).parse().ok(),
            IMAGE_POSITION_PATIENT => {
                if let [x, y, z] = decimals(element.value)[..] {
                    header.image_position = Some([x, y, z]);
                }
            }
            SAMPLES_PER_PIXEL => header.samples_per_pixel = unsigned(element.value),
            ROWS => header.rows = unsigned(element.value),
            COLUMNS => header.columns = unsigned(element.value),
            PIXEL_SPACING => {
                if let [row, column] = decimals(element.value)[..] {
                    header.pixel_spacing = Some([row, column]);
                }
            }
            BITS_ALLOCATED => header.bits_allocated = unsigned(element.value),
            PIXEL_REPRESENTATION => header.pixel_representation = unsigned(element.value),
            PIXEL_DATA => {
                pixel_range = Some(element.range);
                break;
            }
            _ => {}
        }
    }

    let series_uid = header
        .series_uid
        .ok_or_else(|| fail("missing Series Instance UID"))?;
    let pixel_range = pixel_range.ok_or_else(|| fail("missing pixel data"))?;
    let (Some(rows), Some(columns), Some(bits_allocated)) =
        (header.rows, header.columns, header.bits_allocated)
    else {
        return Err(fail("missing image geometry"));
    };

    Ok(DicomSlice {
        source: file.clone(),
        series_uid,
        sop_instance_uid: header.sop_instance_uid,
        series_description: header.series_description,
        instance_number: header.instance_number,
        image_position: header.image_position,
        pixel_spacing: header.pixel_spacing,
        slice_thickness: header.slice_thickness,
        samples_per_pixel: header.samples_per_pixel.unwrap_or(1),
        rows,
        columns,
        bits_allocated,
        pixel_representation: header.pixel_representation.unwrap_or(0),
        pixel_range,
    })
}

/// Orders slices along the scan axis and stacks them into one image.
///
/// Slices are sorted by image position (z) when every slice has one, else by
/// instance number, else by file name.
pub fn assemble_volume(slices: &[DicomSlice]) -> Result<ImageData, DatasetError> {
    let first = slices
        .first()
        .ok_or_else(|| DatasetError::Dicom("volume has no slices".to_string()))?;

    let mut ordered = slices.iter().collect::<Vec<_>>();
    if ordered.iter().all(|slice| slice.image_position.is_some()) {
        ordered.sort_by(|a, b| {
            let za = a.image_position.map_or(0.0, |p| p[2]);
            let zb = b.image_position.map_or(0.0, |p| p[2]);
            za.total_cmp(&zb)
        });
    } else if ordered.iter().all(|slice| slice.instance_number.is_some()) {
        ordered.sort_by_key(|slice| slice.instance_number);
    } else {
        ordered.sort_by(|a, b| a.source.name.cmp(&b.source.name));
    }

    if first.samples_per_pixel != 1 {
        return Err(DatasetError::Dicom(format!(
            "series {}: only single-sample pixels are supported",
            first.series_uid
        )));
    }
    let scalar_type = ScalarType::from_dicom(first.bits_allocated, first.pixel_representation == 1)
        .ok_or_else(|| {
            DatasetError::Dicom(format!(
                "series {}: unsupported BitsAllocated {}",
                first.series_uid, first.bits_allocated
            ))
        })?;
    let slice_len =
        first.rows as usize * first.columns as usize * scalar_type.byte_size();

    let mut scalars = Vec::with_capacity(slice_len * ordered.len());
    for slice in &ordered {
        if (slice.rows, slice.columns, slice.bits_allocated, slice.pixel_representation)
            != (first.rows, first.columns, first.bits_allocated, first.pixel_representation)
        {
            return Err(DatasetError::Dicom(format!(
                "series {}: {} does not match the geometry of the other slices",
                first.series_uid, slice.source.name
            )));
        }
        let pixels = slice.pixel_data();
        if pixels.len() < slice_len {
            return Err(DatasetError::Dicom(format!(
                "{}: pixel data is shorter than {} bytes",
                slice.source.name, slice_len
            )));
        }
        scalars.extend_from_slice(&pixels[..slice_len]);
    }

    let [row_spacing, column_spacing] = first.pixel_spacing.unwrap_or([1.0, 1.0]);
    let z_spacing = match (ordered.first(), ordered.get(1)) {
        (Some(a), Some(b)) => match (a.image_position, b.image_position) {
            (Some(pa), Some(pb)) if pa[2] != pb[2] => (pb[2] - pa[2]).abs(),
            _ => first.slice_thickness.unwrap_or(1.0),
        },
        _ => first.slice_thickness.unwrap_or(1.0),
    };
    let origin = ordered
        .first()
        .and_then(|slice| slice.image_position)
        .unwrap_or([0.0; 3]);

    Ok(ImageData {
        dimensions: [first.columns as usize, first.rows as usize, ordered.len()],
        spacing: [column_spacing, row_spacing, z_spacing],
        origin,
        scalar_type,
        scalars,
    })
}

#[derive(Default)]
struct Header {
    sop_instance_uid: Option<String>,
    series_description: Option<String>,
    slice_thickness: Option<f64>,
    series_uid: Option<String>,
    instance_number: Option<i64>,
    image_position: Option<[f64; 3]>,
    samples_per_pixel: Option<u16>,
    rows: Option<u16>,
    columns: Option<u16>,
    pixel_spacing: Option<[f64; 2]>,
    bits_allocated: Option<u16>,
    pixel_representation: Option<u16>,
}

struct Element<'a> {
    tag: Tag,
    value: &'a [u8],
    range: Range<usize>,
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    explicit: bool,
}

impl<'a> Cursor<'a> {
    fn peek_tag(&self) -> Option<Tag> {
        let raw = self.bytes.get(self.pos..self.pos + 4)?;
        Some((
            u16::from_le_bytes([raw[0], raw[1]]),
            u16::from_le_bytes([raw[2], raw[3]]),
        ))
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| "unexpected end of file".to_string())?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, String> {
        let raw = self.take(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, String> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_tag(&mut self) -> Result<Tag, String> {
        Ok((self.read_u16()?, self.read_u16()?))
    }

    fn read_element(&mut self, depth: usize) -> Result<Element<'a>, String> {
        let tag = self.read_tag()?;
        // Group 0002 is always explicit VR; items and delimiters never carry one.
        let explicit = (self.explicit || tag.0 == 0x0002) && tag.0 != 0xFFFE;
        let length = if explicit {
            let vr = self.take(2)?;
            match vr {
                b"OB" | b"OD" | b"OF" | b"OL" | b"OW" | b"SQ" | b"UC" | b"UR" | b"UT" | b"UN" => {
                    self.take(2)?;
                    self.read_u32()?
                }
                _ => self.read_u16()? as u32,
            }
        } else {
            self.read_u32()?
        };

        if length == UNDEFINED_LENGTH {
            if tag == PIXEL_DATA {
                return Err("encapsulated pixel data is not supported".to_string());
            }
            let start = self.pos;
            self.skip_sequence(depth + 1)?;
            return Ok(Element {
                tag,
                value: &[],
                range: start..start,
            });
        }

        let start = self.pos;
        let value = self.take(length as usize)?;
        Ok(Element {
            tag,
            value,
            range: start..self.pos,
        })
    }

    fn skip_sequence(&mut self, depth: usize) -> Result<(), String> {
        if depth > MAX_SEQUENCE_DEPTH {
            return Err("sequence nesting too deep".to_string());
        }
        loop {
            let tag = self.read_tag()?;
            let length = self.read_u32()?;
            match tag {
                SEQUENCE_DELIMITATION => return Ok(()),
                ITEM if length == UNDEFINED_LENGTH => self.skip_item(depth)?,
                ITEM => {
                    self.take(length as usize)?;
                }
                other => {
                    return Err(format!(
                        "unexpected tag ({:04X},{:04X}) in sequence",
                        other.0, other.1
                    ));
                }
            }
        }
    }

    fn skip_item(&mut self, depth: usize) -> Result<(), String> {
        loop {
            if self.peek_tag() == Some(ITEM_DELIMITATION) {
                self.read_tag()?;
                self.read_u32()?;
                return Ok(());
            }
            self.read_element(depth)?;
        }
    }
}

fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches(['\0', ' '])
        .trim()
        .to_string()
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn decimals(value: &[u8]) -> Vec<f64> {
    text(value)
        .split('\\')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

fn unsigned(value: &[u8]) -> Option<u16> {
    match value {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}
