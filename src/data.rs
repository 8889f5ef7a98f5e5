use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl ScalarType {
    pub fn byte_size(self) -> usize {
        match self {
            ScalarType::U8 | ScalarType::I8 => 1,
            ScalarType::U16 | ScalarType::I16 => 2,
            ScalarType::U32 | ScalarType::I32 | ScalarType::F32 => 4,
            ScalarType::F64 => 8,
        }
    }

    /// Integer pixel type for a DICOM `BitsAllocated`/`PixelRepresentation`
    /// pair.
    pub fn from_dicom(bits_allocated: u16, signed: bool) -> Option<Self> {
        match (bits_allocated, signed) {
            (8, false) => Some(ScalarType::U8),
            (8, true) => Some(ScalarType::I8),
            (16, false) => Some(ScalarType::U16),
            (16, true) => Some(ScalarType::I16),
            (32, false) => Some(ScalarType::U32),
            (32, true) => Some(ScalarType::I32),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::U8 => "uint8",
            ScalarType::I8 => "int8",
            ScalarType::U16 => "uint16",
            ScalarType::I16 => "int16",
            ScalarType::U32 => "uint32",
            ScalarType::I32 => "int32",
            ScalarType::F32 => "float",
            ScalarType::F64 => "double",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ScalarType {
    type Err = DatasetError;

    /// Accepts the NRRD spellings of each type.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let scalar = match value.trim() {
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => ScalarType::U8,
            "signed char" | "int8" | "int8_t" => ScalarType::I8,
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                ScalarType::U16
            }
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                ScalarType::I16
            }
            "uint" | "unsigned int" | "uint32" | "uint32_t" => ScalarType::U32,
            "int" | "signed int" | "int32" | "int32_t" => ScalarType::I32,
            "float" => ScalarType::F32,
            "double" => ScalarType::F64,
            other => {
                return Err(DatasetError::Decode {
                    filename: String::new(),
                    reason: format!("unsupported scalar type {other}"),
                });
            }
        };
        Ok(scalar)
    }
}

/// Regular 3D grid of scalars, x fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub dimensions: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub scalar_type: ScalarType,
    pub scalars: Vec<u8>,
}

impl ImageData {
    /// `None` when the grid size does not fit in `usize`.
    pub fn voxel_count(&self) -> Option<usize> {
        self.dimensions
            .iter()
            .try_fold(1usize, |count, axis| count.checked_mul(*axis))
    }

    pub fn expected_len(&self) -> Option<usize> {
        self.voxel_count()?.checked_mul(self.scalar_type.byte_size())
    }
}

/// Triangle surface.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolyData {
    pub points: Vec<[f32; 3]>,
    pub triangles: Vec<[u32; 3]>,
}
