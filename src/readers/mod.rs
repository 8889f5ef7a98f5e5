//! Per-kind decoders.
//!
//! Each reader states statically which store its output belongs to, so the
//! dispatcher routes decoded objects without inspecting them.

mod nrrd;
mod stl;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::data::{ImageData, PolyData};
use crate::domain::{DatasetType, FileKind, SourceFile};
use crate::error::DatasetError;

pub use nrrd::{NrrdReader, parse_nrrd, write_nrrd};
pub use stl::{StlReader, parse_stl};

#[async_trait]
pub trait ImageReader: Send + Sync {
    async fn read(&self, file: &SourceFile) -> Result<ImageData, DatasetError>;
}

#[async_trait]
pub trait ModelReader: Send + Sync {
    async fn read(&self, file: &SourceFile) -> Result<PolyData, DatasetError>;
}

#[derive(Clone)]
pub enum Reader {
    Image(Arc<dyn ImageReader>),
    Model(Arc<dyn ModelReader>),
}

impl Reader {
    pub fn produces(&self) -> DatasetType {
        match self {
            Reader::Image(_) => DatasetType::Image,
            Reader::Model(_) => DatasetType::Model,
        }
    }
}

#[derive(Clone)]
pub struct ReaderRegistry {
    readers: HashMap<FileKind, Reader>,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(FileKind::Nrrd, Reader::Image(Arc::new(NrrdReader)));
        registry.register(FileKind::Stl, Reader::Model(Arc::new(StlReader)));
        registry
    }
}

impl ReaderRegistry {
    pub fn empty() -> Self {
        Self {
            readers: HashMap::new(),
        }
    }

    /// Replaces any reader already registered for `kind`.
    pub fn register(&mut self, kind: FileKind, reader: Reader) {
        self.readers.insert(kind, reader);
    }

    pub fn get(&self, kind: FileKind) -> Option<&Reader> {
        self.readers.get(&kind)
    }
}
