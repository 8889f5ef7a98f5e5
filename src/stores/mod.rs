//! Type stores that own decoded datasets, plus the small side stores the
//! dataset store coordinates with.

pub mod dicom;
pub mod files;
pub mod images;
pub mod messages;
pub mod models;

pub use dicom::{DicomCollator, DicomStore};
pub use files::FileStore;
pub use images::ImageStore;
pub use messages::{Message, MessageStore};
pub use models::ModelStore;
