pub mod archive;
pub mod classify;
pub mod config;
pub mod data;
pub mod datasets;
pub mod dicom;
pub mod domain;
pub mod error;
pub mod events;
pub mod fs_util;
pub mod output;
pub mod readers;
pub mod session;
pub mod stores;
