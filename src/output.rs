use std::io::{self, Write};

use serde::Serialize;

use crate::datasets::RestoredSession;
use crate::domain::{DataSelection, LoadResult};
use crate::session::Manifest;
use crate::stores::Message;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub results: Vec<LoadResult>,
    pub primary_selection: Option<DataSelection>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    #[serde(flatten)]
    pub restored: RestoredSession,
    pub messages: Vec<Message>,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_load(report: &LoadReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_manifest(manifest: &Manifest) -> io::Result<()> {
        Self::print_json(manifest)
    }

    pub fn print_restore(report: &RestoreReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
