use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::domain::SourceFile;

/// Source files behind each dataset id or volume key, kept for re-export.
#[derive(Debug, Default)]
pub struct FileStore {
    by_id: Mutex<HashMap<String, Vec<SourceFile>>>,
}

impl FileStore {
    pub fn add(&self, id: &str, files: Vec<SourceFile>) {
        self.by_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), files);
    }

    pub fn remove(&self, id: &str) -> Option<Vec<SourceFile>> {
        self.by_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    pub fn get(&self, id: &str) -> Vec<SourceFile> {
        self.by_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}
