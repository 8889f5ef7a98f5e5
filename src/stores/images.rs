use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::data::ImageData;
use crate::domain::{DatasetId, SourceFile};
use crate::error::DatasetError;
use crate::events::{Listener, Notifier};
use crate::readers::{parse_nrrd, write_nrrd};
use crate::session::{DataSetEntry, DataSetType, StateFile};

#[derive(Debug, Default)]
struct ImageIndex {
    id_list: Vec<DatasetId>,
    data: HashMap<DatasetId, Arc<ImageData>>,
    names: HashMap<DatasetId, String>,
}

/// Owns decoded images. Ids are `image-N` and never reused.
#[derive(Debug, Default)]
pub struct ImageStore {
    index: Mutex<ImageIndex>,
    next_id: AtomicU64,
    deleted: Notifier<DatasetId>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_image(&self, name: &str, image: ImageData) -> DatasetId {
        let id = DatasetId::new(format!(
            "image-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed) + 1
        ));
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index.id_list.push(id.clone());
        index.data.insert(id.clone(), Arc::new(image));
        index.names.insert(id.clone(), name.to_string());
        debug!(%id, name, "registered image");
        id
    }

    pub fn get(&self, id: &DatasetId) -> Option<Arc<ImageData>> {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .get(id)
            .cloned()
    }

    pub fn name(&self, id: &DatasetId) -> Option<String> {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &DatasetId) -> bool {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .contains_key(id)
    }

    pub fn id_list(&self) -> Vec<DatasetId> {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id_list
            .clone()
    }

    /// Removes the image and notifies subscribers before returning.
    pub fn delete_data(&self, id: &DatasetId) -> bool {
        {
            let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
            if index.data.remove(id).is_none() {
                return false;
            }
            index.names.remove(id);
            index.id_list.retain(|existing| existing != id);
        }
        debug!(%id, "deleted image");
        self.deleted.emit(id);
        true
    }

    pub fn subscribe_deleted(&self, listener: Listener<DatasetId>) {
        self.deleted.subscribe(listener);
    }

    /// Writes one NRRD entry per image, skipping ids in `skip` (images that
    /// another store persists in its own form).
    pub fn serialize(&self, state: &mut StateFile, skip: &HashSet<DatasetId>) {
        let images = {
            let index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
            index
                .id_list
                .iter()
                .filter(|id| !skip.contains(*id))
                .filter_map(|id| {
                    let data = index.data.get(id)?.clone();
                    let name = index.names.get(id).cloned().unwrap_or_else(|| id.to_string());
                    Some((id.clone(), name, data))
                })
                .collect::<Vec<_>>()
        };

        for (id, name, data) in images {
            let path = format!("data/{id}/");
            state.add_file(format!("{path}{}", nrrd_file_name(&name)), write_nrrd(&data));
            state.add_entry(DataSetEntry {
                id: id.to_string(),
                name,
                path,
                kind: DataSetType::Image,
            });
        }
    }

    pub fn deserialize(
        &self,
        entry: &DataSetEntry,
        file: &SourceFile,
    ) -> Result<DatasetId, DatasetError> {
        let image = parse_nrrd(&file.name, &file.bytes)?;
        Ok(self.add_image(&entry.name, image))
    }
}

fn nrrd_file_name(name: &str) -> String {
    let safe = name.replace(['/', '\\'], "_");
    if safe.to_ascii_lowercase().ends_with(".nrrd") {
        safe
    } else {
        format!("{safe}.nrrd")
    }
}
