use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::data::PolyData;
use crate::domain::DatasetId;
use crate::events::{Listener, Notifier};

#[derive(Debug, Default)]
struct ModelIndex {
    id_list: Vec<DatasetId>,
    data: HashMap<DatasetId, Arc<PolyData>>,
    names: HashMap<DatasetId, String>,
}

/// Owns decoded surface models. Ids are `model-N` and never reused.
#[derive(Debug, Default)]
pub struct ModelStore {
    index: Mutex<ModelIndex>,
    next_id: AtomicU64,
    deleted: Notifier<DatasetId>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model(&self, name: &str, model: PolyData) -> DatasetId {
        let id = DatasetId::new(format!(
            "model-{}",
            self.next_id.fetch_add(1, Ordering::Relaxed) + 1
        ));
        let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
        index.id_list.push(id.clone());
        index.data.insert(id.clone(), Arc::new(model));
        index.names.insert(id.clone(), name.to_string());
        debug!(%id, name, "registered model");
        id
    }

    pub fn get(&self, id: &DatasetId) -> Option<Arc<PolyData>> {
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

    pub fn id_list(&self) -> Vec<DatasetId> {
        self.index
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id_list
            .clone()
    }

    pub fn delete_data(&self, id: &DatasetId) -> bool {
        {
            let mut index = self.index.lock().unwrap_or_else(PoisonError::into_inner);
            if index.data.remove(id).is_none() {
                return false;
            }
            index.names.remove(id);
            index.id_list.retain(|existing| existing != id);
        }
        debug!(%id, "deleted model");
        self.deleted.emit(id);
        true
    }

    pub fn subscribe_deleted(&self, listener: Listener<DatasetId>) {
        self.deleted.subscribe(listener);
    }
}
