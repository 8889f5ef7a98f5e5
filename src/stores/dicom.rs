use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::dicom::{DicomSlice, assemble_volume, parse_slice};
use crate::domain::{DatasetId, SourceFile, VolumeKey};
use crate::error::DatasetError;
use crate::events::{Listener, Notifier};
use crate::session::{DataSetEntry, DataSetType, StateFile};
use crate::stores::ImageStore;

/// DICOM import and volume building, addressed by volume key.
#[async_trait]
pub trait DicomStore: Send + Sync {
    /// Imports a batch of slice files. The batch fails as a unit; on success
    /// one key is returned per series found in it.
    async fn import_files(&self, files: Vec<SourceFile>) -> Result<Vec<VolumeKey>, DatasetError>;

    /// Builds the volume and registers it in the image store. Building an
    /// already built volume does nothing.
    async fn build_volume(&self, volume_key: &VolumeKey) -> Result<(), DatasetError>;

    fn volume_to_image_id(&self, volume_key: &VolumeKey) -> Option<DatasetId>;

    fn has_volume(&self, volume_key: &VolumeKey) -> bool;

    fn volume_keys(&self) -> Vec<VolumeKey>;

    /// Ids of images in the image store that were built from volumes.
    fn built_image_ids(&self) -> Vec<DatasetId>;

    /// Removes the volume (and its built image) and notifies subscribers
    /// before returning.
    fn delete_volume(&self, volume_key: &VolumeKey) -> bool;

    fn subscribe_deleted(&self, listener: Listener<VolumeKey>);

    async fn serialize(&self, state: &mut StateFile) -> Result<(), DatasetError>;

    async fn deserialize(
        &self,
        entry: &DataSetEntry,
        files: Vec<SourceFile>,
    ) -> Result<VolumeKey, DatasetError>;
}

#[derive(Debug)]
struct Volume {
    series_uid: String,
    description: Option<String>,
    slices: Vec<DicomSlice>,
    image_id: Option<DatasetId>,
}

#[derive(Debug, Default)]
struct CollatorState {
    order: Vec<VolumeKey>,
    volumes: HashMap<VolumeKey, Volume>,
    by_series: HashMap<String, VolumeKey>,
}

/// In-process [`DicomStore`]: groups slices by Series Instance UID and keys
/// each series as `volume-N`.
#[derive(Debug)]
pub struct DicomCollator {
    images: Arc<ImageStore>,
    state: Mutex<CollatorState>,
    next_key: AtomicU64,
    deleted: Notifier<VolumeKey>,
}

impl DicomCollator {
    pub fn new(images: Arc<ImageStore>) -> Self {
        Self {
            images,
            state: Mutex::new(CollatorState::default()),
            next_key: AtomicU64::new(0),
            deleted: Notifier::default(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CollatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn allocate_key(&self) -> VolumeKey {
        VolumeKey::new(format!(
            "volume-{}",
            self.next_key.fetch_add(1, Ordering::Relaxed) + 1
        ))
    }

    pub fn slice_count(&self, volume_key: &VolumeKey) -> usize {
        self.lock()
            .volumes
            .get(volume_key)
            .map_or(0, |volume| volume.slices.len())
    }
}

#[async_trait]
impl DicomStore for DicomCollator {
    async fn import_files(&self, files: Vec<SourceFile>) -> Result<Vec<VolumeKey>, DatasetError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let slices = files
            .iter()
            .map(parse_slice)
            .collect::<Result<Vec<_>, _>>()?;

        let mut keys: Vec<VolumeKey> = Vec::new();
        let mut stale_images = Vec::new();
        {
            let mut state = self.lock();
            for slice in slices {
                let existing = state.by_series.get(&slice.series_uid).cloned();
                let key = match existing {
                    Some(key) => key,
                    None => {
                        let key = self.allocate_key();
                        state.by_series.insert(slice.series_uid.clone(), key.clone());
                        state.order.push(key.clone());
                        state.volumes.insert(
                            key.clone(),
                            Volume {
                                series_uid: slice.series_uid.clone(),
                                description: slice.series_description.clone(),
                                slices: Vec::new(),
                                image_id: None,
                            },
                        );
                        key
                    }
                };

                if let Some(volume) = state.volumes.get_mut(&key) {
                    let duplicate = slice.sop_instance_uid.is_some()
                        && volume
                            .slices
                            .iter()
                            .any(|existing| existing.sop_instance_uid == slice.sop_instance_uid);
                    if !duplicate {
                        volume.slices.push(slice);
                        // New slices invalidate a previously built volume.
                        if let Some(image_id) = volume.image_id.take() {
                            stale_images.push(image_id);
                        }
                    }
                }
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }

        for image_id in stale_images {
            self.images.delete_data(&image_id);
        }
        info!(files = files.len(), volumes = keys.len(), "imported DICOM files");
        Ok(keys)
    }

    async fn build_volume(&self, volume_key: &VolumeKey) -> Result<(), DatasetError> {
        let (name, slices) = {
            let state = self.lock();
            let volume = state
                .volumes
                .get(volume_key)
                .ok_or_else(|| DatasetError::VolumeNotFound(volume_key.clone()))?;
            if volume.image_id.is_some() {
                return Ok(());
            }
            let name = volume
                .description
                .clone()
                .unwrap_or_else(|| volume.series_uid.clone());
            (name, volume.slices.clone())
        };

        let image = assemble_volume(&slices)?;
        let image_id = self.images.add_image(&name, image);

        let registered = {
            let mut state = self.lock();
            match state.volumes.get_mut(volume_key) {
                Some(volume) if volume.image_id.is_none() => {
                    volume.image_id = Some(image_id.clone());
                    true
                }
                _ => false,
            }
        };
        if !registered {
            // Deleted or built by someone else while assembling.
            self.images.delete_data(&image_id);
            return Ok(());
        }

        info!(%volume_key, %image_id, slices = slices.len(), "built DICOM volume");
        Ok(())
    }

    fn volume_to_image_id(&self, volume_key: &VolumeKey) -> Option<DatasetId> {
        self.lock()
            .volumes
            .get(volume_key)
            .and_then(|volume| volume.image_id.clone())
    }

    fn has_volume(&self, volume_key: &VolumeKey) -> bool {
        self.lock().volumes.contains_key(volume_key)
    }

    fn volume_keys(&self) -> Vec<VolumeKey> {
        self.lock().order.clone()
    }

    fn built_image_ids(&self) -> Vec<DatasetId> {
        self.lock()
            .volumes
            .values()
            .filter_map(|volume| volume.image_id.clone())
            .collect()
    }

    fn delete_volume(&self, volume_key: &VolumeKey) -> bool {
        let removed = {
            let mut state = self.lock();
            let Some(volume) = state.volumes.remove(volume_key) else {
                return false;
            };
            state.by_series.remove(&volume.series_uid);
            state.order.retain(|key| key != volume_key);
            volume
        };

        if let Some(image_id) = removed.image_id {
            self.images.delete_data(&image_id);
        }
        debug!(%volume_key, "deleted DICOM volume");
        self.deleted.emit(volume_key);
        true
    }

    fn subscribe_deleted(&self, listener: Listener<VolumeKey>) {
        self.deleted.subscribe(listener);
    }

    async fn serialize(&self, state: &mut StateFile) -> Result<(), DatasetError> {
        let volumes = {
            let collator = self.lock();
            collator
                .order
                .iter()
                .filter_map(|key| {
                    let volume = collator.volumes.get(key)?;
                    let name = volume
                        .description
                        .clone()
                        .unwrap_or_else(|| volume.series_uid.clone());
                    let files = volume
                        .slices
                        .iter()
                        .map(|slice| slice.source.clone())
                        .collect::<Vec<_>>();
                    Some((key.clone(), name, files))
                })
                .collect::<Vec<_>>()
        };

        for (key, name, files) in volumes {
            let path = format!("dicom/{key}/");
            for (index, file) in files.into_iter().enumerate() {
                let file_name = file.name.replace(['/', '\\'], "_");
                state.add_file(format!("{path}{index:04}-{file_name}"), file.bytes);
            }
            state.add_entry(DataSetEntry {
                id: key.to_string(),
                name,
                path,
                kind: DataSetType::Dicom,
            });
        }
        Ok(())
    }

    async fn deserialize(
        &self,
        entry: &DataSetEntry,
        files: Vec<SourceFile>,
    ) -> Result<VolumeKey, DatasetError> {
        let keys = self.import_files(files).await?;
        keys.into_iter().next().ok_or_else(|| {
            DatasetError::Dicom(format!("session entry {} contains no DICOM series", entry.id))
        })
    }
}
