//! The dataset store: ingestion, primary selection, deletion watching, and
//! session persistence across the per-kind stores.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::ArchiveExpander;
use crate::classify::retype_all;
use crate::config::StoreConfig;
use crate::data::ImageData;
use crate::domain::{
    ClassifiedFile, DataSelection, DatasetId, DatasetType, FileKind, LoadResult, SourceFile,
    VolumeKey,
};
use crate::error::DatasetError;
use crate::events::{Listener, Notifier};
use crate::readers::{Reader, ReaderRegistry};
use crate::session::{DataSetEntry, DataSetType, StateFile};
use crate::stores::{DicomCollator, DicomStore, FileStore, ImageStore, MessageStore, ModelStore};

pub const VOLUME_BUILD_FAILED: &str = "Failed to build volume(s)";

/// Outcome of restoring a session archive.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredSession {
    pub results: Vec<LoadResult>,
    pub primary_selection: Option<DataSelection>,
}

pub struct DatasetStore<D: DicomStore> {
    images: Arc<ImageStore>,
    models: Arc<ModelStore>,
    dicom: Arc<D>,
    files: Arc<FileStore>,
    messages: Arc<MessageStore>,
    readers: ReaderRegistry,
    expander: ArchiveExpander,
    primary_selection: Arc<Mutex<Option<DataSelection>>>,
    selection_changed: Arc<Notifier<Option<DataSelection>>>,
}

impl DatasetStore<DicomCollator> {
    /// A store wired to fresh in-process stores and the built-in readers.
    pub fn in_memory(config: &StoreConfig) -> Self {
        let images = Arc::new(ImageStore::new());
        let dicom = Arc::new(DicomCollator::new(Arc::clone(&images)));
        Self::new(
            images,
            Arc::new(ModelStore::new()),
            dicom,
            Arc::new(FileStore::default()),
            Arc::new(MessageStore::default()),
            ReaderRegistry::default(),
            config,
        )
    }
}

impl<D: DicomStore> DatasetStore<D> {
    pub fn new(
        images: Arc<ImageStore>,
        models: Arc<ModelStore>,
        dicom: Arc<D>,
        files: Arc<FileStore>,
        messages: Arc<MessageStore>,
        readers: ReaderRegistry,
        config: &StoreConfig,
    ) -> Self {
        let store = Self {
            images,
            models,
            dicom,
            files,
            messages,
            readers,
            expander: ArchiveExpander::new(config.archive),
            primary_selection: Arc::new(Mutex::new(None)),
            selection_changed: Arc::new(Notifier::default()),
        };
        store.watch_deletions();
        store
    }

    pub fn images(&self) -> &Arc<ImageStore> {
        &self.images
    }

    pub fn models(&self) -> &Arc<ModelStore> {
        &self.models
    }

    pub fn dicom(&self) -> &Arc<D> {
        &self.dicom
    }

    pub fn files(&self) -> &Arc<FileStore> {
        &self.files
    }

    pub fn messages(&self) -> &Arc<MessageStore> {
        &self.messages
    }

    pub fn primary_selection(&self) -> Option<DataSelection> {
        self.primary_selection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Called with the new value every time the primary selection changes,
    /// including when a deletion clears it.
    pub fn subscribe_selection(&self, listener: Listener<Option<DataSelection>>) {
        self.selection_changed.subscribe(listener);
    }

    /// The image behind the primary selection; `None` for a DICOM volume that
    /// has not been built yet.
    pub fn primary_dataset(&self) -> Option<Arc<ImageData>> {
        resolve_primary_dataset(
            self.primary_selection().as_ref(),
            |key| self.dicom.volume_to_image_id(key),
            |id| self.images.get(id),
        )
    }

    pub fn all_data_ids(&self) -> Vec<DatasetId> {
        let mut ids = self.images.id_list();
        ids.extend(self.models.id_list());
        ids
    }

    /// Sets the selection, then builds the volume for DICOM selections. A
    /// failed build is reported on the message channel and leaves the
    /// selection in place.
    pub async fn set_primary_selection(&self, selection: Option<DataSelection>) {
        replace_selection(&self.primary_selection, &self.selection_changed, selection.clone());

        let Some(DataSelection::Dicom { volume_key }) = selection else {
            return;
        };
        if let Err(err) = self.dicom.build_volume(&volume_key).await {
            warn!(%volume_key, error = %err, "volume build failed");
            self.messages.report_error(
                VOLUME_BUILD_FAILED,
                Some(format!("{err}. More details can be found in the log.")),
            );
        }
    }

    /// Classifies, expands, and decodes a batch.
    ///
    /// DICOM results come first, then one result per remaining file in input
    /// order. Only archive failures fail the whole call.
    pub async fn load_files(&self, files: Vec<SourceFile>) -> Result<Vec<LoadResult>, DatasetError> {
        let entries = self.expander.expand(retype_all(files))?;

        let (dicoms, others): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|entry| entry.kind == FileKind::Dicom);
        let dicom_files = dicoms.into_iter().map(|entry| entry.file).collect::<Vec<_>>();
        debug!(
            dicom = dicom_files.len(),
            other = others.len(),
            "dispatching batch"
        );

        let dicom_status = self.import_dicom(dicom_files);
        let other_status = join_all(others.into_iter().map(|entry| self.load_one(entry)));
        let (mut results, other_results) = futures::join!(dicom_status, other_status);

        results.extend(other_results);
        info!(
            results = results.len(),
            loaded = results.iter().filter(|result| result.is_loaded()).count(),
            "loaded files"
        );
        Ok(results)
    }

    pub async fn serialize(&self, state: &mut StateFile) -> Result<(), DatasetError> {
        self.dicom.serialize(state).await?;
        let built: HashSet<DatasetId> = self.dicom.built_image_ids().into_iter().collect();
        self.images.serialize(state, &built);

        if let Some(selection) = self.primary_selection() {
            state.manifest.set_primary_selection(Some(&selection));
        }
        Ok(())
    }

    /// Loads one session entry. An image entry must carry exactly one file;
    /// anything else is an invalid state file and leaves the stores untouched.
    pub async fn deserialize(
        &self,
        entry: &DataSetEntry,
        files: Vec<SourceFile>,
    ) -> Result<LoadResult, DatasetError> {
        match entry.kind {
            DataSetType::Dicom => Ok(match self.dicom.deserialize(entry, files).await {
                Ok(volume_key) => LoadResult::dicom_loaded(volume_key),
                Err(err) => LoadResult::dicom_failed(err.to_string()),
            }),
            DataSetType::Image => {
                let [file] = <[SourceFile; 1]>::try_from(files).map_err(|files| {
                    DatasetError::InvalidStateFile(format!(
                        "image entry {} has {} files, expected exactly one",
                        entry.id,
                        files.len()
                    ))
                })?;
                Ok(match self.images.deserialize(entry, &file) {
                    Ok(data_id) => LoadResult::file_loaded(&file.name, data_id, DatasetType::Image),
                    Err(err) => LoadResult::file_failed(
                        &file.name,
                        format!("Reading {} gave an error: {err}", file.name),
                    ),
                })
            }
        }
    }

    /// Deserializes every entry of a session archive and restores its primary
    /// selection against the newly allocated ids.
    pub async fn restore(&self, state: &StateFile) -> Result<RestoredSession, DatasetError> {
        let mut results = Vec::with_capacity(state.manifest.data_sets.len());
        let mut restored = HashMap::new();
        for entry in &state.manifest.data_sets {
            let result = self.deserialize(entry, state.files_for(entry)).await?;
            restored.insert((entry.kind, entry.id.clone()), result.clone());
            results.push(result);
        }

        let selection = state.manifest.primary_selection.as_deref().and_then(|persisted| {
            let lookup = |kind: DataSetType| {
                restored
                    .get(&(kind, persisted.to_string()))
                    .and_then(LoadResult::to_selection)
            };
            match state.manifest.primary_selection_type {
                Some(kind) => lookup(kind),
                None => lookup(DataSetType::Image).or_else(|| lookup(DataSetType::Dicom)),
            }
        });
        if selection.is_some() {
            self.set_primary_selection(selection.clone()).await;
        }
        info!(entries = results.len(), "restored session");

        Ok(RestoredSession {
            results,
            primary_selection: selection,
        })
    }

    async fn import_dicom(&self, files: Vec<SourceFile>) -> Vec<LoadResult> {
        if files.is_empty() {
            return Vec::new();
        }
        match self.dicom.import_files(files).await {
            Ok(keys) => keys.into_iter().map(LoadResult::dicom_loaded).collect(),
            Err(err) => {
                warn!(error = %err, "DICOM import failed");
                vec![LoadResult::dicom_failed(err.to_string())]
            }
        }
    }

    async fn load_one(&self, entry: ClassifiedFile) -> LoadResult {
        let ClassifiedFile { file, kind } = entry;
        let Some(reader) = self.readers.get(kind).cloned() else {
            let err = DatasetError::NoReader {
                filename: file.name.clone(),
                kind,
            };
            return LoadResult::file_failed(&file.name, err.to_string());
        };

        debug!(file = %file.name, %kind, produces = ?reader.produces(), "decoding file");
        // A panicking reader fails only its own file.
        let decoded = AssertUnwindSafe(self.decode(reader, &file))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(DatasetError::decode(&file.name, "reader panicked")));

        match decoded {
            Ok((data_id, data_type)) => {
                self.files.add(data_id.as_str(), vec![file.clone()]);
                LoadResult::file_loaded(&file.name, data_id, data_type)
            }
            Err(err) => {
                warn!(file = %file.name, error = %err, "failed to read file");
                LoadResult::file_failed(
                    &file.name,
                    format!("Reading {} gave an error: {err}", file.name),
                )
            }
        }
    }

    async fn decode(
        &self,
        reader: Reader,
        file: &SourceFile,
    ) -> Result<(DatasetId, DatasetType), DatasetError> {
        match reader {
            Reader::Image(reader) => {
                let image = reader.read(file).await?;
                Ok((self.images.add_image(&file.name, image), DatasetType::Image))
            }
            Reader::Model(reader) => {
                let model = reader.read(file).await?;
                Ok((self.models.add_model(&file.name, model), DatasetType::Model))
            }
        }
    }

    /// Installed once at construction. Handlers run inside the stores' delete
    /// calls, so the selection never dangles after a delete returns.
    fn watch_deletions(&self) {
        let selection = Arc::clone(&self.primary_selection);
        let changed = Arc::clone(&self.selection_changed);
        let files = Arc::clone(&self.files);
        self.images.subscribe_deleted(Arc::new(move |id: &DatasetId| {
            let cleared = clear_selection_if(&selection, &changed, |current| {
                matches!(current, DataSelection::Image { data_id } if data_id == id)
            });
            if cleared {
                info!(%id, "primary image deleted; cleared selection");
            }
            files.remove(id.as_str());
        }));

        let selection = Arc::clone(&self.primary_selection);
        let changed = Arc::clone(&self.selection_changed);
        let files = Arc::clone(&self.files);
        self.dicom.subscribe_deleted(Arc::new(move |volume_key: &VolumeKey| {
            let cleared = clear_selection_if(&selection, &changed, |current| {
                matches!(current, DataSelection::Dicom { volume_key: selected } if selected == volume_key)
            });
            if cleared {
                info!(%volume_key, "primary volume deleted; cleared selection");
            }
            files.remove(volume_key.as_str());
        }));

        let files = Arc::clone(&self.files);
        self.models.subscribe_deleted(Arc::new(move |id: &DatasetId| {
            files.remove(id.as_str());
        }));
    }
}

fn replace_selection(
    slot: &Mutex<Option<DataSelection>>,
    changed: &Notifier<Option<DataSelection>>,
    selection: Option<DataSelection>,
) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = selection.clone();
    changed.emit(&selection);
}

/// Clears the selection when `referenced` holds for it. The check and the
/// clear share one guard; listeners run after it is released.
fn clear_selection_if(
    slot: &Mutex<Option<DataSelection>>,
    changed: &Notifier<Option<DataSelection>>,
    referenced: impl FnOnce(&DataSelection) -> bool,
) -> bool {
    let cleared = {
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let hit = current.as_ref().is_some_and(referenced);
        if hit {
            *current = None;
        }
        hit
    };
    if cleared {
        changed.emit(&None);
    }
    cleared
}

/// Maps a selection to its dataset: images directly, DICOM volumes through
/// the volume index. Recomputed on every call; callers that cache the result
/// must invalidate it themselves.
pub fn resolve_primary_dataset<T>(
    selection: Option<&DataSelection>,
    volume_to_image_id: impl Fn(&VolumeKey) -> Option<DatasetId>,
    lookup: impl Fn(&DatasetId) -> Option<T>,
) -> Option<T> {
    match selection? {
        DataSelection::Image { data_id } => lookup(data_id),
        DataSelection::Dicom { volume_key } => lookup(&volume_to_image_id(volume_key)?),
    }
}
