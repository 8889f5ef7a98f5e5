mod common;

use std::collections::HashSet;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use common::{SERIES_A, SliceSpec, dicom_file, nrrd_bytes, nrrd_file, stl_file};
use medview_datasets::config::StoreConfig;
use medview_datasets::datasets::DatasetStore;
use medview_datasets::domain::{DataSelection, DatasetType, FileLoadResult, LoadResult, SourceFile};
use medview_datasets::error::DatasetError;
use medview_datasets::session::{DataSetEntry, DataSetType, MANIFEST_PATH, StateFile};
use medview_datasets::stores::DicomStore;

fn store() -> DatasetStore<medview_datasets::stores::DicomCollator> {
    DatasetStore::in_memory(&StoreConfig::default())
}

async fn populated(select_volume: bool) -> (DatasetStore<medview_datasets::stores::DicomCollator>, Vec<LoadResult>) {
    let store = store();
    let results = store
        .load_files(vec![
            dicom_file("a.dcm", &SliceSpec::new(SERIES_A, "1.1", 1)),
            dicom_file("b.dcm", &SliceSpec::new(SERIES_A, "1.2", 2)),
            nrrd_file("ct.nrrd"),
            stl_file("mesh.stl"),
        ])
        .await
        .unwrap();
    let selection = if select_volume {
        results[0].to_selection()
    } else {
        results[1].to_selection()
    };
    store.set_primary_selection(selection).await;
    (store, results)
}

#[tokio::test]
async fn serialize_writes_entries_and_tagged_selection() {
    let (store, _) = populated(true).await;
    let mut state = StateFile::new();
    store.serialize(&mut state).await.unwrap();

    let kinds = state
        .manifest
        .data_sets
        .iter()
        .map(|entry| entry.kind)
        .collect::<Vec<_>>();
    // The built volume image is persisted as slices, not again as NRRD.
    assert_eq!(kinds, [DataSetType::Dicom, DataSetType::Image]);
    assert_eq!(state.manifest.primary_selection.as_deref(), Some("volume-1"));
    assert_eq!(state.manifest.primary_selection_type, Some(DataSetType::Dicom));

    let paths = state.file_paths().collect::<Vec<_>>();
    assert!(paths.contains(&"dicom/volume-1/0000-a.dcm"));
    assert!(paths.iter().any(|path| path.starts_with("data/image-") && path.ends_with("ct.nrrd")));
}

#[tokio::test]
async fn image_and_volume_round_trip_through_a_zip() {
    for select_volume in [true, false] {
        let (store, _) = populated(select_volume).await;
        let original = store.primary_selection().unwrap();
        let mut state = StateFile::new();
        store.serialize(&mut state).await.unwrap();
        let bytes = state.to_zip_bytes().unwrap();

        let reopened = StateFile::from_zip_bytes(&bytes).unwrap();
        let fresh = self::store();
        let restored = fresh.restore(&reopened).await.unwrap();

        assert_eq!(restored.results.len(), 2);
        assert!(restored.results.iter().all(LoadResult::is_loaded));
        let selection = restored.primary_selection.unwrap();
        assert_eq!(fresh.primary_selection(), Some(selection.clone()));
        assert_eq!(
            std::mem::discriminant(&selection),
            std::mem::discriminant(&original)
        );
        assert!(fresh.primary_dataset().is_some());
        assert_eq!(fresh.dicom().volume_keys().len(), 1);
    }
}

#[tokio::test]
async fn restored_image_keeps_its_voxels() {
    let (store, results) = populated(false).await;
    let LoadResult::File(FileLoadResult::Loaded { data_id, .. }) = &results[1] else {
        panic!("ct.nrrd did not load");
    };
    let before = store.images().get(data_id).unwrap();

    let mut state = StateFile::new();
    store.serialize(&mut state).await.unwrap();
    let fresh = self::store();
    fresh.restore(&state).await.unwrap();

    let after = fresh.primary_dataset().unwrap();
    assert_eq!(after.dimensions, before.dimensions);
    assert_eq!(after.spacing, before.spacing);
    assert_eq!(after.scalars, before.scalars);
}

#[tokio::test]
async fn legacy_untagged_selection_is_resolved() {
    let (store, _) = populated(false).await;
    let mut state = StateFile::new();
    store.serialize(&mut state).await.unwrap();
    state.manifest.primary_selection_type = None;

    let fresh = self::store();
    let restored = fresh.restore(&state).await.unwrap();

    assert_matches!(restored.primary_selection, Some(DataSelection::Image { .. }));
}

#[tokio::test]
async fn image_entry_with_two_files_is_rejected_without_mutation() {
    let store = store();
    let entry = DataSetEntry {
        id: "image-1".to_string(),
        name: "ct.nrrd".to_string(),
        path: "data/image-1/".to_string(),
        kind: DataSetType::Image,
    };
    let files = vec![
        SourceFile::new("ct.nrrd", nrrd_bytes()),
        SourceFile::new("extra.nrrd", nrrd_bytes()),
    ];

    let err = store.deserialize(&entry, files).await.unwrap_err();

    assert_matches!(err, DatasetError::InvalidStateFile(_));
    assert!(store.images().id_list().is_empty());
}

#[tokio::test]
async fn image_entry_deserializes_to_a_file_result() {
    let store = store();
    let entry = DataSetEntry {
        id: "image-9".to_string(),
        name: "ct.nrrd".to_string(),
        path: "data/image-9/".to_string(),
        kind: DataSetType::Image,
    };
    let result = store
        .deserialize(&entry, vec![SourceFile::new("ct.nrrd", nrrd_bytes())])
        .await
        .unwrap();

    assert_matches!(
        result,
        LoadResult::File(FileLoadResult::Loaded { data_type: DatasetType::Image, .. })
    );
    assert_eq!(store.images().id_list().len(), 1);
}

#[tokio::test]
async fn session_file_round_trips_on_disk() {
    let (store, _) = populated(true).await;
    let mut state = StateFile::new();
    store.serialize(&mut state).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(dir.path().join("session.zip")).unwrap();
    state.save(&path).unwrap();
    let reopened = StateFile::open(&path).unwrap();

    assert_eq!(reopened.manifest, state.manifest);
    let original = state.file_paths().collect::<HashSet<_>>();
    let read_back = reopened.file_paths().collect::<HashSet<_>>();
    assert_eq!(original, read_back);
}

#[test]
fn archive_without_manifest_is_invalid() {
    let bytes = common::zip_bytes(vec![("data/image-1/ct.nrrd", nrrd_bytes())]);
    let err = StateFile::from_zip_bytes(&bytes).unwrap_err();
    assert_matches!(err, DatasetError::InvalidStateFile(message) if message.contains(MANIFEST_PATH));
}

#[test]
fn manifest_uses_camel_case_fields() {
    let mut state = StateFile::new();
    state.manifest.set_primary_selection(Some(&DataSelection::image(
        medview_datasets::domain::DatasetId::new("image-3"),
    )));
    let json = serde_json::to_value(&state.manifest).unwrap();

    assert_eq!(json["version"], "1.0.0");
    assert_eq!(json["primarySelection"], "image-3");
    assert_eq!(json["primarySelectionType"], "image");
    assert!(json["dataSets"].as_array().unwrap().is_empty());
}

#[test]
fn oversized_session_member_is_rejected() {
    let bytes = common::zip_bytes(vec![
        (MANIFEST_PATH, br#"{ "version": "1.0.0" }"#.to_vec()),
        ("data/image-1/ct.nrrd", vec![0u8; 4096]),
    ]);

    let err = StateFile::read_zip_limited(std::io::Cursor::new(bytes), 1024).unwrap_err();

    assert_matches!(err, DatasetError::ArchiveTooLarge { limit: 1024, .. });
}
