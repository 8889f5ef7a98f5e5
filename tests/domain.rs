use medview_datasets::domain::{
    DataSelection, DatasetId, DatasetType, LoadResult, SourceFile, VolumeKey, selection_equals,
};

#[test]
fn selection_equality_requires_matching_variant_and_key() {
    let image = DataSelection::image(DatasetId::new("image-1"));
    let same_image = DataSelection::image(DatasetId::new("image-1"));
    let other_image = DataSelection::image(DatasetId::new("image-2"));
    let colliding_volume = DataSelection::dicom(VolumeKey::new("image-1"));

    assert!(selection_equals(&image, &image));
    assert!(selection_equals(&image, &same_image));
    assert!(selection_equals(&same_image, &image));
    assert!(!selection_equals(&image, &other_image));
    assert!(!selection_equals(&image, &colliding_volume));
    assert!(!selection_equals(&colliding_volume, &image));
}

#[test]
fn selection_serializes_with_a_type_tag() {
    let dicom = serde_json::to_value(DataSelection::dicom(VolumeKey::new("volume-2"))).unwrap();
    assert_eq!(dicom["type"], "dicom");
    assert_eq!(dicom["volumeKey"], "volume-2");

    let image: DataSelection =
        serde_json::from_str(r#"{ "type": "image", "dataID": "image-4" }"#).unwrap();
    assert_eq!(image, DataSelection::image(DatasetId::new("image-4")));
}

#[test]
fn load_results_convert_to_selections() {
    let volume = LoadResult::dicom_loaded(VolumeKey::new("volume-1"));
    let image = LoadResult::file_loaded("ct.nrrd", DatasetId::new("image-1"), DatasetType::Image);
    let model = LoadResult::file_loaded("mesh.stl", DatasetId::new("model-1"), DatasetType::Model);
    let failed = LoadResult::file_failed("x.bin", "No reader for x.bin (kind unknown)");
    let dicom_failed = LoadResult::dicom_failed("bad slice");

    assert_eq!(
        volume.to_selection(),
        Some(DataSelection::dicom(VolumeKey::new("volume-1")))
    );
    assert_eq!(
        image.to_selection(),
        Some(DataSelection::image(DatasetId::new("image-1")))
    );
    assert_eq!(model.to_selection(), None);
    assert_eq!(failed.to_selection(), None);
    assert_eq!(dicom_failed.to_selection(), None);
    assert!(!failed.is_loaded() && !dicom_failed.is_loaded());
}

#[test]
fn load_result_json_carries_type_and_status() {
    let json = serde_json::to_value(LoadResult::file_failed("x.bin", "boom")).unwrap();
    assert_eq!(json["type"], "file");
    assert_eq!(json["status"], "failed");
    assert_eq!(json["filename"], "x.bin");
    assert_eq!(json["reason"], "boom");
}

#[test]
fn extension_is_lowercased_last_segment() {
    assert_eq!(
        SourceFile::new("scan.NRRD.GZ", Vec::<u8>::new()).extension().as_deref(),
        Some("gz")
    );
    assert_eq!(SourceFile::new("README", Vec::<u8>::new()).extension(), None);
}
