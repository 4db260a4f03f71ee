use super::*;
use crate::error::ErrorCode;

#[test]
fn test_embedded_manifest_parses() {
    let manifest = embedded_manifest().unwrap();
    assert_eq!(manifest.num_models, 1);

    let model = manifest.model(0).unwrap();
    assert_eq!(model.name, "train_100_1_rank_0");
    assert_eq!(model.model_type, "PME");
    assert_eq!(
        model.feature_functions,
        vec![
            "PositiveZeroCrossings",
            "NegativeZeroCrossings",
            "GlobalPeaktoPeakofLowFrequency"
        ]
    );
    assert!(manifest.model(1).is_none());
}

#[test]
fn test_class_labels_in_id_order() {
    let info = ModelInfo::embedded().unwrap();
    assert_eq!(
        info.labels,
        vec!["Unknown", "off", "shaking", "speed_1", "speed_2", "speed_3", "tapping"]
    );
    assert_eq!(info.num_classes(), 7);
    assert_eq!(info.label(ClassId(6)), Some("tapping"));
    assert_eq!(info.label(ClassId::UNKNOWN), Some("Unknown"));
    assert_eq!(info.label(ClassId(7)), None);
}

#[test]
fn test_uuid_string_groups() {
    let mut info = ModelInfo::embedded().unwrap();
    info.uuid = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ];
    assert_eq!(info.uuid_string(), "00112233-44556677-8899aabb-ccddeeff");
}

#[test]
fn test_model_count_mismatch_rejected() {
    let json = r#"{"NumModels":2,"ModelIndexes":{},"ModelDescriptions":[]}"#;
    let err = KnowledgePackManifest::from_json(json).unwrap_err();
    assert!(matches!(err, ClassifierError::ModelInvalid { .. }));
}

#[test]
fn test_index_to_unknown_model_rejected() {
    let json = r#"{"NumModels":0,"ModelIndexes":{"0":"ghost"},"ModelDescriptions":[]}"#;
    let err = KnowledgePackManifest::from_json(json).unwrap_err();
    assert!(err.message().contains("ghost"));
}

#[test]
fn test_malformed_json_rejected() {
    let err = KnowledgePackManifest::from_json("{not json").unwrap_err();
    assert!(matches!(err, ClassifierError::ModelInvalid { .. }));
}

#[test]
fn test_class_map_gap_rejected() {
    let description = ModelDescription {
        name: "gappy".to_string(),
        class_maps: [("0", "Unknown"), ("2", "shaking")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        model_type: "PME".to_string(),
        feature_functions: vec![],
    };
    assert!(description.class_labels().is_err());
}

#[test]
fn test_class_id_serializes_as_number() {
    assert_eq!(serde_json::to_string(&ClassId(4)).unwrap(), "4");
    let id: ClassId = serde_json::from_str("3").unwrap();
    assert_eq!(id, ClassId(3));
}
