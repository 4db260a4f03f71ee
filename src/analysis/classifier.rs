// Classifier - knowledge-pack contract and model metadata
//
// A knowledge pack turns frames into class ids. It keeps its own feature
// window, so most frames produce no decision; a decision is reported only
// when the pack's segmenter completes a window.
//
// Model metadata ships as a JSON manifest next to the pack:
//
//   {"NumModels":1,
//    "ModelIndexes":{"0":"train_100_1_rank_0"},
//    "ModelDescriptions":[{"Name":..., "ClassMaps":{"0":"Unknown",...},
//                          "ModelType":"PME", "FeatureFunctions":[...]}]}

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::capture::SampleFrame;
use crate::error::ClassifierError;

/// Class id reported by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub u8);

impl ClassId {
    /// Id the fan-condition pack reserves for "no known pattern".
    pub const UNKNOWN: ClassId = ClassId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Frame-in, verdict-out classifier.
///
/// `classify` runs on the loop for every drained frame and must not
/// allocate; all buffers are set up in `init`.
pub trait Classifier: Send {
    fn init(&mut self) -> Result<(), ClassifierError>;

    /// Feed one frame. `None` means no decision for this frame.
    fn classify(&mut self, frame: &SampleFrame) -> Option<ClassId>;

    fn model(&self) -> &ModelInfo;

    /// Feature vector behind the most recent decision (reporting only).
    fn feature_vector(&self) -> &[u8];
}

/// Embedded manifest of the fan-condition knowledge pack.
pub const EMBEDDED_MODEL_JSON: &str = r#"{"NumModels":1,"ModelIndexes":{"0":"train_100_1_rank_0"},"ModelDescriptions":[{"Name":"train_100_1_rank_0","ClassMaps":{"1":"off","2":"shaking","3":"speed_1","4":"speed_2","5":"speed_3","6":"tapping","0":"Unknown"},"ModelType":"PME","FeatureFunctions":["PositiveZeroCrossings","NegativeZeroCrossings","GlobalPeaktoPeakofLowFrequency"]}]}"#;

/// Build identifier of the embedded pack.
pub const EMBEDDED_MODEL_UUID: [u8; 16] = [
    0x5f, 0x3a, 0x91, 0xc2, 0x0b, 0x7e, 0x44, 0xd1, 0x8a, 0x26, 0xe9, 0x13, 0x6c, 0xf0, 0x52, 0xb8,
];

static EMBEDDED_MANIFEST: Lazy<Result<KnowledgePackManifest, ClassifierError>> =
    Lazy::new(|| KnowledgePackManifest::from_json(EMBEDDED_MODEL_JSON));

/// Parsed form of the embedded manifest.
pub fn embedded_manifest() -> Result<&'static KnowledgePackManifest, ClassifierError> {
    EMBEDDED_MANIFEST.as_ref().map_err(Clone::clone)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KnowledgePackManifest {
    pub num_models: usize,
    pub model_indexes: BTreeMap<String, String>,
    pub model_descriptions: Vec<ModelDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModelDescription {
    pub name: String,
    pub class_maps: BTreeMap<String, String>,
    pub model_type: String,
    pub feature_functions: Vec<String>,
}

impl KnowledgePackManifest {
    /// Parse and cross-check a manifest.
    ///
    /// # Errors
    /// [`ClassifierError::ModelInvalid`] when the JSON is malformed, the
    /// model count disagrees with the descriptions, or an index names a
    /// model that is not described.
    pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
        let manifest: KnowledgePackManifest = serde_json::from_str(json)?;

        if manifest.num_models != manifest.model_descriptions.len() {
            return Err(ClassifierError::ModelInvalid {
                reason: format!(
                    "NumModels is {} but {} descriptions present",
                    manifest.num_models,
                    manifest.model_descriptions.len()
                ),
            });
        }

        for (index, name) in &manifest.model_indexes {
            if index.parse::<u16>().is_err() {
                return Err(ClassifierError::ModelInvalid {
                    reason: format!("model index '{}' is not a number", index),
                });
            }
            if !manifest.model_descriptions.iter().any(|d| &d.name == name) {
                return Err(ClassifierError::ModelInvalid {
                    reason: format!("model index {} names undescribed model '{}'", index, name),
                });
            }
        }

        Ok(manifest)
    }

    /// Description of the model registered under `index`.
    pub fn model(&self, index: u16) -> Option<&ModelDescription> {
        let name = self.model_indexes.get(&index.to_string())?;
        self.model_descriptions.iter().find(|d| &d.name == name)
    }
}

impl ModelDescription {
    /// Class labels indexed by class id.
    ///
    /// # Errors
    /// The class map must cover ids `0..n` without gaps.
    pub fn class_labels(&self) -> Result<Vec<String>, ClassifierError> {
        let mut by_id: BTreeMap<u8, &String> = BTreeMap::new();
        for (key, label) in &self.class_maps {
            let id = key.parse::<u8>().map_err(|_| ClassifierError::ModelInvalid {
                reason: format!("class id '{}' is not a number", key),
            })?;
            by_id.insert(id, label);
        }

        by_id
            .into_iter()
            .enumerate()
            .map(|(expected, (id, label))| {
                if id as usize == expected {
                    Ok(label.clone())
                } else {
                    Err(ClassifierError::ModelInvalid {
                        reason: format!("class map has a gap before id {}", id),
                    })
                }
            })
            .collect()
    }
}

/// Identity of the loaded model, as reported at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub index: u16,
    pub name: String,
    pub model_type: String,
    pub uuid: [u8; 16],
    pub labels: Vec<String>,
    pub feature_functions: Vec<String>,
}

impl ModelInfo {
    pub fn from_description(
        index: u16,
        description: &ModelDescription,
        uuid: [u8; 16],
    ) -> Result<Self, ClassifierError> {
        Ok(Self {
            index,
            name: description.name.clone(),
            model_type: description.model_type.clone(),
            uuid,
            labels: description.class_labels()?,
            feature_functions: description.feature_functions.clone(),
        })
    }

    /// Model 0 of the embedded manifest.
    pub fn embedded() -> Result<Self, ClassifierError> {
        let manifest = embedded_manifest()?;
        let description = manifest.model(0).ok_or_else(|| ClassifierError::ModelInvalid {
            reason: "embedded manifest has no model 0".to_string(),
        })?;
        Self::from_description(0, description, EMBEDDED_MODEL_UUID)
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn label(&self, class: ClassId) -> Option<&str> {
        self.labels.get(class.index()).map(String::as_str)
    }

    /// UUID as four groups of eight hex digits, e.g.
    /// `5f3a91c2-0b7e44d1-8a26e913-6cf052b8`.
    pub fn uuid_string(&self) -> String {
        let mut out = String::with_capacity(35);
        for (i, byte) in self.uuid.iter().enumerate() {
            if i > 0 && i % 4 == 0 {
                out.push('-');
            }
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

#[cfg(test)]
#[path = "classifier_tests.rs"]
mod tests;
