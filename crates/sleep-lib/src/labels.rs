//! Label codec shared by training and serving
//!
//! Bidirectional mapping between class names and dense class indices. The
//! same codec instance encodes labels before fitting index-labelled
//! classifiers and decodes their outputs afterwards, so it is persisted next
//! to the models and never mutated.

use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NO_DISORDER: &str = "no_disorder";
pub const SLEEP_APNEA: &str = "sleep_apnea";
pub const INSOMNIA: &str = "insomnia";

/// Class name <-> index bijection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LabelMappings", into = "LabelMappings")]
pub struct LabelCodec {
    classes: Vec<String>,
}

/// Persisted form: forward and inverse dictionaries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelMappings {
    pub label_mapping: BTreeMap<String, usize>,
    pub inv_label_mapping: BTreeMap<usize, String>,
}

impl LabelCodec {
    /// Build a codec where `classes[i]` has index `i`
    pub fn new<S: Into<String>>(classes: impl IntoIterator<Item = S>) -> Result<Self> {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        if classes.is_empty() {
            return Err(ClassifierError::ArtifactConsistency(
                "label codec needs at least one class".to_string(),
            ));
        }
        for (i, name) in classes.iter().enumerate() {
            if classes[..i].contains(name) {
                return Err(ClassifierError::ArtifactConsistency(format!(
                    "duplicate class `{}` in label codec",
                    name
                )));
            }
        }
        Ok(Self { classes })
    }

    /// `no_disorder -> 0`, `sleep_apnea -> 1`, `insomnia -> 2`
    pub fn sleep_disorders() -> Self {
        Self {
            classes: vec![
                NO_DISORDER.to_string(),
                SLEEP_APNEA.to_string(),
                INSOMNIA.to_string(),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class names in index order
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.iter().any(|c| c == name)
    }

    pub fn encode(&self, name: &str) -> Result<usize> {
        self.classes
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| ClassifierError::UnknownClass(name.to_string()))
    }

    pub fn encode_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.encode(n.as_ref())).collect()
    }

    /// Decode a class index produced by a model.
    ///
    /// An out-of-range index means the model and the codec come from
    /// different training runs.
    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes.get(index).map(String::as_str).ok_or_else(|| {
            ClassifierError::ArtifactConsistency(format!(
                "class index {} outside label codec of {} classes",
                index,
                self.classes.len()
            ))
        })
    }
}

impl Default for LabelCodec {
    fn default() -> Self {
        Self::sleep_disorders()
    }
}

impl From<LabelCodec> for LabelMappings {
    fn from(codec: LabelCodec) -> Self {
        let label_mapping = codec
            .classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        let inv_label_mapping = codec.classes.into_iter().enumerate().collect();
        Self {
            label_mapping,
            inv_label_mapping,
        }
    }
}

impl TryFrom<LabelMappings> for LabelCodec {
    type Error = ClassifierError;

    fn try_from(mappings: LabelMappings) -> Result<Self> {
        let n = mappings.inv_label_mapping.len();
        if mappings.label_mapping.len() != n {
            return Err(ClassifierError::ArtifactConsistency(format!(
                "label mapping has {} entries, inverse mapping has {}",
                mappings.label_mapping.len(),
                n
            )));
        }

        // Indices must be dense 0..n and both directions must agree
        let mut classes = Vec::with_capacity(n);
        for (expected, (index, name)) in mappings.inv_label_mapping.into_iter().enumerate() {
            if index != expected {
                return Err(ClassifierError::ArtifactConsistency(format!(
                    "class indices are not dense: found {} at position {}",
                    index, expected
                )));
            }
            if mappings.label_mapping.get(&name) != Some(&index) {
                return Err(ClassifierError::ArtifactConsistency(format!(
                    "forward and inverse mappings disagree on `{}`",
                    name
                )));
            }
            classes.push(name);
        }

        LabelCodec::new(classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_classes() {
        let codec = LabelCodec::sleep_disorders();
        for name in [NO_DISORDER, SLEEP_APNEA, INSOMNIA] {
            let idx = codec.encode(name).unwrap();
            assert_eq!(codec.decode(idx).unwrap(), name);
        }
    }

    #[test]
    fn test_fixed_indices() {
        let codec = LabelCodec::sleep_disorders();
        assert_eq!(codec.encode(NO_DISORDER).unwrap(), 0);
        assert_eq!(codec.encode(SLEEP_APNEA).unwrap(), 1);
        assert_eq!(codec.encode(INSOMNIA).unwrap(), 2);
    }

    #[test]
    fn test_unknown_class() {
        let codec = LabelCodec::sleep_disorders();
        assert!(matches!(
            codec.encode("narcolepsy"),
            Err(ClassifierError::UnknownClass(_))
        ));
        assert!(matches!(
            codec.decode(3),
            Err(ClassifierError::ArtifactConsistency(_))
        ));
    }

    #[test]
    fn test_persisted_form() {
        let codec = LabelCodec::sleep_disorders();
        let json = serde_json::to_value(&codec).unwrap();
        assert_eq!(json["label_mapping"]["sleep_apnea"], 1);
        assert_eq!(json["inv_label_mapping"]["2"], "insomnia");

        let restored: LabelCodec = serde_json::from_value(json).unwrap();
        assert_eq!(restored, codec);
    }

    #[test]
    fn test_inconsistent_mappings_rejected() {
        let json = serde_json::json!({
            "label_mapping": {"no_disorder": 0, "sleep_apnea": 2},
            "inv_label_mapping": {"0": "no_disorder", "1": "sleep_apnea"}
        });
        assert!(serde_json::from_value::<LabelCodec>(json).is_err());

        let sparse = serde_json::json!({
            "label_mapping": {"no_disorder": 0, "insomnia": 2},
            "inv_label_mapping": {"0": "no_disorder", "2": "insomnia"}
        });
        assert!(serde_json::from_value::<LabelCodec>(sparse).is_err());
    }

    #[test]
    fn test_duplicate_classes_rejected() {
        assert!(LabelCodec::new(["a", "a"]).is_err());
        assert!(LabelCodec::new(Vec::<String>::new()).is_err());
    }
}
