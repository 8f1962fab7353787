//! On-disk artifact set of a training run
//!
//! Layout of a model directory:
//! - one pipeline file per trained variant (`logreg_model.json`, ...)
//! - `label_mappings.json` with the forward and inverse label dictionaries
//! - `manifest.json` recording checksums, metrics and the deployed variant
//!
//! Files are first written to a staging directory, synced, then renamed into
//! place. The manifest goes last, so a reader that finds a manifest finds the
//! files it describes.

use crate::classifier::ModelKind;
use crate::error::{ClassifierError, Result};
use crate::labels::LabelCodec;
use crate::pipeline::Pipeline;
use crate::training::{EvaluationMetrics, SelectionPolicy};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LABEL_MAPPINGS_FILE: &str = "label_mappings.json";
pub const MANIFEST_FILE: &str = "manifest.json";
const STAGING_DIR: &str = ".staging";

/// A persisted file and its SHA-256 digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub file: String,
    pub sha256: String,
}

/// Partition sizes of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub train: usize,
    pub validation: usize,
    pub test: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub kind: ModelKind,
    pub artifact: ArtifactFile,
    pub validation: EvaluationMetrics,
    pub test: EvaluationMetrics,
}

/// Per-run record of artifacts, checksums, metrics and the deployed variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub trained_at: DateTime<Utc>,
    pub random_seed: u64,
    pub split: SplitSizes,
    pub selection_policy: SelectionPolicy,
    pub deployed_variant: ModelKind,
    pub label_mappings: ArtifactFile,
    pub candidates: Vec<CandidateRecord>,
}

impl Manifest {
    pub fn candidate(&self, kind: ModelKind) -> Option<&CandidateRecord> {
        self.candidates.iter().find(|c| c.kind == kind)
    }
}

/// Run-level facts recorded alongside the candidates
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub trained_at: DateTime<Utc>,
    pub random_seed: u64,
    pub split: SplitSizes,
    pub selection_policy: SelectionPolicy,
    pub deployed_variant: ModelKind,
}

/// A fitted candidate waiting to be persisted
#[derive(Debug, Clone, Copy)]
pub struct PendingCandidate<'a> {
    pub pipeline: &'a Pipeline,
    pub validation: EvaluationMetrics,
    pub test: EvaluationMetrics,
}

/// Everything the service needs, loaded and cross-checked
#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub manifest: Manifest,
    pub codec: LabelCodec,
    pub pipeline: Pipeline,
}

/// Model directory reader/writer
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the codec, every candidate pipeline and finally the manifest
    pub fn persist(
        &self,
        codec: &LabelCodec,
        candidates: &[PendingCandidate<'_>],
        run: RunSummary,
    ) -> Result<Manifest> {
        if !candidates.iter().any(|c| c.pipeline.kind() == run.deployed_variant) {
            return Err(ClassifierError::Training(format!(
                "deployed variant {} is not among the persisted candidates",
                run.deployed_variant
            )));
        }

        let staging = self.dir.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let result = self.stage_and_commit(&staging, codec, candidates, run);
        if let Err(e) = fs::remove_dir_all(&staging) {
            warn!(path = %staging.display(), error = %e, "Failed to remove staging directory");
        }
        result
    }

    fn stage_and_commit(
        &self,
        staging: &Path,
        codec: &LabelCodec,
        candidates: &[PendingCandidate<'_>],
        run: RunSummary,
    ) -> Result<Manifest> {
        let label_mappings = stage_json(staging, LABEL_MAPPINGS_FILE, codec)?;

        let mut records = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let kind = candidate.pipeline.kind();
            let artifact = stage_json(staging, kind.artifact_file(), candidate.pipeline)?;
            records.push(CandidateRecord {
                kind,
                artifact,
                validation: candidate.validation,
                test: candidate.test,
            });
        }

        let manifest = Manifest {
            trained_at: run.trained_at,
            random_seed: run.random_seed,
            split: run.split,
            selection_policy: run.selection_policy,
            deployed_variant: run.deployed_variant,
            label_mappings,
            candidates: records,
        };
        stage_json(staging, MANIFEST_FILE, &manifest)?;

        // Everything is staged; move into place with the manifest last
        commit(staging, &self.dir, LABEL_MAPPINGS_FILE)?;
        for record in &manifest.candidates {
            commit(staging, &self.dir, &record.artifact.file)?;
        }
        commit(staging, &self.dir, MANIFEST_FILE)?;

        Ok(manifest)
    }

    pub fn load_manifest(&self) -> Result<Manifest> {
        let bytes = read_artifact(&self.dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn load_codec(&self, manifest: &Manifest) -> Result<LabelCodec> {
        let bytes = self.read_verified(&manifest.label_mappings)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn load_pipeline(&self, manifest: &Manifest, kind: ModelKind) -> Result<Pipeline> {
        let record = manifest.candidate(kind).ok_or_else(|| {
            ClassifierError::MissingArtifact(format!("no {} model in manifest", kind))
        })?;
        let bytes = self.read_verified(&record.artifact)?;
        let pipeline: Pipeline = serde_json::from_slice(&bytes)?;
        pipeline.validate()?;

        if pipeline.kind() != kind {
            return Err(ClassifierError::ArtifactConsistency(format!(
                "{} holds a {} model, expected {}",
                record.artifact.file,
                pipeline.kind(),
                kind
            )));
        }
        Ok(pipeline)
    }

    /// Load the manifest's deployed variant, or `variant` when given, and
    /// check that the pipeline agrees with the label codec.
    pub fn load_deployed(&self, variant: Option<ModelKind>) -> Result<LoadedArtifacts> {
        let manifest = self.load_manifest()?;
        let kind = variant.unwrap_or(manifest.deployed_variant);
        let codec = self.load_codec(&manifest)?;
        let pipeline = self.load_pipeline(&manifest, kind)?;
        pipeline.column_classes(&codec)?;

        debug!(variant = %kind, dir = %self.dir.display(), "Loaded artifact set");
        Ok(LoadedArtifacts {
            manifest,
            codec,
            pipeline,
        })
    }

    fn read_verified(&self, artifact: &ArtifactFile) -> Result<Vec<u8>> {
        let bytes = read_artifact(&self.dir.join(&artifact.file))?;
        let actual = compute_checksum(&bytes);
        if actual != artifact.sha256 {
            return Err(ClassifierError::ChecksumMismatch {
                artifact: artifact.file.clone(),
                expected: artifact.sha256.clone(),
                actual,
            });
        }
        Ok(bytes)
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
            ClassifierError::MissingArtifact(path.display().to_string()),
        ),
        Err(e) => Err(e.into()),
    }
}

fn stage_json<T: Serialize + ?Sized>(staging: &Path, name: &str, value: &T) -> Result<ArtifactFile> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut file = File::create(staging.join(name))?;
    file.write_all(&bytes)?;
    file.sync_all()?;

    Ok(ArtifactFile {
        file: name.to_string(),
        sha256: compute_checksum(&bytes),
    })
}

fn commit(staging: &Path, dir: &Path, name: &str) -> Result<()> {
    fs::rename(staging.join(name), dir.join(name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BoostingParams, ForestParams, Hyperparameters};
    use crate::dataset::synthetic_dataset;
    use crate::schema::FeatureSchema;
    use tempfile::TempDir;

    fn metrics() -> EvaluationMetrics {
        EvaluationMetrics {
            accuracy: 0.9,
            macro_f1: 0.85,
            log_loss: 0.3,
            n_samples: 20,
        }
    }

    fn fit(kind: ModelKind) -> Pipeline {
        let params = Hyperparameters {
            random_forest: ForestParams {
                n_estimators: 5,
                ..ForestParams::default()
            },
            gradient_boosting: BoostingParams {
                n_estimators: 5,
                ..BoostingParams::default()
            },
            ..Hyperparameters::default()
        };
        Pipeline::fit(
            kind,
            &FeatureSchema::sleep_health(),
            &synthetic_dataset(80, 11),
            &LabelCodec::sleep_disorders(),
            &params,
            42,
        )
        .unwrap()
    }

    fn run(deployed: ModelKind) -> RunSummary {
        RunSummary {
            trained_at: Utc::now(),
            random_seed: 42,
            split: SplitSizes {
                train: 48,
                validation: 16,
                test: 16,
            },
            selection_policy: SelectionPolicy::Fixed(deployed),
            deployed_variant: deployed,
        }
    }

    fn persist_all(store: &ArtifactStore) -> Manifest {
        let pipelines: Vec<Pipeline> = ModelKind::ALL.iter().map(|&k| fit(k)).collect();
        let pending: Vec<PendingCandidate<'_>> = pipelines
            .iter()
            .map(|pipeline| PendingCandidate {
                pipeline,
                validation: metrics(),
                test: metrics(),
            })
            .collect();
        store
            .persist(
                &LabelCodec::sleep_disorders(),
                &pending,
                run(ModelKind::GradientBoosting),
            )
            .unwrap()
    }

    #[test]
    fn test_persist_writes_expected_layout() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let manifest = persist_all(&store);

        for file in [
            "logreg_model.json",
            "random_forest_model.json",
            "gradient_boosting_model.json",
            LABEL_MAPPINGS_FILE,
            MANIFEST_FILE,
        ] {
            assert!(dir.path().join(file).exists(), "{} missing", file);
        }
        assert!(!dir.path().join(STAGING_DIR).exists());
        assert_eq!(manifest.candidates.len(), 3);
        assert_eq!(store.load_manifest().unwrap(), manifest);
    }

    #[test]
    fn test_load_deployed_and_override() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        persist_all(&store);

        let loaded = store.load_deployed(None).unwrap();
        assert_eq!(loaded.pipeline.kind(), ModelKind::GradientBoosting);
        assert_eq!(loaded.codec, LabelCodec::sleep_disorders());

        let rf = store.load_deployed(Some(ModelKind::RandomForest)).unwrap();
        assert_eq!(rf.pipeline.kind(), ModelKind::RandomForest);
    }

    #[test]
    fn test_tampered_artifact_detected() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        persist_all(&store);

        let swapped = serde_json::json!({
            "label_mapping": {"insomnia": 0, "no_disorder": 1, "sleep_apnea": 2},
            "inv_label_mapping": {"0": "insomnia", "1": "no_disorder", "2": "sleep_apnea"}
        });
        fs::write(dir.path().join(LABEL_MAPPINGS_FILE), swapped.to_string()).unwrap();

        assert!(matches!(
            store.load_deployed(None),
            Err(ClassifierError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(matches!(
            store.load_deployed(None),
            Err(ClassifierError::MissingArtifact(_))
        ));
    }

    #[test]
    fn test_fixed_variant_must_be_persisted() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let pipeline = fit(ModelKind::LogisticRegression);
        let pending = [PendingCandidate {
            pipeline: &pipeline,
            validation: metrics(),
            test: metrics(),
        }];

        let result = store.persist(
            &LabelCodec::sleep_disorders(),
            &pending,
            run(ModelKind::GradientBoosting),
        );
        assert!(matches!(result, Err(ClassifierError::Training(_))));
        assert!(!dir.path().join(MANIFEST_FILE).exists());
    }
}
