//! Appearance model — training, atomic snapshot slot, persistence.
//!
//! A model is the full labeled collection of feature vectors (a
//! nearest-neighbor reference set, not a parametric model). Training is a
//! full rebuild; the result replaces the previous model by reference swap
//! so concurrent matchers never observe a half-trained state.

use crate::features::{spatial_histogram, TrainingParams};
use crate::types::{TrainingSample, SAMPLE_SIZE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Bumped whenever the serialized layout or feature semantics change;
/// older files are treated as corrupt and trigger a retrain.
const MODEL_FORMAT_VERSION: u32 = 1;

/// One labeled reference vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub label: i64,
    pub features: Vec<f32>,
}

/// A trained, immutable appearance model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppearanceModel {
    pub format_version: u32,
    pub params: TrainingParams,
    pub entries: Vec<ModelEntry>,
    pub trained_at: DateTime<Utc>,
}

impl AppearanceModel {
    /// Number of reference vectors in the model.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct identity labels present in the model.
    pub fn labels(&self) -> Vec<i64> {
        let mut labels: Vec<i64> = self.entries.iter().map(|e| e.label).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

/// Result of a training run.
#[derive(Debug)]
pub enum TrainOutcome {
    Trained(AppearanceModel),
    /// No samples available — reported, not fatal; any installed model
    /// stays as-is.
    EmptyDataset,
}

/// Rebuild the model from the full sample set.
///
/// O(total samples); every call recomputes every feature vector. Samples
/// whose buffer is not SAMPLE_SIZE² are skipped with a warning rather
/// than poisoning the whole run.
pub fn train(samples: &[TrainingSample], params: TrainingParams) -> TrainOutcome {
    if samples.is_empty() {
        tracing::info!("training requested with no samples; keeping current model");
        return TrainOutcome::EmptyDataset;
    }

    let expected_len = (SAMPLE_SIZE * SAMPLE_SIZE) as usize;
    let mut entries = Vec::with_capacity(samples.len());

    for sample in samples {
        if sample.pixels.len() != expected_len {
            tracing::warn!(
                label = sample.label,
                len = sample.pixels.len(),
                "skipping malformed sample"
            );
            continue;
        }
        entries.push(ModelEntry {
            label: sample.label,
            features: spatial_histogram(&sample.pixels, SAMPLE_SIZE, SAMPLE_SIZE, &params),
        });
    }

    if entries.is_empty() {
        tracing::warn!("all samples malformed; keeping current model");
        return TrainOutcome::EmptyDataset;
    }

    tracing::info!(samples = entries.len(), "trained appearance model");
    TrainOutcome::Trained(AppearanceModel {
        format_version: MODEL_FORMAT_VERSION,
        params,
        entries,
        trained_at: Utc::now(),
    })
}

/// Shared slot holding the current model snapshot.
///
/// Readers take a cheap `Arc` clone; the trainer installs a new immutable
/// model by swapping the reference. `None` means untrained.
#[derive(Default)]
pub struct ModelSlot {
    current: RwLock<Option<Arc<AppearanceModel>>>,
}

impl ModelSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The current fully-formed model, if any.
    pub fn snapshot(&self) -> Option<Arc<AppearanceModel>> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Atomically replace the installed model.
    pub fn install(&self, model: AppearanceModel) -> Arc<AppearanceModel> {
        let model = Arc::new(model);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(model.clone());
        model
    }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    /// No persisted model — a fresh install, not a failure.
    #[error("no persisted model at {0}")]
    NotFound(String),
    /// File exists but cannot be understood; caller falls back to
    /// untrained and retrains from samples.
    #[error("corrupt persisted model: {0}")]
    Corrupt(String),
    #[error("model read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ModelSaveError {
    #[error("model serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("model write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Load a persisted model.
///
/// Distinguishes "no model yet" from "corrupt model" from I/O failure;
/// callers handle each differently.
pub fn load_model(path: &Path) -> Result<AppearanceModel, ModelLoadError> {
    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    let model: AppearanceModel =
        serde_json::from_slice(&bytes).map_err(|e| ModelLoadError::Corrupt(e.to_string()))?;
    if model.format_version != MODEL_FORMAT_VERSION {
        return Err(ModelLoadError::Corrupt(format!(
            "format version {} (expected {MODEL_FORMAT_VERSION})",
            model.format_version
        )));
    }
    Ok(model)
}

/// Persist a model atomically: write a sibling temp file, then rename.
///
/// A failure mid-write leaves either the previous file or nothing — never
/// a partially-written model.
pub fn save_model(path: &Path, model: &AppearanceModel) -> Result<(), ModelSaveError> {
    let bytes = serde_json::to_vec(model)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: i64, fill: u8) -> TrainingSample {
        TrainingSample {
            label,
            pixels: vec![fill; (SAMPLE_SIZE * SAMPLE_SIZE) as usize],
        }
    }

    #[test]
    fn test_train_empty_dataset_is_noop() {
        assert!(matches!(
            train(&[], TrainingParams::default()),
            TrainOutcome::EmptyDataset
        ));
    }

    #[test]
    fn test_train_builds_labeled_entries() {
        let samples = vec![sample(7, 10), sample(7, 20), sample(9, 30)];
        let TrainOutcome::Trained(model) = train(&samples, TrainingParams::default()) else {
            panic!("expected a trained model");
        };
        assert_eq!(model.len(), 3);
        assert_eq!(model.labels(), vec![7, 9]);
        assert_eq!(model.entries[0].features.len(), model.params.feature_len());
    }

    #[test]
    fn test_train_skips_malformed_samples() {
        let mut samples = vec![sample(1, 50)];
        samples.push(TrainingSample {
            label: 2,
            pixels: vec![0u8; 17],
        });
        let TrainOutcome::Trained(model) = train(&samples, TrainingParams::default()) else {
            panic!("expected a trained model");
        };
        assert_eq!(model.labels(), vec![1]);
    }

    #[test]
    fn test_train_all_malformed_is_noop() {
        let samples = vec![TrainingSample {
            label: 2,
            pixels: vec![0u8; 17],
        }];
        assert!(matches!(
            train(&samples, TrainingParams::default()),
            TrainOutcome::EmptyDataset
        ));
    }

    #[test]
    fn test_slot_starts_untrained() {
        assert!(ModelSlot::empty().snapshot().is_none());
    }

    #[test]
    fn test_slot_install_and_snapshot() {
        let slot = ModelSlot::empty();
        let TrainOutcome::Trained(model) = train(&[sample(3, 40)], TrainingParams::default())
        else {
            panic!("expected a trained model");
        };
        slot.install(model);

        let snap = slot.snapshot().expect("model installed");
        assert_eq!(snap.labels(), vec![3]);

        // An old snapshot stays valid across a swap.
        let TrainOutcome::Trained(next) = train(&[sample(4, 60)], TrainingParams::default())
        else {
            panic!("expected a trained model");
        };
        slot.install(next);
        assert_eq!(snap.labels(), vec![3]);
        assert_eq!(slot.snapshot().unwrap().labels(), vec![4]);
    }

    #[test]
    fn test_empty_train_leaves_installed_model_untouched() {
        let slot = ModelSlot::empty();
        let TrainOutcome::Trained(model) = train(&[sample(3, 40)], TrainingParams::default())
        else {
            panic!("expected a trained model");
        };
        let installed = slot.install(model);

        assert!(matches!(
            train(&[], TrainingParams::default()),
            TrainOutcome::EmptyDataset
        ));

        // The slot still holds the very same model instance.
        let snap = slot.snapshot().expect("model still installed");
        assert!(Arc::ptr_eq(&installed, &snap));
    }

    #[test]
    fn test_persist_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let TrainOutcome::Trained(model) = train(&[sample(5, 70)], TrainingParams::default())
        else {
            panic!("expected a trained model");
        };
        save_model(&path, &model).unwrap();

        let loaded = load_model(&path).unwrap();
        assert_eq!(loaded.labels(), vec![5]);
        assert_eq!(loaded.params, model.params);
        assert_eq!(loaded.entries[0].features, model.entries[0].features);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_model(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ModelLoadError::NotFound(_))));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(load_model(&path), Err(ModelLoadError::Corrupt(_))));
    }

    #[test]
    fn test_load_wrong_format_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let TrainOutcome::Trained(mut model) = train(&[sample(1, 10)], TrainingParams::default())
        else {
            panic!("expected a trained model");
        };
        model.format_version = 99;
        save_model(&path, &model).unwrap();

        assert!(matches!(load_model(&path), Err(ModelLoadError::Corrupt(_))));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let TrainOutcome::Trained(model) = train(&[sample(1, 10)], TrainingParams::default())
        else {
            panic!("expected a trained model");
        };
        save_model(&path, &model).unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["model.json"]);
    }
}
