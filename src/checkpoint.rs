//! Snapshot save/load for trained layers.
//!
//! Serializes the layer parameters, weight matrix, and update-rule name to
//! JSON. The concrete rule variant behind `dyn Learner` cannot be serialized
//! directly, so the snapshot stores its stable name and reconstructs the
//! matching variant on load.

use crate::core::{FastLearner, Learner, LocalLayer, SequentialLearner};
use crate::LayerConfig;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Serializable snapshot of one local-learning unit.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Layer parameters.
    pub config: LayerConfig,
    /// Update-rule name ("sequential" or "fast").
    pub rule: String,
    /// Weight matrix as nested rows for serialization.
    pub weights: Vec<Vec<f32>>,
    /// Compute device the snapshot was taken on. Always "cpu" here; carried
    /// so the record keeps the full `{parameters, state, device}` shape.
    pub device: String,
    /// Epoch at which this snapshot was taken.
    pub epoch: usize,
}

/// Convert an `Array2` to nested `Vec`s for serialization.
fn array2_to_vecs(arr: &Array2<f32>) -> Vec<Vec<f32>> {
    arr.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// Convert nested `Vec`s back to an `Array2`.
fn vecs_to_array2(vecs: &[Vec<f32>]) -> Result<Array2<f32>, String> {
    if vecs.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }
    let nrows = vecs.len();
    let ncols = vecs[0].len();
    let flat: Vec<f32> = vecs.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| format!("Failed to reconstruct weight matrix: {e}"))
}

/// Reconstruct a learner variant from its rule name.
fn learner_from_name(name: &str, layer: LocalLayer) -> Result<Box<dyn Learner>, String> {
    match name {
        "sequential" => Ok(Box::new(SequentialLearner::from_layer(layer))),
        "fast" => Ok(Box::new(FastLearner::from_layer(layer))),
        _ => Err(format!("Unknown update rule: {name}")),
    }
}

/// Build the snapshot record for a learner.
pub fn snapshot_of(learner: &dyn Learner, epoch: usize) -> Snapshot {
    let layer = learner.layer();
    Snapshot {
        config: layer.config.clone(),
        rule: learner.rule_name().to_string(),
        weights: array2_to_vecs(&layer.w),
        device: "cpu".to_string(),
        epoch,
    }
}

/// Save a learner snapshot to a JSON file, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written or the data cannot be
/// serialized.
pub fn save_snapshot(learner: &dyn Learner, path: &Path, epoch: usize) -> Result<(), String> {
    let snapshot = snapshot_of(learner, epoch);
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| format!("Failed to serialize snapshot: {e}"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create snapshot directory: {e}"))?;
    }

    std::fs::write(path, json)
        .map_err(|e| format!("Failed to write snapshot to {}: {e}", path.display()))
}

/// Load a learner snapshot from a JSON file.
///
/// Reconstructs the update-rule variant recorded in the snapshot.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, the stored
/// parameters fail validation, or the weight matrix shape does not match them.
pub fn load_snapshot(path: &Path) -> Result<(Snapshot, Box<dyn Learner>), String> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read snapshot from {}: {e}", path.display()))?;

    let snapshot: Snapshot =
        serde_json::from_str(&json).map_err(|e| format!("Failed to parse snapshot: {e}"))?;

    let w = vecs_to_array2(&snapshot.weights)?;
    let layer = LocalLayer::from_weights(snapshot.config.clone(), w).map_err(|e| e.to_string())?;
    let learner = learner_from_name(&snapshot.rule, layer)?;

    Ok((snapshot, learner))
}

/// Destination for the training driver's periodic snapshots.
pub trait SnapshotSink {
    /// Persist a snapshot of `learner` taken at `epoch`.
    ///
    /// # Errors
    /// I/O failures are fatal for the invocation and abort the run.
    fn save(&mut self, epoch: usize, learner: &dyn Learner) -> Result<(), String>;
}

/// Sink writing epoch-keyed JSON files beside a model path.
///
/// A path of `out/model.json` yields `out/model_3.json` for epoch 3, keeping
/// the final model path itself free for the accepted result.
#[derive(Debug, Clone)]
pub struct FileSink {
    pub path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Epoch-keyed sibling of the configured path.
    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model");
        let name = match self.path.extension().and_then(|s| s.to_str()) {
            Some(ext) => format!("{stem}_{epoch}.{ext}"),
            None => format!("{stem}_{epoch}"),
        };
        match self.path.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }
}

impl SnapshotSink for FileSink {
    fn save(&mut self, epoch: usize, learner: &dyn Learner) -> Result<(), String> {
        save_snapshot(learner, &self.epoch_path(epoch), epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_config() -> LayerConfig {
        LayerConfig {
            in_size: 4,
            hidden_size: 3,
            k: 2,
            ..LayerConfig::default()
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let learner = FastLearner::with_init(test_config(), Some(0.5), Some(42)).unwrap();
        let dir = std::env::temp_dir().join("ll_test_snapshot");
        let path = dir.join("snapshot.json");

        save_snapshot(&learner, &path, 7).expect("save");
        let (snapshot, loaded) = load_snapshot(&path).expect("load");

        assert_eq!(snapshot.epoch, 7);
        assert_eq!(snapshot.rule, "fast");
        assert_eq!(snapshot.device, "cpu");
        assert_eq!(loaded.rule_name(), "fast");
        assert_eq!(loaded.layer().config, learner.layer.config);

        for (a, b) in learner.layer.w.iter().zip(loaded.layer().w.iter()) {
            assert!((a - b).abs() < 1e-6, "weight mismatch: {a} vs {b}");
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_sequential_rule_reconstructed() {
        let learner = SequentialLearner::with_init(test_config(), Some(0.5), Some(1)).unwrap();
        let dir = std::env::temp_dir().join("ll_test_snapshot_seq");
        let path = dir.join("snapshot.json");

        save_snapshot(&learner, &path, 1).expect("save");
        let (_, loaded) = load_snapshot(&path).expect("load");
        assert_eq!(loaded.rule_name(), "sequential");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_nonexistent_snapshot() {
        assert!(load_snapshot(Path::new("/nonexistent/snapshot.json")).is_err());
    }

    #[test]
    fn test_unknown_rule_name() {
        let layer = LocalLayer::with_init(test_config(), Some(0.5), Some(2)).unwrap();
        assert!(learner_from_name("adam", layer).is_err());
    }

    #[test]
    fn test_file_sink_epoch_naming() {
        let sink = FileSink::new(PathBuf::from("out/model.json"));
        assert_eq!(sink.epoch_path(3), PathBuf::from("out/model_3.json"));

        let bare = FileSink::new(PathBuf::from("model"));
        assert_eq!(bare.epoch_path(10), PathBuf::from("model_10"));
    }
}
