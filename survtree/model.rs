use crate::estimator::MeanSurvivalEstimator;
use crate::learner::LearnerError;
use crate::tree::SurvivalTree;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Trained model artifact, stored as TOML.
///
/// The fitted tree carries its hyperparameters and event-time grid; the feature
/// names fix the column order expected at prediction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub feature_names: Vec<String>,
    pub tree: SurvivalTree,
}

/// Custom error type for model loading and saving.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Model lists {names} feature names, but its tree was fitted on {features} features.")]
    FeatureLayoutMismatch { names: usize, features: usize },
    #[error("Model file does not contain a fitted tree: {0}")]
    Learner(#[from] LearnerError),
}

impl TrainedModel {
    /// Bundles a fitted tree with the names of the columns it was fitted on.
    pub fn new(feature_names: Vec<String>, tree: SurvivalTree) -> Result<Self, ModelError> {
        let model = Self {
            feature_names,
            tree,
        };
        model.check_layout()?;
        Ok(model)
    }

    /// Saves the trained model to a file in a human-readable TOML format.
    pub fn save(&self, path: &str) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads a trained model from a TOML file.
    pub fn load(path: &str) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: Self = toml::from_str(&toml_string)?;
        model.check_layout()?;
        Ok(model)
    }

    /// Wraps the tree in a fitted mean-survival estimator.
    pub fn into_estimator(self) -> MeanSurvivalEstimator<SurvivalTree> {
        MeanSurvivalEstimator::new(self.tree)
    }

    fn check_layout(&self) -> Result<(), ModelError> {
        let features = self.tree.n_features()?;
        if features != self.feature_names.len() {
            return Err(ModelError::FeatureLayoutMismatch {
                names: self.feature_names.len(),
                features,
            });
        }
        Ok(())
    }
}
