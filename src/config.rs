use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{OrchestraError, Result};

/// Knobs for the training orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Interim error estimates are taken after each of the last `estimate_rounds` rounds.
    pub estimate_rounds: usize,
    /// The interim estimate visits roughly one sample out of `estimate_fraction`.
    pub estimate_fraction: usize,
    /// Reported errors are rounded to this many significant places.
    pub significant_digits: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            estimate_rounds: 2,
            estimate_fraction: 10,
            significant_digits: 3,
        }
    }
}

/// Bounds for autoregressive decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum length of the returned sequence, typed tokens included.
    pub max_output_len: usize,
    /// Maximum amount of steps fed to the network per evaluation.
    pub max_window: usize,
    /// Symbol appended when the network predicts the end of a sentence.
    pub terminator: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_output_len: 12,
            max_window: 8,
            terminator: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Words beyond the `max_size` most frequent ones fold into the unknown token.
    pub max_size: usize,
    pub include_end_token: bool,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            max_size: 800,
            include_end_token: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    Perceptron {
        hidden: Vec<usize>,
        learning_rate: f32,
        momentum: f32,
    },
    Elman {
        hidden: usize,
        learning_rate: f32,
        bptt_truncate: usize,
    },
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::Elman {
            hidden: 32,
            learning_rate: 0.01,
            bptt_truncate: 10,
        }
    }
}

/// Full configuration of the training binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub training: TrainingConfig,
    pub decoder: DecoderConfig,
    pub vocabulary: VocabularyConfig,
    pub model: ModelConfig,
    pub seed: Option<u64>,
}

impl Config {
    /// Loads a configuration from a JSON file, missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an `OrchestraError` if the file can't be read, parsed or fails validation.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    /// Returns `OrchestraError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(OrchestraError::InvalidConfig(msg.to_string()));

        if self.training.estimate_fraction == 0 {
            return invalid("training.estimate_fraction must be positive");
        }
        if self.decoder.max_output_len == 0 {
            return invalid("decoder.max_output_len must be positive");
        }
        if self.decoder.max_window == 0 {
            return invalid("decoder.max_window must be positive");
        }
        if self.vocabulary.max_size == 0 {
            return invalid("vocabulary.max_size must be positive");
        }

        match &self.model {
            ModelConfig::Perceptron {
                hidden,
                learning_rate,
                ..
            } => {
                if hidden.contains(&0) {
                    return invalid("model.hidden layers must not be empty");
                }
                if *learning_rate <= 0.0 {
                    return invalid("model.learning_rate must be positive");
                }
            }
            ModelConfig::Elman {
                hidden,
                learning_rate,
                ..
            } => {
                if *hidden == 0 {
                    return invalid("model.hidden must be positive");
                }
                if *learning_rate <= 0.0 {
                    return invalid("model.learning_rate must be positive");
                }
            }
        }

        Ok(())
    }
}
