use rand::{rngs::StdRng, SeedableRng};

use super::{Elman, Perceptron, Signal};
use crate::{
    config::ModelConfig,
    data::{Sample, SampleKind},
    error::Result,
};

/// The numeric core behind a [`super::Feedforward`] network.
pub trait Model: Send {
    /// The width of every input vector.
    fn input_width(&self) -> usize;

    /// The width of every output vector.
    fn output_width(&self) -> usize;

    /// The only kind of sample this model learns from.
    fn sample_kind(&self) -> SampleKind;

    /// Computes the output for the given input.
    fn forward(&self, input: &Signal) -> Result<Signal>;

    /// Trains on a single sample and returns its error before the update.
    fn learn(&mut self, sample: &Sample) -> Result<f32>;

    /// Returns the error of a single sample without training on it.
    fn sample_error(&self, sample: &Sample) -> Result<f32>;

    fn describe(&self) -> String;

    fn normalize_error(&self, raw: f32) -> f32 {
        raw
    }
}

/// The closed set of models this crate ships.
#[derive(Debug, Clone)]
pub enum AnyModel {
    Perceptron(Perceptron),
    Elman(Elman),
}

impl AnyModel {
    /// Builds the model described by `config`.
    ///
    /// # Arguments
    /// * `config` - The model kind and its hyperparameters.
    /// * `input_width` - The width of every input vector.
    /// * `output_width` - The width of every output vector.
    /// * `seed` - Seed for the weight initialization, random if `None`.
    pub fn from_config(
        config: &ModelConfig,
        input_width: usize,
        output_width: usize,
        seed: Option<u64>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        match config {
            ModelConfig::Perceptron {
                hidden,
                learning_rate,
                momentum,
            } => {
                let sizes: Vec<_> = std::iter::once(input_width)
                    .chain(hidden.iter().copied())
                    .chain(std::iter::once(output_width))
                    .collect();
                Self::Perceptron(Perceptron::new(&sizes, *learning_rate, *momentum, &mut rng))
            }
            ModelConfig::Elman {
                hidden,
                learning_rate,
                bptt_truncate,
            } => Self::Elman(Elman::new(
                input_width,
                *hidden,
                output_width,
                *learning_rate,
                *bptt_truncate,
                &mut rng,
            )),
        }
    }
}

impl Model for AnyModel {
    fn input_width(&self) -> usize {
        match self {
            Self::Perceptron(m) => m.input_width(),
            Self::Elman(m) => m.input_width(),
        }
    }

    fn output_width(&self) -> usize {
        match self {
            Self::Perceptron(m) => m.output_width(),
            Self::Elman(m) => m.output_width(),
        }
    }

    fn sample_kind(&self) -> SampleKind {
        match self {
            Self::Perceptron(m) => m.sample_kind(),
            Self::Elman(m) => m.sample_kind(),
        }
    }

    fn forward(&self, input: &Signal) -> Result<Signal> {
        match self {
            Self::Perceptron(m) => m.forward(input),
            Self::Elman(m) => m.forward(input),
        }
    }

    fn learn(&mut self, sample: &Sample) -> Result<f32> {
        match self {
            Self::Perceptron(m) => m.learn(sample),
            Self::Elman(m) => m.learn(sample),
        }
    }

    fn sample_error(&self, sample: &Sample) -> Result<f32> {
        match self {
            Self::Perceptron(m) => m.sample_error(sample),
            Self::Elman(m) => m.sample_error(sample),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Perceptron(m) => m.describe(),
            Self::Elman(m) => m.describe(),
        }
    }

    fn normalize_error(&self, raw: f32) -> f32 {
        match self {
            Self::Perceptron(m) => m.normalize_error(raw),
            Self::Elman(m) => m.normalize_error(raw),
        }
    }
}
