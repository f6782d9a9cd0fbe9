//! The contract between the orchestration layer and a trainable network.
//!
//! The orchestrator and decoder only ever talk to [`Network`], [`ErrorRate`]
//! and [`TrainableNetwork`]. [`Feedforward`] is the stock implementation of
//! that contract on top of any [`Model`].

mod elman;
mod feedforward;
mod model;
mod perceptron;

use ndarray::{Array1, Array2};

use crate::{cancel::CancelToken, data::Sample, error::Result};

pub use elman::Elman;
pub use feedforward::Feedforward;
pub use model::{AnyModel, Model};
pub use perceptron::Perceptron;

/// What flows in and out of a network.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// A single vector, for plain feed-forward networks.
    Vector(Array1<f32>),
    /// One row per time step, for recurrent networks.
    Sequence(Array2<f32>),
}

impl Signal {
    /// Returns the vector of the last step: the vector itself or the last row of a sequence.
    pub fn last_step(&self) -> Option<Array1<f32>> {
        match self {
            Signal::Vector(v) => Some(v.clone()),
            Signal::Sequence(steps) => steps.rows().into_iter().last().map(|row| row.to_owned()),
        }
    }
}

/// Operations every network kind supports.
pub trait Network {
    /// Evaluates the network without touching its trainable state.
    ///
    /// # Errors
    /// Returns `OrchestraError::Evaluation` if the input has the wrong shape or kind.
    fn evaluate(&self, input: &Signal) -> Result<Signal>;

    /// A short human-readable summary of the network.
    fn describe_state(&self) -> String;

    /// Maps a raw average error to the scale reported to the caller.
    fn normalize_error(&self, raw: f32) -> f32 {
        raw
    }
}

/// The result of an error-rate pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorPass {
    /// `false` if the pass was cancelled or hit a fault before visiting every selected sample.
    pub completed_fully: bool,
    /// The average raw error of the visited samples, `None` if none were visited.
    pub average: Option<f32>,
}

/// Computes an average error over the bound dataset.
pub trait ErrorRate: Network {
    /// Walks every `stride`-th bound sample, reporting each visited index.
    ///
    /// Cancellation is checked before every sample.
    fn compute_error_rate(
        &self,
        stride: usize,
        cancel: &CancelToken,
        on_sample: &mut dyn FnMut(usize),
    ) -> ErrorPass;
}

/// How a call to [`TrainableNetwork::train_rounds`] ended.
#[derive(Debug)]
pub enum TrainOutcome {
    /// Every requested round ran.
    Completed,
    /// The cancellation token was observed set.
    Cancelled { rounds_done: usize },
    /// The network faulted while training a sample.
    Failed {
        rounds_done: usize,
        error: crate::error::OrchestraError,
    },
}

impl TrainOutcome {
    /// Whether every requested round ran.
    pub fn completed_fully(&self) -> bool {
        matches!(self, TrainOutcome::Completed)
    }
}

/// Receives the per-sample and per-round callbacks of a training run.
pub trait RoundObserver {
    /// Called after sample `index` of round `round` was trained.
    fn sample_done(&mut self, round: usize, index: usize);

    /// Called after every sample of `round` was trained.
    ///
    /// # Arguments
    /// * `round` - The index of the finished round.
    /// * `rolling_error` - The average training error of the round.
    /// * `scorer` - The network itself, to score and normalize errors between rounds.
    fn round_done(&mut self, round: usize, rolling_error: Option<f32>, scorer: &dyn ErrorRate);
}

/// A network that can be trained over a bound dataset.
pub trait TrainableNetwork: ErrorRate {
    /// Validates and binds the samples used by every following training run.
    ///
    /// # Errors
    /// `EmptySamples` or `SampleWidthMismatch`; the previous dataset stays bound.
    fn bind_samples(&mut self, samples: Vec<Sample>) -> Result<()>;

    /// The amount of bound samples, zero if none are bound.
    fn dataset_len(&self) -> usize;

    /// Runs `rounds` passes over the bound dataset.
    ///
    /// Cancellation is checked before every sample; the returned outcome is
    /// the single completion notification of the run.
    fn train_rounds(
        &mut self,
        rounds: usize,
        cancel: &CancelToken,
        observer: &mut dyn RoundObserver,
    ) -> TrainOutcome;
}
