use log::{debug, warn};

use super::{
    ErrorPass, ErrorRate, Model, Network, RoundObserver, Signal, TrainOutcome, TrainableNetwork,
};
use crate::{
    cancel::CancelToken,
    data::{Dataset, Sample},
    error::{OrchestraError, Result},
};

/// A trainable network: a [`Model`] plus the dataset bound to it.
#[derive(Debug, Clone)]
pub struct Feedforward<M: Model> {
    model: M,
    dataset: Option<Dataset>,
}

impl<M: Model> Feedforward<M> {
    /// Wraps a model, with no dataset bound yet.
    pub fn new(model: M) -> Self {
        Self {
            model,
            dataset: None,
        }
    }

}

impl<M: Model> Network for Feedforward<M> {
    fn evaluate(&self, input: &Signal) -> Result<Signal> {
        self.model.forward(input)
    }

    fn describe_state(&self) -> String {
        self.model.describe()
    }

    fn normalize_error(&self, raw: f32) -> f32 {
        self.model.normalize_error(raw)
    }
}

impl<M: Model> ErrorRate for Feedforward<M> {
    fn compute_error_rate(
        &self,
        stride: usize,
        cancel: &CancelToken,
        on_sample: &mut dyn FnMut(usize),
    ) -> ErrorPass {
        let Some(dataset) = &self.dataset else {
            return ErrorPass {
                completed_fully: false,
                average: None,
            };
        };

        let mut total = 0.0;
        let mut visited = 0;
        let mut completed_fully = true;

        for (index, sample) in dataset.strided(stride) {
            if cancel.is_cancelled() {
                completed_fully = false;
                break;
            }

            match self.model.sample_error(sample) {
                Ok(error) => {
                    total += error;
                    visited += 1;
                }
                Err(e) => {
                    warn!("error rate pass aborted at sample {index}: {e}");
                    completed_fully = false;
                    break;
                }
            }

            on_sample(index);
        }

        ErrorPass {
            completed_fully,
            average: (visited > 0).then(|| total / visited as f32),
        }
    }
}

impl<M: Model> TrainableNetwork for Feedforward<M> {
    fn bind_samples(&mut self, samples: Vec<Sample>) -> Result<()> {
        let dataset = Dataset::new(
            samples,
            self.model.sample_kind(),
            self.model.input_width(),
            self.model.output_width(),
        )?;
        debug!("bound {} samples", dataset.len());
        self.dataset = Some(dataset);
        Ok(())
    }

    fn dataset_len(&self) -> usize {
        self.dataset.as_ref().map_or(0, Dataset::len)
    }

    fn train_rounds(
        &mut self,
        rounds: usize,
        cancel: &CancelToken,
        observer: &mut dyn RoundObserver,
    ) -> TrainOutcome {
        let Some(dataset) = self.dataset.as_ref() else {
            return TrainOutcome::Failed {
                rounds_done: 0,
                error: OrchestraError::NoDataset,
            };
        };

        for round in 0..rounds {
            let mut total = 0.0;
            let mut trained = 0;

            for (index, sample) in dataset.iter().enumerate() {
                if cancel.is_cancelled() {
                    debug!("training cancelled at round {round}, sample {index}");
                    return TrainOutcome::Cancelled { rounds_done: round };
                }

                match self.model.learn(sample) {
                    Ok(error) => {
                        total += error;
                        trained += 1;
                    }
                    Err(error) => {
                        return TrainOutcome::Failed {
                            rounds_done: round,
                            error,
                        };
                    }
                }

                observer.sample_done(round, index);
            }

            let rolling_error = (trained > 0).then(|| total / trained as f32);
            observer.round_done(round, rolling_error, &*self);
        }

        TrainOutcome::Completed
    }
}
