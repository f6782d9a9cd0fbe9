//! The lifecycle of a single training job.
//!
//! [`JobMachine`] is a pure state machine: it consumes [`Step`]s reported by
//! the network and answers with [`Action`]s. [`JobDriver`] executes those
//! actions against the network on the background thread.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use super::event::{JobPhase, JobReport, TrainingEvent};
use crate::{
    cancel::CancelToken,
    config::TrainingConfig,
    network::{ErrorPass, ErrorRate, RoundObserver, TrainOutcome, TrainableNetwork},
};

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Phase {
    Training,
    EstimatingError,
    FinalizingError { trained_fully: bool },
    Done(JobReport),
}

/// Something the network reported. Errors are already normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Step {
    SampleDone { round: usize, index: usize },
    RoundDone { round: usize, rolling_error: Option<f32> },
    ErrorSampleDone { index: usize },
    EstimateDone(ErrorPass),
    TrainingDone { completed_fully: bool, rounds_done: usize },
    FinalDone(ErrorPass),
}

/// Something the driver must do in response to a step.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Action {
    Emit(TrainingEvent),
    /// Run a coarse error-rate pass with the given stride.
    Estimate { stride: usize },
    /// Reset cancellation and run the stride-1 pass over every sample.
    Finalize,
    /// Hand the network back and return the orchestrator to idle.
    Release,
}

/// Computes the stride of the interim estimate.
///
/// `len / (len / fraction)`, which drifts from every `fraction`-th sample when
/// `len` isn't a multiple of `fraction`. Datasets smaller than `fraction` are
/// walked entirely.
pub(crate) fn coarse_stride(len: usize, fraction: usize) -> usize {
    match len / fraction.max(1) {
        0 => 1,
        n => len / n,
    }
}

/// Rounds `value` to `places` significant digits, `0` leaves it untouched.
pub(crate) fn round_to_significant(value: f32, places: u32) -> f32 {
    if places == 0 || value == 0.0 || !value.is_finite() {
        return value;
    }

    let magnitude = value.abs().log10().ceil() as i32;
    let factor = 10f64.powi(places as i32 - magnitude);
    ((value as f64 * factor).round() / factor) as f32
}

pub(crate) struct JobMachine {
    phase: Phase,
    rounds: usize,
    dataset_len: usize,
    config: TrainingConfig,
    rounds_done: usize,
}

impl JobMachine {
    pub(crate) fn new(rounds: usize, dataset_len: usize, config: TrainingConfig) -> Self {
        Self {
            phase: Phase::Training,
            rounds,
            dataset_len,
            config,
            rounds_done: 0,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    fn round(&self, error: Option<f32>) -> Option<f32> {
        error.map(|e| round_to_significant(e, self.config.significant_digits))
    }

    /// Whether `round` is one of the last rounds that get an interim estimate.
    fn estimates_after(&self, round: usize) -> bool {
        self.config.estimate_rounds > 0 && round + self.config.estimate_rounds >= self.rounds
    }

    /// Ends the job early, after the network faulted outside of the step protocol.
    pub(crate) fn abort(&mut self) -> Vec<Action> {
        if let Phase::Done(_) = self.phase {
            return Vec::new();
        }

        let report = JobReport {
            completed_fully: false,
            final_error: None,
            rounds_done: self.rounds_done,
        };
        self.phase = Phase::Done(report);

        vec![
            Action::Release,
            Action::Emit(TrainingEvent::Finished {
                completed_fully: false,
                final_error: None,
            }),
        ]
    }

    /// Advances the machine by one step.
    pub(crate) fn handle(&mut self, step: Step) -> Vec<Action> {
        use Action::Emit;

        match (self.phase, step) {
            (Phase::Training, Step::SampleDone { round, index }) => {
                vec![Emit(TrainingEvent::SampleProgress { round, index })]
            }

            (Phase::Training, Step::RoundDone { round, rolling_error }) => {
                self.rounds_done = round + 1;
                let mut actions = vec![Emit(TrainingEvent::RoundProgress {
                    round,
                    rolling_error: self.round(rolling_error),
                })];

                if self.estimates_after(round) {
                    self.phase = Phase::EstimatingError;
                    actions.push(Emit(TrainingEvent::PhaseChanged(JobPhase::EstimatingError)));
                    actions.push(Action::Estimate {
                        stride: coarse_stride(self.dataset_len, self.config.estimate_fraction),
                    });
                }

                actions
            }

            (
                Phase::EstimatingError | Phase::FinalizingError { .. },
                Step::ErrorSampleDone { index },
            ) => vec![Emit(TrainingEvent::ErrorProgress { index })],

            (Phase::EstimatingError, Step::EstimateDone(pass)) => {
                self.phase = Phase::Training;
                let mut actions = Vec::with_capacity(2);

                match (pass.completed_fully, self.round(pass.average)) {
                    (true, Some(estimate)) => {
                        actions.push(Emit(TrainingEvent::ErrorEstimate(estimate)))
                    }
                    _ => debug!("interim estimate interrupted, not reported"),
                }

                actions.push(Emit(TrainingEvent::PhaseChanged(JobPhase::Training)));
                actions
            }

            (
                Phase::Training,
                Step::TrainingDone {
                    completed_fully,
                    rounds_done,
                },
            ) => {
                self.rounds_done = rounds_done;
                self.phase = Phase::FinalizingError {
                    trained_fully: completed_fully,
                };

                vec![
                    Emit(TrainingEvent::PhaseChanged(JobPhase::FinalizingError)),
                    Action::Finalize,
                ]
            }

            (Phase::FinalizingError { trained_fully }, Step::FinalDone(pass)) => {
                let report = JobReport {
                    completed_fully: trained_fully && pass.completed_fully,
                    final_error: self.round(pass.average),
                    rounds_done: self.rounds_done,
                };
                self.phase = Phase::Done(report);

                vec![
                    Action::Release,
                    Emit(TrainingEvent::Finished {
                        completed_fully: report.completed_fully,
                        final_error: report.final_error,
                    }),
                ]
            }

            (phase, step) => {
                warn!("ignoring {step:?} while in {phase:?}");
                Vec::new()
            }
        }
    }
}

/// Executes a [`JobMachine`]'s actions on the background thread.
pub(crate) struct JobDriver {
    machine: JobMachine,
    cancel: CancelToken,
    events: UnboundedSender<TrainingEvent>,
    last_error: Arc<Mutex<Option<f32>>>,
    /// Events held back until the orchestrator is idle again.
    held: Option<Vec<TrainingEvent>>,
}

impl JobDriver {
    pub(crate) fn new(
        machine: JobMachine,
        cancel: CancelToken,
        events: UnboundedSender<TrainingEvent>,
        last_error: Arc<Mutex<Option<f32>>>,
    ) -> Self {
        Self {
            machine,
            cancel,
            events,
            last_error,
            held: None,
        }
    }

    /// Runs the whole job: training, interim estimates and the final pass.
    ///
    /// Returns once the machine asked for the network to be released; events
    /// emitted after that point are held until [`JobDriver::finish`].
    pub(crate) fn run<N: TrainableNetwork>(&mut self, net: &mut N, rounds: usize) -> JobReport {
        self.emit(TrainingEvent::PhaseChanged(JobPhase::Training));
        let cancel = self.cancel.clone();
        let outcome = net.train_rounds(rounds, &cancel, self);

        let rounds_done = match &outcome {
            TrainOutcome::Completed => rounds,
            TrainOutcome::Cancelled { rounds_done } => {
                info!("training cancelled after {rounds_done} round(s)");
                *rounds_done
            }
            TrainOutcome::Failed { rounds_done, error } => {
                warn!("training stopped after {rounds_done} round(s): {error}");
                *rounds_done
            }
        };

        self.step(
            Step::TrainingDone {
                completed_fully: outcome.completed_fully(),
                rounds_done,
            },
            Some(&*net as &dyn ErrorRate),
        );

        match self.machine.phase() {
            Phase::Done(report) => report,
            phase => {
                warn!("job ended while in {phase:?}");
                JobReport {
                    completed_fully: false,
                    final_error: None,
                    rounds_done,
                }
            }
        }
    }

    /// Reports a job whose network panicked as finished without an error value.
    pub(crate) fn abort(&mut self, reason: &str) -> JobReport {
        warn!("training job aborted: {reason}");
        let actions = self.machine.abort();
        self.execute(actions, None);

        match self.machine.phase() {
            Phase::Done(report) => report,
            phase => {
                warn!("job aborted while in {phase:?}");
                JobReport {
                    completed_fully: false,
                    final_error: None,
                    rounds_done: 0,
                }
            }
        }
    }

    /// Delivers every event held back while releasing the network.
    pub(crate) fn finish(&mut self) {
        for event in self.held.take().unwrap_or_default() {
            self.send(event);
        }
    }

    fn step(&mut self, step: Step, scorer: Option<&dyn ErrorRate>) {
        let actions = self.machine.handle(step);
        self.execute(actions, scorer);
    }

    fn execute(&mut self, actions: Vec<Action>, scorer: Option<&dyn ErrorRate>) {
        for action in actions {
            match action {
                Action::Emit(event) => self.emit(event),
                Action::Estimate { stride } => {
                    let Some(scorer) = scorer else {
                        warn!("no network to estimate the error with");
                        continue;
                    };
                    let pass = self.score(scorer, stride);
                    self.step(Step::EstimateDone(pass), Some(scorer));
                }
                Action::Finalize => {
                    let Some(scorer) = scorer else {
                        warn!("no network to finalize the error with");
                        continue;
                    };
                    // A stop requested during training must not skip the final pass.
                    self.cancel.reset();
                    let pass = self.score(scorer, 1);
                    self.step(Step::FinalDone(pass), Some(scorer));
                }
                Action::Release => {
                    self.held.get_or_insert_with(Vec::new);
                }
            }
        }
    }

    /// Runs an error-rate pass and normalizes its average.
    fn score(&mut self, scorer: &dyn ErrorRate, stride: usize) -> ErrorPass {
        debug!("scoring every {stride} sample(s)");
        let cancel = self.cancel.clone();
        let pass = scorer.compute_error_rate(stride, &cancel, &mut |index| {
            self.step(Step::ErrorSampleDone { index }, None)
        });

        ErrorPass {
            average: pass.average.map(|raw| scorer.normalize_error(raw)),
            ..pass
        }
    }

    fn emit(&mut self, event: TrainingEvent) {
        match &event {
            TrainingEvent::ErrorEstimate(error) => *self.last_error.lock() = Some(*error),
            TrainingEvent::Finished {
                final_error: Some(error),
                ..
            } => *self.last_error.lock() = Some(*error),
            _ => {}
        }

        match &mut self.held {
            Some(held) => held.push(event),
            None => self.send(event),
        }
    }

    fn send(&self, event: TrainingEvent) {
        // The caller may have dropped the receiver; the job still runs to completion.
        let _ = self.events.send(event);
    }
}

impl RoundObserver for JobDriver {
    fn sample_done(&mut self, round: usize, index: usize) {
        self.step(Step::SampleDone { round, index }, None);
    }

    fn round_done(&mut self, round: usize, rolling_error: Option<f32>, scorer: &dyn ErrorRate) {
        let rolling_error = rolling_error.map(|raw| scorer.normalize_error(raw));
        debug!("round {round} done: rolling_error={rolling_error:?}");
        self.step(
            Step::RoundDone {
                round,
                rolling_error,
            },
            Some(scorer),
        );
    }
}
