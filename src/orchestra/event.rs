use std::fmt;

/// What a running job is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Training,
    EstimatingError,
    FinalizingError,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Training => write!(f, "training"),
            Self::EstimatingError => write!(f, "estimating error"),
            Self::FinalizingError => write!(f, "finalizing error"),
        }
    }
}

/// Progress of a training job, delivered in strict program order.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingEvent {
    PhaseChanged(JobPhase),
    /// Sample `index` of `round` was trained.
    SampleProgress { round: usize, index: usize },
    /// Every sample of `round` was trained; `rolling_error` is that round's
    /// normalized training error.
    RoundProgress {
        round: usize,
        rolling_error: Option<f32>,
    },
    /// Sample `index` was scored by an error-rate pass.
    ErrorProgress { index: usize },
    /// A coarse error estimate taken between rounds.
    ErrorEstimate(f32),
    /// The job is over and the orchestrator is idle again.
    Finished {
        completed_fully: bool,
        final_error: Option<f32>,
    },
}

/// Summary returned by a finished job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobReport {
    /// `true` only if every round ran and the final error pass was not interrupted.
    pub completed_fully: bool,
    /// The normalized error of the final pass over every sample.
    pub final_error: Option<f32>,
    pub rounds_done: usize,
}
