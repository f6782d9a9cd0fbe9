use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use crate::data::SampleKind;

/// The result type used across the crate.
pub type Result<T> = std::result::Result<T, OrchestraError>;

/// Every failure that can be surfaced to the caller.
///
/// None of these are fatal: precondition failures are returned before any
/// background work starts, and faults inside a running job are folded into
/// its completion report instead.
#[derive(Debug)]
pub enum OrchestraError {
    /// The network has no bound dataset to train on.
    NoDataset,
    /// The given sample set is empty.
    EmptySamples,
    /// A sample is not of the kind the network trains on.
    SampleKindMismatch { index: usize, expected: SampleKind },
    /// A sample does not match the width the network declares.
    SampleWidthMismatch {
        index: usize,
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A training job is already running on this orchestrator.
    JobInFlight,
    /// A configuration value is out of range.
    InvalidConfig(String),
    /// The network could not evaluate the given input.
    Evaluation(String),
    /// The background job panicked before reporting.
    JobPanicked(String),
    Io(io::Error),
    Json(serde_json::Error),
    Shape(ndarray::ShapeError),
}

impl Display for OrchestraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDataset => write!(f, "the network has no bound dataset"),
            Self::EmptySamples => write!(f, "the sample set is empty"),
            Self::SampleWidthMismatch {
                index,
                what,
                got,
                expected,
            } => write!(
                f,
                "sample {index} has a mismatched {what} width, got {got} and expected {expected}"
            ),
            Self::SampleKindMismatch { index, expected } => {
                write!(f, "sample {index} is not a {expected} sample")
            }
            Self::JobInFlight => write!(f, "a training job is already running"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Evaluation(msg) => write!(f, "evaluation failed: {msg}"),
            Self::JobPanicked(msg) => write!(f, "training job panicked: {msg}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::Shape(e) => write!(f, "shape error: {e}"),
        }
    }
}

impl Error for OrchestraError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Shape(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OrchestraError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for OrchestraError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<ndarray::ShapeError> for OrchestraError {
    fn from(e: ndarray::ShapeError) -> Self {
        Self::Shape(e)
    }
}
