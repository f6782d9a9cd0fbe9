use std::fmt;

use ndarray::Array1;

use crate::error::{OrchestraError, Result};

/// The shape of sample a network trains on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Pair,
    Sequence,
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pair => write!(f, "pair"),
            Self::Sequence => write!(f, "sequence"),
        }
    }
}

/// A single training sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// An input vector and the output the network should produce for it.
    Pair {
        input: Array1<f32>,
        expected: Array1<f32>,
    },
    /// An ordered sequence of token vectors. Each step is trained to predict the next one.
    Sequence(Vec<Array1<f32>>),
}

impl Sample {
    /// Builds a `Sample::Pair`.
    pub fn pair(input: Vec<f32>, expected: Vec<f32>) -> Self {
        Self::Pair {
            input: Array1::from_vec(input),
            expected: Array1::from_vec(expected),
        }
    }

    /// Builds a `Sample::Sequence`.
    pub fn sequence<I>(steps: I) -> Self
    where
        I: IntoIterator<Item = Array1<f32>>,
    {
        Self::Sequence(steps.into_iter().collect())
    }

    pub fn kind(&self) -> SampleKind {
        match self {
            Self::Pair { .. } => SampleKind::Pair,
            Self::Sequence(_) => SampleKind::Sequence,
        }
    }
}

/// A validated, in-memory set of samples bound to a network.
///
/// Every sample is checked against the network widths when the dataset is
/// built, so a job never starts on malformed data.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Creates a new dataset.
    ///
    /// # Arguments
    /// * `samples` - The samples to bind.
    /// * `kind` - The only kind of sample the network trains on.
    /// * `input_width` - The width of every input vector.
    /// * `output_width` - The width of every expected vector.
    ///
    /// # Errors
    /// `EmptySamples` if there are no samples, or a sequence is shorter than two
    /// steps. `SampleKindMismatch` if any sample has another kind, and
    /// `SampleWidthMismatch` if any vector has the wrong width.
    pub fn new(
        samples: Vec<Sample>,
        kind: SampleKind,
        input_width: usize,
        output_width: usize,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(OrchestraError::EmptySamples);
        }

        for (index, sample) in samples.iter().enumerate() {
            if sample.kind() != kind {
                return Err(OrchestraError::SampleKindMismatch {
                    index,
                    expected: kind,
                });
            }

            match sample {
                Sample::Pair { input, expected } => {
                    check_width(index, "input", input.len(), input_width)?;
                    check_width(index, "expected", expected.len(), output_width)?;
                }
                Sample::Sequence(steps) => {
                    if steps.len() < 2 {
                        return Err(OrchestraError::EmptySamples);
                    }
                    for step in steps {
                        check_width(index, "input", step.len(), input_width)?;
                        check_width(index, "expected", step.len(), output_width)?;
                    }
                }
            }
        }

        Ok(Self { samples })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Iterates every `stride`-th sample along with its index, starting at the first one.
    pub fn strided(&self, stride: usize) -> impl Iterator<Item = (usize, &Sample)> {
        self.samples.iter().enumerate().step_by(stride.max(1))
    }
}

fn check_width(index: usize, what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(OrchestraError::SampleWidthMismatch {
            index,
            what,
            got,
            expected,
        });
    }

    Ok(())
}
