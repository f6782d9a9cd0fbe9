use std::cmp::Ordering;

use ndarray::Array1;

use crate::{
    error::{OrchestraError, Result},
    network::{Network, Signal},
    vocab::argmax,
};

/// The outcome of classifying a single input vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The class with the highest score, the first one on ties.
    pub class: usize,
    pub score: f32,
    /// Every class with its score, best first.
    pub ranked: Vec<(usize, f32)>,
}

/// Evaluates `input` and picks the class with the highest output.
///
/// # Errors
/// Returns `OrchestraError::Evaluation` if the network rejects the input or
/// produces no usable scores.
pub fn classify<N: Network + ?Sized>(net: &N, input: Array1<f32>) -> Result<Classification> {
    let scores = net
        .evaluate(&Signal::Vector(input))?
        .last_step()
        .ok_or_else(|| OrchestraError::Evaluation("the network produced no output".into()))?;

    let class = argmax(scores.view())
        .ok_or_else(|| OrchestraError::Evaluation("the network produced no scores".into()))?;

    let mut ranked: Vec<_> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    Ok(Classification {
        class,
        score: scores[class],
        ranked,
    })
}
