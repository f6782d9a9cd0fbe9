mod sentence;

use ndarray::{Array1, ArrayView1};

pub use sentence::{SentenceVocabulary, SENTENCE_END_TOKEN, UNKNOWN_TOKEN};

/// A fixed-width vector whose components score each class or vocabulary entry.
pub type HotVector = Array1<f32>;

/// Bidirectional mapping between tokens and hot vectors.
///
/// All operations are pure and total: unknown tokens degrade into the
/// reserved unknown vector instead of failing.
pub trait VocabularyCodec {
    /// The width of every vector this codec produces.
    fn width(&self) -> usize;

    /// Encodes a token, mapping anything outside the vocabulary to the unknown vector.
    fn encode(&self, token: &str) -> HotVector;

    /// Decodes a vector into the token at its highest component.
    fn decode(&self, vector: ArrayView1<f32>) -> String;

    /// Returns whether the vector is the end-of-sequence encoding.
    fn is_sentence_end(&self, vector: ArrayView1<f32>) -> bool;
}

/// Returns a vector of `width` zeros with a one at `index`.
pub fn one_hot(index: usize, width: usize) -> HotVector {
    let mut vector = Array1::zeros(width);
    if let Some(x) = vector.get_mut(index) {
        *x = 1.0;
    }
    vector
}

/// Returns the index of the largest component, the first one on ties.
///
/// `None` for empty vectors or vectors containing only NaNs.
pub fn argmax(vector: ArrayView1<f32>) -> Option<usize> {
    vector
        .iter()
        .enumerate()
        .filter(|(_, x)| !x.is_nan())
        .fold(None, |best: Option<(usize, f32)>, (i, &x)| match best {
            Some((_, max)) if max >= x => best,
            _ => Some((i, x)),
        })
        .map(|(i, _)| i)
}

/// Collapses a score vector into the one-hot vector of its highest component.
pub fn one_hot_argmax(vector: ArrayView1<f32>) -> HotVector {
    match argmax(vector) {
        Some(index) => one_hot(index, vector.len()),
        None => Array1::zeros(vector.len()),
    }
}
