use std::collections::VecDeque;

use log::{debug, warn};
use ndarray::Array2;

use crate::{
    config::DecoderConfig,
    error::{OrchestraError, Result},
    network::{Network, Signal},
    vocab::{one_hot_argmax, HotVector, VocabularyCodec},
};

/// Greedy autoregressive decoder over a sliding window of hot vectors.
#[derive(Debug, Clone)]
pub struct Decoder<C> {
    codec: C,
    config: DecoderConfig,
}

impl<C: VocabularyCodec> Decoder<C> {
    /// Creates a new `Decoder`.
    ///
    /// # Arguments
    /// * `codec` - Maps tokens to the vectors the network was trained on.
    /// * `config` - The output length bound, window bound and terminator.
    pub fn new(codec: C, config: DecoderConfig) -> Self {
        Self { codec, config }
    }

    /// Continues `tokens` with the network's most likely next tokens.
    ///
    /// # Arguments
    /// * `net` - A sequence network whose output width matches the codec.
    /// * `tokens` - The already confirmed tokens.
    ///
    /// # Returns
    /// The confirmed tokens, normalized through the codec, followed by the
    /// predicted ones and the terminator if the network ended the sentence.
    /// Empty if `tokens` is empty or the network failed to evaluate.
    pub fn predict<N, S>(&self, net: &N, tokens: &[S]) -> Vec<String>
    where
        N: Network + ?Sized,
        S: AsRef<str>,
    {
        match self.try_predict(net, tokens) {
            Ok(output) => output,
            Err(e) => {
                warn!("no prediction available: {e}");
                Vec::new()
            }
        }
    }

    /// Like [`Decoder::predict`], surfacing evaluation failures.
    ///
    /// # Errors
    /// Returns an `OrchestraError` if the network can't evaluate the window or
    /// its output doesn't match the codec width.
    pub fn try_predict<N, S>(&self, net: &N, tokens: &[S]) -> Result<Vec<String>>
    where
        N: Network + ?Sized,
        S: AsRef<str>,
    {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let max_len = self.config.max_output_len;
        let max_window = self.config.max_window;

        let mut output = Vec::with_capacity(max_len.max(tokens.len()) + 1);
        let mut window = VecDeque::with_capacity(max_window + 1);

        for token in tokens {
            let vector = self.codec.encode(token.as_ref());
            output.push(self.codec.decode(vector.view()));
            window.push_back(vector);
        }
        while window.len() > max_window {
            window.pop_front();
        }

        while output.len() < max_len {
            let next = self.next_vector(net, &window)?;

            if self.codec.is_sentence_end(next.view()) {
                debug!("sentence ended after {} token(s)", output.len());
                output.push(self.config.terminator.clone());
                break;
            }

            output.push(self.codec.decode(next.view()));
            window.push_back(next);
            if window.len() > max_window {
                window.pop_front();
            }
        }

        Ok(output)
    }

    /// Evaluates the window and collapses the last step into a one-hot vector.
    fn next_vector<N: Network + ?Sized>(
        &self,
        net: &N,
        window: &VecDeque<HotVector>,
    ) -> Result<HotVector> {
        let width = self.codec.width();
        let steps = Array2::from_shape_vec(
            (window.len(), width),
            window.iter().flat_map(|v| v.iter().copied()).collect(),
        )?;

        let last = net
            .evaluate(&Signal::Sequence(steps))?
            .last_step()
            .ok_or_else(|| OrchestraError::Evaluation("the network produced no output".into()))?;

        if last.len() != width {
            return Err(OrchestraError::Evaluation(format!(
                "output width {} doesn't match the vocabulary width {width}",
                last.len()
            )));
        }

        Ok(one_hot_argmax(last.view()))
    }
}
