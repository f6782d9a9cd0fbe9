use std::collections::HashMap;

use log::debug;
use ndarray::ArrayView1;

use super::{argmax, one_hot, HotVector, VocabularyCodec};
use crate::{config::VocabularyConfig, data::Sample};

/// Canonical token for every word outside the vocabulary.
pub const UNKNOWN_TOKEN: &str = "<unk>";
/// Token that marks the end of a sentence.
pub const SENTENCE_END_TOKEN: &str = "</s>";

const UNKNOWN_INDEX: usize = 0;

/// A word vocabulary built from plain text.
///
/// Index layout: `0` is the unknown token, `1` the end-of-sentence token (when
/// enabled), then the kept words from most to least frequent.
#[derive(Debug, Clone)]
pub struct SentenceVocabulary {
    tokens: Vec<String>,
    index: HashMap<String, usize>,
    end_index: Option<usize>,
}

impl SentenceVocabulary {
    /// Builds a vocabulary out of the words of `text`.
    ///
    /// Only the `config.max_size` most frequent words are kept, ties broken by
    /// first appearance. The rest encode as the unknown token.
    pub fn from_text(text: &str, config: &VocabularyConfig) -> Self {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (seen, word) in sentences(text).flatten().enumerate() {
            counts.entry(word).or_insert((0, seen)).0 += 1;
        }

        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|(_, (ca, sa)), (_, (cb, sb))| cb.cmp(ca).then(sa.cmp(sb)));
        let dropped = ranked.len().saturating_sub(config.max_size);
        ranked.truncate(config.max_size);

        let mut tokens = vec![UNKNOWN_TOKEN.to_string()];
        let end_index = config.include_end_token.then(|| {
            tokens.push(SENTENCE_END_TOKEN.to_string());
            tokens.len() - 1
        });
        tokens.extend(ranked.into_iter().map(|(word, _)| word));

        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| (token.clone(), i))
            .collect();

        debug!(
            "built vocabulary: width={} dropped_words={dropped}",
            tokens.len()
        );

        Self {
            tokens,
            index,
            end_index,
        }
    }

    /// Splits free text into normalized words the way the vocabulary was built,
    /// dropping punctuation.
    pub fn tokenize(text: &str) -> Vec<String> {
        words(text).collect()
    }

    /// Returns the tokens in index order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns whether `token` is part of the vocabulary after normalization.
    pub fn contains(&self, token: &str) -> bool {
        self.index.contains_key(&normalize(token))
    }

    /// Converts every sentence of `text` into a training sequence.
    ///
    /// Sentences that would produce less than two steps are skipped, since they
    /// carry nothing to predict.
    pub fn training_samples(&self, text: &str) -> Vec<Sample> {
        sentences(text)
            .filter_map(|words| {
                let mut steps: Vec<_> = words.iter().map(|w| self.encode(w)).collect();
                if let Some(end) = self.end_index {
                    steps.push(one_hot(end, self.width()));
                }
                (steps.len() >= 2).then(|| Sample::Sequence(steps))
            })
            .collect()
    }
}

impl VocabularyCodec for SentenceVocabulary {
    fn width(&self) -> usize {
        self.tokens.len()
    }

    fn encode(&self, token: &str) -> HotVector {
        let index = self
            .index
            .get(&normalize(token))
            .copied()
            .filter(|&i| Some(i) != self.end_index)
            .unwrap_or(UNKNOWN_INDEX);

        one_hot(index, self.width())
    }

    fn decode(&self, vector: ArrayView1<f32>) -> String {
        argmax(vector)
            .and_then(|i| self.tokens.get(i))
            .map_or_else(|| UNKNOWN_TOKEN.to_string(), Clone::clone)
    }

    fn is_sentence_end(&self, vector: ArrayView1<f32>) -> bool {
        match self.end_index {
            Some(end) => vector == one_hot(end, self.width()),
            None => false,
        }
    }
}

/// Splits text into sentences of normalized words.
fn sentences(text: &str) -> impl Iterator<Item = Vec<String>> + '_ {
    text.split(['.', '!', '?'])
        .map(|sentence| words(sentence).collect::<Vec<_>>())
        .filter(|words| !words.is_empty())
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(normalize)
        .filter(|word| !word.is_empty())
}

fn normalize(word: &str) -> String {
    word.trim_matches('\'').to_lowercase()
}
