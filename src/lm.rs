use std::fmt::Debug;
use std::hash::Hash;

/// A left-to-right language model with an opaque rolling context.
///
/// Two hypotheses whose states compare equal score every continuation
/// identically, which is what makes recombination sound.
pub trait LanguageModel {
    type State: Copy + Eq + Hash + Debug;

    /// Context at the start of a sentence.
    fn initial_state(&self) -> Self::State;

    /// Score `word` after `state`, returning the new context and the
    /// log-probability of the word.
    fn score(&self, state: Self::State, word: &str) -> (Self::State, f64);

    /// Log-probability of ending the sentence in `state`.
    fn end_score(&self, state: Self::State) -> f64;

    /// Score a sequence of words, threading the state through.
    fn score_words<'a, I>(&self, state: Self::State, words: I) -> (Self::State, f64)
    where
        I: IntoIterator<Item = &'a str>,
    {
        words
            .into_iter()
            .fold((state, 0.0), |(state, total), word| {
                let (next, logprob) = self.score(state, word);
                (next, total + logprob)
            })
    }
}
