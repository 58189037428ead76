use crate::phrase_table::PhraseTable;

/// Best single-word translation score of `word`, or zero if the table
/// cannot translate it (it would pass through as itself).
fn word_cost(tm: &PhraseTable, word: &str) -> f64 {
    tm.get_word(word)
        .and_then(|phrases| phrases.iter().map(|p| p.logprob).reduce(f64::max))
        .unwrap_or(0.0)
}

/// Estimate the score of translating `words`, each word independently and
/// ignoring the language model.
pub fn future_cost(tm: &PhraseTable, words: &[String]) -> f64 {
    words.iter().map(|w| word_cost(tm, w)).sum()
}

/// Future cost of every suffix of one sentence.
#[derive(Debug, Clone)]
pub struct FutureCost {
    /// `suffix[j]` is the estimate for words `j..`
    suffix: Vec<f64>,
}

impl FutureCost {
    pub fn new(tm: &PhraseTable, sentence: &[String]) -> Self {
        let mut suffix = vec![0.0; sentence.len() + 1];
        for (j, word) in sentence.iter().enumerate().rev() {
            suffix[j] = suffix[j + 1] + word_cost(tm, word);
        }
        Self { suffix }
    }

    /// Estimate for the words from `j` to the end of the sentence.
    pub fn estimate(&self, j: usize) -> f64 {
        self.suffix.get(j).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phrase_table::Phrase;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    fn table() -> PhraseTable {
        let mut tm = PhraseTable::new();
        tm.insert(words("a"), Phrase::new("x", -1.0));
        tm.insert(words("a"), Phrase::new("z", -0.5));
        tm.insert(words("b"), Phrase::new("y", -2.0));
        tm.insert(words("a b"), Phrase::new("xy", -0.1));
        tm
    }

    #[test]
    fn it_sums_best_single_word_scores() {
        let tm = table();
        assert_eq!(future_cost(&tm, &words("a b")), -2.5);
        assert_eq!(future_cost(&tm, &words("")), 0.0);
    }

    #[test]
    fn it_treats_unknown_words_as_free() {
        let tm = table();
        assert_eq!(future_cost(&tm, &words("c a c")), -0.5);
    }

    #[test]
    fn it_matches_suffix_estimates() {
        let tm = table();
        let sentence = words("a c b a");
        let fc = FutureCost::new(&tm, &sentence);
        for j in 0..=sentence.len() {
            assert!((fc.estimate(j) - future_cost(&tm, &sentence[j..])).abs() < 1e-12);
        }
        assert_eq!(fc.estimate(sentence.len()), 0.0);
    }
}
