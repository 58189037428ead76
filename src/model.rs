use anyhow::Result;
use rustfst::prelude::*;
use std::path::Path;
use std::sync::Arc;

use crate::arpa::ArpaReader;
use crate::lm::LanguageModel;
use crate::StdVectorFst;

/// Sentence start symbol
pub const BOS: &str = "<s>";
/// Sentence end symbol
pub const EOS: &str = "</s>";
/// Unknown word symbol
pub const UNK: &str = "<unk>";
/// Cost of a word the model cannot score at all (no `<unk>` entry)
pub const KINFBACKOFF: f32 = 99.00;

/// Backoff n-gram model stored as an FST.
///
/// States are n-gram histories; word arcs carry negative log10
/// probabilities and each non-root state has an epsilon arc carrying the
/// backoff cost to the next shorter history.
#[derive(Debug)]
pub struct NGramModel {
    /// Underlying FST
    fst: StdVectorFst,
    /// Word symbols
    symbols: Arc<SymbolTable>,
    /// Highest order in the model
    hi_order: u8,
    /// Order of each state (of its outgoing arcs)
    state_orders: Vec<u8>,
    /// N-Gram which reaches a given state
    state_ngrams: Vec<Vec<Label>>,
    /// Cost of the unknown word at the root
    unk_cost: f32,
}

impl NGramModel {
    /// The empty history, where backoff stops
    pub const ROOT: StateId = 0;

    pub(crate) fn new(
        fst: StdVectorFst,
        symbols: Arc<SymbolTable>,
        state_ngrams: Vec<Vec<Label>>,
        hi_order: u8,
        unk_cost: f32,
    ) -> Self {
        let state_orders = state_ngrams
            .iter()
            .map(|ngram| ngram.len() as u8 + 1)
            .collect();
        Self {
            fst,
            symbols,
            hi_order,
            state_orders,
            state_ngrams,
            unk_cost,
        }
    }

    /// Read a model in ARPA format.
    pub fn read_arpa(input: &Path) -> Result<Self> {
        let mut reader = ArpaReader::new();
        reader.read(input)?;
        reader.into_model()
    }

    pub fn hi_order(&self) -> u8 {
        self.hi_order
    }

    pub fn num_states(&self) -> usize {
        self.state_ngrams.len()
    }

    pub fn start(&self) -> StateId {
        self.fst.start().unwrap_or(Self::ROOT)
    }

    pub fn fst(&self) -> &StdVectorFst {
        &self.fst
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Order of the n-grams leaving `state`.
    pub fn state_order(&self, state: StateId) -> u8 {
        self.state_orders.get(state as usize).copied().unwrap_or(1)
    }

    /// History words represented by `state`.
    pub fn state_words(&self, state: StateId) -> Vec<&str> {
        self.state_ngrams
            .get(state as usize)
            .into_iter()
            .flatten()
            .filter_map(|&label| self.symbols.get_symbol(label))
            .collect()
    }

    /// Walk backoff arcs from `state` until one accepts `label`, returning
    /// the destination and the accumulated cost.
    fn walk(&self, mut state: StateId, label: Option<Label>) -> (StateId, f64) {
        let mut cost = 0.0f64;
        // Orders strictly decrease along backoff arcs, so this terminates
        while let Ok(trs) = self.fst.get_trs(state) {
            let trs = trs.trs();
            if let Some(label) = label {
                if let Ok(idx) = trs.binary_search_by(|tr| tr.ilabel.cmp(&label)) {
                    let tr = &trs[idx];
                    return (tr.nextstate, cost + *tr.weight.value() as f64);
                }
            }
            // Arcs are label-sorted so the backoff arc comes first
            match trs.first() {
                Some(tr) if tr.ilabel == EPS_LABEL => {
                    cost += *tr.weight.value() as f64;
                    state = tr.nextstate;
                }
                _ => break,
            }
        }
        (Self::ROOT, cost + self.unk_cost as f64)
    }
}

impl LanguageModel for NGramModel {
    type State = StateId;

    fn initial_state(&self) -> StateId {
        self.start()
    }

    fn score(&self, state: StateId, word: &str) -> (StateId, f64) {
        let label = self.symbols.get_label(word).filter(|&l| l != EPS_LABEL);
        let (next, cost) = self.walk(state, label);
        (next, -cost)
    }

    fn end_score(&self, state: StateId) -> f64 {
        self.score(state, EOS).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-5
    }

    fn model() -> NGramModel {
        NGramModel::read_arpa(&PathBuf::from("testdata/lm")).unwrap()
    }

    #[test]
    fn it_starts_after_bos() {
        let lm = model();
        assert_eq!(lm.hi_order(), 3);
        assert_eq!(lm.state_words(lm.initial_state()), vec![BOS]);
        assert_eq!(lm.state_order(lm.initial_state()), 2);
        assert_eq!(lm.state_words(NGramModel::ROOT), Vec::<&str>::new());
    }

    #[test]
    fn it_scores_known_ngrams() {
        let lm = model();
        // "<s> the" is a bigram in the model
        let (state, logprob) = lm.score(lm.initial_state(), "the");
        assert!(close(logprob, -0.5));
        assert_eq!(lm.state_words(state), vec![BOS, "the"]);
        // "<s> the house" is a trigram
        let (state, logprob) = lm.score(state, "house");
        assert!(close(logprob, -0.2));
        assert_eq!(lm.state_words(state), vec!["the", "house"]);
    }

    #[test]
    fn it_backs_off() {
        let lm = model();
        // no "<s> house": backoff(<s>) + p(house)
        let (state, logprob) = lm.score(lm.initial_state(), "house");
        assert!(close(logprob, -0.3 + -1.2));
        assert_eq!(lm.state_words(state), vec!["house"]);
    }

    #[test]
    fn it_scores_unknown_words() {
        let lm = model();
        let (state, logprob) = lm.score(lm.initial_state(), "zzyzx");
        assert_eq!(state, NGramModel::ROOT);
        assert!(close(logprob, -0.3 + -3.0));
    }

    #[test]
    fn it_scores_sentence_end() {
        let lm = model();
        let (state, _) = lm.score_words(lm.initial_state(), ["the", "house"]);
        // "the house </s>" is a trigram
        assert!(close(lm.end_score(state), -0.1));
    }

    #[test]
    fn it_recombines_equivalent_histories() {
        let lm = model();
        let (a, _) = lm.score_words(lm.initial_state(), ["the", "small", "house"]);
        let (b, _) = lm.score_words(lm.initial_state(), ["a", "small", "house"]);
        assert_eq!(a, b);
    }
}
