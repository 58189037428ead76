use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, error};

use crate::config::DecoderConfig;
use crate::future_cost::FutureCost;
use crate::hypothesis::{AppliedPhrase, HypId, Hypothesis, Lattice, Stack};
use crate::lm::LanguageModel;
use crate::phrase_table::PhraseTable;

/// Output of decoding one sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// Target words in order
    pub words: Vec<String>,
    /// Total score of the winning hypothesis
    pub logprob: f64,
    /// Translation model share of `logprob`
    pub tm_logprob: f64,
    /// Language model share of `logprob`
    pub lm_logprob: f64,
    /// Source span covered by each applied phrase, in order
    pub spans: Vec<(usize, usize)>,
    /// No hypothesis covered the whole sentence; this is a word-by-word
    /// translation with zero score
    pub fallback: bool,
}

impl Translation {
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    /// Score decomposition as reported in verbose mode.
    pub fn scores(&self) -> String {
        format!(
            "LM = {}, TM = {}, Total = {}",
            self.lm_logprob, self.tm_logprob, self.logprob
        )
    }
}

/// Counters for one sentence's search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Hypotheses created by expansion
    pub hypotheses: usize,
    /// Hypotheses discarded on insertion by recombination
    pub recombined: usize,
    /// Hypotheses dropped by the score threshold
    pub pruned: usize,
    /// Entries in the priority frontier at the end of the search
    pub frontier: usize,
}

/// Search state for a single sentence.
struct Search<'m, L: LanguageModel> {
    tm: &'m PhraseTable,
    lm: &'m L,
    config: &'m DecoderConfig,
    sentence: &'m [String],
    future: FutureCost,
    lattice: Lattice<'m, L::State>,
    /// `stacks[i]` holds hypotheses covering the first `i` words
    stacks: Vec<Stack<L::State>>,
    /// Expansions made with each target phrase
    histogram: HashMap<&'m str, usize>,
    /// Every hypothesis by descending total cost
    frontier: BinaryHeap<(OrderedFloat<f64>, Reverse<HypId>)>,
    stats: DecodeStats,
}

impl<'m, L: LanguageModel> Search<'m, L> {
    fn new(
        tm: &'m PhraseTable,
        lm: &'m L,
        config: &'m DecoderConfig,
        sentence: &'m [String],
    ) -> Self {
        let lattice = Lattice::new(lm.initial_state());
        let mut stacks: Vec<Stack<L::State>> =
            (0..=sentence.len()).map(|_| Stack::new()).collect();
        let root = lattice.root();
        stacks[0].offer(&lattice, root);
        let mut frontier = BinaryHeap::new();
        frontier.push((OrderedFloat(lattice[root].total_cost), Reverse(root)));
        Self {
            tm,
            lm,
            config,
            sentence,
            future: FutureCost::new(tm, sentence),
            lattice,
            stacks,
            histogram: HashMap::new(),
            frontier,
            stats: DecodeStats::default(),
        }
    }

    /// Expand the best hypotheses covering `i` words with every phrase
    /// starting at word `i`, then prune stack `i`.
    fn expand(&mut self, i: usize) {
        let n = self.sentence.len();
        let tm = self.tm;
        let current = self.stacks[i].best_first(&self.lattice, self.config.stack_size);
        for &id in current.iter() {
            for j in i + 1..=n {
                let Some(phrases) = tm.get(&self.sentence[i..j]) else {
                    continue;
                };
                for phrase in phrases {
                    let used = self.histogram.entry(phrase.english.as_str()).or_insert(0);
                    if *used >= self.config.k {
                        continue;
                    }
                    *used += 1;
                    let prev = &self.lattice[id];
                    let (lm_state, lm_logprob) = self.lm.score_words(prev.lm_state, phrase.words());
                    let mut logprob = prev.logprob + phrase.logprob + lm_logprob;
                    if j == n {
                        logprob += self.lm.end_score(lm_state);
                    }
                    let hyp = Hypothesis::extend(
                        id,
                        AppliedPhrase {
                            start: i,
                            end: j,
                            phrase,
                        },
                        logprob,
                        lm_state,
                        self.future.estimate(j),
                    );
                    let total_cost = hyp.total_cost;
                    let new_id = self.lattice.push(hyp);
                    self.stats.hypotheses += 1;
                    if !self.stacks[j].offer(&self.lattice, new_id) {
                        self.stats.recombined += 1;
                    }
                    self.frontier.push((OrderedFloat(total_cost), Reverse(new_id)));
                }
            }
        }
        self.stats.pruned += self.stacks[i].prune(&self.lattice, self.config.beam_margin);
    }

    fn run(&mut self) -> Option<HypId> {
        let n = self.sentence.len();
        for i in 0..n {
            self.expand(i);
        }
        self.stats.pruned += self.stacks[n].prune(&self.lattice, self.config.beam_margin);
        self.stats.frontier = self.frontier.len();
        self.stacks[n].best(&self.lattice)
    }

    fn translation(&self, winner: HypId) -> Translation {
        let applied = self.lattice.backtrace(winner);
        let logprob = self.lattice[winner].logprob;
        let tm_logprob: f64 = applied.iter().map(|a| a.phrase.logprob).sum();
        Translation {
            words: applied
                .iter()
                .flat_map(|a| a.phrase.words().map(String::from))
                .collect(),
            logprob,
            tm_logprob,
            lm_logprob: logprob - tm_logprob,
            spans: applied.iter().map(|a| (a.start, a.end)).collect(),
            fallback: false,
        }
    }

    /// Translate each word on its own with its best single-word phrase,
    /// or as itself.
    fn fallback(&self) -> Translation {
        let words = self
            .sentence
            .iter()
            .map(|word| {
                self.tm
                    .get_word(word)
                    .and_then(|phrases| phrases.first())
                    .map_or_else(|| word.clone(), |p| p.english.clone())
            })
            .collect();
        Translation {
            words,
            logprob: 0.0,
            tm_logprob: 0.0,
            lm_logprob: 0.0,
            spans: (0..self.sentence.len()).map(|i| (i, i + 1)).collect(),
            fallback: true,
        }
    }
}

/// Monotone phrase-based beam search decoder.
///
/// The models are only read, so one decoder can translate any number of
/// sentences; all search state is created afresh for each.
pub struct Decoder<'m, L: LanguageModel> {
    tm: &'m PhraseTable,
    lm: &'m L,
    config: DecoderConfig,
}

impl<'m, L: LanguageModel> Decoder<'m, L> {
    pub fn new(tm: &'m PhraseTable, lm: &'m L, config: DecoderConfig) -> Self {
        Self { tm, lm, config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn decode(&self, sentence: &[String]) -> Translation {
        self.decode_with_stats(sentence).0
    }

    pub fn decode_with_stats(&self, sentence: &[String]) -> (Translation, DecodeStats) {
        let mut search = Search::new(self.tm, self.lm, &self.config, sentence);
        let translation = match search.run() {
            Some(winner) => search.translation(winner),
            None => {
                error!("No valid hypotheses for sentence: {}", sentence.join(" "));
                search.fallback()
            }
        };
        debug!(
            "{} words: {} hypotheses, {} recombined, {} pruned, frontier {}",
            sentence.len(),
            search.stats.hypotheses,
            search.stats.recombined,
            search.stats.pruned,
            search.stats.frontier
        );
        (translation, search.stats)
    }
}
