use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Index;

use crate::phrase_table::Phrase;

/// Index of a hypothesis in its sentence's [`Lattice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HypId(usize);

/// A phrase applied to source words `start..end`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPhrase<'a> {
    pub start: usize,
    pub end: usize,
    pub phrase: &'a Phrase,
}

/// One partial translation.  Never modified once in the lattice.
#[derive(Debug, Clone)]
pub struct Hypothesis<'a, S> {
    /// Translation and language model score so far
    pub logprob: f64,
    pub lm_state: S,
    /// Hypothesis this one extends (`None` only for the initial one)
    pub predecessor: Option<HypId>,
    /// Phrase that led here from the predecessor
    pub phrase: Option<AppliedPhrase<'a>>,
    /// Estimated score of the uncovered words
    pub future_cost: f64,
    /// `logprob + future_cost`, only used for ordering
    pub total_cost: f64,
}

impl<'a, S> Hypothesis<'a, S> {
    pub fn initial(lm_state: S) -> Self {
        Self {
            logprob: 0.0,
            lm_state,
            predecessor: None,
            phrase: None,
            future_cost: 0.0,
            total_cost: 0.0,
        }
    }

    pub fn extend(
        predecessor: HypId,
        phrase: AppliedPhrase<'a>,
        logprob: f64,
        lm_state: S,
        future_cost: f64,
    ) -> Self {
        Self {
            logprob,
            lm_state,
            predecessor: Some(predecessor),
            phrase: Some(phrase),
            future_cost,
            total_cost: logprob + future_cost,
        }
    }

    /// Number of source words covered.
    pub fn coverage(&self) -> usize {
        self.phrase.as_ref().map_or(0, |p| p.end)
    }
}

/// Arena holding every hypothesis created for one sentence.  Hypotheses
/// dropped from a stack stay here as long as the sentence is decoded, so
/// predecessor links never dangle.
#[derive(Debug)]
pub struct Lattice<'a, S> {
    hyps: Vec<Hypothesis<'a, S>>,
}

impl<'a, S> Lattice<'a, S> {
    pub fn new(initial_state: S) -> Self {
        Self {
            hyps: vec![Hypothesis::initial(initial_state)],
        }
    }

    pub fn root(&self) -> HypId {
        HypId(0)
    }

    pub fn push(&mut self, hyp: Hypothesis<'a, S>) -> HypId {
        let id = HypId(self.hyps.len());
        self.hyps.push(hyp);
        id
    }

    pub fn len(&self) -> usize {
        self.hyps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hyps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hypothesis<'a, S>> {
        self.hyps.iter()
    }

    /// Phrases applied on the way to `id`, first to last.
    pub fn backtrace(&self, id: HypId) -> Vec<&AppliedPhrase<'a>> {
        let mut phrases = Vec::new();
        let mut cur = Some(id);
        while let Some(id) = cur {
            let hyp = &self[id];
            phrases.extend(hyp.phrase.as_ref());
            cur = hyp.predecessor;
        }
        phrases.reverse();
        phrases
    }
}

impl<'a, S> Index<HypId> for Lattice<'a, S> {
    type Output = Hypothesis<'a, S>;

    fn index(&self, id: HypId) -> &Self::Output {
        &self.hyps[id.0]
    }
}

/// Best hypothesis for each language model state, for one coverage count.
#[derive(Debug)]
pub struct Stack<S> {
    entries: HashMap<S, HypId>,
}

impl<S> Default for Stack<S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<S: Copy + Eq + Hash> Stack<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current best hypothesis with this state, if any.
    pub fn get(&self, state: &S) -> Option<HypId> {
        self.entries.get(state).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = HypId> + '_ {
        self.entries.values().copied()
    }

    /// Recombine: keep `id` only if no hypothesis with the same state
    /// scores at least as well.  Returns whether `id` was kept.
    pub fn offer(&mut self, lattice: &Lattice<'_, S>, id: HypId) -> bool {
        let hyp = &lattice[id];
        match self.get(&hyp.lm_state) {
            Some(cur) if lattice[cur].logprob >= hyp.logprob => false,
            _ => {
                self.entries.insert(hyp.lm_state, id);
                true
            }
        }
    }

    /// Up to `limit` hypotheses, best first.  Ties go to the older one.
    pub fn best_first(&self, lattice: &Lattice<'_, S>, limit: usize) -> Vec<HypId> {
        let mut ids: Vec<HypId> = self.ids().collect();
        ids.sort_by_key(|&id| (Reverse(OrderedFloat(lattice[id].logprob)), id));
        ids.truncate(limit);
        ids
    }

    pub fn best(&self, lattice: &Lattice<'_, S>) -> Option<HypId> {
        self.best_first(lattice, 1).into_iter().next()
    }

    /// Drop hypotheses scoring more than `margin` below the best.
    /// Returns how many were dropped.
    pub fn prune(&mut self, lattice: &Lattice<'_, S>, margin: f64) -> usize {
        let Some(best) = self.best(lattice) else {
            return 0;
        };
        let threshold = lattice[best].logprob - margin;
        let before = self.entries.len();
        self.entries.retain(|_, id| lattice[*id].logprob >= threshold);
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn applied(phrase: &Phrase, start: usize, end: usize) -> AppliedPhrase<'_> {
        AppliedPhrase { start, end, phrase }
    }

    #[test]
    fn it_backtraces_in_order() {
        let x = Phrase::new("x", -1.0);
        let y = Phrase::new("y", -2.0);
        let mut lattice = Lattice::new(0u32);
        let a = lattice.push(Hypothesis::extend(lattice.root(), applied(&x, 0, 1), -1.0, 1, 0.0));
        let b = lattice.push(Hypothesis::extend(a, applied(&y, 1, 3), -3.0, 2, 0.0));
        let english: Vec<&str> = lattice
            .backtrace(b)
            .iter()
            .map(|p| p.phrase.english.as_str())
            .collect();
        assert_eq!(english, vec!["x", "y"]);
        assert_eq!(lattice[b].coverage(), 3);
        assert!(lattice.backtrace(lattice.root()).is_empty());
    }

    #[test]
    fn it_recombines_by_state() {
        let x = Phrase::new("x", 0.0);
        let mut lattice = Lattice::new(0u32);
        let mut stack = Stack::new();
        let root = lattice.root();
        let worse = lattice.push(Hypothesis::extend(root, applied(&x, 0, 1), -2.0, 7, 0.0));
        let better = lattice.push(Hypothesis::extend(root, applied(&x, 0, 1), -1.0, 7, 0.0));
        let tied = lattice.push(Hypothesis::extend(root, applied(&x, 0, 1), -1.0, 7, 0.0));
        let other = lattice.push(Hypothesis::extend(root, applied(&x, 0, 1), -5.0, 8, 0.0));
        assert!(stack.offer(&lattice, worse));
        assert!(stack.offer(&lattice, better));
        assert!(!stack.offer(&lattice, tied));
        assert!(stack.offer(&lattice, other));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.get(&7), Some(better));
        assert_eq!(stack.best_first(&lattice, 10), vec![better, other]);
        assert_eq!(stack.best_first(&lattice, 1), vec![better]);
    }

    #[test]
    fn it_prunes_below_margin() {
        let x = Phrase::new("x", 0.0);
        let mut lattice = Lattice::new(0u32);
        let mut stack = Stack::new();
        for (state, logprob) in [(1, -1.0), (2, -10.0), (3, -16.0), (4, -16.5)] {
            let id = lattice.push(Hypothesis::extend(lattice.root(), applied(&x, 0, 1), logprob, state, 0.0));
            stack.offer(&lattice, id);
        }
        assert_eq!(stack.prune(&lattice, 15.0), 1);
        assert_eq!(stack.len(), 3);
        assert!(stack.get(&4).is_none());
        assert!(stack.get(&3).is_some());
    }

    proptest! {
        #[test]
        fn recombination_keeps_the_best(offers in prop::collection::vec((0u8..4, -50.0f64..0.0), 1..40)) {
            let x = Phrase::new("x", 0.0);
            let mut lattice = Lattice::new(0u8);
            let mut stack = Stack::new();
            for &(state, logprob) in offers.iter() {
                let id = lattice.push(Hypothesis::extend(lattice.root(), applied(&x, 0, 1), logprob, state, 0.0));
                stack.offer(&lattice, id);
            }
            for state in 0u8..4 {
                let best = offers
                    .iter()
                    .filter(|(s, _)| *s == state)
                    .map(|(_, lp)| *lp)
                    .reduce(f64::max);
                let kept = stack.get(&state).map(|id| lattice[id].logprob);
                prop_assert_eq!(kept, best);
            }
        }

        #[test]
        fn pruning_respects_margin(scores in prop::collection::vec(-60.0f64..0.0, 1..40), margin in 0.0f64..30.0) {
            let x = Phrase::new("x", 0.0);
            let mut lattice = Lattice::new(0usize);
            let mut stack = Stack::new();
            for (state, &logprob) in scores.iter().enumerate() {
                let id = lattice.push(Hypothesis::extend(lattice.root(), applied(&x, 0, 1), logprob, state, 0.0));
                stack.offer(&lattice, id);
            }
            stack.prune(&lattice, margin);
            let best = scores.iter().copied().reduce(f64::max).unwrap();
            prop_assert!(!stack.is_empty());
            for id in stack.ids() {
                prop_assert!(lattice[id].logprob >= best - margin);
            }
        }
    }
}
