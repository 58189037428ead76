use anyhow::{anyhow, Result};
use rustfst::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use crate::model::{NGramModel, BOS, KINFBACKOFF, UNK};
use crate::StdVectorFst;

/// Where we are in the ARPA file
#[derive(Debug, Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Data,
    NGrams(u8),
    End,
}

/// One n-gram line.
#[derive(Debug)]
struct ArpaEntry {
    /// Words of the n-gram, history first.
    words: Vec<Label>,
    /// Negative log10 probability of the last word given the others.
    cost: f32,
    /// Negative log10 backoff weight of the n-gram used as a history.
    backoff: f32,
}

/// Metadata for history states
#[derive(Debug)]
struct HistoryState {
    /// Words of the history.
    ngram: Vec<Label>,
    /// Cost of backing off from this history.
    backoff_cost: f32,
}

/// Read an ARPA language model and compile it to a backoff FST.
#[derive(Debug)]
pub struct ArpaReader {
    /// Word symbols, shared by input and output labels
    symbols: SymbolTable,
    /// Every n-gram in file order
    entries: Vec<ArpaEntry>,
    /// Counts declared in the `\data\` section, by order
    declared: Vec<usize>,
    /// Highest order seen
    hi_order: u8,
}

impl ArpaReader {
    pub fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            entries: Vec::new(),
            declared: Vec::new(),
            hi_order: 0,
        }
    }

    fn parse_count(line: &str) -> Result<(u8, usize)> {
        let spec = line
            .strip_prefix("ngram")
            .ok_or_else(|| anyhow!("expected 'ngram N=count', found {:?}", line))?;
        let (order, count) = spec
            .trim()
            .split_once('=')
            .ok_or_else(|| anyhow!("expected 'ngram N=count', found {:?}", line))?;
        Ok((order.trim().parse()?, count.trim().parse()?))
    }

    fn parse_header(line: &str) -> Option<u8> {
        line.strip_prefix('\\')?
            .strip_suffix("-grams:")?
            .parse()
            .ok()
    }

    fn parse_entry(&mut self, order: u8, line: &str) -> Result<()> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let n = order as usize;
        if fields.len() != n + 1 && fields.len() != n + 2 {
            return Err(anyhow!("bad {}-gram line {:?}", order, line));
        }
        let logprob: f32 = fields[0].parse()?;
        let backoff: f32 = match fields.get(n + 1) {
            Some(b) => b.parse()?,
            None => 0.0,
        };
        let words = fields[1..=n]
            .iter()
            .map(|w| self.symbols.add_symbol(*w))
            .collect();
        self.entries.push(ArpaEntry {
            words,
            cost: -logprob,
            backoff: -backoff,
        });
        Ok(())
    }

    /// Consume the lines of an ARPA file.
    pub fn read_lines<B: BufRead>(&mut self, input: B) -> Result<()> {
        let mut section = Section::Preamble;
        for (lineno, line) in input.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let wrap = |e: anyhow::Error| anyhow!("line {}: {}", lineno + 1, e);
            if line == "\\data\\" {
                section = Section::Data;
            } else if line == "\\end\\" {
                section = Section::End;
                break;
            } else if let Some(order) = Self::parse_header(line) {
                if order == 0 {
                    return Err(wrap(anyhow!("n-gram order must be positive")));
                }
                section = Section::NGrams(order);
                self.hi_order = self.hi_order.max(order);
            } else {
                match section {
                    Section::Preamble | Section::End => {}
                    Section::Data => {
                        let (order, count) = Self::parse_count(line).map_err(wrap)?;
                        if order == 0 {
                            return Err(wrap(anyhow!("n-gram order must be positive")));
                        }
                        if self.declared.len() < order as usize {
                            self.declared.resize(order as usize, 0);
                        }
                        self.declared[order as usize - 1] = count;
                    }
                    Section::NGrams(order) => self.parse_entry(order, line).map_err(wrap)?,
                }
            }
        }
        if section != Section::End {
            return Err(anyhow!("missing \\end\\ marker"));
        }
        if self.entries.is_empty() {
            return Err(anyhow!("no n-grams found"));
        }
        Ok(())
    }

    pub fn read(&mut self, input: &Path) -> Result<()> {
        let fh = File::open(input)
            .map_err(|e| anyhow!("cannot open language model {}: {}", input.display(), e))?;
        self.read_lines(BufReader::new(fh))
            .map_err(|e| anyhow!("{}: {}", input.display(), e))
    }

    fn check_counts(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(anyhow!("no n-grams found"));
        }
        let mut found = vec![0usize; self.hi_order as usize];
        for entry in self.entries.iter() {
            found[entry.words.len() - 1] += 1;
        }
        for (idx, &declared) in self.declared.iter().enumerate() {
            let actual = found.get(idx).copied().unwrap_or(0);
            if declared != actual {
                return Err(anyhow!(
                    "declared {} {}-grams but found {}",
                    declared,
                    idx + 1,
                    actual
                ));
            }
        }
        Ok(())
    }

    /// Longest suffix of `ngram`, at most `max_len` long, that is a history.
    fn longest_suffix(
        histories: &HashMap<Vec<Label>, StateId>,
        ngram: &[Label],
        max_len: usize,
    ) -> StateId {
        let first = ngram.len().saturating_sub(max_len);
        (first..=ngram.len())
            .find_map(|i| histories.get(&ngram[i..]).copied())
            .unwrap_or(NGramModel::ROOT)
    }

    /// Build the backoff FST.  Every n-gram shorter than the model order is
    /// a history state; each history has an epsilon arc to its longest
    /// proper suffix carrying the backoff cost.
    pub fn into_model(mut self) -> Result<NGramModel> {
        self.check_counts()?;
        let bos = self.symbols.add_symbol(BOS);
        let max_history = self.hi_order as usize - 1;

        let mut backoffs: HashMap<&[Label], f32> = HashMap::new();
        for entry in self.entries.iter() {
            backoffs.insert(entry.words.as_slice(), entry.backoff);
        }
        let mut keys: Vec<Vec<Label>> = vec![vec![]];
        if max_history > 0 {
            keys.push(vec![bos]);
        }
        for entry in self.entries.iter() {
            let n = entry.words.len();
            keys.push(entry.words[..n - 1].to_vec());
            if n <= max_history {
                keys.push(entry.words.clone());
            }
        }
        keys.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
        keys.dedup();

        let mut fst = StdVectorFst::new();
        let mut histories: HashMap<Vec<Label>, StateId> = HashMap::new();
        let mut states: Vec<HistoryState> = Vec::with_capacity(keys.len());
        for ngram in keys {
            let s = fst.add_state();
            let backoff_cost = backoffs.get(ngram.as_slice()).copied().unwrap_or(0.0);
            histories.insert(ngram.clone(), s);
            states.push(HistoryState {
                ngram,
                backoff_cost,
            });
        }
        for (s, state) in states.iter().enumerate() {
            if state.ngram.is_empty() {
                continue;
            }
            let backoff_state = Self::longest_suffix(&histories, &state.ngram[1..], max_history);
            fst.add_tr(
                s as StateId,
                Tr::new(EPS_LABEL, EPS_LABEL, state.backoff_cost, backoff_state),
            )?;
        }
        for entry in self.entries.iter() {
            let n = entry.words.len();
            let origin = histories
                .get(&entry.words[..n - 1])
                .copied()
                .ok_or_else(|| anyhow!("no history state for {:?}", entry.words))?;
            let destination = Self::longest_suffix(&histories, &entry.words, max_history);
            let label = entry.words[n - 1];
            fst.add_tr(origin, Tr::new(label, label, entry.cost, destination))?;
        }
        let start = histories.get(&vec![bos]).copied().unwrap_or(NGramModel::ROOT);
        fst.set_start(start)?;
        tr_sort(&mut fst, ILabelCompare {});

        let unk_cost = self
            .symbols
            .get_label(UNK)
            .and_then(|unk| self.entries.iter().find(|e| e.words == [unk]))
            .map(|e| e.cost)
            .unwrap_or(KINFBACKOFF);
        let syms = Arc::new(self.symbols);
        fst.set_input_symbols(Arc::clone(&syms));
        fst.set_output_symbols(Arc::clone(&syms));
        let state_ngrams = states.into_iter().map(|s| s.ngram).collect();
        Ok(NGramModel::new(fst, syms, state_ngrams, self.hi_order, unk_cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const TINY: &str = "\\data\\\nngram 1=3\nngram 2=1\n\n\\1-grams:\n-1.0\t<s>\t-0.5\n-0.5\ta\t-0.25\n-0.75\t</s>\n\n\\2-grams:\n-0.1\t<s> a\n\n\\end\\\n";

    #[test]
    fn it_reads_an_arpa_file() {
        let mut reader = ArpaReader::new();
        reader.read(&PathBuf::from("testdata/lm")).unwrap();
        assert_eq!(reader.hi_order, 3);
        assert!(reader.symbols.contains_symbol("house"));
        reader.check_counts().unwrap();
    }

    #[test]
    fn it_builds_history_states() {
        let mut reader = ArpaReader::new();
        reader.read_lines(TINY.as_bytes()).unwrap();
        let model = reader.into_model().unwrap();
        assert_eq!(model.hi_order(), 2);
        // root, <s>, a, </s>
        assert_eq!(model.num_states(), 4);
        assert_eq!(model.state_words(model.start()), vec!["<s>"]);
    }

    #[test]
    fn it_rejects_bad_counts() {
        let bad = TINY.replace("ngram 2=1", "ngram 2=2");
        let mut reader = ArpaReader::new();
        reader.read_lines(bad.as_bytes()).unwrap();
        assert!(reader.into_model().is_err());
    }

    #[test]
    fn it_rejects_truncated_files() {
        let bad = TINY.replace("\\end\\", "");
        let mut reader = ArpaReader::new();
        assert!(reader.read_lines(bad.as_bytes()).is_err());
    }

    #[test]
    fn it_rejects_bad_lines() {
        let bad = TINY.replace("-0.1\t<s> a", "-0.1\t<s> a b c");
        let mut reader = ArpaReader::new();
        let err = reader.read_lines(bad.as_bytes()).unwrap_err();
        assert!(err.to_string().starts_with("line 11"));
    }
}
