use anyhow::{anyhow, Result};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

/// Field separator in phrase table files
const SEPARATOR: &str = " ||| ";

/// One candidate translation of a source phrase.
#[derive(Debug, Clone, PartialEq)]
pub struct Phrase {
    /// Target words, space separated.
    pub english: String,
    /// Translation model log-probability.
    pub logprob: f64,
}

impl Phrase {
    pub fn new(english: impl Into<String>, logprob: f64) -> Self {
        Self {
            english: english.into(),
            logprob,
        }
    }

    /// Translate a word as itself with probability one.
    pub fn passthrough(word: &str) -> Self {
        Self::new(word, 0.0)
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.english.split_whitespace()
    }
}

/// Maps source word sequences to their candidate translations, best first.
#[derive(Debug, Default, Clone)]
pub struct PhraseTable {
    entries: HashMap<Vec<String>, Vec<Phrase>>,
}

impl PhraseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a `source ||| target ||| logprob` file, keeping the `k` best
    /// translations of each source phrase.
    pub fn read(input: &Path, k: usize) -> Result<Self> {
        let fh = File::open(input)
            .map_err(|e| anyhow!("cannot open phrase table {}: {}", input.display(), e))?;
        let mut table = Self::new();
        for (lineno, line) in BufReader::new(fh).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(SEPARATOR).collect();
            if fields.len() != 3 {
                return Err(anyhow!(
                    "{}:{}: expected 3 fields, found {}",
                    input.display(),
                    lineno + 1,
                    fields.len()
                ));
            }
            let logprob: f64 = fields[2].trim().parse().map_err(|e| {
                anyhow!("{}:{}: bad logprob {:?}: {}", input.display(), lineno + 1, fields[2], e)
            })?;
            let source: Vec<String> = fields[0].split_whitespace().map(String::from).collect();
            if source.is_empty() {
                return Err(anyhow!("{}:{}: empty source phrase", input.display(), lineno + 1));
            }
            table
                .entries
                .entry(source)
                .or_default()
                .push(Phrase::new(fields[1].trim(), logprob));
        }
        for phrases in table.entries.values_mut() {
            // Stable, so equal scores keep file order
            phrases.sort_by(|a, b| b.logprob.total_cmp(&a.logprob));
            phrases.truncate(k);
        }
        Ok(table)
    }

    /// Add a translation, keeping the list for `source` sorted best first.
    pub fn insert(&mut self, source: Vec<String>, phrase: Phrase) {
        let phrases = self.entries.entry(source).or_default();
        let pos = phrases.partition_point(|p| p.logprob >= phrase.logprob);
        phrases.insert(pos, phrase);
    }

    pub fn get(&self, source: &[String]) -> Option<&[Phrase]> {
        self.entries.get(source).map(Vec::as_slice)
    }

    pub fn contains(&self, source: &[String]) -> bool {
        self.entries.contains_key(source)
    }

    /// Translations of a single word.
    pub fn get_word(&self, word: &str) -> Option<&[Phrase]> {
        self.get(&[word.to_string()])
    }

    /// Number of distinct source phrases.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Make every word of `sentences` translatable by letting unknown
    /// words stand for themselves. Returns the words that were added.
    pub fn register_unknown_words<S: AsRef<[String]>>(&mut self, sentences: &[S]) -> Vec<String> {
        let vocab: BTreeSet<&String> = sentences.iter().flat_map(|s| s.as_ref()).collect();
        let unknown: Vec<String> = vocab
            .into_iter()
            .filter(|word| self.get_word(word).is_none())
            .cloned()
            .collect();
        for word in unknown.iter() {
            warn!("'{}' not in translation model! Using as-is.", word);
            self.insert(vec![word.clone()], Phrase::passthrough(word));
        }
        unknown
    }
}
