use anyhow::Result;
use rustfst::fst_impls::VectorFst;
use rustfst::semirings::TropicalWeight;
use std::fs::File;
use std::io::prelude::*;
use std::io::BufReader;
use std::path::Path;

/// rustfst does not define this but we will
type StdVectorFst = VectorFst<TropicalWeight>;

/// Reading ARPA files into backoff FSTs
pub mod arpa;
/// Decoder tuning parameters
pub mod config;
/// Beam search over phrase segmentations
pub mod decoder;
/// Heuristic estimate of the cost of untranslated words
pub mod future_cost;
/// Partial translations and the stacks that hold them
pub mod hypothesis;
/// Language model interface
pub mod lm;
/// N-Gram language model backed by an FST
pub mod model;
/// Translation model
pub mod phrase_table;

pub use config::DecoderConfig;
pub use decoder::{DecodeStats, Decoder, Translation};
pub use future_cost::{future_cost, FutureCost};
pub use lm::LanguageModel;
pub use model::NGramModel;
pub use phrase_table::{Phrase, PhraseTable};

/// Read input sentences as whitespace-separated lines
pub fn read_sentences(input: &Path) -> Result<Vec<Vec<String>>> {
    let fh = File::open(input)?;
    let mut sentences = Vec::new();
    for line in BufReader::new(fh).lines() {
        let line = line?;
        sentences.push(line.split_whitespace().map(String::from).collect());
    }
    Ok(sentences)
}
