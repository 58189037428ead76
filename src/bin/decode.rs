use anyhow::Result;
use clap::Parser;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use phrase_decoder::{read_sentences, Decoder, DecoderConfig, NGramModel, PhraseTable};

/// Translate sentences with a monotone phrase-based beam search.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// File containing sentences to translate
    #[arg(short, long, default_value = "data/input")]
    input: PathBuf,
    /// File containing translation model
    #[arg(short = 't', long = "translation-model", default_value = "data/tm")]
    tm: PathBuf,
    /// File containing ARPA-format language model
    #[arg(short = 'l', long = "language-model", default_value = "data/lm")]
    lm: PathBuf,
    /// Number of sentences to decode (default: no limit)
    #[arg(short = 'n', long = "num-sentences")]
    num_sentences: Option<usize>,
    /// Limit on translations per phrase and uses per target phrase
    #[arg(short = 'k', long = "translations-per-phrase", default_value_t = DecoderConfig::DEFAULT_K)]
    k: usize,
    /// Maximum stack size
    #[arg(short = 's', long = "stack-size", default_value_t = DecoderConfig::DEFAULT_STACK_SIZE)]
    stack_size: usize,
    /// Drop hypotheses this far below the best of their stack
    #[arg(long, default_value_t = DecoderConfig::DEFAULT_BEAM_MARGIN)]
    beam_margin: f64,
    /// Print the LM/TM decomposition of each translation
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let args = Args::parse();
    let config = DecoderConfig {
        k: args.k,
        stack_size: args.stack_size,
        beam_margin: args.beam_margin,
        verbose: args.verbose,
    };

    let mut tm = PhraseTable::read(&args.tm, config.k)?;
    let lm = NGramModel::read_arpa(&args.lm)?;
    let mut sentences = read_sentences(&args.input)?;
    if let Some(n) = args.num_sentences {
        sentences.truncate(n);
    }
    tm.register_unknown_words(&sentences);

    info!("Decoding {} using beam search...", args.input.display());
    let decoder = Decoder::new(&tm, &lm, config);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for sentence in sentences.iter() {
        let translation = decoder.decode(sentence);
        writeln!(out, "{}", translation.text())?;
        if decoder.config().verbose {
            out.flush()?;
            eprintln!("{}", translation.scores());
        }
    }
    out.flush()?;
    Ok(())
}
