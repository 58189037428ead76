/// Tuning parameters for one decoder run.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderConfig {
    /// Translations kept per source phrase, and the cap on how often one
    /// target phrase may be used as an expansion within a sentence.
    pub k: usize,
    /// Hypotheses expanded from each stack.
    pub stack_size: usize,
    /// Hypotheses further than this below the best of their stack are pruned.
    pub beam_margin: f64,
    /// Report the LM/TM score decomposition of each translation.
    pub verbose: bool,
}

impl DecoderConfig {
    pub const DEFAULT_K: usize = 500;
    pub const DEFAULT_STACK_SIZE: usize = 1000;
    pub const DEFAULT_BEAM_MARGIN: f64 = 15.0;
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            k: Self::DEFAULT_K,
            stack_size: Self::DEFAULT_STACK_SIZE,
            beam_margin: Self::DEFAULT_BEAM_MARGIN,
            verbose: false,
        }
    }
}
