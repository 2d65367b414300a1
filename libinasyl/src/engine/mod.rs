pub mod base;
pub mod ngram_viterbi_engine;
