pub mod base;
pub mod ngram_model;
pub mod smoothing;
