pub mod augmentation;
pub mod batch;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod lm;
pub mod stemmer;
pub mod tag;
