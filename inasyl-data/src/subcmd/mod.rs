pub mod augment;
pub mod build_ngram;
pub mod compare;
pub mod dump_ngram;
pub mod evaluate;
pub mod init_config;
pub mod tag;
