use std::io::{stdin, stdout, BufRead, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use log::{error, info};
use serde::Serialize;

use libinasyl::engine::base::TaggingEngine;
use libinasyl::engine::ngram_viterbi_engine::{NGramViterbiEngine, NGramViterbiEngineBuilder};
use libinasyl::graph::TagMode;
use libinasyl::lm::smoothing::SmoothingMethod;
use libinasyl::stemmer::DictionaryStemmer;

use crate::utils::load_config;

#[derive(Debug, Serialize)]
struct JsonOutput {
    word: String,
    prediction: Option<String>,
    tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub struct TagOptions<'a> {
    pub words: Vec<String>,
    pub model: &'a str,
    pub mode: TagMode,
    pub method: SmoothingMethod,
    pub order: Option<usize>,
    pub config: Option<&'a str>,
    pub roots: Option<&'a str>,
    pub augmented: Option<(&'a str, f64)>,
    pub prune: bool,
    pub dot: bool,
    pub json_output: bool,
}

fn tag_one<W: Write>(
    engine: &mut NGramViterbiEngine,
    word: &str,
    opts: &TagOptions,
    out: &mut W,
) -> anyhow::Result<()> {
    if opts.dot {
        let joiner = engine.config().word_joiner;
        for sub_word in word.split(joiner).filter(|s| !s.is_empty()) {
            write!(out, "{}", engine.to_lattice(sub_word, opts.prune)?.dump_dot())?;
        }
    }

    let result = engine.tag_word(word);
    if opts.json_output {
        let output = match &result {
            Ok(tags) => JsonOutput {
                word: word.to_string(),
                prediction: Some(engine.render(word, tags)),
                tags: tags.iter().map(|t| t.to_token()).collect(),
                error: None,
            },
            Err(err) => JsonOutput {
                word: word.to_string(),
                prediction: None,
                tags: Vec::new(),
                error: Some(err.to_string()),
            },
        };
        writeln!(out, "{}", serde_json::to_string(&output)?)?;
        return Ok(());
    }

    match result {
        Ok(tags) => writeln!(out, "{}\t{}", word, engine.render(word, &tags))?,
        Err(err) => {
            error!("Cannot tag '{}': {}", word, err);
            writeln!(out, "{}\t!ERROR", word)?;
        }
    }
    Ok(())
}

/// 語をタグ付けして `word<TAB>prediction` を出力する。
pub fn tag(opts: TagOptions) -> anyhow::Result<()> {
    let mut builder = NGramViterbiEngineBuilder::new(opts.mode);
    builder
        .model_path(Path::new(opts.model))
        .smoothing(opts.method)
        .config(Arc::new(load_config(opts.config)?))
        .prune(opts.prune);
    if let Some(order) = opts.order {
        builder.order(order);
    }
    if let Some(roots) = opts.roots {
        let stemmer = DictionaryStemmer::load(Path::new(roots))?;
        info!("Loaded {} root words", stemmer.len());
        builder.stemmer(Arc::new(stemmer));
    }
    if let Some((path, weight)) = opts.augmented {
        builder.augmented_path(Path::new(path), weight);
    }
    let mut engine = builder.build()?;
    info!("{:?}", engine);

    let mut out = BufWriter::new(stdout().lock());
    if opts.words.is_empty() {
        for line in stdin().lock().lines() {
            let line = line?;
            let word = line.trim();
            if word.is_empty() {
                continue;
            }
            tag_one(&mut engine, word, &opts, &mut out)?;
        }
    } else {
        for word in &opts.words {
            tag_one(&mut engine, word, &opts, &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}
