use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::bail;
use log::info;

use libinasyl::batch::{evaluate_folds, CancelFlag, EvaluateOptions};
use libinasyl::graph::TagMode;
use libinasyl::lm::smoothing::SmoothingMethod;
use libinasyl::stemmer::{DictionaryStemmer, Stemmer};

use crate::utils::{expand_inputs, load_config};

pub struct EvaluateCliOptions<'a> {
    pub test: &'a [String],
    pub models: &'a [String],
    pub augmented_models: &'a [String],
    pub augmented_weight: f64,
    pub mode: TagMode,
    pub method: SmoothingMethod,
    pub order: Option<usize>,
    pub config: Option<&'a str>,
    pub roots: Option<&'a str>,
    pub prune: bool,
    pub validation: bool,
    pub threads: Option<usize>,
    pub out_dir: &'a str,
}

/// テストファイルごとに評価し、結果の TSV と JSON のログを out_dir に書く。
pub fn evaluate(opts: EvaluateCliOptions) -> anyhow::Result<()> {
    let test = expand_inputs(opts.test)?;
    if test.is_empty() {
        bail!("No test files are given");
    }
    let models: Vec<PathBuf> = opts.models.iter().map(PathBuf::from).collect();
    if models.len() != 1 && models.len() != test.len() {
        bail!(
            "{} models for {} test files: give one model or one per test file",
            models.len(),
            test.len()
        );
    }

    let stemmer: Option<Arc<dyn Stemmer>> = match opts.roots {
        Some(roots) => Some(Arc::new(DictionaryStemmer::load(Path::new(roots))?)),
        None => None,
    };
    let augmented = if opts.augmented_models.is_empty() {
        None
    } else {
        let paths = opts.augmented_models.iter().map(PathBuf::from).collect();
        Some((paths, opts.augmented_weight))
    };

    let options = EvaluateOptions {
        mode: opts.mode,
        order: opts.order,
        method: opts.method,
        config: Arc::new(load_config(opts.config)?),
        stemmer,
        augmented,
        prune: opts.prune,
        validation: opts.validation,
        threads: opts.threads,
    };
    let report = evaluate_folds(
        &test,
        &models,
        &options,
        Path::new(opts.out_dir),
        &CancelFlag::new(),
    )?;

    for fold in &report.folds {
        if let Some(summary) = &fold.summary {
            info!(
                "{}: WER={:.5} ({}/{}), UER={:.5} ({}/{})",
                fold.input,
                summary.word_error_rate,
                summary.wrong_words,
                summary.total_words,
                summary.unit_error_rate,
                summary.wrong_units,
                summary.total_units
            );
        }
    }
    if report.failed() > 0 {
        bail!("{} of {} folds failed", report.failed(), report.folds.len());
    }
    Ok(())
}
