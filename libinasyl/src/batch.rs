use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use log::{error, info, warn};
use regex::Regex;
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::augmentation::{augment, Augmentation};
use crate::config::LinguisticConfig;
use crate::corpus::{read_corpus, tokenize};
use crate::engine::ngram_viterbi_engine::NGramViterbiEngineBuilder;
use crate::evaluator::{save_results, EvaluationSummary, Evaluator};
use crate::graph::TagMode;
use crate::lm::ngram_model::{BuildTables, NGramModel};
use crate::lm::smoothing::SmoothingMethod;
use crate::stemmer::Stemmer;
use crate::tag::pad_tokens;

/// 長い処理を途中で止めるためのフラグ。語と語、fold と fold の間で確認する。
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> CancelFlag {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// ファイル名の `_fold_<k>` から fold 番号を取る。
/// すべてのファイルが番号を持ち、番号が重複しないときだけ Some。
pub fn folds_from_file_names(paths: &[PathBuf]) -> Option<Vec<u32>> {
    let pattern = Regex::new(r"_fold_([0-9]+)$").ok()?;
    let mut seen = FxHashSet::default();
    let mut folds = Vec::with_capacity(paths.len());
    for path in paths {
        let stem = path.file_stem()?.to_string_lossy();
        let k: u32 = pattern.captures(&stem)?.get(1)?.as_str().parse().ok()?;
        if !seen.insert(k) {
            return None;
        }
        folds.push(k);
    }
    Some(folds)
}

/// 出力ファイルに付ける接尾辞。fold 番号が取れなければ 1 始まりの通し番号。
/// fold 番号のないファイルが一つだけなら接尾辞は付けない。
pub fn output_suffixes(paths: &[PathBuf]) -> Vec<String> {
    match folds_from_file_names(paths) {
        Some(folds) => folds.iter().map(|k| format!("_fold_{}", k)).collect(),
        None if paths.len() == 1 => vec![String::new()],
        None => (1..=paths.len()).map(|i| format!("_{}", i)).collect(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FoldReport {
    pub name: String,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<EvaluationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub start_time: String,
    pub end_time: String,
    pub folds: Vec<FoldReport>,
    /// 成功した fold の音節 (音素) 誤り率の平均
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_unit_error_rate: Option<f64>,
    pub cancelled: bool,
}

impl BatchReport {
    fn new(folds: Vec<FoldReport>, start_time: String, cancelled: bool) -> BatchReport {
        let rates: Vec<f64> = folds
            .iter()
            .filter_map(|f| f.summary.as_ref())
            .map(|s| s.unit_error_rate)
            .collect();
        let average_unit_error_rate = if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f64>() / rates.len() as f64)
        };
        BatchReport {
            start_time,
            end_time: now(),
            folds,
            average_unit_error_rate,
            cancelled,
        }
    }

    pub fn failed(&self) -> usize {
        self.folds.iter().filter(|f| f.error.is_some()).count()
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        info!("Writing {}", path.display());
        let file = File::create(path).with_context(|| format!("File: {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

fn now() -> String {
    Local::now().format("%Y/%m/%d - %H:%M:%S").to_string()
}

fn log_path(out_dir: &Path, prefix: &str) -> PathBuf {
    out_dir.join(format!("{}_{}.json", prefix, Local::now().format("%Y%m%d_%H%M%S")))
}

pub struct BuildOptions {
    pub order: usize,
    pub mode: TagMode,
    pub config: Arc<LinguisticConfig>,
    /// 空でなければ拡張データで別のモデルも作る
    pub augmentations: Vec<Augmentation>,
    pub model_prefix: String,
    pub tables: BuildTables,
}

/// 学習ファイルごとに n-gram モデルを作って保存する。
/// 戻り値は (本体, 拡張モデル) の出力パス。
fn build_one(
    train_file: &Path,
    suffix: &str,
    options: &BuildOptions,
    out_dir: &Path,
) -> anyhow::Result<(PathBuf, Option<PathBuf>)> {
    let rows = read_corpus(train_file, true)?;
    let tokens = tokenize(&rows, options.mode, &options.config)?;
    let model = NGramModel::build_with(
        &pad_tokens(tokens, options.order),
        options.order,
        options.tables,
    )?;
    let model_path = out_dir.join(format!("{}{}.json", options.model_prefix, suffix));
    model
        .save(&model_path)
        .with_context(|| format!("Cannot save {}", model_path.display()))?;

    if options.augmentations.is_empty() {
        return Ok((model_path, None));
    }
    let augmented_rows = augment(&rows, &options.augmentations, &options.config);
    let tokens = tokenize(&augmented_rows, options.mode, &options.config)?;
    let aug_model = NGramModel::build_with(
        &pad_tokens(tokens, options.order),
        options.order,
        options.tables,
    )?;
    let aug_path = out_dir.join(format!("{}_aug{}.json", options.model_prefix, suffix));
    aug_model
        .save(&aug_path)
        .with_context(|| format!("Cannot save {}", aug_path.display()))?;
    Ok((model_path, Some(aug_path)))
}

/// 学習ファイルごとにモデルを作る。失敗した fold は記録して次へ進む。
pub fn build_models(
    train_files: &[PathBuf],
    options: &BuildOptions,
    out_dir: &Path,
    cancel: &CancelFlag,
) -> anyhow::Result<BatchReport> {
    let start_time = now();
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create {}", out_dir.display()))?;

    let mut folds = Vec::with_capacity(train_files.len());
    let mut cancelled = false;
    for (train_file, suffix) in train_files.iter().zip(output_suffixes(train_files)) {
        if cancel.is_cancelled() {
            warn!("Cancelled before {}", train_file.display());
            cancelled = true;
            break;
        }
        info!("Building model{} from {}", suffix, train_file.display());
        let mut report = FoldReport {
            name: suffix.clone(),
            input: train_file.display().to_string(),
            output: None,
            summary: None,
            error: None,
        };
        match build_one(train_file, &suffix, options, out_dir) {
            Ok((model_path, _)) => report.output = Some(model_path.display().to_string()),
            Err(err) => {
                error!("Fold{} failed: {:?}", suffix, err);
                report.error = Some(format!("{:#}", err));
            }
        }
        folds.push(report);
    }

    let report = BatchReport::new(folds, start_time, cancelled);
    report.save(&log_path(out_dir, "build"))?;
    Ok(report)
}

pub struct EvaluateOptions {
    pub mode: TagMode,
    pub order: Option<usize>,
    pub method: SmoothingMethod,
    pub config: Arc<LinguisticConfig>,
    pub stemmer: Option<Arc<dyn Stemmer>>,
    /// fold ごとの拡張モデルと重み
    pub augmented: Option<(Vec<PathBuf>, f64)>,
    pub prune: bool,
    pub validation: bool,
    pub threads: Option<usize>,
}

fn model_for(models: &[PathBuf], i: usize) -> anyhow::Result<&Path> {
    match models {
        [single] => Ok(single),
        _ => models
            .get(i)
            .map(|p| p.as_path())
            .ok_or_else(|| anyhow::anyhow!("No model file for fold #{}", i + 1)),
    }
}

fn evaluate_one(
    i: usize,
    test_file: &Path,
    model_files: &[PathBuf],
    options: &EvaluateOptions,
    out_path: &Path,
    cancel: &CancelFlag,
) -> anyhow::Result<EvaluationSummary> {
    let mut builder = NGramViterbiEngineBuilder::new(options.mode);
    builder
        .model_path(model_for(model_files, i)?)
        .smoothing(options.method)
        .config(options.config.clone())
        .prune(options.prune);
    if let Some(order) = options.order {
        builder.order(order);
    }
    if let Some(stemmer) = &options.stemmer {
        builder.stemmer(stemmer.clone());
    }
    if let Some((aug_files, weight)) = &options.augmented {
        builder.augmented_path(model_for(aug_files, i)?, *weight);
    }
    let engine = builder.build()?;

    let rows = read_corpus(test_file, options.validation)?;
    let mut evaluator = Evaluator::new(options.validation).cancel_flag(cancel.clone());
    if let Some(threads) = options.threads {
        evaluator = evaluator.threads(threads);
    }
    let evaluation = evaluator.evaluate(&engine, &rows)?;
    save_results(out_path, &evaluation.records)?;
    Ok(evaluation.summary)
}

/// テストファイルごとに評価して結果を書き、全体のログを JSON で残す。
/// モデルが一つだけならすべての fold で使う。
pub fn evaluate_folds(
    test_files: &[PathBuf],
    model_files: &[PathBuf],
    options: &EvaluateOptions,
    out_dir: &Path,
    cancel: &CancelFlag,
) -> anyhow::Result<BatchReport> {
    let start_time = now();
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create {}", out_dir.display()))?;

    let mut folds = Vec::with_capacity(test_files.len());
    let mut cancelled = false;
    for (i, (test_file, suffix)) in test_files
        .iter()
        .zip(output_suffixes(test_files))
        .enumerate()
    {
        if cancel.is_cancelled() {
            warn!("Cancelled before {}", test_file.display());
            cancelled = true;
            break;
        }
        let out_path = out_dir.join(format!("result{}.tsv", suffix));
        info!("Evaluating {} => {}", test_file.display(), out_path.display());
        let mut report = FoldReport {
            name: suffix.clone(),
            input: test_file.display().to_string(),
            output: None,
            summary: None,
            error: None,
        };
        match evaluate_one(i, test_file, model_files, options, &out_path, cancel) {
            Ok(summary) => {
                report.output = Some(out_path.display().to_string());
                report.summary = Some(summary);
            }
            Err(err) if err.downcast_ref::<Cancelled>().is_some() => {
                warn!("Cancelled while evaluating {}", test_file.display());
                cancelled = true;
                break;
            }
            Err(err) => {
                error!("Fold{} failed: {:?}", suffix, err);
                report.error = Some(format!("{:#}", err));
            }
        }
        folds.push(report);
    }

    let report = BatchReport::new(folds, start_time, cancelled);
    if let Some(average) = report.average_unit_error_rate {
        info!("Average unit error rate: {:.5}", average);
    }
    report.save(&log_path(out_dir, "evaluation"))?;
    Ok(report)
}
