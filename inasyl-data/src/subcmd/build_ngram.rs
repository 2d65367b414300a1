use std::path::Path;
use std::sync::Arc;

use anyhow::bail;
use log::info;

use libinasyl::augmentation::Augmentation;
use libinasyl::batch::{build_models, BuildOptions, CancelFlag};
use libinasyl::graph::TagMode;
use libinasyl::lm::ngram_model::BuildTables;

use crate::utils::{expand_inputs, load_config};

pub struct BuildNgramOptions<'a> {
    pub train: &'a [String],
    pub order: usize,
    pub mode: TagMode,
    pub config: Option<&'a str>,
    pub augmentations: Vec<Augmentation>,
    pub prefix: String,
    pub tables: BuildTables,
    pub out_dir: &'a str,
}

/// 学習ファイルごとに n-gram モデルを作り、out_dir に保存する。
pub fn build_ngram(opts: BuildNgramOptions) -> anyhow::Result<()> {
    let train = expand_inputs(opts.train)?;
    if train.is_empty() {
        bail!("No training files are given");
    }
    info!(
        "build-ngram: {} files, order={}, mode={} => {}",
        train.len(),
        opts.order,
        opts.mode,
        opts.out_dir
    );

    let options = BuildOptions {
        order: opts.order,
        mode: opts.mode,
        config: Arc::new(load_config(opts.config)?),
        augmentations: opts.augmentations,
        model_prefix: opts.prefix,
        tables: opts.tables,
    };
    let report = build_models(&train, &options, Path::new(opts.out_dir), &CancelFlag::new())?;

    for fold in &report.folds {
        match (&fold.output, &fold.error) {
            (Some(output), _) => info!("{} => {}", fold.input, output),
            (None, Some(error)) => info!("{} => FAILED: {}", fold.input, error),
            (None, None) => {}
        }
    }
    if report.failed() > 0 {
        bail!("{} of {} folds failed", report.failed(), report.folds.len());
    }
    Ok(())
}
