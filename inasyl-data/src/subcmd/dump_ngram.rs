use std::io::{stdout, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use log::info;

use libinasyl::lm::ngram_model::{LoadOptions, NGramModel};

/// モデルの k-gram とその頻度を出力する。
pub fn dump_ngram(model: &str, k: usize) -> anyhow::Result<()> {
    let options = LoadOptions {
        max_order: Some(k),
        continuation: false,
        follow: false,
    };
    let model = NGramModel::load(Path::new(model), options)
        .with_context(|| format!("Cannot load n-gram model: {}", model))?;
    info!(
        "order={}, distinct={}, total={}",
        k,
        model.distinct(k),
        model.total(k)
    );

    let mut out = BufWriter::new(stdout().lock());
    for (gram, cnt) in model.counts_of(k) {
        writeln!(out, "{}\t{}", gram, cnt)?;
    }
    out.flush()?;
    Ok(())
}
