use std::io::{stdout, BufWriter, Write};
use std::path::Path;

use log::info;

use libinasyl::evaluator::{compare_results, load_results};
use libinasyl::graph::TagMode;

use crate::utils::load_config;

/// 二つの結果ファイルで、指定した正誤の組み合わせになった語を出力する。
pub fn compare(
    first: &str,
    second: &str,
    first_wrong: bool,
    second_wrong: bool,
    mode: TagMode,
    config: Option<&str>,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let a = load_results(Path::new(first), mode, &config)?;
    let b = load_results(Path::new(second), mode, &config)?;
    info!(
        "{}: UER={:.5}, {}: UER={:.5}",
        first, a.summary.unit_error_rate, second, b.summary.unit_error_rate
    );

    let pairs = compare_results(&a.records, &b.records, first_wrong, second_wrong);
    let mut out = BufWriter::new(stdout().lock());
    for (x, y) in &pairs {
        writeln!(
            out,
            "{}\t{}\t{}\t{}",
            x.word,
            x.gold.as_deref().unwrap_or_default(),
            x.prediction,
            y.prediction
        )?;
    }
    out.flush()?;
    info!("{} words", pairs.len());
    Ok(())
}
