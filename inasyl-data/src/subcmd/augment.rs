use std::path::Path;

use log::info;

use libinasyl::augmentation::{self, Augmentation};
use libinasyl::corpus::{read_corpus, write_corpus};

use crate::utils::load_config;

/// src_file の音節データを拡張して dst_file に書く。
pub fn augment(
    src_file: &str,
    dst_file: &str,
    methods: &[Augmentation],
    config: Option<&str>,
    include_original: bool,
) -> anyhow::Result<()> {
    info!("augment: {} => {}, methods={:?}", src_file, dst_file, methods);
    let config = load_config(config)?;
    let rows = read_corpus(Path::new(src_file), true)?;

    let generated = augmentation::augment(&rows, methods, &config);
    info!("{} rows => {} generated rows", rows.len(), generated.len());

    let output = if include_original {
        let mut output = rows;
        output.extend(generated);
        output
    } else {
        generated
    };
    write_corpus(Path::new(dst_file), &output)?;
    Ok(())
}
