use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail};
use log::info;

use libinasyl::config::LinguisticConfig;

/// 組み込みの言語設定を YAML で書き出す。
pub fn init_config(path: Option<&str>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => PathBuf::from(path),
        None => LinguisticConfig::default_path()
            .ok_or_else(|| anyhow!("Cannot resolve the configuration directory"))?,
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    LinguisticConfig::default().save(&path)?;
    info!("Wrote {}", path.display());
    Ok(())
}
