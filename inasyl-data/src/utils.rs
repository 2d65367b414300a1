use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use libinasyl::config::LinguisticConfig;

pub fn get_file_list(src_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut result: Vec<PathBuf> = Vec::new();

    for src_file in WalkDir::new(src_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|file| file.ok())
        .filter(|file| file.file_type().is_file())
    {
        result.push(src_file.path().to_path_buf());
    }
    Ok(result)
}

/// ファイルはそのまま、ディレクトリは中のファイルに展開する。
pub fn expand_inputs(inputs: &[String]) -> anyhow::Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if path.is_dir() {
            let files = get_file_list(path)?;
            if files.is_empty() {
                warn!("No files in {}", path.display());
            }
            result.extend(files);
        } else {
            result.push(path.to_path_buf());
        }
    }
    Ok(result)
}

pub fn load_config(path: Option<&str>) -> anyhow::Result<LinguisticConfig> {
    let config = match path {
        Some(path) => LinguisticConfig::load(Path::new(path))?,
        None => LinguisticConfig::load_default()?,
    };
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_expand_inputs() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::create_dir(dir.path().join("folds"))?;
        fs::write(dir.path().join("folds/train_fold_2.txt"), "")?;
        fs::write(dir.path().join("folds/train_fold_1.txt"), "")?;
        fs::write(dir.path().join("extra.txt"), "")?;

        let inputs = vec![
            dir.path().join("folds").display().to_string(),
            dir.path().join("extra.txt").display().to_string(),
        ];
        let files = expand_inputs(&inputs)?;
        assert_eq!(
            files,
            vec![
                dir.path().join("folds/train_fold_1.txt"),
                dir.path().join("folds/train_fold_2.txt"),
                dir.path().join("extra.txt"),
            ]
        );
        Ok(())
    }
}
