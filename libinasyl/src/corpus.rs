use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use log::info;

use crate::config::LinguisticConfig;
use crate::error::{InasylError, Result};
use crate::graph::TagMode;
use crate::tag::{phonemes_to_tags, syllables_to_tags, Gram};

/// コーパスの一行。label は音節区切りの語 (音節化) または音素列 (G2P)。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusRow {
    pub word: String,
    pub label: Option<String>,
}

impl CorpusRow {
    pub fn new(word: &str, label: &str) -> CorpusRow {
        CorpusRow {
            word: word.to_string(),
            label: Some(label.to_string()),
        }
    }
}

/// `word<TAB>label` 形式のファイルを読む。
/// validation=false のときは label 列がなくてもよい。
pub fn read_corpus(path: &Path, validation: bool) -> Result<Vec<CorpusRow>> {
    info!("Reading {}", path.display());
    let file = File::open(path)?;
    parse_corpus(BufReader::new(file), validation)
}

pub fn parse_corpus<R: BufRead>(reader: R, validation: bool) -> Result<Vec<CorpusRow>> {
    let mut rows = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let mut columns = line.split('\t');
        let word = columns.next().unwrap_or_default().trim();
        if word.is_empty() {
            return Err(InasylError::MalformedCorpusRow {
                line: line_no,
                reason: "empty word".to_string(),
            });
        }
        let label = columns.next().map(|s| s.trim().to_string());
        if validation && label.as_deref().map_or(true, str::is_empty) {
            return Err(InasylError::MalformedCorpusRow {
                line: line_no,
                reason: format!("missing label for '{word}'"),
            });
        }
        rows.push(CorpusRow {
            word: word.to_string(),
            label,
        });
    }
    Ok(rows)
}

pub fn write_corpus(path: &Path, rows: &[CorpusRow]) -> Result<()> {
    let mut file = File::create(path)?;
    for row in rows {
        match &row.label {
            Some(label) => writeln!(file, "{}\t{}", row.word, label)?,
            None => writeln!(file, "{}", row.word)?,
        }
    }
    Ok(())
}

/// 学習用に各行をタグ列に変換する。ハイフンで連結された語は部分語ごとに分ける。
pub fn tokenize(rows: &[CorpusRow], mode: TagMode, config: &LinguisticConfig) -> Result<Vec<Gram>> {
    let joiner = config.word_joiner;
    let mut tokens = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let Some(label) = &row.label else {
            return Err(InasylError::MalformedCorpusRow {
                line: i + 1,
                reason: format!("missing label for '{}'", row.word),
            });
        };
        match mode {
            TagMode::Syllabification => {
                for sub_word in label.split(joiner).filter(|s| !s.is_empty()) {
                    tokens.push(syllables_to_tags(sub_word, config.syllable_boundary));
                }
            }
            TagMode::G2p => {
                let letters: Vec<&str> = row.word.split(joiner).filter(|s| !s.is_empty()).collect();
                let phonemes: Vec<&str> = label.split(joiner).filter(|s| !s.is_empty()).collect();
                if letters.len() != phonemes.len() {
                    return Err(InasylError::MalformedCorpusRow {
                        line: i + 1,
                        reason: format!("'{}' and '{}' have different sub-words", row.word, label),
                    });
                }
                for (l, p) in letters.iter().zip(phonemes.iter()) {
                    tokens.push(phonemes_to_tags(l, p, i + 1)?);
                }
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;

    #[test]
    fn test_parse_corpus() -> anyhow::Result<()> {
        let text = "# comment\nrumah\tru.mah\n\nmakan\tma.kan\n";
        let rows = parse_corpus(text.as_bytes(), true)?;
        assert_eq!(
            rows,
            vec![CorpusRow::new("rumah", "ru.mah"), CorpusRow::new("makan", "ma.kan")]
        );
        Ok(())
    }

    #[test]
    fn test_missing_label() {
        let err = parse_corpus("rumah\tru.mah\nmakan\n".as_bytes(), true).unwrap_err();
        assert!(matches!(err, InasylError::MalformedCorpusRow { line: 2, .. }));

        let rows = parse_corpus("makan\n".as_bytes(), false).unwrap();
        assert_eq!(rows[0].label, None);
    }

    #[test]
    fn test_tokenize_splits_hyphen() -> anyhow::Result<()> {
        let rows = vec![CorpusRow::new("kuda-kuda", "ku.da-ku.da")];
        let tokens = tokenize(&rows, TagMode::Syllabification, &LinguisticConfig::default())?;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], tokens[1]);
        assert_eq!(tokens[0][1], Tag::end('u'));
        Ok(())
    }

    #[test]
    fn test_tokenize_g2p() -> anyhow::Result<()> {
        let rows = vec![CorpusRow::new("nya.nyi", "+*a.+*i")];
        let tokens = tokenize(&rows, TagMode::G2p, &LinguisticConfig::default())?;
        assert_eq!(tokens[0].len(), 7);
        assert_eq!(tokens[0][1], Tag::phoneme('y', '*'));
        Ok(())
    }
}
