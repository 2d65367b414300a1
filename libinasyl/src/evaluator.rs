use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;

use anyhow::{anyhow, Context};
use chrono::Local;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::augmentation::split_syllables;
use crate::batch::{CancelFlag, Cancelled};
use crate::config::LinguisticConfig;
use crate::corpus::CorpusRow;
use crate::engine::base::TaggingEngine;
use crate::engine::ngram_viterbi_engine::NGramViterbiEngine;
use crate::graph::TagMode;

const TIME_FORMAT: &str = "%Y/%m/%d - %H:%M:%S";

/// 予測と正解の音節境界のずれを数える。
///
/// 両方の音節列を先頭から文字位置でそろえて走査し、正解にしかない境界と予測にしか
/// ない境界をそれぞれ数え、多い方を返す。境界を一つずらしただけなら 1。
/// 正解の音節数を上限とする。
pub fn mismatch_count(pred_syllables: &[String], truth_syllables: &[String]) -> usize {
    let boundaries = |syllables: &[String]| {
        let mut offset = 0;
        let mut positions = Vec::with_capacity(syllables.len());
        for syllable in syllables.iter().take(syllables.len().saturating_sub(1)) {
            offset += syllable.chars().count();
            positions.push(offset);
        }
        positions
    };
    let pred = boundaries(pred_syllables);
    let truth = boundaries(truth_syllables);

    let (mut i, mut j) = (0, 0);
    let (mut missing, mut extra) = (0, 0);
    while i < truth.len() || j < pred.len() {
        match (truth.get(i), pred.get(j)) {
            (Some(t), Some(p)) if t == p => {
                i += 1;
                j += 1;
            }
            (Some(t), Some(p)) if t < p => {
                missing += 1;
                i += 1;
            }
            (Some(_), None) => {
                missing += 1;
                i += 1;
            }
            _ => {
                extra += 1;
                j += 1;
            }
        }
    }
    missing.max(extra).min(truth_syllables.len())
}

/// 音素列の文字ごとの不一致数。長さの差も不一致に数える。
pub fn phoneme_mismatch_count(pred: &[String], truth: &[String]) -> usize {
    let differing = pred.iter().zip(truth).filter(|(p, t)| p != t).count();
    differing + pred.len().abs_diff(truth.len())
}

/// 評価の単位 (音節あるいは音素) に分ける。
pub fn split_units(label: &str, mode: TagMode, config: &LinguisticConfig) -> Vec<String> {
    match mode {
        TagMode::Syllabification => split_syllables(label, config),
        TagMode::G2p => label
            .chars()
            .filter(|c| *c != config.syllable_boundary && *c != config.word_joiner)
            .map(|c| c.to_string())
            .collect(),
    }
}

pub fn unit_mismatch_count(
    prediction: &str,
    gold: &str,
    mode: TagMode,
    config: &LinguisticConfig,
) -> usize {
    let pred = split_units(prediction, mode, config);
    let truth = split_units(gold, mode, config);
    match mode {
        TagMode::Syllabification => mismatch_count(&pred, &truth),
        TagMode::G2p => phoneme_mismatch_count(&pred, &truth),
    }
}

/// 一語分の結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub word: String,
    pub gold: Option<String>,
    pub prediction: String,
    pub mismatch_count: usize,
    /// タグ付けに失敗したときの理由
    pub error: Option<String>,
}

impl ResultRecord {
    pub fn is_wrong(&self) -> bool {
        self.error.is_some() || self.mismatch_count > 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub total_words: usize,
    pub wrong_words: usize,
    pub correct_words: usize,
    pub word_error_rate: f64,
    pub total_units: usize,
    pub wrong_units: usize,
    pub correct_units: usize,
    pub unit_error_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl EvaluationSummary {
    pub fn from_records(records: &[ResultRecord], mode: TagMode, config: &LinguisticConfig) -> Self {
        let total_words = records.len();
        let wrong_words = records.iter().filter(|r| r.is_wrong()).count();
        let total_units: usize = records
            .iter()
            .filter_map(|r| r.gold.as_deref())
            .map(|gold| split_units(gold, mode, config).len())
            .sum();
        let wrong_units: usize = records.iter().map(|r| r.mismatch_count).sum();

        let rate = |wrong: usize, total: usize| {
            if total == 0 {
                0.0
            } else {
                wrong as f64 / total as f64
            }
        };
        EvaluationSummary {
            total_words,
            wrong_words,
            correct_words: total_words - wrong_words,
            word_error_rate: rate(wrong_words, total_words),
            total_units,
            wrong_units,
            correct_units: total_units.saturating_sub(wrong_units),
            unit_error_rate: rate(wrong_units, total_units),
            start_time: None,
            end_time: None,
            duration: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub records: Vec<ResultRecord>,
    pub summary: EvaluationSummary,
}

/**
 * テストデータの各語をタグ付けして、正解と比べる。
 *
 * データをスレッド数で分割し、スレッドごとにエンジンを fork する。
 * 一語の失敗はその語の結果に記録し、全体は止めない。
 */
pub struct Evaluator {
    validation: bool,
    threads: usize,
    cancel: CancelFlag,
}

impl Evaluator {
    pub fn new(validation: bool) -> Evaluator {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Evaluator {
            validation,
            threads,
            cancel: CancelFlag::default(),
        }
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn evaluate_row(&self, engine: &mut NGramViterbiEngine, row: &CorpusRow) -> ResultRecord {
        let (prediction, error) = match engine.segment(&row.word) {
            Ok(prediction) => (prediction, None),
            Err(err) => {
                warn!("Cannot tag '{}': {}", row.word, err);
                (String::new(), Some(err.to_string()))
            }
        };

        let gold = if self.validation {
            row.label.clone()
        } else {
            None
        };
        let mismatch_count = match &gold {
            Some(gold) if error.is_some() => split_units(gold, engine.mode(), engine.config()).len(),
            Some(gold) if *gold != prediction => {
                unit_mismatch_count(&prediction, gold, engine.mode(), engine.config())
            }
            _ => 0,
        };
        debug!("{} => (gold={:?}, prediction={})", row.word, gold, prediction);

        ResultRecord {
            word: row.word.clone(),
            gold,
            prediction,
            mismatch_count,
            error,
        }
    }

    pub fn evaluate(
        &self,
        engine: &NGramViterbiEngine,
        rows: &[CorpusRow],
    ) -> anyhow::Result<Evaluation> {
        let start = Local::now();
        let total_t1 = SystemTime::now();

        let chunk_size = rows.len().div_ceil(self.threads).max(1);
        let results: Vec<anyhow::Result<Vec<ResultRecord>>> = std::thread::scope(|s| {
            let handles: Vec<_> = rows
                .chunks(chunk_size)
                .map(|chunk| {
                    let mut engine = engine.fork();
                    s.spawn(move || {
                        let mut records = Vec::with_capacity(chunk.len());
                        for row in chunk {
                            if self.cancel.is_cancelled() {
                                return Err(anyhow::Error::new(Cancelled));
                            }
                            records.push(self.evaluate_row(&mut engine, row));
                        }
                        Ok(records)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(anyhow!("evaluation thread panicked")))
                })
                .collect()
        });

        let mut records = Vec::with_capacity(rows.len());
        for result in results {
            records.extend(result?);
        }

        let mut summary = EvaluationSummary::from_records(&records, engine.mode(), engine.config());
        let end = Local::now();
        summary.start_time = Some(start.format(TIME_FORMAT).to_string());
        summary.end_time = Some(end.format(TIME_FORMAT).to_string());
        let elapsed = SystemTime::now().duration_since(total_t1)?;
        summary.duration = Some((elapsed.as_secs_f64() * 100.0).round() / 100.0);

        info!(
            "Words={}, Wrong={}, WER={:.5}, UER={:.5}, elapsed={}ms",
            summary.total_words,
            summary.wrong_words,
            summary.word_error_rate,
            summary.unit_error_rate,
            elapsed.as_millis()
        );
        Ok(Evaluation { records, summary })
    }
}

/// 結果を TSV で書く。word, gold, prediction, mismatch_count (, error)。
/// 正解のない結果は word, prediction の二列。
pub fn save_results(path: &Path, records: &[ResultRecord]) -> anyhow::Result<()> {
    info!("Writing {}", path.display());
    let file = File::create(path).with_context(|| format!("File: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for record in records {
        match &record.gold {
            Some(gold) => write!(
                writer,
                "{}\t{}\t{}\t{}",
                record.word, gold, record.prediction, record.mismatch_count
            )?,
            None => write!(writer, "{}\t{}", record.word, record.prediction)?,
        }
        if let Some(error) = &record.error {
            write!(writer, "\t{}", error.replace(['\t', '\n'], " "))?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// `save_results` で書いた正解付きの結果を読み、集計し直す。
pub fn load_results(
    path: &Path,
    mode: TagMode,
    config: &LinguisticConfig,
) -> anyhow::Result<Evaluation> {
    let file = File::open(path).with_context(|| format!("File: {}", path.display()))?;
    let mut records = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 4 {
            anyhow::bail!(
                "{}:{}: expected word, gold, prediction and mismatch count",
                path.display(),
                i + 1
            );
        }
        let mismatch_count = columns[3]
            .parse::<usize>()
            .with_context(|| format!("{}:{}: bad mismatch count", path.display(), i + 1))?;
        records.push(ResultRecord {
            word: columns[0].to_string(),
            gold: Some(columns[1].to_string()),
            prediction: columns[2].to_string(),
            mismatch_count,
            error: columns.get(4).map(|e| e.to_string()),
        });
    }
    let summary = EvaluationSummary::from_records(&records, mode, config);
    info!("Successfully loaded {}", path.display());
    Ok(Evaluation { records, summary })
}

/// 二つの結果を (word, gold) で突き合わせ、それぞれの正誤が指定どおりのものを返す。
pub fn compare_results<'a>(
    first: &'a [ResultRecord],
    second: &'a [ResultRecord],
    first_wrong: bool,
    second_wrong: bool,
) -> Vec<(&'a ResultRecord, &'a ResultRecord)> {
    let index: std::collections::HashMap<(&str, Option<&str>), &ResultRecord> = second
        .iter()
        .map(|r| ((r.word.as_str(), r.gold.as_deref()), r))
        .collect();
    first
        .iter()
        .filter(|a| a.is_wrong() == first_wrong)
        .filter_map(|a| {
            let b = index.get(&(a.word.as_str(), a.gold.as_deref()))?;
            (b.is_wrong() == second_wrong).then_some((a, *b))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::corpus::tokenize;
    use crate::engine::ngram_viterbi_engine::NGramViterbiEngineBuilder;
    use crate::lm::ngram_model::NGramModel;
    use crate::lm::smoothing::SmoothingMethod;
    use crate::tag::pad_tokens;
    use tempfile::NamedTempFile;

    fn syllables(s: &str) -> Vec<String> {
        split_syllables(s, &LinguisticConfig::default())
    }

    #[test]
    fn test_mismatch_count_shifted_boundary() {
        assert_eq!(mismatch_count(&syllables("rum.ah"), &syllables("ru.mah")), 1);
    }

    #[test]
    fn test_mismatch_count() {
        assert_eq!(mismatch_count(&syllables("ru.mah"), &syllables("ru.mah")), 0);
        // 境界が足りない
        assert_eq!(mismatch_count(&syllables("makan"), &syllables("ma.kan")), 1);
        // 境界が多い
        assert_eq!(
            mismatch_count(&syllables("in.do.ne.si.a"), &syllables("in.do.ne.sia")),
            1
        );
        assert_eq!(mismatch_count(&syllables("m.a.k.a.n"), &syllables("ma.kan")), 2);
    }

    #[test]
    fn test_phoneme_mismatch_count() {
        let config = LinguisticConfig::default();
        assert_eq!(unit_mismatch_count("m#.ba", "m3.ba", TagMode::G2p, &config), 1);
        assert_eq!(unit_mismatch_count("ba", "ba", TagMode::G2p, &config), 0);
    }

    fn engine() -> NGramViterbiEngine {
        let config = LinguisticConfig::default();
        let rows = vec![CorpusRow::new("rumah", "ru.mah"), CorpusRow::new("makan", "ma.kan")];
        let tokens = tokenize(&rows, TagMode::Syllabification, &config).unwrap();
        let model = NGramModel::build(&pad_tokens(tokens, 3), 3).unwrap();
        NGramViterbiEngineBuilder::new(TagMode::Syllabification)
            .model(Arc::new(model))
            .config(Arc::new(config))
            .smoothing(SmoothingMethod::StupidBackoff { alpha: 0.4 })
            .build()
            .unwrap()
    }

    #[test]
    fn test_evaluate() -> anyhow::Result<()> {
        let rows = vec![
            CorpusRow::new("rumah", "ru.mah"),
            CorpusRow::new("makan", "ma.kan"),
            CorpusRow::new("rumah", "rum.ah"),
        ];
        let evaluation = Evaluator::new(true).threads(2).evaluate(&engine(), &rows)?;
        assert_eq!(evaluation.records.len(), 3);
        assert_eq!(evaluation.records[0].prediction, "ru.mah");
        assert_eq!(evaluation.summary.total_words, 3);
        assert_eq!(evaluation.summary.wrong_words, 1);
        assert_eq!(evaluation.summary.total_units, 6);
        assert_eq!(evaluation.summary.wrong_units, 1);
        assert!(evaluation.summary.duration.is_some());
        Ok(())
    }

    #[test]
    fn test_untaggable_words_are_recorded_as_errors() -> anyhow::Result<()> {
        let config = LinguisticConfig::default();
        let rows = vec![CorpusRow::new("rumah", "ru.mah"), CorpusRow::new("makan", "ma.kan")];
        let tokens = tokenize(&rows, TagMode::Syllabification, &config)?;
        let model = Arc::new(NGramModel::build(&pad_tokens(tokens, 3), 3)?);
        // 同じモデルを -1 倍で足すと確率がすべて 0 になり、どの経路も通れない
        let engine = NGramViterbiEngineBuilder::new(TagMode::Syllabification)
            .model(model.clone())
            .augmented(model, -1.0)
            .config(Arc::new(config.clone()))
            .smoothing(SmoothingMethod::StupidBackoff { alpha: 0.4 })
            .build()?;

        let rows = vec![
            CorpusRow::new("rumah", "ru.mah"),
            CorpusRow::new("makanan", "ma.ka.nan"),
        ];
        let evaluation = Evaluator::new(true).threads(1).evaluate(&engine, &rows)?;
        assert_eq!(evaluation.records.len(), 2);
        for (record, units) in evaluation.records.iter().zip([2, 3]) {
            let error = record.error.as_deref().unwrap_or_default();
            assert!(error.contains("no viable path"), "{}", error);
            assert_eq!(record.prediction, "");
            assert_eq!(record.mismatch_count, units);
        }
        assert_eq!(evaluation.summary.wrong_words, 2);
        assert_eq!(evaluation.summary.total_units, 5);
        assert_eq!(evaluation.summary.wrong_units, 5);
        assert_eq!(evaluation.summary.unit_error_rate, 1.0);

        // エラー列も保存して読み戻せる
        let tmpfile = NamedTempFile::new()?;
        save_results(tmpfile.path(), &evaluation.records)?;
        let loaded = load_results(tmpfile.path(), TagMode::Syllabification, &config)?;
        assert_eq!(loaded.records, evaluation.records);
        assert_eq!(loaded.summary.wrong_words, 2);
        Ok(())
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancelFlag::default();
        cancel.cancel();
        let rows = vec![CorpusRow::new("rumah", "ru.mah")];
        let err = Evaluator::new(true)
            .cancel_flag(cancel)
            .evaluate(&engine(), &rows)
            .unwrap_err();
        assert!(err.downcast_ref::<Cancelled>().is_some());
    }

    #[test]
    fn test_save_and_load_results() -> anyhow::Result<()> {
        let config = LinguisticConfig::default();
        let records = vec![
            ResultRecord {
                word: "rumah".to_string(),
                gold: Some("ru.mah".to_string()),
                prediction: "rum.ah".to_string(),
                mismatch_count: 1,
                error: None,
            },
            ResultRecord {
                word: "makan".to_string(),
                gold: Some("ma.kan".to_string()),
                prediction: "ma.kan".to_string(),
                mismatch_count: 0,
                error: None,
            },
        ];
        let tmpfile = NamedTempFile::new()?;
        save_results(tmpfile.path(), &records)?;

        let loaded = load_results(tmpfile.path(), TagMode::Syllabification, &config)?;
        assert_eq!(loaded.records, records);
        assert_eq!(loaded.summary.wrong_words, 1);
        assert_eq!(loaded.summary.total_units, 4);
        assert_eq!(loaded.summary.unit_error_rate, 0.25);
        Ok(())
    }

    #[test]
    fn test_compare_results() {
        let record = |word: &str, mismatch_count| ResultRecord {
            word: word.to_string(),
            gold: Some(word.to_string()),
            prediction: word.to_string(),
            mismatch_count,
            error: None,
        };
        let first = vec![record("a", 1), record("b", 0), record("c", 1)];
        let second = vec![record("a", 0), record("b", 0), record("c", 1)];
        let pairs = compare_results(&first, &second, true, false);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0.word, "a");
    }
}
