use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;

use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{InasylError, Result};
use crate::tag::{gram_to_str, str_to_gram, Gram, Tag};

pub const CONTINUATION_TABLE: &str = "continuation_fdist";
pub const FOLLOW_TABLE: &str = "follow_fdist";

/// 文脈 → (次のタグ → その (k+1)-gram の出現数)
pub type FollowTable = FxHashMap<Gram, FxHashMap<Tag, u32>>;

/**
 * タグ列の n-gram 頻度モデル。
 * 1..=order の各次数について、出現数・継続数 (continuation count)・後続分布
 * (follow distribution) を保持する。構築後は読み取り専用。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct NGramModel {
    order: usize,
    /// counts[k-1]: k-gram の出現数
    counts: Vec<FxHashMap<Gram, u32>>,
    /// continuation[k-1]: k-gram を接尾辞に持つ (k+1)-gram の種類数。k = 1..order-1
    continuation: Option<Vec<FxHashMap<Gram, u32>>>,
    /// follow[k-1]: k-gram の文脈に続くタグとその頻度。k = 1..order-1
    follow: Option<Vec<FollowTable>>,
    /// totals[k-1]: k-gram の総出現数 (N)
    totals: Vec<u64>,
}

/// 読み込み時にどこまで展開するか。大きなモデルでメモリを節約するため。
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub max_order: Option<usize>,
    pub continuation: bool,
    pub follow: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            max_order: None,
            continuation: true,
            follow: true,
        }
    }
}

/// 構築時に継続数・後続分布を作るか。stupid backoff だけなら両方いらない。
#[derive(Debug, Clone, Copy)]
pub struct BuildTables {
    pub continuation: bool,
    pub follow: bool,
}

impl Default for BuildTables {
    fn default() -> Self {
        BuildTables {
            continuation: true,
            follow: true,
        }
    }
}

#[derive(Serialize)]
struct ModelFileOut {
    #[serde(rename = "N")]
    n: usize,
    fdist: BTreeMap<usize, BTreeMap<String, u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_fdist: Option<BTreeMap<usize, BTreeMap<String, u32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    follow_fdist: Option<BTreeMap<usize, BTreeMap<String, BTreeMap<String, u32>>>>,
}

// 不要なテーブルは生の JSON のまま読み飛ばす
#[derive(Deserialize)]
struct ModelFileIn {
    #[serde(rename = "N")]
    n: usize,
    fdist: BTreeMap<usize, Box<RawValue>>,
    #[serde(default)]
    continuation_fdist: Option<BTreeMap<usize, Box<RawValue>>>,
    #[serde(default)]
    follow_fdist: Option<BTreeMap<usize, Box<RawValue>>>,
}

impl NGramModel {
    /// パディング済みのタグ列から n-gram を数え上げる。
    /// gram は語をまたがない。
    pub fn build(words: &[Gram], order: usize) -> Result<NGramModel> {
        Self::build_with(words, order, BuildTables::default())
    }

    pub fn build_with(words: &[Gram], order: usize, tables: BuildTables) -> Result<NGramModel> {
        if order == 0 {
            return Err(InasylError::InvalidOrder(order));
        }
        let t1 = SystemTime::now();
        info!("Building {}-gram model from {} words", order, words.len());

        let mut counts: Vec<FxHashMap<Gram, u32>> = Vec::with_capacity(order);
        for k in 1..=order {
            let mut fdist: FxHashMap<Gram, u32> = FxHashMap::default();
            for word in words {
                for window in word.windows(k) {
                    match fdist.get_mut(window) {
                        Some(cnt) => *cnt += 1,
                        None => {
                            fdist.insert(window.to_vec(), 1);
                        }
                    }
                }
            }
            debug!("order={} distinct={}", k, fdist.len());
            counts.push(fdist);
        }

        let continuation = tables
            .continuation
            .then(|| Self::build_continuation(&counts));
        let follow = tables.follow.then(|| Self::build_follow(&counts));
        let totals = Self::totals_of(&counts);

        if let Ok(elapsed) = SystemTime::now().duration_since(t1) {
            info!("Finished building n-gram in {}ms", elapsed.as_millis());
        }

        Ok(NGramModel {
            order,
            counts,
            continuation,
            follow,
            totals,
        })
    }

    fn build_continuation(counts: &[FxHashMap<Gram, u32>]) -> Vec<FxHashMap<Gram, u32>> {
        let order = counts.len();
        (1..order)
            .map(|k| {
                let mut cfdist: FxHashMap<Gram, u32> = FxHashMap::default();
                for gram in counts[k].keys() {
                    *cfdist.entry(gram[1..].to_vec()).or_insert(0) += 1;
                }
                cfdist
            })
            .collect()
    }

    fn build_follow(counts: &[FxHashMap<Gram, u32>]) -> Vec<FollowTable> {
        let order = counts.len();
        (1..order)
            .map(|k| {
                let mut ffdist: FollowTable = FxHashMap::default();
                for (gram, cnt) in &counts[k] {
                    ffdist
                        .entry(gram[..k].to_vec())
                        .or_default()
                        .insert(gram[k], *cnt);
                }
                ffdist
            })
            .collect()
    }

    fn totals_of(counts: &[FxHashMap<Gram, u32>]) -> Vec<u64> {
        counts
            .iter()
            .map(|fdist| fdist.values().map(|c| *c as u64).sum())
            .collect()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// 次数 `order` までのテーブルだけを残した複製。ファイルから次数を絞って読んだものと同じになる。
    pub fn truncate(&self, order: usize) -> Result<NGramModel> {
        if order > self.order {
            return Err(InasylError::InsufficientOrder {
                requested: order,
                stored: self.order,
            });
        }
        if order == 0 {
            return Err(InasylError::InvalidOrder(order));
        }
        Ok(NGramModel {
            order,
            counts: self.counts[..order].to_vec(),
            continuation: self
                .continuation
                .as_ref()
                .map(|tables| tables[..order - 1].to_vec()),
            follow: self.follow.as_ref().map(|tables| tables[..order - 1].to_vec()),
            totals: self.totals[..order].to_vec(),
        })
    }

    pub fn has_continuation(&self) -> bool {
        self.continuation.is_some()
    }

    pub fn has_follow(&self) -> bool {
        self.follow.is_some()
    }

    fn check_len(&self, len: usize, limit: usize) -> Result<()> {
        if len == 0 || len > limit {
            return Err(InasylError::InvalidGramLength {
                len,
                order: self.order,
            });
        }
        Ok(())
    }

    /// 出現数。未観測の gram は 0。
    pub fn count(&self, gram: &[Tag]) -> Result<u32> {
        self.check_len(gram.len(), self.order)?;
        Ok(self.counts[gram.len() - 1]
            .get(gram)
            .copied()
            .unwrap_or(0))
    }

    pub fn continuation_count(&self, gram: &[Tag]) -> Result<u32> {
        self.check_len(gram.len(), self.order - 1)?;
        let table = self
            .continuation
            .as_ref()
            .ok_or(InasylError::MissingTable(CONTINUATION_TABLE))?;
        Ok(table[gram.len() - 1].get(gram).copied().unwrap_or(0))
    }

    /// 文脈 `prefix` に続くタグの種類数。
    pub fn follow_count(&self, prefix: &[Tag]) -> Result<u32> {
        Ok(self
            .follow_distribution(prefix)?
            .map(|dist| dist.len() as u32)
            .unwrap_or(0))
    }

    pub fn follow_distribution(&self, prefix: &[Tag]) -> Result<Option<&FxHashMap<Tag, u32>>> {
        self.check_len(prefix.len(), self.order - 1)?;
        let table = self
            .follow
            .as_ref()
            .ok_or(InasylError::MissingTable(FOLLOW_TABLE))?;
        Ok(table[prefix.len() - 1].get(prefix))
    }

    /// 後続 gram の出現数ごとの種類数。ceiling を超える出現数は ceiling に丸める。
    pub fn follow_histogram(&self, prefix: &[Tag], ceiling: u32) -> Result<BTreeMap<u32, u32>> {
        let mut histogram = BTreeMap::new();
        if let Some(dist) = self.follow_distribution(prefix)? {
            for cnt in dist.values() {
                *histogram.entry((*cnt).min(ceiling)).or_insert(0) += 1;
            }
        }
        Ok(histogram)
    }

    /// k-gram の種類数 (B)。
    pub fn distinct(&self, k: usize) -> usize {
        self.counts.get(k.wrapping_sub(1)).map_or(0, |c| c.len())
    }

    /// k-gram の総出現数 (N)。
    pub fn total(&self, k: usize) -> u64 {
        self.totals.get(k.wrapping_sub(1)).copied().unwrap_or(0)
    }

    /// 次数 k の n[c] (出現数 c の gram の種類数)。
    /// 最高次数は生の出現数、それ以外は継続数から数える。
    pub fn count_of_counts(&self, k: usize, highest_order: bool) -> Result<FxHashMap<u32, u32>> {
        let source = if highest_order {
            self.check_len(k, self.order)?;
            &self.counts[k - 1]
        } else {
            self.check_len(k, self.order - 1)?;
            let table = self
                .continuation
                .as_ref()
                .ok_or(InasylError::MissingTable(CONTINUATION_TABLE))?;
            &table[k - 1]
        };
        let mut c_freq: FxHashMap<u32, u32> = FxHashMap::default();
        for cnt in source.values() {
            *c_freq.entry(*cnt).or_insert(0) += 1;
        }
        Ok(c_freq)
    }

    /// k-gram を辞書順で返す (ダンプ用)。
    pub fn counts_of(&self, k: usize) -> Vec<(String, u32)> {
        let Some(fdist) = self.counts.get(k.wrapping_sub(1)) else {
            return Vec::new();
        };
        let mut list = fdist
            .iter()
            .map(|(gram, cnt)| (gram_to_str(gram), *cnt))
            .collect::<Vec<_>>();
        list.sort();
        list
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        info!("Writing {}", path.display());
        let encode = |tables: &[FxHashMap<Gram, u32>]| {
            tables
                .iter()
                .enumerate()
                .map(|(i, fdist)| {
                    let table = fdist
                        .iter()
                        .map(|(gram, cnt)| (gram_to_str(gram), *cnt))
                        .collect::<BTreeMap<_, _>>();
                    (i + 1, table)
                })
                .collect::<BTreeMap<_, _>>()
        };

        let data = ModelFileOut {
            n: self.order,
            fdist: encode(self.counts.as_slice()),
            continuation_fdist: self.continuation.as_deref().map(encode),
            follow_fdist: self.follow.as_ref().map(|follow| {
                follow
                    .iter()
                    .enumerate()
                    .map(|(i, ffdist)| {
                        let table = ffdist
                            .iter()
                            .map(|(prefix, next)| {
                                let next = next
                                    .iter()
                                    .map(|(tag, cnt)| (tag.to_token(), *cnt))
                                    .collect::<BTreeMap<_, _>>();
                                (gram_to_str(prefix), next)
                            })
                            .collect::<BTreeMap<_, _>>();
                        (i + 1, table)
                    })
                    .collect()
            }),
        };

        // 書き込み途中のファイルを残さない
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &data)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path, options: LoadOptions) -> Result<NGramModel> {
        info!("Reading {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_json(&text, options)
    }

    pub fn from_json(text: &str, options: LoadOptions) -> Result<NGramModel> {
        let data: ModelFileIn = serde_json::from_str(text)?;
        let order = options.max_order.unwrap_or(data.n);
        if order > data.n {
            return Err(InasylError::InsufficientOrder {
                requested: order,
                stored: data.n,
            });
        }
        if order == 0 {
            return Err(InasylError::InvalidOrder(order));
        }

        let counts = Self::decode_counts(&data.fdist, 1..=order)?;

        let continuation = if options.continuation {
            let table = data
                .continuation_fdist
                .as_ref()
                .ok_or(InasylError::MissingTable(CONTINUATION_TABLE))?;
            Some(Self::decode_counts(table, 1..=order - 1)?)
        } else {
            None
        };

        let follow = if options.follow {
            let table = data
                .follow_fdist
                .as_ref()
                .ok_or(InasylError::MissingTable(FOLLOW_TABLE))?;
            let mut follow = Vec::with_capacity(order.saturating_sub(1));
            for k in 1..order {
                let mut ffdist: FollowTable = FxHashMap::default();
                if let Some(raw) = table.get(&k) {
                    let decoded: BTreeMap<String, BTreeMap<String, u32>> =
                        serde_json::from_str(raw.get())?;
                    for (prefix, next) in decoded {
                        let mut dist: FxHashMap<Tag, u32> = FxHashMap::default();
                        for (tag, cnt) in next {
                            dist.insert(Tag::from_token(&tag)?, cnt);
                        }
                        ffdist.insert(str_to_gram(&prefix)?, dist);
                    }
                }
                follow.push(ffdist);
            }
            Some(follow)
        } else {
            None
        };

        let totals = Self::totals_of(&counts);
        Ok(NGramModel {
            order,
            counts,
            continuation,
            follow,
            totals,
        })
    }

    fn decode_counts(
        tables: &BTreeMap<usize, Box<RawValue>>,
        orders: std::ops::RangeInclusive<usize>,
    ) -> Result<Vec<FxHashMap<Gram, u32>>> {
        let mut result = Vec::new();
        for k in orders {
            let mut fdist: FxHashMap<Gram, u32> = FxHashMap::default();
            if let Some(raw) = tables.get(&k) {
                let decoded: BTreeMap<String, u32> = serde_json::from_str(raw.get())?;
                for (gram, cnt) in decoded {
                    fdist.insert(str_to_gram(&gram)?, cnt);
                }
            }
            result.push(fdist);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{pad_tokens, syllables_to_tags};
    use tempfile::NamedTempFile;

    fn corpus(order: usize) -> Vec<Gram> {
        let words = ["ru.mah", "ma.kan", "ma.kan.an"]
            .iter()
            .map(|w| syllables_to_tags(w, '.'))
            .collect();
        pad_tokens(words, order)
    }

    #[test]
    fn test_counts() -> anyhow::Result<()> {
        let model = NGramModel::build(&corpus(3), 3)?;
        assert_eq!(model.count(&[Tag::mid('m'), Tag::end('a')])?, 2);
        assert_eq!(model.count(&[Tag::StartPad, Tag::StartPad])?, 3);
        assert_eq!(model.count(&[Tag::end('x')])?, 0);
        // 3 words × (2 pads + letters + end marker)
        assert_eq!(model.total(1), 3 * 3 + 5 + 5 + 7);
        assert_eq!(model.distinct(1), model.counts_of(1).len());
        Ok(())
    }

    #[test]
    fn test_continuation_and_follow() -> anyhow::Result<()> {
        let model = NGramModel::build(&corpus(3), 3)?;
        // "a¡" の直前に来るタグ: m¡ (rumah), k¡ (makan), n• (makanan)
        assert_eq!(model.continuation_count(&[Tag::mid('a')])?, 3);
        // "m¡" の後: a¡ (rumah), a• (makan)
        assert_eq!(model.follow_count(&[Tag::mid('m')])?, 2);
        let histogram = model.follow_histogram(&[Tag::mid('m')], 3)?;
        assert_eq!(histogram.get(&1), Some(&1));
        assert_eq!(histogram.get(&2), Some(&1));
        Ok(())
    }

    #[test]
    fn test_gram_too_long() -> anyhow::Result<()> {
        let model = NGramModel::build(&corpus(2), 2)?;
        let err = model
            .count(&[Tag::mid('m'), Tag::end('a'), Tag::mid('k')])
            .unwrap_err();
        assert!(matches!(err, InasylError::InvalidGramLength { len: 3, order: 2 }));
        assert!(model.continuation_count(&[Tag::mid('m'), Tag::end('a')]).is_err());
        Ok(())
    }

    #[test]
    fn test_save_load_round_trip() -> anyhow::Result<()> {
        let model = NGramModel::build(&corpus(4), 4)?;
        let tmpfile = NamedTempFile::new()?;
        model.save(tmpfile.path())?;

        let loaded = NGramModel::load(tmpfile.path(), LoadOptions::default())?;
        assert_eq!(loaded, model);
        Ok(())
    }

    #[test]
    fn test_partial_load() -> anyhow::Result<()> {
        let model = NGramModel::build(&corpus(4), 4)?;
        let tmpfile = NamedTempFile::new()?;
        model.save(tmpfile.path())?;

        let loaded = NGramModel::load(
            tmpfile.path(),
            LoadOptions {
                max_order: Some(2),
                continuation: false,
                follow: true,
            },
        )?;
        assert_eq!(loaded.order(), 2);
        assert!(!loaded.has_continuation());
        assert_eq!(loaded.counts_of(2), model.counts_of(2));
        assert!(matches!(
            loaded.continuation_count(&[Tag::mid('a')]),
            Err(InasylError::MissingTable(CONTINUATION_TABLE))
        ));
        Ok(())
    }

    #[test]
    fn test_build_without_tables() -> anyhow::Result<()> {
        let model = NGramModel::build_with(
            &corpus(3),
            3,
            BuildTables {
                continuation: false,
                follow: false,
            },
        )?;
        assert!(!model.has_continuation());
        assert!(!model.has_follow());

        let tmpfile = NamedTempFile::new()?;
        model.save(tmpfile.path())?;
        let text = fs::read_to_string(tmpfile.path())?;
        assert!(!text.contains(CONTINUATION_TABLE));
        assert!(!text.contains(FOLLOW_TABLE));

        let loaded = NGramModel::load(
            tmpfile.path(),
            LoadOptions {
                max_order: None,
                continuation: false,
                follow: false,
            },
        )?;
        assert_eq!(loaded, model);
        Ok(())
    }

    #[test]
    fn test_truncate_matches_partial_load() -> anyhow::Result<()> {
        let model = NGramModel::build(&corpus(4), 4)?;
        let tmpfile = NamedTempFile::new()?;
        model.save(tmpfile.path())?;

        let loaded = NGramModel::load(
            tmpfile.path(),
            LoadOptions {
                max_order: Some(3),
                ..LoadOptions::default()
            },
        )?;
        assert_eq!(model.truncate(3)?, loaded);
        assert!(model.truncate(5).is_err());
        Ok(())
    }

    #[test]
    fn test_insufficient_order() -> anyhow::Result<()> {
        let model = NGramModel::build(&corpus(2), 2)?;
        let tmpfile = NamedTempFile::new()?;
        model.save(tmpfile.path())?;

        let err = NGramModel::load(
            tmpfile.path(),
            LoadOptions {
                max_order: Some(3),
                ..LoadOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            InasylError::InsufficientOrder {
                requested: 3,
                stored: 2
            }
        ));
        Ok(())
    }

    #[test]
    fn test_missing_table() {
        let json = r#"{"N": 2, "fdist": {"1": {"a•": 1}, "2": {}}}"#;
        let err = NGramModel::from_json(json, LoadOptions::default()).unwrap_err();
        assert!(matches!(err, InasylError::MissingTable(_)));

        let model = NGramModel::from_json(
            json,
            LoadOptions {
                max_order: None,
                continuation: false,
                follow: false,
            },
        )
        .unwrap();
        assert_eq!(model.count(&[Tag::end('a')]).unwrap(), 1);
    }
}
