use log::debug;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::lm::ngram_model::NGramModel;
use crate::lm::smoothing::{unigram_base, Level, ProbabilityCache};
use crate::tag::Tag;

/// 出現数 c に対する割引 D(c)。
///
/// `D(c) = c - (c+1) * (n[c+1] / n[c]) * (n[1] / (n[1] + 2 n[2]))` を 0 以上に丸めたもの。
/// c は ceiling で頭打ちにする。分母が 0 になる場合は割引なし。
pub fn gkn_discount(c: u32, c_freq: &FxHashMap<u32, u32>, ceiling: u32) -> f64 {
    if c == 0 {
        return 0.0;
    }
    let c = c.min(ceiling);
    let n = |k: u32| c_freq.get(&k).copied().unwrap_or(0) as f64;

    let n_c = n(c);
    let y_denom = n(1) + 2.0 * n(2);
    if n_c == 0.0 || y_denom == 0.0 {
        return 0.0;
    }
    let y = n(1) / y_denom;
    let d = c as f64 - (c as f64 + 1.0) * (n(c + 1) / n_c) * y;
    d.max(0.0)
}

/// 長さ 2..=N の各次数について D(0..=ceiling) を前計算したもの。
/// 次数 N は生の出現数、それ未満は継続数から作る。
#[derive(Debug, Clone)]
pub struct DiscountCache {
    ceiling: u32,
    discounts: Vec<Vec<f64>>,
}

impl DiscountCache {
    pub fn build(model: &NGramModel, ceiling: u32) -> Result<DiscountCache> {
        let order = model.order();
        let mut discounts = vec![Vec::new(); order + 1];
        for (len, slot) in discounts.iter_mut().enumerate().skip(2) {
            let c_freq = model.count_of_counts(len, len == order)?;
            *slot = (0..=ceiling)
                .map(|c| gkn_discount(c, &c_freq, ceiling))
                .collect();
            debug!("discounts[{}]={:?}", len, slot);
        }
        Ok(DiscountCache {
            ceiling,
            discounts,
        })
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// 長さ len の gram で出現数 c のときの割引。
    pub fn get(&self, len: usize, c: u32) -> f64 {
        self.discounts
            .get(len)
            .and_then(|row| row.get(c.min(self.ceiling) as usize))
            .copied()
            .unwrap_or(0.0)
    }
}

/**
 * 出現数ごとに割引を変える (modified) Kneser-Ney。
 *
 * 文脈の後続分布に 2 種類以上の出現数がないとき、あるいは文脈が未出現のときは、
 * この次数の補正をせずに一つ短い gram へ下がる。
 */
pub fn generalized_kn(
    model: &NGramModel,
    tags: &[Tag],
    ceiling: u32,
    level: Level,
    cache: &mut ProbabilityCache,
    discounts: &DiscountCache,
) -> Result<f64> {
    if let Some(prob) = cache.get(level, tags) {
        return Ok(prob);
    }

    let n = tags.len();
    let prob = if n == 1 {
        unigram_base(model, tags)?
    } else {
        let tags_prec = &tags[..n - 1];
        let count_prec = model.count(tags_prec)?;
        let histogram = if count_prec > 0 {
            model.follow_histogram(tags_prec, ceiling)?
        } else {
            Default::default()
        };

        if count_prec == 0 || histogram.len() <= 1 {
            generalized_kn(model, &tags[1..], ceiling, Level::Highest, cache, discounts)?
        } else {
            let (ckn, ckn_prec) = match level {
                Level::Highest => (model.count(tags)?, count_prec),
                Level::Lower => (
                    model.continuation_count(tags)?,
                    model.continuation_count(tags_prec)?,
                ),
            };
            let d = discounts.get(n, ckn);

            let gamma: f64 = (1..=ceiling)
                .map(|i| discounts.get(n, i) * histogram.get(&i).copied().unwrap_or(0) as f64)
                .sum();
            let lambda = gamma / count_prec as f64;

            let lower = generalized_kn(model, &tags[1..], ceiling, Level::Lower, cache, discounts)?;
            (ckn as f64 - d).max(0.0) / ckn_prec.max(1) as f64 + lambda * lower
        }
    };

    cache.insert(level, tags, prob);
    Ok(prob)
}
