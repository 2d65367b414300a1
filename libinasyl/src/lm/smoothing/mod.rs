use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::InasylError;
use crate::lm::ngram_model::{LoadOptions, NGramModel};
use crate::tag::{Gram, Tag};

pub mod generalized_kn;
pub mod kneser_ney;
pub mod session;
pub mod stupid_backoff;

pub const DEFAULT_KN_DISCOUNT: f64 = 0.75;
pub const DEFAULT_GKN_CEILING: u32 = 3;
pub const DEFAULT_BACKOFF_ALPHA: f64 = 0.4;

/// 平滑化の方式。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum SmoothingMethod {
    KneserNey { d: f64 },
    GeneralizedKneserNey { ceiling: u32 },
    StupidBackoff { alpha: f64 },
}

impl SmoothingMethod {
    /// KN 系は継続数と後続分布を読む。stupid backoff は生の出現数だけ。
    pub fn needs_continuation(&self) -> bool {
        !matches!(self, SmoothingMethod::StupidBackoff { .. })
    }

    pub fn needs_follow(&self) -> bool {
        !matches!(self, SmoothingMethod::StupidBackoff { .. })
    }

    pub fn load_options(&self, max_order: Option<usize>) -> LoadOptions {
        LoadOptions {
            max_order,
            continuation: self.needs_continuation(),
            follow: self.needs_follow(),
        }
    }

    /// 各方式のスコア計算の入口。
    pub(crate) fn score(
        &self,
        model: &NGramModel,
        tags: &[Tag],
        cache: &mut ProbabilityCache,
        discounts: Option<&generalized_kn::DiscountCache>,
    ) -> crate::error::Result<f64> {
        match self {
            SmoothingMethod::KneserNey { d } => {
                kneser_ney::kneser_ney(model, tags, *d, Level::Highest, cache)
            }
            SmoothingMethod::GeneralizedKneserNey { ceiling } => {
                let discounts = discounts.ok_or(InasylError::MissingTable("discount cache"))?;
                generalized_kn::generalized_kn(
                    model,
                    tags,
                    *ceiling,
                    Level::Highest,
                    cache,
                    discounts,
                )
            }
            SmoothingMethod::StupidBackoff { alpha } => {
                stupid_backoff::stupid_backoff(model, tags, *alpha, cache)
            }
        }
    }
}

impl Default for SmoothingMethod {
    fn default() -> Self {
        SmoothingMethod::StupidBackoff {
            alpha: DEFAULT_BACKOFF_ALPHA,
        }
    }
}

/// "kn", "gkn:4", "stupid-backoff:0.3" のような文字列を読む。
/// コロン以降を省略したときは既定のパラメータ。
impl FromStr for SmoothingMethod {
    type Err = InasylError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, param) = match s.split_once(':') {
            Some((name, param)) => (name, Some(param)),
            None => (s, None),
        };
        let invalid = || InasylError::UnknownSmoothing(s.to_string());
        let method = match name.trim().to_lowercase().as_str() {
            "kn" | "kneser-ney" => SmoothingMethod::KneserNey {
                d: param
                    .map(|p| p.trim().parse::<f64>())
                    .transpose()
                    .map_err(|_| invalid())?
                    .unwrap_or(DEFAULT_KN_DISCOUNT),
            },
            "gkn" => SmoothingMethod::GeneralizedKneserNey {
                ceiling: param
                    .map(|p| p.trim().parse::<u32>())
                    .transpose()
                    .map_err(|_| invalid())?
                    .unwrap_or(DEFAULT_GKN_CEILING),
            },
            "stupid-backoff" | "stupid_backoff" | "sb" => SmoothingMethod::StupidBackoff {
                alpha: param
                    .map(|p| p.trim().parse::<f64>())
                    .transpose()
                    .map_err(|_| invalid())?
                    .unwrap_or(DEFAULT_BACKOFF_ALPHA),
            },
            _ => return Err(invalid()),
        };
        Ok(method)
    }
}

impl Display for SmoothingMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SmoothingMethod::KneserNey { d } => write!(f, "kn:{}", d),
            SmoothingMethod::GeneralizedKneserNey { ceiling } => write!(f, "gkn:{}", ceiling),
            SmoothingMethod::StupidBackoff { alpha } => write!(f, "stupid-backoff:{}", alpha),
        }
    }
}

/// 最高次数の生の出現数で計算した値と、低次の継続数で計算した値は別物なので分けて持つ。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Highest,
    Lower,
}

/// 確率のメモ。level → gram の長さ → gram。
#[derive(Debug, Default, Clone)]
pub struct ProbabilityCache {
    tables: [Vec<FxHashMap<Gram, f64>>; 2],
}

impl ProbabilityCache {
    fn slot(level: Level) -> usize {
        match level {
            Level::Highest => 0,
            Level::Lower => 1,
        }
    }

    pub fn get(&self, level: Level, tags: &[Tag]) -> Option<f64> {
        self.tables[Self::slot(level)]
            .get(tags.len())
            .and_then(|table| table.get(tags))
            .copied()
    }

    pub fn insert(&mut self, level: Level, tags: &[Tag], prob: f64) {
        let tables = &mut self.tables[Self::slot(level)];
        if tables.len() <= tags.len() {
            tables.resize_with(tags.len() + 1, FxHashMap::default);
        }
        tables[tags.len()].insert(tags.to_vec(), prob);
    }

    pub fn len(&self) -> usize {
        self.tables
            .iter()
            .flat_map(|tables| tables.iter())
            .map(|table| table.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        for tables in self.tables.iter_mut() {
            tables.clear();
        }
    }
}

/// KN 系の unigram の値。継続数のない一次モデルでは出現数 / N で代用する。
pub(crate) fn unigram_base(model: &NGramModel, tags: &[Tag]) -> crate::error::Result<f64> {
    if model.order() >= 2 && model.has_continuation() {
        let continuation = model.continuation_count(tags)?.max(1) as f64;
        Ok(continuation / model.distinct(2).max(1) as f64)
    } else {
        let count = model.count(tags)?.max(1) as f64;
        Ok(count / model.total(1).max(1) as f64)
    }
}
