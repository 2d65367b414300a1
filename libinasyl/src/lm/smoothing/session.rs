use std::sync::Arc;

use log::{debug, info};

use crate::error::{InasylError, Result};
use crate::lm::base::TransitionScorer;
use crate::lm::ngram_model::NGramModel;
use crate::lm::smoothing::generalized_kn::DiscountCache;
use crate::lm::smoothing::{ProbabilityCache, SmoothingMethod};
use crate::tag::Tag;

/**
 * 一つのモデルに対するスコア計算の状態。
 *
 * モデル本体は共有 (読み取り専用) だが、確率キャッシュと割引表はセッションごとに持つ。
 * 並列に評価するときはスレッドごとに `fork` したものを使うこと。
 */
#[derive(Debug)]
pub struct ScoringSession {
    model: Arc<NGramModel>,
    method: SmoothingMethod,
    cache: ProbabilityCache,
    discounts: Option<DiscountCache>,
    augmented: Option<(Box<ScoringSession>, f64)>,
}

impl ScoringSession {
    pub fn new(model: Arc<NGramModel>, method: SmoothingMethod) -> Result<ScoringSession> {
        if method.needs_continuation() && !model.has_continuation() && model.order() >= 2 {
            return Err(InasylError::MissingTable(
                crate::lm::ngram_model::CONTINUATION_TABLE,
            ));
        }
        if method.needs_follow() && !model.has_follow() && model.order() >= 2 {
            return Err(InasylError::MissingTable(crate::lm::ngram_model::FOLLOW_TABLE));
        }

        let discounts = match method {
            SmoothingMethod::GeneralizedKneserNey { ceiling } => {
                let discounts = DiscountCache::build(&model, ceiling)?;
                info!("Built discount cache (ceiling={})", ceiling);
                Some(discounts)
            }
            _ => None,
        };

        Ok(ScoringSession {
            model,
            method,
            cache: ProbabilityCache::default(),
            discounts,
            augmented: None,
        })
    }

    /// 補助 (データ拡張) モデルを重み付きで足し合わせる。
    pub fn with_augmented(mut self, augmented: ScoringSession, weight: f64) -> ScoringSession {
        self.augmented = Some((Box::new(augmented), weight));
        self
    }

    /// 同じモデル・方式で、キャッシュが空のセッションを作る。
    pub fn fork(&self) -> ScoringSession {
        ScoringSession {
            model: self.model.clone(),
            method: self.method,
            cache: ProbabilityCache::default(),
            discounts: self.discounts.clone(),
            augmented: self
                .augmented
                .as_ref()
                .map(|(session, weight)| (Box::new(session.fork()), *weight)),
        }
    }

    pub fn model(&self) -> &Arc<NGramModel> {
        &self.model
    }

    pub fn method(&self) -> SmoothingMethod {
        self.method
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// P = P_primary + weight * P_augmented
    pub fn probability(&mut self, tags: &[Tag]) -> Result<f64> {
        if tags.is_empty() || tags.len() > self.model.order() {
            return Err(InasylError::InvalidGramLength {
                len: tags.len(),
                order: self.model.order(),
            });
        }

        let mut prob = self
            .method
            .score(&self.model, tags, &mut self.cache, self.discounts.as_ref())?;

        if let Some((augmented, weight)) = self.augmented.as_mut() {
            prob += *weight * augmented.probability(tags)?;
        }
        Ok(prob)
    }

    pub fn log_probability(&mut self, tags: &[Tag]) -> Result<f64> {
        TransitionScorer::log_probability(self, tags)
    }

    /// モデルを差し替えたときなどに、キャッシュを捨てる。割引表は残す。
    pub fn clear(&mut self) {
        debug!("Clearing {} cached probabilities", self.cache.len());
        self.cache.clear();
        if let Some((augmented, _)) = self.augmented.as_mut() {
            augmented.clear();
        }
    }
}

impl TransitionScorer for ScoringSession {
    fn probability(&mut self, gram: &[Tag]) -> Result<f64> {
        ScoringSession::probability(self, gram)
    }

    fn order(&self) -> usize {
        self.model.order()
    }
}
