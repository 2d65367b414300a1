use crate::error::Result;
use crate::lm::ngram_model::NGramModel;
use crate::lm::smoothing::{Level, ProbabilityCache};
use crate::tag::Tag;

/// Stupid backoff のスコア。確率分布にはならない (合計が 1 を超えうる)。
/// 未観測の unigram は 1 回出現したものとして扱い、0 にはしない。
pub fn stupid_backoff(
    model: &NGramModel,
    tags: &[Tag],
    alpha: f64,
    cache: &mut ProbabilityCache,
) -> Result<f64> {
    // レベルの区別はないので Highest 側だけを使う
    if let Some(prob) = cache.get(Level::Highest, tags) {
        return Ok(prob);
    }

    let n = tags.len();
    let count = model.count(tags)?;
    let prob = if count > 0 && n >= 2 {
        let count_prec = model.count(&tags[..n - 1])?;
        count as f64 / count_prec.max(1) as f64
    } else if n >= 2 {
        alpha * stupid_backoff(model, &tags[1..], alpha, cache)?
    } else {
        count.max(1) as f64 / model.total(1).max(1) as f64
    };

    cache.insert(Level::Highest, tags, prob);
    Ok(prob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{pad_tokens, syllables_to_tags};

    fn model() -> NGramModel {
        let words = ["ru.mah", "ma.kan"]
            .iter()
            .map(|w| syllables_to_tags(w, '.'))
            .collect();
        NGramModel::build(&pad_tokens(words, 3), 3).unwrap()
    }

    #[test]
    fn test_seen_trigram() -> anyhow::Result<()> {
        let model = model();
        let mut cache = ProbabilityCache::default();
        // "∅ r¡" は 1 回、その後は必ず "u•"
        let p = stupid_backoff(
            &model,
            &[Tag::StartPad, Tag::mid('r'), Tag::end('u')],
            0.4,
            &mut cache,
        )?;
        assert_eq!(p, 1.0);
        Ok(())
    }

    #[test]
    fn test_backoff_multiplies_alpha() -> anyhow::Result<()> {
        let model = model();
        let mut cache = ProbabilityCache::default();
        let unseen = [Tag::mid('r'), Tag::end('u'), Tag::end('m')];
        let p = stupid_backoff(&model, &unseen, 0.4, &mut cache)?;
        // "u• m•" も未観測、"m•" も未観測 → 0.4 * 0.4 * 1/N
        let expected = 0.4 * 0.4 * (1.0 / model.total(1) as f64);
        assert!((p - expected).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_unseen_unigram_is_positive() -> anyhow::Result<()> {
        let model = model();
        let mut cache = ProbabilityCache::default();
        let p = stupid_backoff(&model, &[Tag::end('z')], 0.4, &mut cache)?;
        assert!(p > 0.0);
        Ok(())
    }
}
