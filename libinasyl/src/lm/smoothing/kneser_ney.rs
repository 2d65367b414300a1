use crate::error::Result;
use crate::lm::ngram_model::NGramModel;
use crate::lm::smoothing::{unigram_base, Level, ProbabilityCache};
use crate::tag::Tag;

/**
 * 割引 d を固定した補間 Kneser-Ney。
 *
 * 最高次数では生の出現数を、バックオフ先では継続数を使う。
 * 文脈が一度も出現していなければ、その次数では何もせず一つ短い gram を
 * 最高次数として評価する。
 */
pub fn kneser_ney(
    model: &NGramModel,
    tags: &[Tag],
    d: f64,
    level: Level,
    cache: &mut ProbabilityCache,
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
        if count_prec == 0 {
            kneser_ney(model, &tags[1..], d, Level::Highest, cache)?
        } else {
            let (ckn, ckn_prec) = match level {
                Level::Highest => (model.count(tags)?, count_prec),
                Level::Lower => (
                    model.continuation_count(tags)?,
                    model.continuation_count(tags_prec)?,
                ),
            };
            let follow = model.follow_count(tags_prec)?.max(1) as f64;
            let lambda = (d / count_prec as f64) * follow;
            let lower = kneser_ney(model, &tags[1..], d, Level::Lower, cache)?;
            (ckn as f64 - d).max(0.0) / ckn_prec.max(1) as f64 + lambda * lower
        }
    };

    cache.insert(level, tags, prob);
    Ok(prob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::{pad_tokens, syllables_to_tags};

    fn model() -> NGramModel {
        let words = ["ru.mah", "ma.kan", "ma.in", "ru.mah.nya"]
            .iter()
            .map(|w| syllables_to_tags(w, '.'))
            .collect();
        NGramModel::build(&pad_tokens(words, 3), 3).unwrap()
    }

    #[test]
    fn test_seen_trigram_is_positive() -> anyhow::Result<()> {
        let model = model();
        let mut cache = ProbabilityCache::default();
        let gram = [Tag::StartPad, Tag::mid('r'), Tag::end('u')];
        let p = kneser_ney(&model, &gram, 0.75, Level::Highest, &mut cache)?;
        assert!(p > 0.0 && p <= 1.0, "p={}", p);
        assert!(!cache.is_empty());
        Ok(())
    }

    #[test]
    fn test_unseen_context_backs_off() -> anyhow::Result<()> {
        let model = model();
        let mut cache = ProbabilityCache::default();
        let gram = [Tag::mid('x'), Tag::mid('q'), Tag::end('a')];
        let p = kneser_ney(&model, &gram, 0.75, Level::Highest, &mut cache)?;
        let backed_off = kneser_ney(&model, &gram[1..], 0.75, Level::Highest, &mut cache)?;
        assert_eq!(p, backed_off);
        assert!(p.is_finite() && p > 0.0);
        Ok(())
    }

    #[test]
    fn test_seen_beats_unseen() -> anyhow::Result<()> {
        let model = model();
        let mut cache = ProbabilityCache::default();
        let seen = [Tag::mid('m'), Tag::mid('a'), Tag::end('h')];
        let unseen = [Tag::mid('m'), Tag::mid('a'), Tag::end('r')];
        let p_seen = kneser_ney(&model, &seen, 0.75, Level::Highest, &mut cache)?;
        let p_unseen = kneser_ney(&model, &unseen, 0.75, Level::Highest, &mut cache)?;
        assert!(p_seen > p_unseen);
        Ok(())
    }
}
