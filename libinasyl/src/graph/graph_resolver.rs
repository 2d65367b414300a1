use log::trace;

use crate::error::{InasylError, Result};
use crate::graph::lattice_graph::Lattice;
use crate::lm::base::TransitionScorer;
use crate::tag::Tag;

/// ビタビで得た最良のタグ列 (語末記号は除く) とその対数確率。
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub tags: Vec<Tag>,
    pub score: f64,
}

/**
 * ラティス上の最尤経路を求める。
 */
#[derive(Default)]
pub struct GraphResolver {}

impl GraphResolver {
    /**
     * ビタビアルゴリズムで最適な経路を見つける。
     *
     * 遷移 gram は (前の状態の先頭タグ, 現在の状態...)。
     * 前の状態の選択で同点のときは後に列挙されたものを採り、最後の層で同点のときは
     * 先に列挙されたものを採る。
     */
    pub fn resolve<S: TransitionScorer>(
        &self,
        lattice: &Lattice,
        scorer: &mut S,
    ) -> Result<ResolvedPath> {
        let layers = lattice.layers();
        let mut scores: Vec<Vec<f64>> = Vec::with_capacity(layers.len());
        let mut back: Vec<Vec<usize>> = Vec::with_capacity(layers.len());
        scores.push(vec![0.0; layers[0].len()]);
        back.push(vec![0; layers[0].len()]);

        // 前向きに動的計画法でたどる
        let mut gram: Vec<Tag> = Vec::new();
        for t in 1..layers.len() {
            let layer = &layers[t];
            let prev_layer = &layers[t - 1];
            let no_path = || InasylError::NoViablePath {
                word: lattice.word(),
                position: t - 1,
            };
            if layer.is_empty() {
                return Err(no_path());
            }

            let mut layer_scores = Vec::with_capacity(layer.len());
            let mut layer_back = Vec::with_capacity(layer.len());
            for (j, state) in layer.states.iter().enumerate() {
                let mut best: Option<(f64, usize)> = None;
                for &i in layer.predecessors(j) {
                    let prev_state = &prev_layer.states[i];
                    gram.clear();
                    gram.push(prev_state[0]);
                    gram.extend_from_slice(state);

                    let tr_logprob = scorer.log_probability(&gram)?;
                    let va = scores[t - 1][i] + tr_logprob;
                    trace!("[{}] {:?}->{:?} : {:.5} | Sum: {:.5}", t, prev_state, state, tr_logprob, va);

                    match best {
                        Some((score, _)) if va < score => {}
                        _ => best = Some((va, i)),
                    }
                }
                let (score, prev) = best.ok_or_else(no_path)?;
                layer_scores.push(score);
                layer_back.push(prev);
            }

            if layer_scores.iter().all(|s| *s == f64::NEG_INFINITY) {
                return Err(no_path());
            }
            scores.push(layer_scores);
            back.push(layer_back);
        }

        // 最後の層で最もスコアの高い状態
        let last = layers.len() - 1;
        let mut best: Option<(f64, usize)> = None;
        for (j, score) in scores[last].iter().enumerate() {
            match best {
                Some((s, _)) if *score <= s => {}
                _ => best = Some((*score, j)),
            }
        }
        let Some((score, mut current)) = best else {
            return Err(InasylError::NoViablePath {
                word: lattice.word(),
                position: last,
            });
        };

        // 後ろ向きにたどる
        let mut tags = Vec::with_capacity(last);
        for t in (1..=last).rev() {
            let state = &layers[t].states[current];
            if let Some(tag) = state.last() {
                tags.push(*tag);
            }
            current = back[t][current];
        }
        tags.reverse();

        if tags.last() == Some(&Tag::WordEnd) {
            tags.pop();
        }
        Ok(ResolvedPath { tags, score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinguisticConfig;
    use crate::graph::state_space::StateSpaceGenerator;
    use crate::graph::TagMode;

    /// 音節末のタグを好むだけの採点器。
    struct PreferEnd;

    impl TransitionScorer for PreferEnd {
        fn probability(&mut self, gram: &[Tag]) -> Result<f64> {
            Ok(match gram.last() {
                Some(tag) if tag.is_end() => 0.9,
                _ => 0.1,
            })
        }

        fn order(&self) -> usize {
            3
        }
    }

    /// 全部同点。
    struct Flat;

    impl TransitionScorer for Flat {
        fn probability(&mut self, _gram: &[Tag]) -> Result<f64> {
            Ok(0.5)
        }

        fn order(&self) -> usize {
            2
        }
    }

    /// すべて確率 0。
    struct Impossible;

    impl TransitionScorer for Impossible {
        fn probability(&mut self, _gram: &[Tag]) -> Result<f64> {
            Ok(0.0)
        }

        fn order(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_resolve_prefers_high_score() -> anyhow::Result<()> {
        let config = LinguisticConfig::default();
        let lattice = StateSpaceGenerator::new(TagMode::Syllabification, 3, &config)?
            .prune(false)
            .generate("aku");
        let path = GraphResolver::default().resolve(&lattice, &mut PreferEnd)?;
        assert_eq!(path.tags, vec![Tag::end('a'), Tag::end('k'), Tag::end('u')]);
        assert!(path.score.is_finite());
        Ok(())
    }

    #[test]
    fn test_predecessor_tie_keeps_later() -> anyhow::Result<()> {
        let config = LinguisticConfig::default();
        let lattice = StateSpaceGenerator::new(TagMode::Syllabification, 2, &config)?
            .prune(false)
            .generate("ab");
        let path = GraphResolver::default().resolve(&lattice, &mut Flat)?;
        assert_eq!(path.tags, vec![Tag::end('a'), Tag::end('b')]);
        Ok(())
    }

    #[test]
    fn test_final_tie_keeps_first() -> anyhow::Result<()> {
        let config = LinguisticConfig::default();
        let lattice = StateSpaceGenerator::new(TagMode::Syllabification, 3, &config)?
            .prune(false)
            .generate("ab");
        let path = GraphResolver::default().resolve(&lattice, &mut Flat)?;
        // 最後の層は (b¡ ×) と (b• ×) が同点で、先頭の (b¡ ×) を採る
        assert_eq!(path.tags, vec![Tag::end('a'), Tag::mid('b')]);
        Ok(())
    }

    #[test]
    fn test_no_viable_path() -> anyhow::Result<()> {
        let config = LinguisticConfig::default();
        let lattice = StateSpaceGenerator::new(TagMode::Syllabification, 2, &config)?
            .prune(false)
            .generate("ab");
        let err = GraphResolver::default()
            .resolve(&lattice, &mut Impossible)
            .unwrap_err();
        assert!(matches!(err, InasylError::NoViablePath { position: 0, .. }));
        Ok(())
    }
}
