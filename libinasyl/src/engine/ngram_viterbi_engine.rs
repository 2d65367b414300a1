use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use log::{info, warn};

use crate::config::LinguisticConfig;
use crate::engine::base::TaggingEngine;
use crate::error::{InasylError, Result};
use crate::graph::graph_resolver::GraphResolver;
use crate::graph::lattice_graph::Lattice;
use crate::graph::state_space::StateSpaceGenerator;
use crate::graph::TagMode;
use crate::lm::ngram_model::NGramModel;
use crate::lm::smoothing::session::ScoringSession;
use crate::lm::smoothing::SmoothingMethod;
use crate::stemmer::Stemmer;
use crate::tag::{tags_to_phonemes, tags_to_syllables, Tag};

/// n-gram とビタビによるタグ付けエンジンです。
/// 語ごとにラティスを作り、遷移を平滑化済みの n-gram 確率で採点します。
pub struct NGramViterbiEngine {
    mode: TagMode,
    order: usize,
    config: Arc<LinguisticConfig>,
    session: ScoringSession,
    graph_resolver: GraphResolver,
    stemmer: Option<Arc<dyn Stemmer>>,
    prune: bool,
}

impl Debug for NGramViterbiEngine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NGramViterbiEngine(mode={}, order={}, method={})",
            self.mode,
            self.order,
            self.session.method()
        )
    }
}

impl TaggingEngine for NGramViterbiEngine {
    fn tag_word(&mut self, word: &str) -> Result<Vec<Tag>> {
        self.tag_with(word, self.prune)
    }

    fn tag_word_unpruned(&mut self, word: &str) -> Result<Vec<Tag>> {
        self.tag_with(word, false)
    }

    fn segment(&mut self, word: &str) -> Result<String> {
        let tags = self.tag_word(word)?;
        Ok(self.render(word, &tags))
    }
}

impl NGramViterbiEngine {
    pub fn mode(&self) -> TagMode {
        self.mode
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn config(&self) -> &LinguisticConfig {
        &self.config
    }

    pub fn session(&self) -> &ScoringSession {
        &self.session
    }

    /// 別スレッドで使うための複製。モデルは共有し、キャッシュは新しく作る。
    pub fn fork(&self) -> NGramViterbiEngine {
        NGramViterbiEngine {
            mode: self.mode,
            order: self.order,
            config: self.config.clone(),
            session: self.session.fork(),
            graph_resolver: GraphResolver::default(),
            stemmer: self.stemmer.clone(),
            prune: self.prune,
        }
    }

    /// タグ列を出力形式の文字列にする。
    pub fn render(&self, word: &str, tags: &[Tag]) -> String {
        match self.mode {
            TagMode::Syllabification => tags_to_syllables(
                word,
                tags,
                self.config.syllable_boundary,
                self.config.word_joiner,
            ),
            TagMode::G2p => tags_to_phonemes(tags),
        }
    }

    /// 部分語ごとのラティス。デバッグ用。
    pub fn to_lattice(&self, sub_word: &str, prune: bool) -> Result<Lattice> {
        let forced = self.forced_phonemes(sub_word);
        Ok(StateSpaceGenerator::new(self.mode, self.order, &self.config)?
            .prune(prune)
            .forced(forced)
            .generate(sub_word))
    }

    fn forced_phonemes(&self, sub_word: &str) -> Vec<Option<char>> {
        match (self.mode, &self.stemmer) {
            (TagMode::G2p, Some(stemmer)) => stemmer.forced_phonemes(sub_word).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn tag_with(&mut self, word: &str, prune: bool) -> Result<Vec<Tag>> {
        let joiner = self.config.word_joiner;
        let mut sequence = Vec::with_capacity(word.len());
        for (i, sub_word) in word.split(joiner).filter(|s| !s.is_empty()).enumerate() {
            // 音節化では連結記号のタグを出さない。出力時に元の語から写す。
            if i > 0 && self.mode == TagMode::G2p {
                sequence.push(Tag::phoneme(joiner, joiner));
            }
            sequence.extend(self.tag_sub_word(sub_word, prune)?);
        }
        Ok(sequence)
    }

    fn tag_sub_word(&mut self, sub_word: &str, prune: bool) -> Result<Vec<Tag>> {
        let lattice = self.to_lattice(sub_word, prune)?;
        if prune {
            if let Some(position) = lattice.first_empty_layer() {
                warn!(
                    "All states of '{}' were eliminated at layer {}, retrying without pruning",
                    sub_word, position
                );
                return self.tag_sub_word(sub_word, false);
            }
        }

        match self.graph_resolver.resolve(&lattice, &mut self.session) {
            Ok(path) => Ok(path.tags),
            Err(InasylError::NoViablePath { position, .. }) if prune => {
                warn!(
                    "No viable path for '{}' at {}, retrying without pruning",
                    sub_word, position
                );
                self.tag_sub_word(sub_word, false)
            }
            Err(err) => Err(err),
        }
    }
}

pub struct NGramViterbiEngineBuilder {
    mode: TagMode,
    order: Option<usize>,
    method: SmoothingMethod,
    model: Option<Arc<NGramModel>>,
    model_path: Option<PathBuf>,
    augmented: Option<(Arc<NGramModel>, f64)>,
    augmented_path: Option<(PathBuf, f64)>,
    config: Option<Arc<LinguisticConfig>>,
    stemmer: Option<Arc<dyn Stemmer>>,
    prune: bool,
}

impl NGramViterbiEngineBuilder {
    pub fn new(mode: TagMode) -> NGramViterbiEngineBuilder {
        NGramViterbiEngineBuilder {
            mode,
            order: None,
            method: SmoothingMethod::default(),
            model: None,
            model_path: None,
            augmented: None,
            augmented_path: None,
            config: None,
            stemmer: None,
            prune: true,
        }
    }

    /// 使う次数。省略するとモデルの次数。
    pub fn order(&mut self, order: usize) -> &mut Self {
        self.order = Some(order);
        self
    }

    pub fn smoothing(&mut self, method: SmoothingMethod) -> &mut Self {
        self.method = method;
        self
    }

    pub fn model(&mut self, model: Arc<NGramModel>) -> &mut Self {
        self.model = Some(model);
        self
    }

    pub fn model_path(&mut self, path: &Path) -> &mut Self {
        self.model_path = Some(path.to_path_buf());
        self
    }

    pub fn augmented(&mut self, model: Arc<NGramModel>, weight: f64) -> &mut Self {
        self.augmented = Some((model, weight));
        self
    }

    pub fn augmented_path(&mut self, path: &Path, weight: f64) -> &mut Self {
        self.augmented_path = Some((path.to_path_buf(), weight));
        self
    }

    pub fn config(&mut self, config: Arc<LinguisticConfig>) -> &mut Self {
        self.config = Some(config);
        self
    }

    pub fn stemmer(&mut self, stemmer: Arc<dyn Stemmer>) -> &mut Self {
        self.stemmer = Some(stemmer);
        self
    }

    pub fn prune(&mut self, prune: bool) -> &mut Self {
        self.prune = prune;
        self
    }

    fn load_model(&self, path: &Path) -> anyhow::Result<Arc<NGramModel>> {
        let model = NGramModel::load(path, self.method.load_options(self.order))
            .with_context(|| format!("Cannot load n-gram model: {}", path.display()))?;
        Ok(Arc::new(model))
    }

    pub fn build(&self) -> anyhow::Result<NGramViterbiEngine> {
        let model = match (&self.model, &self.model_path) {
            (Some(model), _) => model.clone(),
            (None, Some(path)) => self.load_model(path)?,
            (None, None) => bail!("No n-gram model is given"),
        };

        let order = self.order.unwrap_or(model.order());
        if order > model.order() {
            return Err(InasylError::InsufficientOrder {
                requested: order,
                stored: model.order(),
            }
            .into());
        }
        if order < 2 {
            return Err(InasylError::InvalidOrder(order).into());
        }

        // 最高次数の扱いが変わるので、使わない次数は落としておく
        let truncate = |model: Arc<NGramModel>| -> anyhow::Result<Arc<NGramModel>> {
            if order < model.order() {
                Ok(Arc::new(model.truncate(order)?))
            } else {
                Ok(model)
            }
        };

        let mut session = ScoringSession::new(truncate(model)?, self.method)?;
        let augmented = match (&self.augmented, &self.augmented_path) {
            (Some((model, weight)), _) => Some((model.clone(), *weight)),
            (None, Some((path, weight))) => Some((self.load_model(path)?, *weight)),
            (None, None) => None,
        };
        if let Some((aug_model, weight)) = augmented {
            let aug_model = truncate(aug_model)?;
            info!("Blending augmented model (weight={})", weight);
            session = session.with_augmented(ScoringSession::new(aug_model, self.method)?, weight);
        }

        let config = match &self.config {
            Some(config) => config.clone(),
            None => Arc::new(LinguisticConfig::load_default()?),
        };

        info!(
            "Built tagging engine: mode={}, order={}, method={}, prune={}",
            self.mode, order, self.method, self.prune
        );
        Ok(NGramViterbiEngine {
            mode: self.mode,
            order,
            config,
            session,
            graph_resolver: GraphResolver::default(),
            stemmer: self.stemmer.clone(),
            prune: self.prune,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{tokenize, CorpusRow};
    use crate::stemmer::DictionaryStemmer;
    use crate::tag::pad_tokens;

    fn model(rows: &[(&str, &str)], mode: TagMode, order: usize) -> Arc<NGramModel> {
        let rows: Vec<CorpusRow> = rows.iter().map(|(w, l)| CorpusRow::new(w, l)).collect();
        let tokens = tokenize(&rows, mode, &LinguisticConfig::default()).unwrap();
        Arc::new(NGramModel::build(&pad_tokens(tokens, order), order).unwrap())
    }

    fn engine(model: Arc<NGramModel>, mode: TagMode) -> NGramViterbiEngine {
        NGramViterbiEngineBuilder::new(mode)
            .model(model)
            .config(Arc::new(LinguisticConfig::default()))
            .smoothing(SmoothingMethod::StupidBackoff { alpha: 0.4 })
            .build()
            .unwrap()
    }

    #[test]
    fn test_segment_seen_words() -> anyhow::Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let model = model(
            &[("rumah", "ru.mah"), ("makan", "ma.kan"), ("kuda", "ku.da")],
            TagMode::Syllabification,
            3,
        );
        let mut engine = engine(model, TagMode::Syllabification);
        assert_eq!(engine.segment("rumah")?, "ru.mah");
        assert_eq!(engine.segment("makan")?, "ma.kan");
        Ok(())
    }

    #[test]
    fn test_hyphen_is_copied_in_syllabification() -> anyhow::Result<()> {
        let model = model(&[("kuda", "ku.da")], TagMode::Syllabification, 3);
        let mut engine = engine(model, TagMode::Syllabification);
        let tags = engine.tag_word("kuda-kuda")?;
        // 連結記号のタグは出さない
        assert_eq!(tags.len(), 8);
        assert_eq!(engine.segment("kuda-kuda")?, "ku.da-ku.da");
        Ok(())
    }

    #[test]
    fn test_hyphen_tag_in_g2p() -> anyhow::Result<()> {
        let model = model(&[("ku.da", "ku.da")], TagMode::G2p, 3);
        let mut engine = engine(model, TagMode::G2p);
        let tags = engine.tag_word("ku.da-ku.da")?;
        assert_eq!(tags.len(), 11);
        assert_eq!(tags[5], Tag::phoneme('-', '-'));
        assert_eq!(engine.segment("ku.da-ku.da")?, "ku.da-ku.da");
        Ok(())
    }

    #[test]
    fn test_g2p_with_stemmer() -> anyhow::Result<()> {
        let model = model(
            &[("ba.ca", "ba.ca"), ("mem.ba.ca", "m#m.ba.ca")],
            TagMode::G2p,
            3,
        );
        let stemmer: Arc<dyn Stemmer> = Arc::new(DictionaryStemmer::from_roots(["baca"]));
        let mut engine = NGramViterbiEngineBuilder::new(TagMode::G2p)
            .model(model)
            .config(Arc::new(LinguisticConfig::default()))
            .stemmer(stemmer)
            .build()?;
        assert_eq!(engine.segment("mem.ba.ca")?, "m#m.ba.ca");
        Ok(())
    }

    #[test]
    fn test_deterministic() -> anyhow::Result<()> {
        let model = model(
            &[("rumah", "ru.mah"), ("makan", "ma.kan"), ("main", "ma.in")],
            TagMode::Syllabification,
            3,
        );
        let mut engine = engine(model, TagMode::Syllabification);
        let first = engine.tag_word("rumahan")?;
        for _ in 0..3 {
            assert_eq!(engine.fork().tag_word("rumahan")?, first);
            assert_eq!(engine.tag_word("rumahan")?, first);
        }
        Ok(())
    }

    #[test]
    fn test_lower_order_scores_match_between_memory_and_file() -> anyhow::Result<()> {
        let model = model(
            &[
                ("rumah", "ru.mah"),
                ("makan", "ma.kan"),
                ("makanan", "ma.ka.nan"),
                ("kamu", "ka.mu"),
                ("mata", "ma.ta"),
                ("kaki", "ka.ki"),
                ("rusa", "ru.sa"),
                ("makam", "ma.kam"),
            ],
            TagMode::Syllabification,
            4,
        );
        let tmpfile = tempfile::NamedTempFile::new()?;
        model.save(tmpfile.path())?;

        let method = SmoothingMethod::GeneralizedKneserNey { ceiling: 3 };
        let from_memory = NGramViterbiEngineBuilder::new(TagMode::Syllabification)
            .model(model)
            .order(3)
            .smoothing(method)
            .config(Arc::new(LinguisticConfig::default()))
            .build()?;
        let from_file = NGramViterbiEngineBuilder::new(TagMode::Syllabification)
            .model_path(tmpfile.path())
            .order(3)
            .smoothing(method)
            .config(Arc::new(LinguisticConfig::default()))
            .build()?;
        assert_eq!(from_memory.session().model().order(), 3);

        let (mut a, mut b) = (from_memory.session().fork(), from_file.session().fork());
        for gram in [
            vec![Tag::mid('m'), Tag::end('a'), Tag::mid('k')],
            vec![Tag::mid('k'), Tag::end('a'), Tag::mid('n')],
            vec![Tag::StartPad, Tag::mid('r'), Tag::end('u')],
            vec![Tag::end('a'), Tag::mid('m')],
        ] {
            let (pa, pb) = (a.probability(&gram)?, b.probability(&gram)?);
            assert!((pa - pb).abs() < 1e-12, "{:?}: {} != {}", gram, pa, pb);
        }
        Ok(())
    }

    #[test]
    fn test_builder_errors() {
        let model = model(&[("rumah", "ru.mah")], TagMode::Syllabification, 2);
        assert!(NGramViterbiEngineBuilder::new(TagMode::Syllabification)
            .build()
            .is_err());
        assert!(NGramViterbiEngineBuilder::new(TagMode::Syllabification)
            .model(model)
            .order(3)
            .config(Arc::new(LinguisticConfig::default()))
            .build()
            .is_err());
    }
}
