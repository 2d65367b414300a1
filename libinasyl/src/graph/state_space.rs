use log::trace;
use rustc_hash::FxHashMap;

use crate::config::{LinguisticConfig, NeighborClass, Side};
use crate::error::{InasylError, Result};
use crate::graph::lattice_graph::{Lattice, Layer, State};
use crate::graph::TagMode;
use crate::tag::{Tag, WORDEND};

/**
 * 語ごとのラティスを作る。
 *
 * 各位置で許されるタグを前の層の状態に付け足していく。状態の末尾 (先頭を除いた部分)
 * が同じ状態は同じ後続を持つので、末尾ごとに一度だけ展開する。
 */
pub struct StateSpaceGenerator<'a> {
    mode: TagMode,
    state_len: usize,
    config: &'a LinguisticConfig,
    prune: bool,
    forced: Vec<Option<char>>,
}

impl<'a> StateSpaceGenerator<'a> {
    pub fn new(
        mode: TagMode,
        order: usize,
        config: &'a LinguisticConfig,
    ) -> Result<StateSpaceGenerator<'a>> {
        if order < 2 {
            return Err(InasylError::InvalidOrder(order));
        }
        Ok(StateSpaceGenerator {
            mode,
            state_len: order - 1,
            config,
            prune: true,
            forced: Vec::new(),
        })
    }

    pub fn prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// 位置ごとに音素を固定する (G2P のみ)。None の位置は通常どおり探索する。
    pub fn forced(mut self, forced: Vec<Option<char>>) -> Self {
        self.forced = forced;
        self
    }

    pub fn generate(&self, word: &str) -> Lattice {
        let mut symbols: Vec<char> = word.chars().collect();
        symbols.push(WORDEND);

        let initial: State = vec![Tag::StartPad; self.state_len];
        let mut layers = vec![Layer {
            states: vec![initial],
            prev: vec![vec![]],
        }];

        for i in 0..symbols.len() {
            let prev_layer = &layers[i];

            // 末尾ごとにまとめる
            let mut tails: Vec<(&[Tag], Vec<usize>)> = Vec::new();
            let mut tail_index: FxHashMap<&[Tag], usize> = FxHashMap::default();
            for (j, state) in prev_layer.states.iter().enumerate() {
                let tail = &state[1..];
                match tail_index.get(tail) {
                    Some(&k) => tails[k].1.push(j),
                    None => {
                        tail_index.insert(tail, tails.len());
                        tails.push((tail, vec![j]));
                    }
                }
            }

            let legal = self.legal_tags(&symbols, i);
            let mut layer = Layer::default();
            for (tail, members) in &tails {
                for tag in &legal {
                    let mut state = Vec::with_capacity(self.state_len);
                    state.extend_from_slice(tail);
                    state.push(*tag);
                    if self.prune && !self.is_legal_state(&state) {
                        trace!("eliminated {:?}", state);
                        continue;
                    }
                    // 末尾が異なれば生成される状態も異なるので、ここで重複は起きない
                    layer.states.push(state);
                    layer.prev.push(members.clone());
                }
            }
            layers.push(layer);
        }

        Lattice { symbols, layers }
    }

    /// 位置 i の記号に付けうるタグ。
    fn legal_tags(&self, symbols: &[char], i: usize) -> Vec<Tag> {
        let symbol = symbols[i];
        if symbol == WORDEND {
            return vec![Tag::WordEnd];
        }
        match self.mode {
            TagMode::Syllabification => vec![Tag::mid(symbol), Tag::end(symbol)],
            TagMode::G2p => {
                if let Some(Some(phoneme)) = self.forced.get(i) {
                    return vec![Tag::phoneme(symbol, *phoneme)];
                }
                self.config
                    .phoneme_candidates(symbol)
                    .into_iter()
                    .filter(|p| !self.prune || self.satisfies_context(symbols, i, *p))
                    .map(|p| Tag::phoneme(symbol, p))
                    .collect()
            }
        }
    }

    /// 文脈規則のある音素は、いずれかの規則を満たすときだけ使える。
    fn satisfies_context(&self, symbols: &[char], i: usize, phoneme: char) -> bool {
        let letter = symbols[i];
        let mut rules = self.config.rules_for(letter, phoneme).peekable();
        if rules.peek().is_none() {
            return true;
        }
        rules.any(|rule| {
            let neighbor = self.neighbor(symbols, i, rule.side);
            rule.classes
                .iter()
                .any(|class| self.matches_class(class, neighbor))
        })
    }

    /// 音節境界記号を飛ばした隣の文字。語頭・語末なら None。
    fn neighbor(&self, symbols: &[char], i: usize, side: Side) -> Option<char> {
        let boundary = self.config.syllable_boundary;
        let is_letter = |c: &&char| **c != boundary && **c != WORDEND;
        match side {
            Side::Left => symbols[..i].iter().rev().find(is_letter).copied(),
            Side::Right => symbols[i + 1..]
                .iter()
                .take_while(|c| **c != WORDEND)
                .find(is_letter)
                .copied(),
        }
    }

    fn matches_class(&self, class: &NeighborClass, neighbor: Option<char>) -> bool {
        match (class, neighbor) {
            (NeighborClass::Edge, None) => true,
            (NeighborClass::Vowel, Some(c)) => self.config.is_vowel(c),
            (NeighborClass::Consonant, Some(c)) => c.is_alphabetic() && !self.config.is_vowel(c),
            (NeighborClass::Letters(letters), Some(c)) => letters.contains(c),
            _ => false,
        }
    }

    /// 音節化の枝刈り規則。G2P の状態は常に通す。
    pub fn is_legal_state(&self, state: &[Tag]) -> bool {
        if self.mode != TagMode::Syllabification {
            return true;
        }
        let n = state.len();

        // 語末の直前は必ず音節末
        if n >= 2 && state[n - 1] == Tag::WordEnd && !state[n - 2].is_end() {
            return false;
        }

        // V¡C¡ のあと C• を挟まずに母音が来るものは音節にできない
        if n >= 3 {
            let is_vowel = |tag: &Tag| tag.letter().map_or(false, |c| self.config.is_vowel(c));
            let mut flag = false;
            for i in 1..n {
                let (before, current) = (&state[i - 1], &state[i]);
                if *current == Tag::StartPad || *before == Tag::StartPad || *current == Tag::WordEnd
                {
                    continue;
                }
                if !flag {
                    if is_vowel(before) && before.is_mid() && !is_vowel(current) && current.is_mid()
                    {
                        flag = true;
                    }
                } else if !is_vowel(current) && current.is_end() {
                    flag = false;
                } else if is_vowel(current) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator(mode: TagMode, order: usize, config: &LinguisticConfig) -> StateSpaceGenerator {
        StateSpaceGenerator::new(mode, order, config).unwrap()
    }

    #[test]
    fn test_order_one_is_rejected() {
        let config = LinguisticConfig::default();
        assert!(matches!(
            StateSpaceGenerator::new(TagMode::Syllabification, 1, &config),
            Err(InasylError::InvalidOrder(1))
        ));
    }

    #[test]
    fn test_layers_without_pruning() {
        let config = LinguisticConfig::default();
        let lattice = generator(TagMode::Syllabification, 3, &config)
            .prune(false)
            .generate("aku");

        // 初期状態 + 3 文字 + 語末記号
        assert_eq!(lattice.layers().len(), 5);
        assert_eq!(lattice.layers()[0].len(), 1);
        assert_eq!(lattice.layers()[1].len(), 2);
        assert_eq!(lattice.layers()[2].len(), 4);
        assert_eq!(lattice.layers()[3].len(), 4);
        // 語末記号は一通り
        assert_eq!(lattice.layers()[4].len(), 2);
        assert_eq!(lattice.word(), "aku");
    }

    #[test]
    fn test_states_are_distinct() {
        let config = LinguisticConfig::default();
        let lattice = generator(TagMode::Syllabification, 2, &config)
            .prune(false)
            .generate("makan");
        for layer in lattice.layers() {
            let mut states = layer.states().to_vec();
            states.sort();
            states.dedup();
            assert_eq!(states.len(), layer.len());
        }
        // order 2 では前の層のすべての状態から遷移できる
        assert_eq!(lattice.layers()[2].predecessors(0), &[0, 1]);
    }

    #[test]
    fn test_word_must_end_with_syllable_end() {
        let config = LinguisticConfig::default();
        let generator = generator(TagMode::Syllabification, 3, &config);
        assert!(!generator.is_legal_state(&[Tag::mid('h'), Tag::WordEnd]));
        assert!(generator.is_legal_state(&[Tag::end('h'), Tag::WordEnd]));
    }

    #[test]
    fn test_vcv_is_eliminated() {
        let config = LinguisticConfig::default();
        let generator = generator(TagMode::Syllabification, 4, &config);
        // a¡ m¡ a¡ : "ama" を一音節にはできない
        assert!(!generator.is_legal_state(&[Tag::mid('a'), Tag::mid('m'), Tag::mid('a')]));
        assert!(!generator.is_legal_state(&[Tag::mid('a'), Tag::mid('m'), Tag::end('a')]));
        // a¡ n¡ g• : 子音の音節末で解除される
        assert!(generator.is_legal_state(&[Tag::mid('a'), Tag::mid('n'), Tag::end('g')]));
        // a• m¡ a¡ : 問題なし
        assert!(generator.is_legal_state(&[Tag::end('a'), Tag::mid('m'), Tag::mid('a')]));
        // パディングは見ない
        assert!(generator.is_legal_state(&[Tag::StartPad, Tag::mid('m'), Tag::mid('a')]));
    }

    #[test]
    fn test_pruned_lattice_is_smaller() {
        let config = LinguisticConfig::default();
        let unpruned = generator(TagMode::Syllabification, 4, &config)
            .prune(false)
            .generate("makanan");
        let pruned = generator(TagMode::Syllabification, 4, &config).generate("makanan");
        assert!(pruned.state_count() < unpruned.state_count());
        assert_eq!(pruned.first_empty_layer(), None);
    }

    #[test]
    fn test_g2p_context_rules() {
        let config = LinguisticConfig::default();
        let generator = generator(TagMode::G2p, 2, &config);
        // "ng": n は ')'、g は '*' になりうる
        let lattice = generator.generate("ngan");
        let first: Vec<Tag> = lattice.layers()[1]
            .states()
            .iter()
            .map(|s| s[0])
            .collect();
        assert!(first.contains(&Tag::phoneme('n', ')')));
        assert!(!first.contains(&Tag::phoneme('n', '+')));

        // 語末の n には ')' も '+' も付かない
        let last: Vec<Tag> = lattice.layers()[4]
            .states()
            .iter()
            .map(|s| s[0])
            .collect();
        assert_eq!(last, vec![Tag::phoneme('n', 'n')]);
    }

    #[test]
    fn test_g2p_neighbor_skips_boundary() {
        let config = LinguisticConfig::default();
        let generator = generator(TagMode::G2p, 2, &config);
        // "ba.pak" の k は語末、"pak.sa" の k は子音の前
        let lattice = generator.generate("ba.pak");
        let k: Vec<Tag> = lattice.layers()[6].states().iter().map(|s| s[0]).collect();
        assert!(k.contains(&Tag::phoneme('k', '(')));

        let lattice = generator.generate("ma.kan");
        let k: Vec<Tag> = lattice.layers()[4].states().iter().map(|s| s[0]).collect();
        assert!(!k.contains(&Tag::phoneme('k', '(')));
        assert!(k.contains(&Tag::phoneme('k', 'k')));
    }

    #[test]
    fn test_forced_phonemes() {
        let config = LinguisticConfig::default();
        let lattice = generator(TagMode::G2p, 2, &config)
            .forced(vec![Some('m'), Some('#'), None])
            .generate("mem");
        assert_eq!(lattice.layers()[2].states(), &[vec![Tag::phoneme('e', '#')]]);
        assert_eq!(lattice.layers()[3].len(), 1);
    }
}
