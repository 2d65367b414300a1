use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const CONFIG_PREFIX: &str = "inasyl";
const CONFIG_FILE: &str = "config.yml";

/// 隣接文字が属するべきクラス。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborClass {
    Vowel,
    Consonant,
    /// 列挙した文字のいずれか
    Letters(String),
    /// 語頭・語末 (隣接文字が存在しない)
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

/// G2P の文脈規則。
/// `letter` を `phoneme` として読むのは、`side` 側の隣接文字 (音節境界記号は飛ばす) が
/// `classes` のいずれかに属するときだけ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRule {
    pub letter: char,
    pub phoneme: char,
    pub side: Side,
    pub classes: Vec<NeighborClass>,
}

impl ContextRule {
    fn new(letter: char, phoneme: char, side: Side, classes: Vec<NeighborClass>) -> ContextRule {
        ContextRule {
            letter,
            phoneme,
            side,
            classes,
        }
    }
}

/// 言語ごとの記号・音素表。
/// タグ付けやデータ拡張の各関数には、これを明示的に渡す。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinguisticConfig {
    pub vowels: Vec<char>,
    pub semi_vowels: Vec<char>,
    pub diphthongs: Vec<String>,
    pub syllable_boundary: char,
    pub word_joiner: char,
    /// 文字 → 音素候補
    pub g2p: BTreeMap<char, Vec<char>>,
    pub context_rules: Vec<ContextRule>,
}

impl Default for LinguisticConfig {
    fn default() -> Self {
        let g2p: BTreeMap<char, Vec<char>> = [
            ('a', "a$@1"),
            ('b', "b"),
            ('c', "c"),
            ('d', "d"),
            ('e', "e#%23"),
            ('f', "f"),
            ('g', "g*"),
            ('h', "h*"),
            ('i', "i*4"),
            ('j', "j"),
            ('k', "k(*"),
            ('l', "l"),
            ('m', "m"),
            ('n', "n)+"),
            ('o', "o^5"),
            ('p', "p"),
            ('q', "k"),
            ('r', "r"),
            ('s', "s~"),
            ('t', "t"),
            ('u', "u*6"),
            ('v', "f"),
            ('w', "w"),
            ('x', "s"),
            ('y', "y*"),
            ('z', "z"),
        ]
        .into_iter()
        .map(|(letter, phonemes)| (letter, phonemes.chars().collect()))
        .collect();

        use NeighborClass::*;
        use Side::*;
        let letters = |s: &str| Letters(s.to_string());
        let context_rules = vec![
            // ng / nk
            ContextRule::new('n', ')', Right, vec![letters("gk")]),
            // ny / nc / nj
            ContextRule::new('n', '+', Right, vec![letters("ycj")]),
            ContextRule::new('g', '*', Left, vec![letters("n")]),
            ContextRule::new('y', '*', Left, vec![letters("ns")]),
            ContextRule::new('s', '~', Right, vec![letters("y")]),
            // kh
            ContextRule::new('k', '*', Right, vec![letters("h")]),
            ContextRule::new('h', '*', Left, vec![letters("k")]),
            // 音節末の k は声門閉鎖音
            ContextRule::new('k', '(', Right, vec![Consonant, Edge]),
            // 二重母音 ai / au / oi / ei
            ContextRule::new('a', '$', Right, vec![letters("iy")]),
            ContextRule::new('a', '@', Right, vec![letters("uw")]),
            ContextRule::new('o', '^', Right, vec![letters("iy")]),
            ContextRule::new('e', '%', Right, vec![letters("iy")]),
            ContextRule::new('i', '*', Left, vec![letters("aoe")]),
            ContextRule::new('u', '*', Left, vec![letters("a")]),
            // 母音の前のシュワー
            ContextRule::new('e', '3', Right, vec![Vowel]),
        ];

        LinguisticConfig {
            vowels: vec!['a', 'e', 'i', 'o', 'u'],
            semi_vowels: vec!['y', 'w'],
            diphthongs: ["ai", "au", "ei", "oi", "ay", "aw", "ey", "oy"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            syllable_boundary: '.',
            word_joiner: '-',
            g2p,
            context_rules,
        }
    }
}

impl LinguisticConfig {
    pub fn is_vowel(&self, c: char) -> bool {
        self.vowels.contains(&c)
    }

    pub fn is_semi_vowel(&self, c: char) -> bool {
        self.semi_vowels.contains(&c)
    }

    pub fn is_diphthong(&self, first: char, second: char) -> bool {
        self.diphthongs.iter().any(|d| {
            let mut chars = d.chars();
            chars.next() == Some(first) && chars.next() == Some(second) && chars.next().is_none()
        })
    }

    /// 表にない文字 (数字や記号) は、その文字自身を音素とする。
    pub fn phoneme_candidates(&self, letter: char) -> Vec<char> {
        if letter == self.syllable_boundary {
            return vec![letter];
        }
        match self.g2p.get(&letter) {
            Some(phonemes) if !phonemes.is_empty() => phonemes.clone(),
            _ => vec![letter],
        }
    }

    pub fn rules_for(&self, letter: char, phoneme: char) -> impl Iterator<Item = &ContextRule> {
        self.context_rules
            .iter()
            .filter(move |r| r.letter == letter && r.phoneme == phoneme)
    }

    pub fn load(path: &Path) -> Result<LinguisticConfig> {
        info!("Reading {}", path.display());
        let file = File::open(path)?;
        let config: LinguisticConfig = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// XDG 設定ディレクトリの config.yml を読む。なければデフォルト値。
    pub fn load_default() -> Result<LinguisticConfig> {
        let Some(path) = Self::default_path() else {
            return Ok(LinguisticConfig::default());
        };
        if !path.exists() {
            info!(
                "{} does not exist, using the built-in tables",
                path.display()
            );
            return Ok(LinguisticConfig::default());
        }
        Self::load(&path)
    }

    pub fn default_path() -> Option<PathBuf> {
        match xdg::BaseDirectories::with_prefix(CONFIG_PREFIX) {
            Ok(dirs) => Some(dirs.get_config_home().join(CONFIG_FILE)),
            Err(err) => {
                warn!("Cannot resolve XDG directories: {}", err);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        let mut file = File::create(path)?;
        file.write_all(yaml.as_bytes())?;
        Ok(())
    }
}
