use std::str::FromStr;

use log::{info, warn};
use rayon::prelude::*;

use crate::config::LinguisticConfig;
use crate::corpus::CorpusRow;

/// 有声・無声などで入れ替えられる子音の対。
const CONSONANT_SWAP_PAIRS: [(char, char); 7] = [
    ('b', 'p'),
    ('d', 't'),
    ('k', 'q'),
    ('c', 'j'),
    ('f', 'v'),
    ('s', 'z'),
    ('l', 'r'),
];

/// これより多く入れ替え可能な位置を持つ語は組み合わせが多すぎるので飛ばす。
const MAX_SWAP_POSITIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Augmentation {
    FlipOnsets,
    SwapConsonants,
    TransposeNuclei,
}

impl FromStr for Augmentation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flip-onsets" => Ok(Augmentation::FlipOnsets),
            "swap-consonants" => Ok(Augmentation::SwapConsonants),
            "transpose-nuclei" => Ok(Augmentation::TransposeNuclei),
            _ => Err(format!("unknown augmentation '{}'", s)),
        }
    }
}

/// 音節を 頭子音・核・尾子音 に分ける。母音を含まなければ None。
/// 母音の直後の半母音が二重母音を作るときは核に含める。
pub fn extract_syllable<'a>(
    syllable: &'a str,
    config: &LinguisticConfig,
) -> Option<(&'a str, &'a str, &'a str)> {
    let start = syllable.find(|c: char| config.is_vowel(c))?;
    let mut end = start;
    let mut last_vowel = None;
    for (i, c) in syllable[start..].char_indices() {
        if !config.is_vowel(c) {
            break;
        }
        last_vowel = Some(c);
        end = start + i + c.len_utf8();
    }
    if let (Some(v), Some(next)) = (last_vowel, syllable[end..].chars().next()) {
        let rest = &syllable[end + next.len_utf8()..];
        // 半母音が音節末にあるときだけ (pan.tai / pan.tay)
        if config.is_semi_vowel(next) && config.is_diphthong(v, next) && rest.is_empty() {
            end += next.len_utf8();
        }
    }
    Some((&syllable[..start], &syllable[start..end], &syllable[end..]))
}

/// 音節区切りの語を音節の列にする。連結記号も区切りとして扱う。
pub fn split_syllables(syllabified: &str, config: &LinguisticConfig) -> Vec<String> {
    let boundary = config.syllable_boundary;
    syllabified
        .replace(config.word_joiner, &boundary.to_string())
        .trim_end_matches(boundary)
        .split(boundary)
        .map(|s| s.to_string())
        .collect()
}

fn to_row(syllables: &[String], config: &LinguisticConfig) -> CorpusRow {
    let label = syllables.join(&config.syllable_boundary.to_string());
    CorpusRow::new(&syllables.concat(), &label)
}

fn syllables_of(row: &CorpusRow) -> Option<&str> {
    row.label.as_deref().filter(|l| !l.is_empty())
}

/// 第 1 音節と第 2 音節の頭子音を入れ替える。どちらかに頭子音がなければ飛ばす。
pub fn flip_onsets(rows: &[CorpusRow], config: &LinguisticConfig) -> Vec<CorpusRow> {
    rows.par_iter()
        .filter_map(|row| {
            let mut syllables = split_syllables(syllables_of(row)?, config);
            if syllables.len() < 2 {
                return None;
            }
            let (ons0, nuc0, cod0) = extract_syllable(&syllables[0], config)?;
            let (ons1, nuc1, cod1) = extract_syllable(&syllables[1], config)?;
            if ons0.is_empty() || ons1.is_empty() {
                return None;
            }
            let first = format!("{}{}{}", ons1, nuc0, cod0);
            let second = format!("{}{}{}", ons0, nuc1, cod1);
            syllables[0] = first;
            syllables[1] = second;
            Some(to_row(&syllables, config))
        })
        .collect()
}

/// 第 1 音節と第 2 音節の核を入れ替える。
pub fn transpose_nuclei(rows: &[CorpusRow], config: &LinguisticConfig) -> Vec<CorpusRow> {
    rows.par_iter()
        .filter_map(|row| {
            let mut syllables = split_syllables(syllables_of(row)?, config);
            if syllables.len() < 2 {
                return None;
            }
            let (ons0, nuc0, cod0) = extract_syllable(&syllables[0], config)?;
            let (ons1, nuc1, cod1) = extract_syllable(&syllables[1], config)?;
            if nuc0 == nuc1 {
                return None;
            }
            let first = format!("{}{}{}", ons0, nuc1, cod0);
            let second = format!("{}{}{}", ons1, nuc0, cod1);
            syllables[0] = first;
            syllables[1] = second;
            Some(to_row(&syllables, config))
        })
        .collect()
}

fn swap_partner(c: char) -> Option<char> {
    CONSONANT_SWAP_PAIRS.iter().find_map(|(a, b)| {
        if *a == c {
            Some(*b)
        } else if *b == c {
            Some(*a)
        } else {
            None
        }
    })
}

/// 入れ替え可能な子音の、空でないすべての部分集合について入れ替えた語を作る。
pub fn swap_consonants(rows: &[CorpusRow], config: &LinguisticConfig) -> Vec<CorpusRow> {
    let boundary = config.syllable_boundary;
    rows.par_iter()
        .flat_map_iter(|row| {
            let mut generated = Vec::new();
            let Some(syllabified) = syllables_of(row) else {
                return generated;
            };
            let letters: Vec<char> = syllabified.chars().collect();
            let positions: Vec<usize> = letters
                .iter()
                .enumerate()
                .filter(|(_, c)| swap_partner(**c).is_some())
                .map(|(i, _)| i)
                .collect();
            if positions.len() > MAX_SWAP_POSITIONS {
                warn!(
                    "'{}' has {} swappable consonants, skipped",
                    syllabified,
                    positions.len()
                );
                return generated;
            }

            for mask in 1u32..(1u32 << positions.len()) {
                let mut new_letters = letters.clone();
                for (bit, pos) in positions.iter().enumerate() {
                    if mask & (1 << bit) != 0 {
                        if let Some(partner) = swap_partner(new_letters[*pos]) {
                            new_letters[*pos] = partner;
                        }
                    }
                }
                let label: String = new_letters.iter().collect();
                let word: String = new_letters.iter().filter(|c| **c != boundary).collect();
                generated.push(CorpusRow::new(&word, &label));
            }
            generated
        })
        .collect()
}

/// 指定した方法で拡張したデータをまとめて返す。元のデータは含まない。
pub fn augment(
    rows: &[CorpusRow],
    methods: &[Augmentation],
    config: &LinguisticConfig,
) -> Vec<CorpusRow> {
    let mut result = Vec::new();
    for method in methods {
        let generated = match method {
            Augmentation::FlipOnsets => flip_onsets(rows, config),
            Augmentation::SwapConsonants => swap_consonants(rows, config),
            Augmentation::TransposeNuclei => transpose_nuclei(rows, config),
        };
        info!("{:?}: generated {} rows", method, generated.len());
        result.extend(generated);
    }
    result
}
