use std::fmt::{Display, Formatter};

use crate::error::{InasylError, Result};

/// 音節の途中の文字
pub const SYLMID: char = '\u{00A1}';
/// 音節末の文字
pub const SYLEND: char = '\u{2022}';
/// 語末記号
pub const WORDEND: char = '\u{00D7}';
/// 語頭のパディング
pub const STARTPAD: char = '\u{2205}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mark {
    Mid,
    End,
    Phoneme(char),
}

/// 一文字分のタグ。文字 + 境界マーク、あるいは G2P では文字 + 音素。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    StartPad,
    WordEnd,
    Letter { letter: char, mark: Mark },
}

/// 1..=N 個のタグの並び。
pub type Gram = Vec<Tag>;

impl Tag {
    pub fn mid(letter: char) -> Tag {
        Tag::Letter {
            letter,
            mark: Mark::Mid,
        }
    }

    pub fn end(letter: char) -> Tag {
        Tag::Letter {
            letter,
            mark: Mark::End,
        }
    }

    pub fn phoneme(letter: char, phoneme: char) -> Tag {
        Tag::Letter {
            letter,
            mark: Mark::Phoneme(phoneme),
        }
    }

    /// タグが表す入力記号。ラティスの各位置の文字と突き合わせるのに使う。
    pub fn symbol(&self) -> char {
        match self {
            Tag::StartPad => STARTPAD,
            Tag::WordEnd => WORDEND,
            Tag::Letter { letter, .. } => *letter,
        }
    }

    pub fn letter(&self) -> Option<char> {
        match self {
            Tag::Letter { letter, .. } => Some(*letter),
            _ => None,
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(
            self,
            Tag::Letter {
                mark: Mark::End,
                ..
            }
        )
    }

    pub fn is_mid(&self) -> bool {
        matches!(
            self,
            Tag::Letter {
                mark: Mark::Mid,
                ..
            }
        )
    }

    pub fn to_token(&self) -> String {
        match self {
            Tag::StartPad => STARTPAD.to_string(),
            Tag::WordEnd => WORDEND.to_string(),
            Tag::Letter { letter, mark } => {
                let suffix = match mark {
                    Mark::Mid => SYLMID,
                    Mark::End => SYLEND,
                    Mark::Phoneme(p) => *p,
                };
                let mut buf = String::with_capacity(8);
                buf.push(*letter);
                buf.push(suffix);
                buf
            }
        }
    }

    pub fn from_token(token: &str) -> Result<Tag> {
        let mut chars = token.chars();
        let tag = match (chars.next(), chars.next(), chars.next()) {
            (Some(STARTPAD), None, _) => Tag::StartPad,
            (Some(WORDEND), None, _) => Tag::WordEnd,
            (Some(letter), Some(SYLMID), None) => Tag::mid(letter),
            (Some(letter), Some(SYLEND), None) => Tag::end(letter),
            (Some(letter), Some(p), None) => Tag::phoneme(letter, p),
            _ => return Err(InasylError::UnknownTag(token.to_string())),
        };
        Ok(tag)
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_token())
    }
}

pub fn gram_to_str(gram: &[Tag]) -> String {
    gram.iter()
        .map(|tag| tag.to_token())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn str_to_gram(s: &str) -> Result<Gram> {
    s.split_whitespace().map(Tag::from_token).collect()
}

/// 音節区切りされた部分語 ("ru.mah") をタグ列にする。
pub fn syllables_to_tags(syl_sub_word: &str, boundary: char) -> Gram {
    let chars: Vec<char> = syl_sub_word.chars().collect();
    let mut tags = Vec::with_capacity(chars.len());
    for (i, c) in chars.iter().enumerate() {
        if *c == boundary {
            continue;
        }
        match chars.get(i + 1) {
            None => tags.push(Tag::end(*c)),
            Some(next) if *next == boundary => tags.push(Tag::end(*c)),
            Some(_) => tags.push(Tag::mid(*c)),
        }
    }
    tags
}

/// タグ列を音節区切りの単語に戻す。
/// 入力語にある連結記号 (ハイフン) はタグを持たないので、語からそのまま写す。
pub fn tags_to_syllables(word: &str, tags: &[Tag], boundary: char, joiner: char) -> String {
    let chars: Vec<char> = word.chars().collect();
    let n = chars.len();
    let mut segmented = String::with_capacity(n * 2);
    let mut j = 0;
    for i in 0..n {
        segmented.push(chars[i]);
        if chars[i] == joiner {
            continue;
        }
        let is_end = tags.get(j).map(|t| t.is_end()).unwrap_or(false);
        if is_end && i < n - 1 && chars[i + 1] != joiner {
            segmented.push(boundary);
        }
        j += 1;
    }
    segmented
}

/// G2P の学習データ: 文字列と音素列は一文字ずつ対応している必要がある。
pub fn phonemes_to_tags(letters: &str, phonemes: &str, line: usize) -> Result<Gram> {
    let letters: Vec<char> = letters.chars().collect();
    let phonemes: Vec<char> = phonemes.chars().collect();
    if letters.len() != phonemes.len() {
        return Err(InasylError::MalformedCorpusRow {
            line,
            reason: format!(
                "letters and phonemes are not aligned ({} != {})",
                letters.len(),
                phonemes.len()
            ),
        });
    }
    Ok(letters
        .into_iter()
        .zip(phonemes)
        .map(|(l, p)| Tag::phoneme(l, p))
        .collect())
}

pub fn tags_to_phonemes(tags: &[Tag]) -> String {
    tags.iter()
        .filter_map(|tag| match tag {
            Tag::Letter {
                mark: Mark::Phoneme(p),
                ..
            } => Some(*p),
            _ => None,
        })
        .collect()
}

/// 各語の先頭に order-1 個のパディング、末尾に語末記号を付ける。
pub fn pad_tokens(words: Vec<Gram>, order: usize) -> Vec<Gram> {
    let pad = order.saturating_sub(1);
    words
        .into_iter()
        .map(|word| {
            let mut padded = Vec::with_capacity(word.len() + pad + 1);
            padded.extend(std::iter::repeat(Tag::StartPad).take(pad));
            padded.extend(word);
            padded.push(Tag::WordEnd);
            padded
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syllables_to_tags() {
        let tags = syllables_to_tags("ru.mah", '.');
        assert_eq!(
            tags,
            vec![
                Tag::mid('r'),
                Tag::end('u'),
                Tag::mid('m'),
                Tag::mid('a'),
                Tag::end('h'),
            ]
        );
        assert_eq!(tags_to_syllables("rumah", &tags, '.', '-'), "ru.mah");
    }

    #[test]
    fn test_segmented_round_trip() {
        for syl in ["ru.mah", "a", "ma.kan", "in.do.ne.si.a", "trans.por.ta.si"] {
            let tags = syllables_to_tags(syl, '.');
            let word = syl.replace('.', "");
            assert_eq!(tags_to_syllables(&word, &tags, '.', '-'), syl);
        }
    }

    #[test]
    fn test_joiner_is_copied_from_word() {
        let mut tags = syllables_to_tags("ku.da", '.');
        tags.extend(syllables_to_tags("ku.da", '.'));
        assert_eq!(
            tags_to_syllables("kuda-kuda", &tags, '.', '-'),
            "ku.da-ku.da"
        );
    }

    #[test]
    fn test_token_round_trip() -> anyhow::Result<()> {
        let gram = vec![
            Tag::StartPad,
            Tag::mid('r'),
            Tag::end('u'),
            Tag::phoneme('n', ')'),
            Tag::WordEnd,
        ];
        let s = gram_to_str(&gram);
        assert_eq!(s, "∅ r¡ u• n) ×");
        assert_eq!(str_to_gram(&s)?, gram);
        Ok(())
    }

    #[test]
    fn test_unknown_token() {
        assert!(Tag::from_token("abc").is_err());
        assert!(Tag::from_token("").is_err());
    }

    #[test]
    fn test_phonemes_to_tags() -> anyhow::Result<()> {
        let tags = phonemes_to_tags("nya.nyi", "+*a.+*i", 1)?;
        assert_eq!(tags[0], Tag::phoneme('n', '+'));
        assert_eq!(tags[3], Tag::phoneme('.', '.'));
        assert_eq!(tags_to_phonemes(&tags), "+*a.+*i");

        assert!(phonemes_to_tags("nya", "+a", 3).is_err());
        Ok(())
    }

    #[test]
    fn test_pad_tokens() {
        let padded = pad_tokens(vec![vec![Tag::end('a')]], 3);
        assert_eq!(
            padded[0],
            vec![Tag::StartPad, Tag::StartPad, Tag::end('a'), Tag::WordEnd]
        );
    }
}
