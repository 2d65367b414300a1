use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info};
use rustc_hash::FxHashSet;

use crate::error::Result;

/// 音節区切り付きの語を 接頭辞 + 語根 + 派生接尾辞 + 屈折接尾辞 に分けたもの。
/// 接辞は区切り記号を含んだまま持つ (例: "meng.", ".kan")。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub prefix: String,
    pub root: String,
    pub derivational_suffix: String,
    pub inflectional_suffix: String,
}

/// 接辞の音素列。文字数は対応する接辞と同じ。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffixPhonemes {
    pub prefix: String,
    pub derivational_suffix: String,
    pub inflectional_suffix: String,
}

pub trait Stemmer: Send + Sync {
    fn get_root(&self, word: &str) -> Segmentation;

    fn get_affix_phonemes(&self, segmentation: &Segmentation) -> AffixPhonemes;

    /// 接辞の位置の音素を固定した列。語根の位置は None。
    /// 接辞が見つからないとき、または文字数が合わないときは None。
    fn forced_phonemes(&self, word: &str) -> Option<Vec<Option<char>>> {
        let segmentation = self.get_root(word);
        if segmentation.prefix.is_empty()
            && segmentation.derivational_suffix.is_empty()
            && segmentation.inflectional_suffix.is_empty()
        {
            return None;
        }
        let phonemes = self.get_affix_phonemes(&segmentation);

        let mut forced: Vec<Option<char>> = Vec::with_capacity(word.len());
        forced.extend(phonemes.prefix.chars().map(Some));
        forced.extend(segmentation.root.chars().map(|_| None));
        forced.extend(phonemes.derivational_suffix.chars().map(Some));
        forced.extend(phonemes.inflectional_suffix.chars().map(Some));

        if forced.len() != word.chars().count() {
            debug!("affix phonemes of '{}' do not line up, ignored", word);
            return None;
        }
        Some(forced)
    }
}

const INFLECTIONAL_SUFFIXES: [(&str, &str); 7] = [
    (".kah", ".kah"),
    (".lah", ".lah"),
    (".tah", ".tah"),
    (".pun", ".pun"),
    (".nya", ".+*a"),
    (".ku", ".ku"),
    (".mu", ".mu"),
];

const DERIVATIONAL_SUFFIXES: [(&str, &str); 3] = [(".kan", ".kan"), (".an", ".an"), (".i", ".i")];

// 長いものから順に照合する
const PREFIXES: [(&str, &str); 18] = [
    ("meng.", "m#)*."),
    ("me.ng", "m#.)*"),
    ("meny.", "m#+*."),
    ("me.ny", "m#.+*"),
    ("ber.", "b#r."),
    ("ter.", "t#r."),
    ("mem.", "m#m."),
    ("men.", "m#n."),
    ("per.", "p#r."),
    ("pem.", "p#m."),
    ("pen.", "p#n."),
    ("di.", "di."),
    ("ke.", "k#."),
    ("se.", "s#."),
    ("be.", "b#."),
    ("te.", "t#."),
    ("me.", "m#."),
    ("pe.", "p#."),
];

fn lookup<'a>(table: &[(&'a str, &'a str)], affix: &'a str) -> &'a str {
    table
        .iter()
        .find(|(a, _)| *a == affix)
        .map(|(_, p)| *p)
        .unwrap_or(affix)
}

/**
 * 語根辞書を使うインドネシア語の接辞除去。
 *
 * 屈折接尾辞、派生接尾辞、接頭辞の順に外す。各段階で、その時点の語根が辞書にあれば
 * そこで止める。接頭辞は、組み合わせとしてありえない接頭辞と接尾辞の対
 * (be-…-i, di-…-an など) のときは外さない。
 */
#[derive(Debug, Default)]
pub struct DictionaryStemmer {
    roots: FxHashSet<String>,
}

impl DictionaryStemmer {
    pub fn from_roots<I, S>(roots: I) -> DictionaryStemmer
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DictionaryStemmer {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// 一行一語の語根リストを読む。
    pub fn load(path: &Path) -> Result<DictionaryStemmer> {
        info!("Reading {}", path.display());
        let file = File::open(path)?;
        let mut roots = FxHashSet::default();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                roots.insert(line.to_string());
            }
        }
        info!("Loaded {} roots", roots.len());
        Ok(DictionaryStemmer { roots })
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn in_dictionary(&self, syllabified: &str) -> bool {
        self.roots.contains(&syllabified.replace('.', ""))
    }

    fn strip_suffix<'a>(word: &'a str, suffixes: &[(&str, &str)]) -> (&'a str, &'a str) {
        for (suffix, _) in suffixes {
            if let Some(root) = word.strip_suffix(suffix) {
                return (root, &word[root.len()..]);
            }
        }
        (word, "")
    }

    fn strip_prefix(word: &str) -> (&str, &str) {
        for (prefix, _) in PREFIXES.iter() {
            if let Some(root) = word.strip_prefix(prefix) {
                return (&word[..prefix.len()], root);
            }
        }
        ("", word)
    }

    fn is_invalid_affix_pair(word: &str) -> bool {
        let starts = |p: &str| word.starts_with(p);
        let ends = |s: &str| word.ends_with(s);
        (starts("be") && ends("i"))
            || (starts("di") && ends("an"))
            || (starts("ke") && (ends("i") || ends("kan")))
            || (starts("me") && ends("an"))
            || (starts("se") && (ends("i") || ends("kan")))
            || (starts("te") && ends("an"))
    }
}

impl Stemmer for DictionaryStemmer {
    fn get_root(&self, word: &str) -> Segmentation {
        let mut root = word;
        let mut inflectional_suffix = "";
        let mut derivational_suffix = "";
        let mut prefix = "";

        if !self.in_dictionary(root) {
            (root, inflectional_suffix) = Self::strip_suffix(root, &INFLECTIONAL_SUFFIXES);
        }
        if !self.in_dictionary(root) {
            (root, derivational_suffix) = Self::strip_suffix(root, &DERIVATIONAL_SUFFIXES);
        }
        if !(self.in_dictionary(root) || Self::is_invalid_affix_pair(word)) {
            (prefix, root) = Self::strip_prefix(root);
        }

        Segmentation {
            prefix: prefix.to_string(),
            root: root.to_string(),
            derivational_suffix: derivational_suffix.to_string(),
            inflectional_suffix: inflectional_suffix.to_string(),
        }
    }

    fn get_affix_phonemes(&self, segmentation: &Segmentation) -> AffixPhonemes {
        let mut prefix = lookup(&PREFIXES, &segmentation.prefix).to_string();
        let first = segmentation.root.chars().next();

        if prefix.ends_with("n.") && matches!(first, Some('c' | 'j')) {
            // pen.ca.ri → p#+.
            prefix = prefix.replace('n', "+");
        } else if prefix.ends_with("#.") && matches!(first, Some('a' | 'e' | 'i' | 'o' | 'u')) {
            prefix = prefix.replace('#', "3");
        }

        AffixPhonemes {
            prefix,
            derivational_suffix: lookup(&DERIVATIONAL_SUFFIXES, &segmentation.derivational_suffix)
                .to_string(),
            inflectional_suffix: lookup(&INFLECTIONAL_SUFFIXES, &segmentation.inflectional_suffix)
                .to_string(),
        }
    }
}
