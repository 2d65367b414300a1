use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod graph_resolver;
pub mod lattice_graph;
pub mod state_space;

/// タグ付けの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMode {
    /// 各文字が音節末かどうか
    #[default]
    Syllabification,
    /// 各文字の音素
    G2p,
}

impl FromStr for TagMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "syl" | "syllabification" => Ok(TagMode::Syllabification),
            "g2p" => Ok(TagMode::G2p),
            _ => Err(format!("unknown mode '{}' (expected syl or g2p)", s)),
        }
    }
}

impl Display for TagMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TagMode::Syllabification => write!(f, "syl"),
            TagMode::G2p => write!(f, "g2p"),
        }
    }
}
