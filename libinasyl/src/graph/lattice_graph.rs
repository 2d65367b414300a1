use std::fmt::{Debug, Formatter};

use crate::tag::{gram_to_str, Tag, WORDEND};

/// 直近 order-1 個のタグ。
pub type State = Vec<Tag>;

/// ラティスの一列。状態は挿入順に並び、重複しない。
#[derive(Clone, Default, PartialEq)]
pub struct Layer {
    pub(crate) states: Vec<State>,
    /// prev[j]: states[j] に遷移しうる、一つ前の層の状態の index
    pub(crate) prev: Vec<Vec<usize>>,
}

impl Layer {
    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn predecessors(&self, j: usize) -> &[usize] {
        &self.prev[j]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/**
 * 一語分の状態空間。
 * layers[0] はパディングだけの初期状態で、layers[t] (t >= 1) は symbols[t-1] を
 * 最後に読んだ状態の集合。
 */
#[derive(Clone, PartialEq)]
pub struct Lattice {
    pub(crate) symbols: Vec<char>,
    pub(crate) layers: Vec<Layer>,
}

impl Debug for Lattice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lattice(word={}, layers={:?})",
            self.word(),
            self.layers.iter().map(|l| l.len()).collect::<Vec<_>>()
        )
    }
}

impl Lattice {
    /// 語末記号を含む入力記号列。
    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    /// 語末記号を除いた語。
    pub fn word(&self) -> String {
        self.symbols.iter().filter(|c| **c != WORDEND).collect()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, t: usize) -> Option<&Layer> {
        self.layers.get(t)
    }

    /// 状態が一つもない層の位置。枝刈りが強すぎたときに現れる。
    pub fn first_empty_layer(&self) -> Option<usize> {
        self.layers.iter().position(|layer| layer.is_empty())
    }

    pub fn state_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.len()).sum()
    }

    // for debugging purpose
    #[allow(unused)]
    pub fn dump_dot(&self) -> String {
        let mut buf = String::new();
        buf += "digraph Lattice {\n";
        for (t, layer) in self.layers.iter().enumerate().skip(1) {
            for (j, state) in layer.states.iter().enumerate() {
                for i in &layer.prev[j] {
                    buf += &format!(
                        "    \"{}:{}\" -> \"{}:{}\"\n",
                        t - 1,
                        gram_to_str(&self.layers[t - 1].states[*i]),
                        t,
                        gram_to_str(state)
                    );
                }
            }
        }
        buf += "}\n";
        buf
    }
}
