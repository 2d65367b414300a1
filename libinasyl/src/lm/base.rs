use crate::error::Result;
use crate::tag::Tag;

/// ラティスの遷移スコアを返すもの。
/// キャッシュを更新するので &mut self を取る。スレッドごとに一つ持つこと。
pub trait TransitionScorer {
    /// gram の (平滑化済み) 確率。0 以下になることもある。
    fn probability(&mut self, gram: &[Tag]) -> Result<f64>;

    /// 確率が 0 以下のときは負の無限大。
    fn log_probability(&mut self, gram: &[Tag]) -> Result<f64> {
        let p = self.probability(gram)?;
        Ok(if p > 0.0 { p.ln() } else { f64::NEG_INFINITY })
    }

    /// 扱える gram の最大長。
    fn order(&self) -> usize;
}
