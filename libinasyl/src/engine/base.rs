use crate::error::Result;
use crate::tag::Tag;

pub trait TaggingEngine {
    /// 語のタグ列を返す。連結記号で区切られた部分語は別々にタグ付けする。
    fn tag_word(&mut self, word: &str) -> Result<Vec<Tag>>;

    /// 枝刈りをせずにタグ付けする。
    fn tag_word_unpruned(&mut self, word: &str) -> Result<Vec<Tag>>;

    /// タグ付けして、音節区切りの語 (あるいは音素列) として返す。
    fn segment(&mut self, word: &str) -> Result<String>;
}
