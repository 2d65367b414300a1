use thiserror::Error;

/// モデル・スコア計算・タグ付けのエラー。
///
/// バッチ処理では `anyhow` で包み、失敗した fold を記録して次の fold へ進む。
#[derive(Debug, Error)]
pub enum InasylError {
    #[error("requested order {requested} exceeds the stored order {stored}")]
    InsufficientOrder { requested: usize, stored: usize },

    #[error("table '{0}' is not loaded")]
    MissingTable(&'static str),

    #[error("no viable path for '{word}' at position {position}")]
    NoViablePath { word: String, position: usize },

    #[error("gram of length {len} exceeds model order {order}")]
    InvalidGramLength { len: usize, order: usize },

    #[error("malformed corpus row at line {line}: {reason}")]
    MalformedCorpusRow { line: usize, reason: String },

    /// 状態は order-1 個のタグを持つので、order 1 ではラティスが作れない。
    #[error("order {0} is not usable for tagging (must be >= 2)")]
    InvalidOrder(usize),

    #[error("unknown tag token '{0}'")]
    UnknownTag(String),

    #[error("unknown smoothing method '{0}' (expected kn, gkn or stupid-backoff)")]
    UnknownSmoothing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, InasylError>;
