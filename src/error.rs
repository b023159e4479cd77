use thiserror::Error;

/// 构建索引和映射查询时的错误。
#[derive(Debug, Error)]
pub enum MapError {
    /// 蛋白库格式错误或为空，终止索引构建
    #[error("corpus error: {0}")]
    Corpus(String),

    /// 查询展开的候选数超过配置的上限
    #[error("query '{query}' expands to {candidates} candidates (limit {limit})")]
    AmbiguityOverflow {
        query: String,
        candidates: u64,
        limit: u64,
    },

    /// 查询行格式错误，终止整个运行
    #[error("invalid input at line {line}: {reason}: '{content}'")]
    InputSyntax {
        line: usize,
        content: String,
        reason: String,
    },

    /// 索引文件无法解码
    #[error("index format error: {0}")]
    IndexFormat(#[from] bincode::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MapError {
    /// 与配置无关、必然终止批处理的错误
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MapError::AmbiguityOverflow { .. })
    }
}

pub type Result<T> = std::result::Result<T, MapError>;
