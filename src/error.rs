use serde::Serialize;
use thiserror::Error;

use crate::game::PairId;

#[derive(Debug, Clone, Serialize, Error, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ConfigError {
    #[error("invalid configuration JSON: {message}")]
    Json { message: String },
    #[error("the story needs at least one page")]
    NoPages,
    #[error("{field} {index} is outside the {total} configured pages")]
    PageOutOfRange {
        field: &'static str,
        index: usize,
        total: usize,
    },
    #[error("page {index} cannot be both the game page and the decision page")]
    SharedPage { index: usize },
    #[error("the memory game needs at least one card face")]
    NoCards,
    #[error("pair id {id} is used by more than one card face")]
    DuplicatePairId { id: PairId },
    #[error("at least one decline phrase is required")]
    NoDeclinePhrases,
    #[error("timer tick interval must be non-zero")]
    ZeroTick,
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        ConfigError::Json {
            message: error.to_string(),
        }
    }
}

/// 初始化失败：记录日志、通知用户，然后停在安全但不可用的状态。
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("callback `{name}` is missing or not a function")]
    MissingCallback { name: &'static str },
}
