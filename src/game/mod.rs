//! 记忆配对小游戏（牌组、翻牌规则、计时与胜负判定）。

pub mod rules;
pub mod state;

pub use rules::{shuffle, FlipOutcome, GameTiming, MatchingGameEngine};
pub use state::{
    Card,
    CardFace,
    FaceState,
    GameState,
    GameSummary,
    IntegrityError,
    PairId,
    Position,
};
