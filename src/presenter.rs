//! 核心与表现层之间的边界：表现层只接收命令与事件，从不直接修改状态。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::game::{Card, GameSummary, PairId};
use crate::story::{Direction, NavigationView, PageKind, TransitionPhase};

/// 推送给表现层的事件流。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum StoryEvent {
    PageActivated {
        index: usize,
        kind: PageKind,
    },
    NavigationChanged {
        view: NavigationView,
    },
    MoveCounted {
        moves: u32,
    },
    MatchResolved {
        pair_id: PairId,
        matched: bool,
        matched_pairs: usize,
        pair_count: usize,
    },
    GameComplete {
        moves: u32,
        elapsed_seconds: u32,
    },
    TimerTicked {
        elapsed_seconds: u32,
    },
    StoryAccepted,
    DeclineDodged {
        phrase: String,
        attempt: u32,
    },
    CountdownTicked {
        days: u64,
        hours: u64,
        minutes: u64,
        seconds: u64,
    },
    CountdownReached,
}

#[async_trait(?Send)]
pub trait Presenter {
    /// 页面离场或入场动画，完成后返回。
    async fn render_page(&self, index: usize, direction: Direction, phase: TransitionPhase);

    fn render_deck(&self, cards: &[Card], revealed: bool);

    fn render_card_face(&self, card: &Card);

    /// 返回用户是否点了确认。
    async fn show_completion_dialog(&self, summary: &GameSummary) -> bool;

    async fn confirm_acceptance(&self) -> bool;

    fn play_ending_sequence(&self);

    fn emit(&self, event: &StoryEvent);

    async fn wait(&self, duration: Duration);

    fn notify_error(&self, message: &str);
}
