//! 贺卡运行配置（页数、小游戏所在页、动画时长、卡面内容等）。

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::game::{CardFace, GameTiming, PairId};
use crate::story::{Page, PageKind};

const DEFAULT_TOTAL_PAGES: usize = 8;
const DEFAULT_GAME_PAGE: usize = 5;

/// 卡面内容：一个配对标识对应一个符号和一句说明。
fn default_cards() -> Vec<CardFace> {
    vec![
        CardFace::new(1, "💝", "Our very first message"),
        CardFace::new(2, "💌", "Pandemic days together"),
        CardFace::new(3, "💕", "Meeting again at Christmas"),
    ]
}

fn default_decline_phrases() -> Vec<String> {
    [
        "No",
        "Are you sure?",
        "Really?",
        "Think it over...",
        "Last chance!",
        "Absolutely sure?",
        "You'll make me cry!",
        "Don't be like that! 🥺",
        "Pretty please!",
        "I need you!",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StoryConfig {
    pub total_pages: usize,
    pub game_page: usize,
    /// 最后的抉择页；缺省为最后一页。
    pub decision_page: Option<usize>,
    pub cards: Vec<CardFace>,
    pub exit_ms: u32,
    pub enter_ms: u32,
    pub preview_ms: u32,
    pub mismatch_delay_ms: u32,
    pub completion_delay_ms: u32,
    pub tick_ms: u32,
    pub decline_phrases: Vec<String>,
    /// "不" 按钮两次躲闪之间的最短间隔。
    pub decline_cooldown_ms: u32,
    /// 结尾倒计时的目标时刻（本地时间）；为空时不倒计时。
    pub countdown_target: Option<NaiveDateTime>,
}

impl StoryConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StoryConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_pages(mut self, total_pages: usize, game_page: usize) -> Self {
        self.total_pages = total_pages;
        self.game_page = game_page;
        self.decision_page = None;
        self
    }

    /// 关闭所有等待，便于在测试或无动画环境下立即推进。
    pub fn without_delays(mut self) -> Self {
        self.exit_ms = 0;
        self.enter_ms = 0;
        self.preview_ms = 0;
        self.mismatch_delay_ms = 0;
        self.completion_delay_ms = 0;
        self.decline_cooldown_ms = 0;
        self
    }

    pub fn decision_page(&self) -> usize {
        self.decision_page
            .unwrap_or_else(|| self.total_pages.saturating_sub(1))
    }

    pub fn pair_count(&self) -> usize {
        self.cards.len()
    }

    pub fn pages(&self) -> Vec<Page> {
        let decision = self.decision_page();
        (0..self.total_pages)
            .map(|index| {
                let kind = if index == self.game_page {
                    PageKind::Game
                } else if index == decision {
                    PageKind::Decision
                } else {
                    PageKind::Narrative
                };
                Page { index, kind }
            })
            .collect()
    }

    pub fn exit_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.exit_ms))
    }

    pub fn enter_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.enter_ms))
    }

    pub fn preview_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.preview_ms))
    }

    pub fn mismatch_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.mismatch_delay_ms))
    }

    pub fn game_timing(&self) -> GameTiming {
        GameTiming {
            preview: self.preview_duration(),
            mismatch_delay: self.mismatch_delay(),
        }
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.completion_delay_ms))
    }

    pub fn decline_cooldown(&self) -> Duration {
        Duration::from_millis(u64::from(self.decline_cooldown_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_pages == 0 {
            return Err(ConfigError::NoPages);
        }
        if self.game_page >= self.total_pages {
            return Err(ConfigError::PageOutOfRange {
                field: "gamePage",
                index: self.game_page,
                total: self.total_pages,
            });
        }
        let decision = self.decision_page();
        if decision >= self.total_pages {
            return Err(ConfigError::PageOutOfRange {
                field: "decisionPage",
                index: decision,
                total: self.total_pages,
            });
        }
        if decision == self.game_page {
            return Err(ConfigError::SharedPage { index: decision });
        }
        if self.cards.is_empty() {
            return Err(ConfigError::NoCards);
        }
        let mut seen: HashSet<PairId> = HashSet::new();
        for face in &self.cards {
            if !seen.insert(face.id) {
                return Err(ConfigError::DuplicatePairId { id: face.id });
            }
        }
        if self.decline_phrases.is_empty() {
            return Err(ConfigError::NoDeclinePhrases);
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            total_pages: DEFAULT_TOTAL_PAGES,
            game_page: DEFAULT_GAME_PAGE,
            decision_page: None,
            cards: default_cards(),
            exit_ms: 300,
            enter_ms: 350,
            preview_ms: 1000,
            mismatch_delay_ms: 1000,
            completion_delay_ms: 1500,
            tick_ms: 1000,
            decline_phrases: default_decline_phrases(),
            decline_cooldown_ms: 300,
            countdown_target: None,
        }
    }
}
