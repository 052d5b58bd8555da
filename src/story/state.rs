use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Narrative,
    Game,
    Decision,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub index: usize,
    pub kind: PageKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Next,
    Prev,
}

impl Direction {
    pub fn step(self, from: usize) -> Option<usize> {
        match self {
            Direction::Next => from.checked_add(1),
            Direction::Prev => from.checked_sub(1),
        }
    }

    fn toward(from: usize, to: usize) -> Self {
        if to < from {
            Direction::Prev
        } else {
            Direction::Next
        }
    }
}

/// 页面切换分两步：旧页离场，新页入场。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPhase {
    Exit,
    Enter,
}

/// 导航请求的结果；越界与并发请求是无效果的空操作，而不是错误。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Navigation {
    Moved { from: usize, to: usize },
    /// 封面尚未合上。
    NotStarted,
    Busy,
    OutOfRange,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NavigationView {
    pub current_page: usize,
    pub total_pages: usize,
    pub label: String,
    pub show_prev: bool,
    pub show_next: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub current_page: usize,
    pub total_pages: usize,
    pub is_transitioning: bool,
    pub started: bool,
    pub accepted: bool,
    pub ending_played: bool,
    pub decline_attempts: u32,
    pub countdown_reached: bool,
}

impl NavigationState {
    pub fn new(total_pages: usize) -> Self {
        Self {
            total_pages,
            ..Self::default()
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        index < self.total_pages
    }

    /// 计算一次跳转的方向；目标无效时给出对应的空操作结果。
    pub fn plan(&self, target: usize) -> Result<Direction, Navigation> {
        if !self.started {
            return Err(Navigation::NotStarted);
        }
        if self.is_transitioning {
            return Err(Navigation::Busy);
        }
        if !self.contains(target) {
            return Err(Navigation::OutOfRange);
        }
        if target == self.current_page {
            return Err(Navigation::Unchanged);
        }
        Ok(Direction::toward(self.current_page, target))
    }

    pub fn view(&self) -> NavigationView {
        let last = self.total_pages.saturating_sub(1);
        NavigationView {
            current_page: self.current_page,
            total_pages: self.total_pages,
            label: format!("{}/{}", self.current_page + 1, self.total_pages),
            show_prev: self.current_page > 0,
            show_next: self.current_page < last,
        }
    }
}
