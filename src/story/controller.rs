use std::cell::{Cell, RefCell};
use std::rc::Rc;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::countdown::Countdown;
use super::state::{
    Direction, Navigation, NavigationState, NavigationView, Page, PageKind, TransitionPhase,
};
use crate::config::StoryConfig;
use crate::error::ConfigError;
use crate::game::{FlipOutcome, MatchingGameEngine, Position};
use crate::presenter::{Presenter, StoryEvent};

/// 切换期间持有；离开作用域（包括 future 被丢弃）时清除切换标记。
struct TransitionGuard<'a> {
    state: &'a RefCell<NavigationState>,
}

impl<'a> TransitionGuard<'a> {
    fn begin(state: &'a RefCell<NavigationState>) -> Option<Self> {
        let mut nav = state.borrow_mut();
        if nav.is_transitioning {
            return None;
        }
        nav.is_transitioning = true;
        Some(Self { state })
    }
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().is_transitioning = false;
    }
}

pub struct NarrativeController {
    config: StoryConfig,
    pages: Vec<Page>,
    state: RefCell<NavigationState>,
    game: Rc<MatchingGameEngine>,
    presenter: Rc<dyn Presenter>,
    last_dodge: Cell<Option<NaiveDateTime>>,
}

impl NarrativeController {
    pub fn new(config: StoryConfig, presenter: Rc<dyn Presenter>) -> Result<Self, ConfigError> {
        config.validate()?;
        let game = Rc::new(MatchingGameEngine::new(
            config.cards.clone(),
            config.game_timing(),
            presenter.clone(),
        ));
        Self::with_game(config, presenter, game)
    }

    pub fn with_game(
        config: StoryConfig,
        presenter: Rc<dyn Presenter>,
        game: Rc<MatchingGameEngine>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let pages = config.pages();
        let state = RefCell::new(NavigationState::new(pages.len()));
        Ok(Self {
            config,
            pages,
            state,
            game,
            presenter,
            last_dodge: Cell::new(None),
        })
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn game(&self) -> &Rc<MatchingGameEngine> {
        &self.game
    }

    pub fn snapshot(&self) -> NavigationState {
        self.state.borrow().clone()
    }

    pub fn current_page(&self) -> usize {
        self.state.borrow().current_page
    }

    pub fn is_transitioning(&self) -> bool {
        self.state.borrow().is_transitioning
    }

    pub fn navigation_view(&self) -> NavigationView {
        self.state.borrow().view()
    }

    fn page_kind(&self, index: usize) -> Option<PageKind> {
        self.pages.get(index).map(|page| page.kind)
    }

    /// 合上封面，把第一页送上舞台。只生效一次。
    pub async fn start_story(&self) -> bool {
        if self.state.borrow().started {
            return false;
        }
        let Some(guard) = TransitionGuard::begin(&self.state) else {
            return false;
        };
        let index = {
            let mut state = self.state.borrow_mut();
            state.started = true;
            state.current_page
        };

        self.presenter
            .render_page(index, Direction::Next, TransitionPhase::Enter)
            .await;
        self.publish_navigation();
        self.on_page_activated(index).await;
        drop(guard);
        true
    }

    pub async fn go_to(&self, direction: Direction) -> Navigation {
        let target = {
            let state = self.state.borrow();
            if !state.started {
                debug!(?direction, "navigation before the cover is dismissed");
                return Navigation::NotStarted;
            }
            if state.is_transitioning {
                debug!(?direction, "navigation dropped mid-transition");
                return Navigation::Busy;
            }
            match direction
                .step(state.current_page)
                .filter(|target| state.contains(*target))
            {
                Some(target) => target,
                None => return Navigation::OutOfRange,
            }
        };
        self.transition(target, direction).await
    }

    pub async fn go_to_index(&self, index: usize) -> Navigation {
        let planned = self.state.borrow().plan(index);
        match planned {
            Ok(direction) => self.transition(index, direction).await,
            Err(outcome) => outcome,
        }
    }

    async fn transition(&self, target: usize, direction: Direction) -> Navigation {
        let Some(guard) = TransitionGuard::begin(&self.state) else {
            return Navigation::Busy;
        };
        let from = self.current_page();
        debug!(from, to = target, ?direction, "page transition");

        self.presenter
            .render_page(from, direction, TransitionPhase::Exit)
            .await;
        self.presenter
            .render_page(target, direction, TransitionPhase::Enter)
            .await;

        self.state.borrow_mut().current_page = target;
        self.publish_navigation();
        self.on_page_activated(target).await;
        drop(guard);
        Navigation::Moved { from, to: target }
    }

    fn publish_navigation(&self) {
        let view = self.navigation_view();
        self.presenter
            .emit(&StoryEvent::NavigationChanged { view });
    }

    pub async fn on_page_activated(&self, index: usize) {
        let Some(kind) = self.page_kind(index) else {
            return;
        };
        self.presenter
            .emit(&StoryEvent::PageActivated { index, kind });

        match kind {
            PageKind::Game => self.game.initialize().await,
            PageKind::Decision => self.play_ending_if_accepted(),
            PageKind::Narrative => {}
        }
    }

    fn play_ending_if_accepted(&self) {
        let play = {
            let mut state = self.state.borrow_mut();
            let play = state.accepted && !state.ending_played;
            if play {
                state.ending_played = true;
            }
            play
        };
        if play {
            info!("playing ending sequence");
            self.presenter.play_ending_sequence();
        }
    }

    pub async fn handle_key(&self, key: &str) -> Option<Navigation> {
        let direction = match key {
            "ArrowRight" => Direction::Next,
            "ArrowLeft" => Direction::Prev,
            _ => return None,
        };
        Some(self.go_to(direction).await)
    }

    /// 翻牌；若这一步赢下整局，弹出完成对话框，确认后翻到下一页。
    pub async fn flip_card(&self, position: Position) -> FlipOutcome {
        if self.page_kind(self.current_page()) != Some(PageKind::Game) {
            debug!(position, "card click outside the game page");
            return FlipOutcome::Ignored;
        }

        let outcome = self.game.flip(position).await;
        if let FlipOutcome::Completed { summary } = outcome {
            self.presenter.wait(self.config.completion_delay()).await;
            if self.presenter.show_completion_dialog(&summary).await {
                self.go_to_index(self.config.game_page + 1).await;
            }
        }
        outcome
    }

    pub async fn reset_game(&self) {
        self.game.reset().await;
    }

    pub async fn accept(&self) -> bool {
        let eligible = {
            let state = self.state.borrow();
            !state.is_transitioning
                && !state.accepted
                && self.page_kind(state.current_page) == Some(PageKind::Decision)
        };
        if !eligible {
            return false;
        }
        if !self.presenter.confirm_acceptance().await {
            debug!("acceptance dialog dismissed");
            return false;
        }

        let current = {
            let mut state = self.state.borrow_mut();
            state.accepted = true;
            state.current_page
        };
        info!("story accepted");
        self.presenter.emit(&StoryEvent::StoryAccepted);

        // 对话框期间可能已经翻走；结局留到下次回到抉择页时播放。
        if self.page_kind(current) == Some(PageKind::Decision) {
            self.play_ending_if_accepted();
        }
        true
    }

    /// "不" 按钮躲开一次，依次换一句台词。冷却期内的再次触发返回 `None`。
    pub fn decline(&self, now: NaiveDateTime) -> Option<String> {
        let cooldown_ms =
            i64::try_from(self.config.decline_cooldown().as_millis()).unwrap_or(i64::MAX);
        if let Some(last) = self.last_dodge.get() {
            if now.signed_duration_since(last).num_milliseconds() < cooldown_ms {
                debug!("decline dodge still cooling down");
                return None;
            }
        }
        self.last_dodge.set(Some(now));

        let attempt = {
            let mut state = self.state.borrow_mut();
            state.decline_attempts += 1;
            state.decline_attempts
        };
        let phrases = &self.config.decline_phrases;
        let phrase = phrases
            .get(attempt as usize % phrases.len().max(1))
            .cloned()
            .unwrap_or_default();
        self.presenter.emit(&StoryEvent::DeclineDodged {
            phrase: phrase.clone(),
            attempt,
        });
        Some(phrase)
    }

    pub fn countdown(&self, now: NaiveDateTime) -> Option<Countdown> {
        self.config
            .countdown_target
            .map(|target| Countdown::until(target, now))
    }

    /// 推送一次倒计时；到点的事件只发一次。
    pub fn update_countdown(&self, now: NaiveDateTime) -> Option<Countdown> {
        let countdown = self.countdown(now)?;
        match countdown {
            Countdown::Remaining {
                days,
                hours,
                minutes,
                seconds,
            } => self.presenter.emit(&StoryEvent::CountdownTicked {
                days,
                hours,
                minutes,
                seconds,
            }),
            Countdown::Reached => {
                let first = {
                    let mut state = self.state.borrow_mut();
                    !std::mem::replace(&mut state.countdown_reached, true)
                };
                if first {
                    info!("countdown reached its target");
                    self.presenter.emit(&StoryEvent::CountdownReached);
                }
            }
        }
        Some(countdown)
    }

    /// 宿主的秒级定时器入口：推进小游戏计时与结尾倒计时。
    pub fn tick(&self, now: NaiveDateTime) {
        self.game.tick();
        self.update_countdown(now);
    }
}
