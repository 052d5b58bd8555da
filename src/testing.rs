//! 测试用的表现层：记录所有调用，并可挂起下一次动画、等待或确认框。

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::oneshot;

use crate::game::{Card, GameSummary};
use crate::presenter::{Presenter, StoryEvent};
use crate::story::{Direction, TransitionPhase};

pub struct RecordingPresenter {
    events: RefCell<Vec<StoryEvent>>,
    pages: RefCell<Vec<(usize, Direction, TransitionPhase)>>,
    deck_renders: RefCell<Vec<bool>>,
    faces: RefCell<Vec<Card>>,
    waits: RefCell<Vec<Duration>>,
    dialogs: RefCell<Vec<GameSummary>>,
    errors: RefCell<Vec<String>>,
    gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    completion_answer: Cell<bool>,
    acceptance_answer: Cell<bool>,
    acceptance_prompts: Cell<u32>,
    endings: Cell<u32>,
    observer: RefCell<Option<Box<dyn Fn()>>>,
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self {
            events: RefCell::default(),
            pages: RefCell::default(),
            deck_renders: RefCell::default(),
            faces: RefCell::default(),
            waits: RefCell::default(),
            dialogs: RefCell::default(),
            errors: RefCell::default(),
            gates: RefCell::default(),
            completion_answer: Cell::new(true),
            acceptance_answer: Cell::new(true),
            acceptance_prompts: Cell::new(0),
            endings: Cell::new(0),
            observer: RefCell::default(),
        }
    }
}

impl RecordingPresenter {
    /// 挂起下一次 `render_page`、`wait` 或 `confirm_acceptance`，直到返回的发送端被触发。
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        self.gates.borrow_mut().push_back(receiver);
        sender
    }

    /// 每次同步回调（渲染或事件）时调用，模拟页面脚本回读状态。
    pub fn observe(&self, observer: impl Fn() + 'static) {
        *self.observer.borrow_mut() = Some(Box::new(observer));
    }

    /// 清空已记录的调用，保留应答与挂起设置。
    pub fn forget(&self) {
        self.events.borrow_mut().clear();
        self.pages.borrow_mut().clear();
        self.deck_renders.borrow_mut().clear();
        self.faces.borrow_mut().clear();
        self.waits.borrow_mut().clear();
    }

    pub fn answer_completion(&self, confirmed: bool) {
        self.completion_answer.set(confirmed);
    }

    pub fn answer_acceptance(&self, confirmed: bool) {
        self.acceptance_answer.set(confirmed);
    }

    pub fn events(&self) -> Vec<StoryEvent> {
        self.events.borrow().clone()
    }

    pub fn pages(&self) -> Vec<(usize, Direction, TransitionPhase)> {
        self.pages.borrow().clone()
    }

    pub fn deck_renders(&self) -> Vec<bool> {
        self.deck_renders.borrow().clone()
    }

    pub fn face_renders(&self) -> Vec<Card> {
        self.faces.borrow().clone()
    }

    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }

    pub fn dialogs(&self) -> Vec<GameSummary> {
        self.dialogs.borrow().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }

    pub fn acceptance_prompts(&self) -> u32 {
        self.acceptance_prompts.get()
    }

    pub fn endings(&self) -> u32 {
        self.endings.get()
    }

    fn notify_observer(&self) {
        if let Some(observer) = self.observer.borrow().as_ref() {
            observer();
        }
    }

    async fn pass_gate(&self) {
        let gate = self.gates.borrow_mut().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }
}

#[async_trait(?Send)]
impl Presenter for RecordingPresenter {
    async fn render_page(&self, index: usize, direction: Direction, phase: TransitionPhase) {
        self.pages.borrow_mut().push((index, direction, phase));
        self.pass_gate().await;
    }

    fn render_deck(&self, _cards: &[Card], revealed: bool) {
        self.deck_renders.borrow_mut().push(revealed);
        self.notify_observer();
    }

    fn render_card_face(&self, card: &Card) {
        self.faces.borrow_mut().push(card.clone());
        self.notify_observer();
    }

    async fn show_completion_dialog(&self, summary: &GameSummary) -> bool {
        self.dialogs.borrow_mut().push(*summary);
        self.completion_answer.get()
    }

    async fn confirm_acceptance(&self) -> bool {
        self.acceptance_prompts.set(self.acceptance_prompts.get() + 1);
        self.pass_gate().await;
        self.acceptance_answer.get()
    }

    fn play_ending_sequence(&self) {
        self.endings.set(self.endings.get() + 1);
    }

    fn emit(&self, event: &StoryEvent) {
        self.events.borrow_mut().push(event.clone());
        self.notify_observer();
    }

    async fn wait(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
        self.pass_gate().await;
    }

    fn notify_error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_owned());
    }
}
