use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::state::{Card, CardFace, FaceState, GameState, GameSummary, PairId, Position};
use crate::presenter::{Presenter, StoryEvent};

/// 单次翻牌的结果；被拒绝的翻牌不是错误，只是没有效果。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum FlipOutcome {
    Ignored,
    Revealed,
    Matched { pair_id: PairId },
    Mismatched,
    Completed { summary: GameSummary },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTiming {
    pub preview: Duration,
    pub mismatch_delay: Duration,
}

/// 无偏的 Fisher–Yates 洗牌：从末尾向前，每个位置与 [0, i] 中均匀选取的位置交换。
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

pub struct MatchingGameEngine {
    faces: Vec<CardFace>,
    timing: GameTiming,
    state: RefCell<GameState>,
    rng: RefCell<SmallRng>,
    presenter: Rc<dyn Presenter>,
}

impl MatchingGameEngine {
    pub fn new(faces: Vec<CardFace>, timing: GameTiming, presenter: Rc<dyn Presenter>) -> Self {
        Self::with_rng(faces, timing, presenter, SmallRng::from_entropy())
    }

    pub fn with_seed(
        faces: Vec<CardFace>,
        timing: GameTiming,
        presenter: Rc<dyn Presenter>,
        seed: u64,
    ) -> Self {
        Self::with_rng(faces, timing, presenter, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(
        faces: Vec<CardFace>,
        timing: GameTiming,
        presenter: Rc<dyn Presenter>,
        rng: SmallRng,
    ) -> Self {
        let pair_count = faces.len();
        Self {
            faces,
            timing,
            state: RefCell::new(GameState {
                pair_count,
                ..GameState::default()
            }),
            rng: RefCell::new(rng),
            presenter,
        }
    }

    pub fn pair_count(&self) -> usize {
        self.faces.len()
    }

    pub fn snapshot(&self) -> GameState {
        self.state.borrow().clone()
    }

    pub fn summary(&self) -> GameSummary {
        self.state.borrow().summary()
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.state.borrow().elapsed_seconds
    }

    /// 洗出新的一局并渲染；预览期间锁定牌面，预览结束后开始计时。
    pub async fn initialize(&self) {
        let layout = self.shuffled_layout();
        self.start_round(layout).await;
    }

    /// 与 `initialize` 等价：丢弃当前牌局，重新洗牌。
    pub async fn reset(&self) {
        self.initialize().await;
    }

    fn shuffled_layout(&self) -> Vec<PairId> {
        let mut layout: Vec<PairId> = self
            .faces
            .iter()
            .flat_map(|face| [face.id, face.id])
            .collect();
        shuffle(&mut layout, &mut *self.rng.borrow_mut());
        layout
    }

    async fn start_round(&self, layout: Vec<PairId>) {
        let previewing = !self.timing.preview.is_zero();
        let (round, cards) = {
            let mut state = self.state.borrow_mut();
            let round = state.round + 1;
            *state = GameState::dealt(&self.faces, &layout, round);
            state.is_locked = previewing;
            (round, state.deck.clone())
        };
        debug!(round, cards = cards.len(), "dealt memory deck");

        if previewing {
            self.presenter.render_deck(&cards, true);
            self.presenter.wait(self.timing.preview).await;
            if self.state.borrow().round != round {
                return;
            }
        }

        self.presenter.render_deck(&cards, false);
        let mut state = self.state.borrow_mut();
        if state.round == round {
            state.is_locked = false;
            state.timer_running = true;
        }
    }

    pub async fn flip(&self, position: Position) -> FlipOutcome {
        let (card, pending) = {
            let mut state = self.state.borrow_mut();
            let rejected = state.is_locked
                || state.is_buffered(position)
                || state.card(position).map_or(true, Card::is_matched);
            if rejected {
                debug!(position, "flip ignored");
                return FlipOutcome::Ignored;
            }

            state.set_face(position, FaceState::Flipped);
            state.flipped.push(position);
            let card = state.card(position).cloned();

            let pending = state.buffer_full().then(|| {
                state.moves += 1;
                state.is_locked = true;
                (state.moves, state.round, state.flipped[0], state.flipped[1])
            });
            (card, pending)
        };

        // 回调可能回读状态，所以只在借用结束后通知表现层。
        if let Some(card) = &card {
            self.presenter.render_card_face(card);
        }
        let Some((moves, round, first, second)) = pending else {
            return FlipOutcome::Revealed;
        };
        self.presenter.emit(&StoryEvent::MoveCounted { moves });
        self.evaluate_pair(round, first, second).await
    }

    async fn evaluate_pair(&self, round: u64, first: Position, second: Position) -> FlipOutcome {
        let pair = {
            let state = self.state.borrow();
            match (state.card(first), state.card(second)) {
                (Some(a), Some(b)) if a.pair_id == b.pair_id => Some(a.pair_id),
                _ => None,
            }
        };

        match pair {
            Some(pair_id) => self.resolve_match(pair_id, first, second),
            None => {
                self.presenter.wait(self.timing.mismatch_delay).await;
                self.resolve_mismatch(round, first, second)
            }
        }
    }

    fn publish_faces(&self, cards: &[Card]) {
        for card in cards {
            self.presenter.render_card_face(card);
        }
    }

    fn resolve_match(&self, pair_id: PairId, first: Position, second: Position) -> FlipOutcome {
        let (cards, resolved, completion) = {
            let mut state = self.state.borrow_mut();
            state.set_face(first, FaceState::Matched);
            state.set_face(second, FaceState::Matched);
            state.matched_pairs += 1;
            state.flipped.clear();
            state.is_locked = false;

            let cards: Vec<Card> = [first, second]
                .iter()
                .filter_map(|position| state.card(*position).cloned())
                .collect();
            let resolved = StoryEvent::MatchResolved {
                pair_id,
                matched: true,
                matched_pairs: state.matched_pairs,
                pair_count: state.pair_count,
            };

            let completion = (state.is_won() && !state.completed).then(|| {
                state.completed = true;
                state.timer_running = false;
                state.summary()
            });
            (cards, resolved, completion)
        };

        self.publish_faces(&cards);
        self.presenter.emit(&resolved);

        let Some(summary) = completion else {
            return FlipOutcome::Matched { pair_id };
        };
        info!(
            moves = summary.moves,
            elapsed_seconds = summary.elapsed_seconds,
            "memory game complete"
        );
        self.presenter.emit(&StoryEvent::GameComplete {
            moves: summary.moves,
            elapsed_seconds: summary.elapsed_seconds,
        });
        FlipOutcome::Completed { summary }
    }

    fn resolve_mismatch(&self, round: u64, first: Position, second: Position) -> FlipOutcome {
        let (cards, resolved) = {
            let mut state = self.state.borrow_mut();
            if state.round != round {
                debug!(round, "stale mismatch discarded after reset");
                return FlipOutcome::Ignored;
            }

            state.set_face(first, FaceState::Hidden);
            state.set_face(second, FaceState::Hidden);
            state.flipped.clear();
            state.is_locked = false;

            let cards: Vec<Card> = [first, second]
                .iter()
                .filter_map(|position| state.card(*position).cloned())
                .collect();
            let pair_id = cards.first().map(|card| card.pair_id).unwrap_or_default();
            let resolved = StoryEvent::MatchResolved {
                pair_id,
                matched: false,
                matched_pairs: state.matched_pairs,
                pair_count: state.pair_count,
            };
            (cards, resolved)
        };

        self.publish_faces(&cards);
        self.presenter.emit(&resolved);
        FlipOutcome::Mismatched
    }

    /// 每秒由宿主调用一次；计时器未运行时不做任何事。
    pub fn tick(&self) {
        let elapsed_seconds = {
            let mut state = self.state.borrow_mut();
            if !state.timer_running {
                return;
            }
            state.elapsed_seconds += 1;
            state.elapsed_seconds
        };
        self.presenter
            .emit(&StoryEvent::TimerTicked { elapsed_seconds });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use futures::executor::block_on;
    use futures::FutureExt;

    use super::*;
    use crate::testing::RecordingPresenter;

    const A: PairId = 1;
    const B: PairId = 2;
    const C: PairId = 3;

    fn faces() -> Vec<CardFace> {
        vec![
            CardFace::new(A, "A", "first"),
            CardFace::new(B, "B", "second"),
            CardFace::new(C, "C", "third"),
        ]
    }

    fn instant() -> GameTiming {
        GameTiming {
            preview: Duration::ZERO,
            mismatch_delay: Duration::ZERO,
        }
    }

    fn engine_with(presenter: &Rc<RecordingPresenter>, timing: GameTiming) -> MatchingGameEngine {
        MatchingGameEngine::with_seed(faces(), timing, presenter.clone(), 7)
    }

    fn scenario_engine(presenter: &Rc<RecordingPresenter>) -> MatchingGameEngine {
        let engine = engine_with(presenter, instant());
        block_on(engine.start_round(vec![B, A, C, A, B, C]));
        engine
    }

    fn faces_at(engine: &MatchingGameEngine, positions: &[Position]) -> Vec<FaceState> {
        let state = engine.snapshot();
        positions.iter().map(|p| state.deck[*p].face).collect()
    }

    #[test]
    fn every_shuffled_deck_holds_each_pair_twice() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = engine_with(&presenter, instant());

        for _ in 0..50 {
            block_on(engine.initialize());
            let state = engine.snapshot();
            assert_eq!(state.deck.len(), 6);
            state.integrity_check().expect("fresh deck should be consistent");

            let mut counts: HashMap<PairId, usize> = HashMap::new();
            for card in &state.deck {
                *counts.entry(card.pair_id).or_default() += 1;
            }
            assert!(counts.values().all(|count| *count == 2));
        }
    }

    #[test]
    fn shuffle_reaches_every_slot_for_every_item() {
        let mut rng = SmallRng::seed_from_u64(11);
        let mut seen = [[0usize; 4]; 4];
        for _ in 0..4000 {
            let mut items = [0usize, 1, 2, 3];
            shuffle(&mut items, &mut rng);
            for (slot, item) in items.iter().enumerate() {
                seen[*item][slot] += 1;
            }
        }
        for row in seen {
            for count in row {
                assert!(count > 800 && count < 1200, "skewed count {count}");
            }
        }
    }

    #[test]
    fn initialize_resets_counters_and_starts_timer() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = scenario_engine(&presenter);
        block_on(engine.flip(0));
        block_on(engine.flip(2));

        block_on(engine.initialize());
        let state = engine.snapshot();
        assert_eq!(state.moves, 0);
        assert_eq!(state.matched_pairs, 0);
        assert!(state.flipped.is_empty());
        assert!(!state.is_locked);
        assert!(state.timer_running);
        assert_eq!(state.elapsed_seconds, 0);
    }

    #[test]
    fn mismatch_then_match_scenario() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = scenario_engine(&presenter);

        assert_eq!(block_on(engine.flip(0)), FlipOutcome::Revealed);
        assert_eq!(block_on(engine.flip(2)), FlipOutcome::Mismatched);
        let state = engine.snapshot();
        assert_eq!(state.moves, 1);
        assert!(state.flipped.is_empty());
        assert!(!state.is_locked);
        assert_eq!(faces_at(&engine, &[0, 2]), vec![FaceState::Hidden; 2]);
        let rendered: Vec<(Position, FaceState)> = presenter
            .face_renders()
            .iter()
            .map(|card| (card.position, card.face))
            .collect();
        assert_eq!(
            rendered,
            vec![
                (0, FaceState::Flipped),
                (2, FaceState::Flipped),
                (0, FaceState::Hidden),
                (2, FaceState::Hidden),
            ]
        );

        assert_eq!(block_on(engine.flip(0)), FlipOutcome::Revealed);
        assert_eq!(block_on(engine.flip(4)), FlipOutcome::Matched { pair_id: B });
        let state = engine.snapshot();
        assert_eq!(state.moves, 2);
        assert_eq!(state.matched_pairs, 1);
        assert_eq!(faces_at(&engine, &[0, 4]), vec![FaceState::Matched; 2]);
        state.integrity_check().expect("state should stay consistent");
    }

    #[test]
    fn third_flip_is_rejected_while_pair_resolves() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = scenario_engine(&presenter);
        let release = presenter.hold_next();

        block_on(engine.flip(0));
        let mut pending = Box::pin(engine.flip(2));
        assert!(pending.as_mut().now_or_never().is_none());
        assert!(engine.snapshot().is_locked);

        assert_eq!(block_on(engine.flip(1)), FlipOutcome::Ignored);
        assert_eq!(engine.snapshot().flipped, vec![0, 2]);

        release.send(()).expect("gate should be open");
        assert_eq!(block_on(pending), FlipOutcome::Mismatched);
        assert_eq!(block_on(engine.flip(1)), FlipOutcome::Revealed);
    }

    #[test]
    fn flipping_same_or_matched_card_is_ignored() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = scenario_engine(&presenter);

        block_on(engine.flip(1));
        assert_eq!(block_on(engine.flip(1)), FlipOutcome::Ignored);
        assert_eq!(block_on(engine.flip(3)), FlipOutcome::Matched { pair_id: A });

        assert_eq!(block_on(engine.flip(1)), FlipOutcome::Ignored);
        assert_eq!(block_on(engine.flip(3)), FlipOutcome::Ignored);
        assert_eq!(block_on(engine.flip(99)), FlipOutcome::Ignored);
        assert_eq!(faces_at(&engine, &[1, 3]), vec![FaceState::Matched; 2]);
        assert_eq!(engine.snapshot().moves, 1);
    }

    #[test]
    fn matched_pairs_only_grow_and_completion_fires_once() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = scenario_engine(&presenter);

        let mut last = 0;
        for (first, second) in [(0, 2), (0, 4), (1, 3), (2, 5)] {
            block_on(engine.flip(first));
            block_on(engine.flip(second));
            let matched = engine.snapshot().matched_pairs;
            assert!(matched >= last);
            assert!(matched - last <= 1);
            last = matched;
        }

        let state = engine.snapshot();
        assert!(state.is_won());
        assert!(state.completed);
        assert!(!state.timer_running);
        assert!(state.moves as usize >= state.pair_count);

        block_on(engine.flip(0));
        block_on(engine.flip(5));
        let completions = presenter
            .events()
            .iter()
            .filter(|event| matches!(event, StoryEvent::GameComplete { .. }))
            .count();
        assert_eq!(completions, 1);
        assert!(presenter.events().contains(&StoryEvent::GameComplete {
            moves: 4,
            elapsed_seconds: 0
        }));
    }

    #[test]
    fn final_match_reports_summary() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = scenario_engine(&presenter);
        engine.tick();
        engine.tick();

        block_on(engine.flip(0));
        block_on(engine.flip(4));
        block_on(engine.flip(1));
        block_on(engine.flip(3));
        block_on(engine.flip(2));
        let outcome = block_on(engine.flip(5));

        assert_eq!(
            outcome,
            FlipOutcome::Completed {
                summary: GameSummary {
                    moves: 3,
                    elapsed_seconds: 2,
                    pair_count: 3
                }
            }
        );
        engine.tick();
        assert_eq!(engine.elapsed_seconds(), 2, "timer stops on completion");
    }

    #[test]
    fn preview_locks_deck_then_starts_timer() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = engine_with(
            &presenter,
            GameTiming {
                preview: Duration::from_millis(500),
                mismatch_delay: Duration::ZERO,
            },
        );
        let release = presenter.hold_next();

        let mut pending = Box::pin(engine.initialize());
        assert!(pending.as_mut().now_or_never().is_none());
        assert!(engine.snapshot().is_locked);
        assert_eq!(block_on(engine.flip(0)), FlipOutcome::Ignored);
        engine.tick();
        assert_eq!(engine.elapsed_seconds(), 0);

        release.send(()).expect("gate should be open");
        block_on(pending);
        let state = engine.snapshot();
        assert!(!state.is_locked);
        assert!(state.timer_running);
        assert_eq!(presenter.deck_renders(), vec![true, false]);
        assert_eq!(presenter.waits(), vec![Duration::from_millis(500)]);
    }

    #[test]
    fn reset_during_mismatch_delay_discards_stale_resolution() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = scenario_engine(&presenter);
        let release = presenter.hold_next();

        block_on(engine.flip(0));
        let mut pending = Box::pin(engine.flip(2));
        assert!(pending.as_mut().now_or_never().is_none());

        block_on(engine.reset());
        let fresh = engine.snapshot();
        assert!(!fresh.is_locked);
        assert_eq!(fresh.moves, 0);

        release.send(()).expect("gate should be open");
        assert_eq!(block_on(pending), FlipOutcome::Ignored);
        assert_eq!(engine.snapshot(), fresh);
    }

    #[test]
    fn presenter_callbacks_can_read_engine_state() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = Rc::new(engine_with(&presenter, instant()));
        let moves_seen = Rc::new(RefCell::new(Vec::new()));

        let reader = Rc::downgrade(&engine);
        let log = moves_seen.clone();
        presenter.observe(move || {
            if let Some(engine) = reader.upgrade() {
                log.borrow_mut().push(engine.snapshot().moves);
            }
        });

        block_on(engine.start_round(vec![B, A, C, A, B, C]));
        for (first, second) in [(0, 2), (0, 4), (1, 3), (2, 5)] {
            block_on(engine.flip(first));
            block_on(engine.flip(second));
        }
        engine.tick();

        assert!(engine.snapshot().completed);
        let moves_seen = moves_seen.borrow();
        assert!(moves_seen.contains(&1));
        assert_eq!(moves_seen.last(), Some(&4));
    }

    #[test]
    fn tick_counts_only_while_running() {
        let presenter = Rc::new(RecordingPresenter::default());
        let engine = engine_with(&presenter, instant());
        engine.tick();
        assert_eq!(engine.elapsed_seconds(), 0);

        block_on(engine.initialize());
        engine.tick();
        engine.tick();
        assert_eq!(engine.elapsed_seconds(), 2);
        assert!(presenter
            .events()
            .contains(&StoryEvent::TimerTicked { elapsed_seconds: 2 }));
    }
}
