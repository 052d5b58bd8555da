use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配对标识：同一标识在牌组中恰好出现两次。
pub type PairId = u32;
/// 卡牌在洗牌后布局中的位置。
pub type Position = usize;

const BUFFER_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FaceState {
    #[default]
    Hidden,
    Flipped,
    Matched,
}

/// 一对卡牌共享的卡面内容。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardFace {
    pub id: PairId,
    pub symbol: String,
    pub caption: String,
}

impl CardFace {
    pub fn new(id: PairId, symbol: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            caption: caption.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub pair_id: PairId,
    pub position: Position,
    pub symbol: String,
    pub caption: String,
    #[serde(default)]
    pub face: FaceState,
}

impl Card {
    pub fn from_face(face: &CardFace, position: Position) -> Self {
        Self {
            pair_id: face.id,
            position,
            symbol: face.symbol.clone(),
            caption: face.caption.clone(),
            face: FaceState::Hidden,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.face == FaceState::Matched
    }
}

/// 一局结束时交给完成对话框的统计数据。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub moves: u32,
    pub elapsed_seconds: u32,
    pub pair_count: usize,
}

impl GameSummary {
    pub fn elapsed_label(&self) -> String {
        format!("{:02}:{:02}", self.elapsed_seconds / 60, self.elapsed_seconds % 60)
    }
}

#[derive(Debug, Clone, Serialize, Error, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("deck has {actual} cards, expected {expected}")]
    DeckSize { expected: usize, actual: usize },
    #[error("pair {pair_id} appears {count} times")]
    UnpairedCard { pair_id: PairId, count: usize },
    #[error("card at {position} is stored in slot {slot}")]
    MisplacedCard { position: Position, slot: usize },
    #[error("{count} cards are waiting for resolution")]
    BufferOverflow { count: usize },
    #[error("buffered card at {position} is not face up")]
    BufferedCardNotFlipped { position: Position },
    #[error("{matched} matched pairs recorded, {on_table} on the table")]
    MatchedCountMismatch { matched: usize, on_table: usize },
}

/// 记忆小游戏的整体状态。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    #[serde(default)]
    pub deck: Vec<Card>,
    #[serde(default)]
    pub flipped: Vec<Position>,
    pub pair_count: usize,
    pub matched_pairs: usize,
    pub moves: u32,
    pub is_locked: bool,
    pub elapsed_seconds: u32,
    pub timer_running: bool,
    pub completed: bool,
    /// 每次发牌递增，用于丢弃重置前遗留的延迟结算。
    pub round: u64,
}

impl GameState {
    /// 按给定的配对顺序摆牌（洗牌在引擎里完成）。
    pub fn dealt(faces: &[CardFace], layout: &[PairId], round: u64) -> Self {
        let deck = layout
            .iter()
            .enumerate()
            .filter_map(|(position, pair_id)| {
                faces
                    .iter()
                    .find(|face| face.id == *pair_id)
                    .map(|face| Card::from_face(face, position))
            })
            .collect();

        Self {
            deck,
            pair_count: faces.len(),
            round,
            ..Self::default()
        }
    }

    pub fn card(&self, position: Position) -> Option<&Card> {
        self.deck.get(position)
    }

    pub fn card_mut(&mut self, position: Position) -> Option<&mut Card> {
        self.deck.get_mut(position)
    }

    pub fn is_buffered(&self, position: Position) -> bool {
        self.flipped.contains(&position)
    }

    pub fn buffer_full(&self) -> bool {
        self.flipped.len() >= BUFFER_LIMIT
    }

    pub fn is_won(&self) -> bool {
        self.pair_count > 0 && self.matched_pairs == self.pair_count
    }

    pub fn set_face(&mut self, position: Position, face: FaceState) {
        if let Some(card) = self.card_mut(position) {
            // 已配对的卡牌不会再翻回去。
            if !card.is_matched() {
                card.face = face;
            }
        }
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary {
            moves: self.moves,
            elapsed_seconds: self.elapsed_seconds,
            pair_count: self.pair_count,
        }
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        let expected = self.pair_count * 2;
        if self.deck.len() != expected {
            return Err(IntegrityError::DeckSize {
                expected,
                actual: self.deck.len(),
            });
        }

        let mut counts: HashMap<PairId, usize> = HashMap::new();
        for (slot, card) in self.deck.iter().enumerate() {
            if card.position != slot {
                return Err(IntegrityError::MisplacedCard {
                    position: card.position,
                    slot,
                });
            }
            *counts.entry(card.pair_id).or_default() += 1;
        }
        if let Some((pair_id, count)) = counts.into_iter().find(|(_, count)| *count != 2) {
            return Err(IntegrityError::UnpairedCard { pair_id, count });
        }

        if self.flipped.len() > BUFFER_LIMIT {
            return Err(IntegrityError::BufferOverflow {
                count: self.flipped.len(),
            });
        }
        for position in &self.flipped {
            let face_up = self
                .card(*position)
                .map(|card| card.face == FaceState::Flipped)
                .unwrap_or(false);
            if !face_up {
                return Err(IntegrityError::BufferedCardNotFlipped {
                    position: *position,
                });
            }
        }

        let on_table = self.deck.iter().filter(|card| card.is_matched()).count() / 2;
        if on_table != self.matched_pairs {
            return Err(IntegrityError::MatchedCountMismatch {
                matched: self.matched_pairs,
                on_table,
            });
        }

        Ok(())
    }
}
