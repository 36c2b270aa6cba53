use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::Coord;
use crate::scoring::MAX_HEALTH;

pub type PlayerId = Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub health: u32,
    pub guess: Option<Coord>,
    pub has_submitted: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            score: 0,
            health: MAX_HEALTH,
            guess: None,
            has_submitted: false,
        }
    }

    /// Record this round's guess. Returns false if one was already recorded.
    pub fn submit(&mut self, guess: Coord) -> bool {
        if self.has_submitted {
            return false;
        }
        self.guess = Some(guess);
        self.has_submitted = true;
        true
    }

    pub fn clear_round(&mut self) {
        self.guess = None;
        self.has_submitted = false;
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.health = self.health.saturating_sub(amount);
    }

    pub fn add_score(&mut self, points: u32) {
        self.score = self.score.saturating_add(points);
    }

    pub fn is_eliminated(&self) -> bool {
        self.health == 0
    }

    pub fn reset(&mut self) {
        self.score = 0;
        self.health = MAX_HEALTH;
        self.clear_round();
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            score: self.score,
            health: self.health,
            has_submitted: self.has_submitted,
        }
    }
}

/// Public view of a player. Never carries the pending guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub health: u32,
    pub has_submitted: bool,
}
