use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::card::{starter_pair, Card, CardData, CardStatus};

/// Whether a player still takes turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    Active,
    Spectator,
}

/// Which of a player's two cards an action addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardSlot {
    Active,
    Bench,
}

/// A player's two cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCards {
    pub active: Card,
    pub bench: Card,
}

impl PlayerCards {
    pub fn get(&self, slot: CardSlot) -> &Card {
        match slot {
            CardSlot::Active => &self.active,
            CardSlot::Bench => &self.bench,
        }
    }

    pub fn get_mut(&mut self, slot: CardSlot) -> &mut Card {
        match slot {
            CardSlot::Active => &mut self.active,
            CardSlot::Bench => &mut self.bench,
        }
    }
}

/// Data a client sends when joining a raid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub username: String,
    /// `[active, bench]`. Starter cards are dealt when absent.
    #[serde(default)]
    pub cards: Option<[CardData; 2]>,
    /// Join as a pure viewer instead of a combatant.
    #[serde(default)]
    pub as_spectator: bool,
}

/// A participant controlling an active and a bench card.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub username: String,
    pub status: PlayerStatus,
    pub cards: PlayerCards,
    pub ko_count: u32,
    pub can_use_cheer: bool,
    pub joined_at: DateTime<Utc>,
}

impl Player {
    /// Build a player from join data. `join_index` picks the starter pair when
    /// the client brought no cards.
    pub fn new(id: &str, data: PlayerData, join_index: usize) -> Self {
        let (mut active, mut bench) = match data.cards {
            Some([a, b]) => (a.into_card(), b.into_card()),
            None => starter_pair(join_index),
        };
        active.status = CardStatus::Active;
        bench.status = CardStatus::Benched;

        let username = if data.username.trim().is_empty() {
            format!("Trainer {}", join_index + 1)
        } else {
            data.username.trim().to_string()
        };

        Player {
            id: id.to_string(),
            username,
            status: PlayerStatus::Active,
            cards: PlayerCards { active, bench },
            ko_count: 0,
            can_use_cheer: false,
            joined_at: Utc::now(),
        }
    }

    pub fn is_spectator(&self) -> bool {
        self.status == PlayerStatus::Spectator
    }

    /// Both cards knocked out.
    pub fn all_cards_ko(&self) -> bool {
        self.cards.active.is_ko() && self.cards.bench.is_ko()
    }

    /// Still in the fight and has a living active card to be hit with.
    pub fn is_targetable(&self) -> bool {
        !self.is_spectator() && !self.cards.active.is_ko()
    }

    /// Swap active and bench, fixing up the statuses of living cards.
    pub fn swap_cards(&mut self) {
        std::mem::swap(&mut self.cards.active, &mut self.cards.bench);
        if !self.cards.active.is_ko() {
            self.cards.active.status = CardStatus::Active;
        }
        if !self.cards.bench.is_ko() {
            self.cards.bench.status = CardStatus::Benched;
        }
    }

    /// Bring both cards back to full HP and return to the fight.
    pub fn resurrect(&mut self) {
        self.cards.active.restore(CardStatus::Active);
        self.cards.bench.restore(CardStatus::Benched);
        self.status = PlayerStatus::Active;
        self.can_use_cheer = false;
    }
}
