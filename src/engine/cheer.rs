// Cheer card catalogue.

use serde::Serialize;

use super::config::*;
use super::error::{RaidError, RaidResult};

/// The five cheer effects a knocked-out player can hand to the team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CheerCard {
    /// #1: the next player attack deals double damage.
    DoubleNextDamage,
    /// #2: every fighting player's active card heals.
    HealAllActives,
    /// #3: one player's active card is fully healed.
    FullHealOne,
    /// #4: the boss's next turn is weakened.
    LimitBossNextTurn,
    /// #5: flat bonus on every player attack until the boss acts.
    FlatDamageBonus,
}

impl CheerCard {
    pub fn from_number(n: u8) -> RaidResult<Self> {
        match n {
            1 => Ok(CheerCard::DoubleNextDamage),
            2 => Ok(CheerCard::HealAllActives),
            3 => Ok(CheerCard::FullHealOne),
            4 => Ok(CheerCard::LimitBossNextTurn),
            5 => Ok(CheerCard::FlatDamageBonus),
            other => Err(RaidError::InvalidCheerCard(other)),
        }
    }

    pub fn number(self) -> u8 {
        match self {
            CheerCard::DoubleNextDamage => 1,
            CheerCard::HealAllActives => 2,
            CheerCard::FullHealOne => 3,
            CheerCard::LimitBossNextTurn => 4,
            CheerCard::FlatDamageBonus => 5,
        }
    }

    pub fn description(self) -> String {
        match self {
            CheerCard::DoubleNextDamage => "Next attack deals double damage".to_string(),
            CheerCard::HealAllActives => {
                format!("All active cards heal {CHEER_HEAL_ALL_AMOUNT} HP")
            }
            CheerCard::FullHealOne => "One active card is fully healed".to_string(),
            CheerCard::LimitBossNextTurn => {
                format!("Boss hits are capped at {CHEER_BOSS_HIT_CAP} next turn")
            }
            CheerCard::FlatDamageBonus => {
                format!("+{CHEER_FLAT_BONUS} damage on every attack this round")
            }
        }
    }
}

/// Cheer effects waiting to be consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheerModifiers {
    pub double_next_damage: bool,
    pub flat_bonus_this_round: u32,
    pub limit_boss_next_turn: bool,
}

impl CheerModifiers {
    /// Damage a player attack actually deals, consuming one-shot effects.
    pub fn apply_to_player_attack(&mut self, base: u32) -> u32 {
        let mut damage = base.saturating_add(self.flat_bonus_this_round);
        if self.double_next_damage {
            damage = damage.saturating_mul(2);
            self.double_next_damage = false;
        }
        damage
    }

    /// Called once the round's player turns are over.
    pub fn end_player_round(&mut self) {
        self.flat_bonus_this_round = 0;
    }

    /// Take the boss limiter for the turn about to be executed.
    pub fn take_boss_limit(&mut self) -> bool {
        std::mem::take(&mut self.limit_boss_next_turn)
    }
}
