// Boss decision-making: attack weighting, target scoring, aggro tracking.

use std::collections::VecDeque;

use rand::Rng;
use serde::Serialize;

use super::boss::{Boss, BossAttack};
use super::config::*;

/// What the AI needs to know about a player it might hit.
#[derive(Debug, Clone)]
pub struct CombatantView {
    pub player_id: String,
    pub active_hp: u32,
    pub active_max_hp: u32,
}

impl CombatantView {
    fn hp_fraction(&self) -> f64 {
        self.active_hp as f64 / self.active_max_hp.max(1) as f64
    }
}

/// A player attack the boss remembers when picking its aggro target.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DamageRecord {
    player_id: String,
    damage: u32,
}

/// The attack the boss committed to and who it will hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BossDecision {
    pub attack: BossAttack,
    /// Empty for heal attacks.
    pub targets: Vec<String>,
}

/// Read-only view of the AI state for snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BossAiState {
    pub health_threshold: f64,
    pub enrage_mode: bool,
    pub aggro_target: Option<String>,
    pub last_attack: Option<String>,
}

#[derive(Debug, Default)]
pub struct BossAi {
    health_threshold: f64,
    enrage_mode: bool,
    aggro_target: Option<String>,
    last_attack: Option<usize>,
    consecutive_repeats: u32,
    cooldowns: Vec<u32>,
    history: VecDeque<DamageRecord>,
}

/// How many of the best-ranked options the boss picks among at a given level.
pub fn selection_window(level: u8) -> usize {
    match level {
        0..=2 => 3,
        3..=5 => 2,
        _ => 1,
    }
}

impl BossAi {
    pub fn new() -> Self {
        BossAi {
            health_threshold: 1.0,
            ..Default::default()
        }
    }

    pub fn reset(&mut self) {
        *self = BossAi::new();
    }

    pub fn state(&self, boss: &Boss) -> BossAiState {
        BossAiState {
            health_threshold: self.health_threshold,
            enrage_mode: self.enrage_mode,
            aggro_target: self.aggro_target.clone(),
            last_attack: self
                .last_attack
                .and_then(|i| boss.attacks.get(i))
                .map(|a| a.name.clone()),
        }
    }

    pub fn aggro_target(&self) -> Option<&str> {
        self.aggro_target.as_deref()
    }

    pub fn is_enraged(&self) -> bool {
        self.enrage_mode
    }

    /// Remember a player's attack on the boss. Only the last few turns count.
    pub fn record_player_damage(&mut self, player_id: &str, damage: u32) {
        self.history.push_back(DamageRecord {
            player_id: player_id.to_string(),
            damage,
        });
        while self.history.len() > AGGRO_WINDOW {
            self.history.pop_front();
        }
    }

    /// Forget a player who left the raid.
    pub fn forget_player(&mut self, player_id: &str) {
        self.history.retain(|r| r.player_id != player_id);
        if self.aggro_target.as_deref() == Some(player_id) {
            self.aggro_target = None;
        }
    }

    /// Refresh threshold, enrage flag and aggro target.
    pub fn update_state(&mut self, boss: &Boss, players: &[CombatantView]) {
        self.health_threshold = boss.health_fraction();
        self.enrage_mode = self.health_threshold < ENRAGE_THRESHOLD;

        let mut totals: Vec<(&str, u32)> = Vec::new();
        for record in &self.history {
            if !players.iter().any(|p| p.player_id == record.player_id) {
                continue;
            }
            match totals.iter_mut().find(|(id, _)| *id == record.player_id) {
                Some((_, total)) => *total = total.saturating_add(record.damage),
                None => totals.push((record.player_id.as_str(), record.damage)),
            }
        }

        let previous_active = self
            .aggro_target
            .as_deref()
            .filter(|prev| players.iter().any(|p| p.player_id == *prev))
            .map(str::to_string);

        let Some(best) = totals.iter().map(|(_, t)| *t).max() else {
            self.aggro_target = previous_active;
            return;
        };
        let tied: Vec<&str> = totals
            .iter()
            .filter(|(_, t)| *t == best)
            .map(|(id, _)| *id)
            .collect();

        self.aggro_target = match previous_active {
            Some(prev) if tied.len() > 1 && tied.contains(&prev.as_str()) => Some(prev),
            _ => tied.first().map(|id| id.to_string()),
        };
    }

    fn available_attacks(&self, boss: &Boss, allow_heal: bool) -> Vec<usize> {
        let usable = |i: &usize| {
            let attack = &boss.attacks[*i];
            if attack.is_heal() && (!allow_heal || boss.current_hp >= boss.max_hp) {
                return false;
            }
            true
        };
        let ready: Vec<usize> = (0..boss.attacks.len())
            .filter(usable)
            .filter(|i| self.cooldowns.get(*i).copied().unwrap_or(0) == 0)
            .collect();
        if !ready.is_empty() {
            return ready;
        }
        // Everything is cooling down: fall back to whatever is usable at all.
        (0..boss.attacks.len()).filter(usable).collect()
    }

    /// Weight of one attack given the current battlefield.
    pub fn attack_weight(&self, index: usize, attack: &BossAttack, players: &[CombatantView]) -> f64 {
        let damage = attack.damage as f64;
        let mut weight = damage;

        if attack.is_heal() {
            if self.health_threshold < HEAL_THRESHOLD {
                weight += HEAL_BONUS;
            } else {
                weight *= HEAL_IDLE_FACTOR;
            }
        } else {
            let alive = players.len();
            if attack.is_aoe() && alive >= 3 {
                weight += AOE_BONUS;
            }
            if !attack.is_aoe() && alive == 1 {
                weight += SINGLE_TARGET_BONUS;
            }
            if alive > 0 && attack.damage >= HIGH_DAMAGE_MIN {
                let avg = players.iter().map(CombatantView::hp_fraction).sum::<f64>() / alive as f64;
                if avg < LOW_HP_THRESHOLD {
                    weight += HIGH_DAMAGE_BONUS;
                }
            }
            if self.enrage_mode {
                weight += damage * ENRAGE_FACTOR;
            }
        }

        if self.last_attack == Some(index) {
            weight -= REPEAT_PENALTY * (self.consecutive_repeats + 1) as f64;
        }
        weight.max(MIN_WEIGHT)
    }

    /// Score a single-target candidate (without jitter).
    pub fn target_score(&self, attack: &BossAttack, player: &CombatantView) -> f64 {
        let mut score = 0.0;
        if self.aggro_target.as_deref() == Some(player.player_id.as_str()) {
            score += AGGRO_SCORE;
        }
        if attack.damage >= player.active_hp {
            score += LETHAL_SCORE;
        }
        if player.hp_fraction() < LOW_HP_THRESHOLD {
            score += LOW_HP_SCORE;
        }
        score
    }

    /// Run the full pipeline once. `players` are the targetable players in seat
    /// order. `allow_heal` is false while a cheer limiter is pending.
    pub fn decide<R: Rng>(
        &mut self,
        boss: &Boss,
        players: &[CombatantView],
        allow_heal: bool,
        rng: &mut R,
    ) -> Option<BossDecision> {
        if self.cooldowns.len() != boss.attacks.len() {
            self.cooldowns = vec![0; boss.attacks.len()];
        }
        self.update_state(boss, players);

        let candidates = self.available_attacks(boss, allow_heal);
        if candidates.is_empty() {
            return None;
        }

        let mut ranked: Vec<(usize, f64)> = candidates
            .into_iter()
            .map(|i| (i, self.attack_weight(i, &boss.attacks[i], players)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(selection_window(boss.level));

        let total: f64 = ranked.iter().map(|(_, w)| w).sum();
        let mut roll = rng.gen_range(0.0..total);
        let mut chosen = ranked[0].0;
        for (i, w) in &ranked {
            if roll < *w {
                chosen = *i;
                break;
            }
            roll -= w;
        }

        let attack = boss.attacks[chosen].clone();
        let targets = if attack.is_heal() {
            Vec::new()
        } else if attack.is_aoe() {
            players.iter().map(|p| p.player_id.clone()).collect()
        } else {
            self.pick_target(&attack, players, boss.level, rng)
                .into_iter()
                .collect()
        };

        if self.last_attack == Some(chosen) {
            self.consecutive_repeats += 1;
        } else {
            self.consecutive_repeats = 0;
        }
        self.last_attack = Some(chosen);
        for cd in self.cooldowns.iter_mut() {
            *cd = cd.saturating_sub(1);
        }
        self.cooldowns[chosen] = attack.cooldown;

        Some(BossDecision { attack, targets })
    }

    fn pick_target<R: Rng>(
        &self,
        attack: &BossAttack,
        players: &[CombatantView],
        level: u8,
        rng: &mut R,
    ) -> Option<String> {
        let mut scored: Vec<(&CombatantView, f64)> = players
            .iter()
            .map(|p| (p, self.target_score(attack, p) + rng.gen_range(0.0..TARGET_JITTER)))
            .collect();
        if scored.is_empty() {
            return None;
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        let window = selection_window(level).min(scored.len());
        let pick = rng.gen_range(0..window);
        Some(scored[pick].0.player_id.clone())
    }
}
