// Combat resolution: damage, knockouts, retreats, spectator transitions and cheer cards.

use chrono::Utc;

use super::action::{BossHit, RaidEvent};
use super::boss_ai::BossDecision;
use super::cheer::CheerCard;
use super::config::*;
use super::error::{RaidError, RaidResult};
use super::player::{CardSlot, PlayerStatus};
use super::raid::{RaidSession, SpectatorRecord};
use super::turn::Phase;

impl RaidSession {
    /// Resolve the current player's attack. Ends their turn unless the boss falls.
    pub(crate) fn resolve_attack(
        &mut self,
        idx: usize,
        attack_name: Option<&str>,
        damage: Option<u32>,
    ) -> RaidResult<Vec<RaidEvent>> {
        let player = &self.players[idx];
        if player.all_cards_ko() {
            // Cards were knocked out outside combat; the player drops out instead.
            let username = player.username.clone();
            self.transition_to_spectator(idx);
            self.check_defeat();
            return Ok(vec![RaidEvent::success(
                "playerAttack",
                format!("{username} has no cards left and becomes a spectator"),
                None,
            )]);
        }

        let auto_retreat = player.cards.active.is_ko();
        let card = if auto_retreat {
            &player.cards.bench
        } else {
            &player.cards.active
        };
        let (attack, base) = match (attack_name, damage) {
            (None, Some(amount)) => {
                let name = card.find_attack(None).map(|a| a.name.clone());
                (name.unwrap_or_else(|| "Attack".to_string()), amount)
            }
            (name, override_damage) => {
                let attack = card.find_attack(name).ok_or_else(|| {
                    RaidError::UnknownAttack(name.unwrap_or("<none>").to_string())
                })?;
                (attack.name.clone(), override_damage.unwrap_or(attack.damage))
            }
        };

        // Validated; apply.
        let player_id = player.id.clone();
        let username = player.username.clone();
        if auto_retreat {
            self.players[idx].swap_cards();
        }
        let card_name = self.players[idx].cards.active.name.clone();
        let amount = self.cheer.apply_to_player_attack(base);
        let dealt = self.boss.take_damage(amount);
        self.ai.record_player_damage(&player_id, dealt);

        let mut message = format!("{username}'s {card_name} used {attack} for {dealt} damage");
        if auto_retreat {
            message = format!("{card_name} stepped in. {message}");
        }
        tracing::info!(
            raid_id = %self.id,
            player_id = %player_id,
            damage = dealt,
            boss_hp = self.boss.current_hp,
            "Player attack resolved"
        );

        if self.boss.is_defeated() {
            self.conclude(Phase::Victory, format!("{} was defeated", self.boss.name));
        } else {
            let advance = self.turns.advance();
            self.on_advance(advance);
        }
        Ok(vec![RaidEvent::success("playerAttack", message, Some(dealt))])
    }

    /// Swap active and bench. Does not end the turn.
    pub(crate) fn resolve_retreat(&mut self, idx: usize) -> RaidResult<Vec<RaidEvent>> {
        let player = &self.players[idx];
        if player.cards.bench.is_ko() {
            return Err(RaidError::BenchUnavailable);
        }
        let message = format!(
            "{} retreated {} for {}",
            player.username, player.cards.active.name, player.cards.bench.name
        );
        self.players[idx].swap_cards();
        Ok(vec![RaidEvent::success("playerRetreat", message, None)])
    }

    /// Knock out one card. Returns false (and changes nothing) if it was already out.
    pub(crate) fn resolve_knockout(&mut self, idx: usize, slot: CardSlot) -> bool {
        let player = &mut self.players[idx];
        if !player.cards.get_mut(slot).knock_out() {
            return false;
        }
        player.ko_count += 1;
        self.total_kos += 1;
        crate::metrics::KNOCKOUTS_TOTAL.inc();
        tracing::info!(
            raid_id = %self.id,
            player_id = %player.id,
            total_kos = self.total_kos,
            "Card knocked out"
        );
        if self.players[idx].all_cards_ko() {
            self.transition_to_spectator(idx);
        }
        self.check_defeat();
        true
    }

    /// Move a player out of the fight. Calling it twice changes nothing.
    pub(crate) fn transition_to_spectator(&mut self, idx: usize) {
        let player = &mut self.players[idx];
        if player.is_spectator() {
            return;
        }
        player.status = PlayerStatus::Spectator;
        player.can_use_cheer = true;
        let record = SpectatorRecord {
            player_id: player.id.clone(),
            username: player.username.clone(),
            was_player: true,
            since: Utc::now(),
        };
        let player_id = record.player_id.clone();
        self.spectators.push(record);
        if let Some(advance) = self.turns.remove_player(&player_id) {
            self.on_advance(advance);
        }
        self.recompute_layout();
        tracing::info!(raid_id = %self.id, player_id = %player_id, "Player is now spectating");
    }

    /// Defeat once too many cards fell or nobody is left fighting.
    pub(crate) fn check_defeat(&mut self) {
        let phase = self.turns.phase();
        if !matches!(phase, Phase::Playing | Phase::BossTurn) {
            return;
        }
        if self.total_kos >= self.config.max_kos {
            self.conclude(
                Phase::Defeat,
                format!("{} cards were knocked out", self.total_kos),
            );
        } else if self.fighting_ids().is_empty() {
            self.conclude(Phase::Defeat, "All trainers were knocked out".to_string());
        }
    }

    /// Play a cheer card on behalf of a knocked-out player.
    pub(crate) fn apply_cheer(
        &mut self,
        idx: usize,
        card_number: u8,
        target: Option<&str>,
    ) -> RaidResult<Vec<RaidEvent>> {
        let card = CheerCard::from_number(card_number)?;
        if self.cheer_cards_used >= MAX_CHEER_CARDS {
            return Err(RaidError::CheerExhausted);
        }
        if !self.players[idx].can_use_cheer {
            return Err(RaidError::CheerUnavailable);
        }
        let heal_target = match card {
            CheerCard::FullHealOne => self.full_heal_target(target)?,
            _ => None,
        };

        // Validated; apply.
        match card {
            CheerCard::DoubleNextDamage => self.cheer.double_next_damage = true,
            CheerCard::HealAllActives => {
                for p in self.players.iter_mut().filter(|p| !p.is_spectator()) {
                    p.cards.active.heal(CHEER_HEAL_ALL_AMOUNT);
                }
            }
            CheerCard::FullHealOne => {
                if let Some(t) = heal_target {
                    let active = &mut self.players[t].cards.active;
                    active.heal(active.max_hp);
                }
            }
            CheerCard::LimitBossNextTurn => self.cheer.limit_boss_next_turn = true,
            CheerCard::FlatDamageBonus => self.cheer.flat_bonus_this_round = CHEER_FLAT_BONUS,
        }
        self.cheer_cards_used += 1;
        let player = &mut self.players[idx];
        player.can_use_cheer = false;
        let label = card.number().to_string();
        crate::metrics::CHEER_CARDS_TOTAL
            .with_label_values(&[label.as_str()])
            .inc();

        Ok(vec![RaidEvent::success(
            "cheerCard",
            format!(
                "{} played cheer card #{}: {}",
                player.username,
                card.number(),
                card.description()
            ),
            None,
        )])
    }

    /// Pick whose active card a full heal lands on: the named player, or the
    /// lowest HP fraction among living active cards.
    fn full_heal_target(&self, target: Option<&str>) -> RaidResult<Option<usize>> {
        match target {
            Some(id) => {
                let t = self.require_player(id)?;
                if !self.players[t].is_targetable() {
                    return Err(RaidError::CardKnockedOut);
                }
                Ok(Some(t))
            }
            None => Ok(self
                .players
                .iter()
                .enumerate()
                .filter(|(_, p)| p.is_targetable())
                .min_by(|a, b| {
                    a.1.cards
                        .active
                        .hp_fraction()
                        .total_cmp(&b.1.cards.active.hp_fraction())
                })
                .map(|(i, _)| i)),
        }
    }

    /// Carry out the boss's decision against whoever is still standing.
    pub(crate) fn execute_boss_attack(&mut self, decision: BossDecision, limited: bool) -> RaidEvent {
        let attack = decision.attack;
        let mut healed = 0;
        let mut hits = Vec::new();

        if attack.is_heal() {
            if !limited {
                healed = self.boss.heal(attack.damage);
            }
        } else {
            let damage = if limited {
                attack.damage.min(CHEER_BOSS_HIT_CAP)
            } else {
                attack.damage
            };
            for target in &decision.targets {
                if self.turns.phase().is_terminal() {
                    break;
                }
                let Some(idx) = self.player_index(target) else {
                    continue;
                };
                let player = &mut self.players[idx];
                if !player.is_targetable() {
                    continue;
                }
                let card = player.cards.active.name.clone();
                let username = player.username.clone();
                let knocked_out = damage >= player.cards.active.current_hp;
                if knocked_out {
                    self.resolve_knockout(idx, CardSlot::Active);
                } else {
                    player.cards.active.take_damage(damage);
                }
                hits.push(BossHit {
                    player_id: target.clone(),
                    username,
                    card,
                    damage,
                    knocked_out,
                });
            }
        }

        tracing::info!(
            raid_id = %self.id,
            attack = %attack.name,
            targets = hits.len(),
            healed,
            limited,
            "Boss attack resolved"
        );
        RaidEvent::BossActionCompleted {
            attack: attack.name,
            targets: hits,
            healed,
            limited,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::action::RaidAction;
    use crate::engine::player::PlayerData;
    use crate::engine::raid::{RaidConfig, RaidSettings};

    fn raid(players: usize) -> RaidSession {
        let settings = RaidSettings {
            boss_turn_delay: Duration::ZERO,
            turn_timeout: None,
            debug_default: true,
        };
        let config = RaidConfig {
            min_players: players,
            seed: Some(42),
            ..Default::default()
        };
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config, PlayerData::default(), &settings).unwrap();
        for i in 2..=players {
            raid.apply(
                &format!("p{i}"),
                RaidAction::JoinRaid {
                    player_data: PlayerData::default(),
                },
            )
            .unwrap();
        }
        raid
    }

    #[test]
    fn test_attack_uses_named_attack() {
        let mut raid = raid(2);
        let events = raid
            .apply(
                "p1",
                RaidAction::PlayerAttack {
                    attack_name: Some("quick attack".into()),
                    damage: None,
                },
            )
            .unwrap();
        assert_eq!(raid.boss().current_hp, 980);
        assert!(matches!(
            &events[0],
            RaidEvent::ActionResult(r) if r.success && r.damage == Some(20)
        ));
        assert_eq!(raid.current_turn_player(), Some("p2"));
    }

    #[test]
    fn test_unknown_attack_rejected() {
        let mut raid = raid(1);
        let err = raid
            .apply(
                "p1",
                RaidAction::PlayerAttack {
                    attack_name: Some("Hyper Beam".into()),
                    damage: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, RaidError::UnknownAttack("Hyper Beam".into()));
        assert_eq!(raid.boss().current_hp, 1000);
    }

    #[test]
    fn test_retreat_keeps_turn() {
        let mut raid = raid(2);
        raid.apply("p1", RaidAction::PlayerRetreat).unwrap();
        let p1 = raid.player("p1").unwrap();
        assert_eq!(p1.cards.active.name, "Eevee");
        assert_eq!(raid.current_turn_player(), Some("p1"));

        assert_eq!(
            raid.apply("p2", RaidAction::PlayerRetreat).unwrap_err(),
            RaidError::NotYourTurn
        );
    }

    #[test]
    fn test_retreat_needs_living_bench() {
        let mut raid = raid(1);
        raid.apply("p1", RaidAction::TestKo { card_slot: CardSlot::Bench })
            .unwrap();
        assert_eq!(
            raid.apply("p1", RaidAction::PlayerRetreat).unwrap_err(),
            RaidError::BenchUnavailable
        );
    }

    #[test]
    fn test_knockout_twice_is_noop() {
        let mut raid = raid(1);
        assert!(raid.resolve_knockout(0, CardSlot::Active));
        assert!(!raid.resolve_knockout(0, CardSlot::Active));
        assert_eq!(raid.total_kos(), 1);
        assert_eq!(raid.players()[0].ko_count, 1);
    }

    #[test]
    fn test_spectator_transition_idempotent() {
        let mut raid = raid(3);
        raid.resolve_knockout(1, CardSlot::Active);
        raid.resolve_knockout(1, CardSlot::Bench);
        raid.transition_to_spectator(1);
        assert_eq!(raid.spectators().len(), 1);
        assert!(raid.players()[1].can_use_cheer);
        assert!(!raid.turn_order().contains(&"p2".to_string()));
        assert_eq!(raid.positions().players.len(), 2);
    }

    #[test]
    fn test_cheer_requires_eligibility() {
        let mut raid = raid(2);
        let err = raid
            .apply(
                "p1",
                RaidAction::CheerCard {
                    card_number: 1,
                    target_player_id: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, RaidError::CheerUnavailable);

        let err = raid
            .apply(
                "p1",
                RaidAction::CheerCard {
                    card_number: 9,
                    target_player_id: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, RaidError::InvalidCheerCard(9));
    }

    #[test]
    fn test_double_damage_cheer() {
        let mut raid = raid(3);
        raid.resolve_knockout(2, CardSlot::Active);
        raid.resolve_knockout(2, CardSlot::Bench);
        raid.apply(
            "p3",
            RaidAction::CheerCard {
                card_number: 1,
                target_player_id: None,
            },
        )
        .unwrap();
        // One card per eligibility window
        assert_eq!(
            raid.apply(
                "p3",
                RaidAction::CheerCard {
                    card_number: 5,
                    target_player_id: None,
                },
            )
            .unwrap_err(),
            RaidError::CheerUnavailable
        );

        raid.apply(
            "p1",
            RaidAction::PlayerAttack {
                attack_name: None,
                damage: Some(60),
            },
        )
        .unwrap();
        assert_eq!(raid.boss().current_hp, 880);
        assert_eq!(raid.cheer_cards_used(), 1);
    }

    #[test]
    fn test_full_heal_lowest_active() {
        let mut raid = raid(3);
        raid.players[0].cards.active.take_damage(100);
        raid.players[1].cards.active.take_damage(10);
        raid.resolve_knockout(2, CardSlot::Active);
        raid.resolve_knockout(2, CardSlot::Bench);
        raid.apply(
            "p3",
            RaidAction::CheerCard {
                card_number: 3,
                target_player_id: None,
            },
        )
        .unwrap();
        let p1 = &raid.players()[0].cards.active;
        assert_eq!(p1.current_hp, p1.max_hp);
        let p2 = &raid.players()[1].cards.active;
        assert!(p2.current_hp < p2.max_hp);
    }

    #[test]
    fn test_cheer_exhausted_after_three() {
        let mut raid = raid(4);
        raid.cheer_cards_used = MAX_CHEER_CARDS;
        raid.players[3].can_use_cheer = true;
        let err = raid
            .apply(
                "p4",
                RaidAction::CheerCard {
                    card_number: 2,
                    target_player_id: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, RaidError::CheerExhausted);
    }

    #[test]
    fn test_limited_boss_turn_caps_hits() {
        let mut raid = raid(1);
        raid.players[0].can_use_cheer = true;
        raid.apply(
            "p1",
            RaidAction::CheerCard {
                card_number: 4,
                target_player_id: None,
            },
        )
        .unwrap();
        raid.apply(
            "p1",
            RaidAction::PlayerAttack {
                attack_name: None,
                damage: Some(10),
            },
        )
        .unwrap();
        let events = raid.run_pending_boss_turn();
        let completed = events
            .iter()
            .find_map(|e| match e {
                RaidEvent::BossActionCompleted {
                    targets,
                    healed,
                    limited,
                    ..
                } => Some((targets.clone(), *healed, *limited)),
                _ => None,
            })
            .unwrap();
        assert!(completed.2);
        assert_eq!(completed.1, 0);
        assert!(completed.0.iter().all(|hit| hit.damage <= CHEER_BOSS_HIT_CAP));
        let active = &raid.players()[0].cards.active;
        assert!(active.current_hp >= active.max_hp - CHEER_BOSS_HIT_CAP);
    }
}
