// Raid session: one raid's players, boss and turn state behind a single action entry point.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::action::{RaidAction, RaidEvent, RaidOutcome};
use super::boss::{Boss, BossTemplate};
use super::boss_ai::{BossAi, BossAiState, BossDecision, CombatantView};
use super::card::CardStatus;
use super::cheer::CheerModifiers;
use super::config::*;
use super::error::{RaidError, RaidResult};
use super::geometry::{compute_layout, Layout, LayoutPositions};
use super::player::{CardSlot, Player, PlayerData, PlayerStatus};
use super::turn::{Advance, Phase, ScheduledTask, TaskKind, TurnManager};

/// Raid rule sets. Only the official rules exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RaidKind {
    #[default]
    Official,
}

/// Per-raid settings supplied by the creator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RaidConfig {
    pub max_players: usize,
    pub min_players: usize,
    pub layout: Layout,
    #[serde(rename = "maxKOs")]
    pub max_kos: u32,
    /// Overrides the server-wide boss turn delay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boss_turn_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_timeout_secs: Option<u64>,
    /// Fixed RNG seed for the boss AI. Entropy when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boss: Option<BossTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_mode: Option<bool>,
    pub kind: RaidKind,
}

impl Default for RaidConfig {
    fn default() -> Self {
        RaidConfig {
            max_players: DEFAULT_MAX_PLAYERS,
            min_players: DEFAULT_MIN_PLAYERS,
            layout: Layout::Versus,
            max_kos: DEFAULT_MAX_KOS,
            boss_turn_delay_ms: None,
            turn_timeout_secs: None,
            seed: None,
            boss: None,
            debug_mode: None,
            kind: RaidKind::Official,
        }
    }
}

impl RaidConfig {
    /// Clamp nonsensical values: at least one player to start, room for the minimum.
    fn normalized(mut self) -> Self {
        self.min_players = self.min_players.max(1);
        self.max_players = self.max_players.max(self.min_players);
        self.max_kos = self.max_kos.max(1);
        self
    }
}

/// Server-wide defaults a raid falls back on.
#[derive(Debug, Clone)]
pub struct RaidSettings {
    pub boss_turn_delay: Duration,
    pub turn_timeout: Option<Duration>,
    pub debug_default: bool,
}

impl Default for RaidSettings {
    fn default() -> Self {
        RaidSettings {
            boss_turn_delay: Duration::from_millis(DEFAULT_BOSS_TURN_DELAY_MS),
            turn_timeout: None,
            debug_default: false,
        }
    }
}

/// Someone watching instead of fighting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectatorRecord {
    pub player_id: String,
    pub username: String,
    /// True for knocked-out players, false for viewers who joined to watch.
    pub was_player: bool,
    pub since: DateTime<Utc>,
}

/// Everything a client needs to render the raid.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidSnapshot {
    pub id: String,
    pub kind: RaidKind,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub phase: Phase,
    pub round: u32,
    pub debug_mode: bool,
    pub config: RaidConfig,
    pub players: Vec<Player>,
    pub boss: Boss,
    pub boss_ai: BossAiState,
    pub turn_order: Vec<String>,
    pub current_turn_player_id: Option<String>,
    pub turn_indicator: String,
    #[serde(rename = "totalKOs")]
    pub total_kos: u32,
    #[serde(rename = "maxKOs")]
    pub max_kos: u32,
    pub cheer_cards_used: u32,
    pub cheer: CheerModifiers,
    pub spectators: Vec<SpectatorRecord>,
    pub positions: LayoutPositions,
}

/// Short listing entry for the lobby browser.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaidSummary {
    pub id: String,
    pub phase: Phase,
    pub players: usize,
    pub max_players: usize,
    pub round: u32,
    pub boss_name: String,
    #[serde(rename = "bossHP")]
    pub boss_hp: u32,
    #[serde(rename = "bossMaxHP")]
    pub boss_max_hp: u32,
    pub created_at: DateTime<Utc>,
}

/// Boss attack chosen on entry to the boss turn, executed when its task fires.
#[derive(Debug, Clone)]
pub(crate) struct PendingBossTurn {
    pub(crate) token: u64,
    pub(crate) decision: Option<BossDecision>,
    pub(crate) limited: bool,
}

/// A single raid. Not thread-safe on its own; the registry serializes access.
pub struct RaidSession {
    pub(crate) id: String,
    pub(crate) config: RaidConfig,
    pub(crate) creator_id: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) debug_mode: bool,
    pub(crate) players: Vec<Player>,
    pub(crate) boss: Boss,
    pub(crate) turns: TurnManager,
    pub(crate) total_kos: u32,
    pub(crate) departed_kos: u32,
    pub(crate) cheer_cards_used: u32,
    pub(crate) cheer: CheerModifiers,
    pub(crate) spectators: Vec<SpectatorRecord>,
    pub(crate) positions: LayoutPositions,
    pub(crate) ai: BossAi,
    pub(crate) pending_boss: Option<PendingBossTurn>,
    pub(crate) rng: StdRng,
    pub(crate) join_counter: usize,
    pub(crate) end_reason: Option<String>,
    pub(crate) closed: bool,
}

impl RaidSession {
    /// Create a raid in the lobby and seat its creator.
    pub fn create(
        id: &str,
        creator_id: &str,
        config: RaidConfig,
        creator: PlayerData,
        settings: &RaidSettings,
    ) -> RaidResult<(Self, Vec<RaidEvent>)> {
        let config = config.normalized();
        let boss_delay = config
            .boss_turn_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(settings.boss_turn_delay);
        let turn_timeout = config
            .turn_timeout_secs
            .map(Duration::from_secs)
            .or(settings.turn_timeout);
        let template = config.boss.clone().unwrap_or_default();
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut session = RaidSession {
            id: id.to_string(),
            creator_id: creator_id.to_string(),
            created_at: Utc::now(),
            debug_mode: config.debug_mode.unwrap_or(settings.debug_default),
            players: Vec::new(),
            boss: Boss::from_template(&template),
            turns: TurnManager::new(boss_delay, turn_timeout),
            total_kos: 0,
            departed_kos: 0,
            cheer_cards_used: 0,
            cheer: CheerModifiers::default(),
            spectators: Vec::new(),
            positions: compute_layout(&[], config.layout),
            ai: BossAi::new(),
            pending_boss: None,
            rng,
            join_counter: 0,
            end_reason: None,
            closed: false,
            config,
        };

        let mut events = vec![RaidEvent::RaidCreated {
            raid_id: session.id.clone(),
            creator_id: session.creator_id.clone(),
            config: session.config.clone(),
        }];
        events.extend(session.join(creator_id, creator)?);
        events.push(session.state_update());
        Ok((session, events))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.turns.phase()
    }

    pub fn boss(&self) -> &Boss {
        &self.boss
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn turn_order(&self) -> &[String] {
        self.turns.turn_order()
    }

    pub fn current_turn_player(&self) -> Option<&str> {
        self.turns.current_player()
    }

    pub fn total_kos(&self) -> u32 {
        self.total_kos
    }

    pub fn departed_kos(&self) -> u32 {
        self.departed_kos
    }

    pub fn spectators(&self) -> &[SpectatorRecord] {
        &self.spectators
    }

    pub fn positions(&self) -> &LayoutPositions {
        &self.positions
    }

    pub fn cheer_cards_used(&self) -> u32 {
        self.cheer_cards_used
    }

    pub fn is_debug(&self) -> bool {
        self.debug_mode
    }

    /// No one left, not even viewers.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Ended by its creator; the registry drops it.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn player_index(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    pub(crate) fn require_player(&self, id: &str) -> RaidResult<usize> {
        self.player_index(id)
            .ok_or_else(|| RaidError::PlayerNotFound(id.to_string()))
    }

    /// Players still fighting, in join order.
    pub(crate) fn fighting_ids(&self) -> Vec<String> {
        self.players
            .iter()
            .filter(|p| !p.is_spectator())
            .map(|p| p.id.clone())
            .collect()
    }

    pub(crate) fn combatant_views(&self) -> Vec<CombatantView> {
        self.players
            .iter()
            .filter(|p| p.is_targetable())
            .map(|p| CombatantView {
                player_id: p.id.clone(),
                active_hp: p.cards.active.current_hp,
                active_max_hp: p.cards.active.max_hp,
            })
            .collect()
    }

    pub(crate) fn recompute_layout(&mut self) {
        self.positions = compute_layout(&self.fighting_ids(), self.config.layout);
    }

    fn require_phase(&self, allowed: &[Phase]) -> RaidResult<()> {
        let phase = self.turns.phase();
        if allowed.contains(&phase) {
            Ok(())
        } else {
            Err(RaidError::InvalidPhase(phase.to_string()))
        }
    }

    /// Apply an action, returning the events it produced. A rejected action
    /// leaves the session untouched.
    pub fn apply(&mut self, actor: &str, action: RaidAction) -> RaidResult<Vec<RaidEvent>> {
        let before = self.turns.phase();
        let mut events = match action {
            RaidAction::CreateRaid { .. } => {
                return Err(RaidError::InvalidPhase(before.to_string()))
            }
            RaidAction::JoinRaid { player_data } => self.join(actor, player_data)?,
            RaidAction::LeaveRaid => self.leave(actor)?,
            RaidAction::PlayerAttack {
                attack_name,
                damage,
            } => self.player_attack(actor, attack_name.as_deref(), damage)?,
            RaidAction::PlayerRetreat => self.player_retreat(actor)?,
            RaidAction::CheerCard {
                card_number,
                target_player_id,
            } => self.play_cheer(actor, card_number, target_player_id.as_deref())?,
            RaidAction::TestKo { card_slot } => self.test_ko(actor, card_slot)?,
            RaidAction::SwitchLayout { layout } => self.switch_layout(actor, layout)?,
            RaidAction::ToggleDebugMode => self.toggle_debug(actor)?,
            RaidAction::EndRaid => return self.end_raid(actor),
            debug => self.apply_debug(actor, debug)?,
        };
        self.finish(before, &mut events);
        Ok(events)
    }

    /// Like `apply`, but a rejection becomes a failed `actionResult`.
    pub fn handle(&mut self, actor: &str, action: RaidAction) -> Vec<RaidEvent> {
        let kind = action.kind();
        match self.apply(actor, action) {
            Ok(events) => events,
            Err(e) => vec![RaidEvent::rejected(kind, &e)],
        }
    }

    /// Run a task previously handed out by `take_scheduled`. Stale tokens do nothing.
    pub fn fire(&mut self, task: ScheduledTask) -> Vec<RaidEvent> {
        match task.kind {
            TaskKind::BossTurn => self.run_boss_turn(task.token),
            TaskKind::TurnTimeout => self.run_turn_timeout(task.token),
        }
    }

    /// Execute the pending boss turn right away, ignoring its delay.
    pub fn run_pending_boss_turn(&mut self) -> Vec<RaidEvent> {
        match self.turns.pending_boss_token() {
            Some(token) => self.run_boss_turn(token),
            None => Vec::new(),
        }
    }

    /// Tasks the host must schedule since the last call.
    pub fn take_scheduled(&mut self) -> Vec<ScheduledTask> {
        self.turns.take_scheduled()
    }

    /// Append the raid-ended notice when the phase just turned terminal, then
    /// a fresh snapshot.
    fn finish(&mut self, before: Phase, events: &mut Vec<RaidEvent>) {
        let after = self.turns.phase();
        if after.is_terminal() && !before.is_terminal() {
            let outcome = if after == Phase::Victory {
                RaidOutcome::Victory
            } else {
                RaidOutcome::Defeat
            };
            crate::metrics::RAIDS_ENDED_TOTAL
                .with_label_values(&[outcome_label(outcome)])
                .inc();
            tracing::info!(raid_id = %self.id, round = self.turns.round(), "Raid ended: {after}");
            events.push(RaidEvent::RaidEnded {
                outcome,
                reason: self.end_reason.clone().unwrap_or_default(),
            });
        }
        events.push(self.state_update());
    }

    fn state_update(&self) -> RaidEvent {
        RaidEvent::GameStateUpdate {
            snapshot: Box::new(self.snapshot()),
        }
    }

    /// React to the turn manager moving on. Entering the boss turn settles the
    /// boss's choice immediately.
    pub(crate) fn on_advance(&mut self, advance: Advance) {
        if advance == Advance::BossTurn {
            self.prepare_boss_turn();
        }
    }

    fn prepare_boss_turn(&mut self) {
        let Some(token) = self.turns.pending_boss_token() else {
            return;
        };
        self.cheer.end_player_round();
        let limited = self.cheer.take_boss_limit();
        let views = self.combatant_views();
        let decision = self.ai.decide(&self.boss, &views, !limited, &mut self.rng);
        self.pending_boss = Some(PendingBossTurn {
            token,
            decision,
            limited,
        });
    }

    /// Start the first round once enough fighters are seated.
    fn maybe_start(&mut self) {
        if self.turns.phase() != Phase::Lobby {
            return;
        }
        let fighters = self.fighting_ids();
        if fighters.len() >= self.config.min_players {
            tracing::info!(raid_id = %self.id, players = fighters.len(), "Raid started");
            self.turns.start(fighters);
        }
    }

    /// Move to a terminal phase and drop anything still scheduled.
    pub(crate) fn conclude(&mut self, outcome: Phase, reason: String) {
        if self.turns.phase().is_terminal() {
            return;
        }
        self.turns.end(outcome);
        self.pending_boss = None;
        self.end_reason = Some(reason);
    }

    // ── Roster ───────────────────────────────────────────────────────

    fn join(&mut self, actor: &str, data: PlayerData) -> RaidResult<Vec<RaidEvent>> {
        if self.player_index(actor).is_some() {
            return Err(RaidError::AlreadyJoined(actor.to_string()));
        }
        let phase = self.turns.phase();
        if phase.is_terminal() {
            return Err(RaidError::InvalidPhase(phase.to_string()));
        }
        let viewer = data.as_spectator;
        if !viewer && self.fighting_ids().len() >= self.config.max_players {
            return Err(RaidError::RaidFull(self.config.max_players));
        }

        let mut player = Player::new(actor, data, self.join_counter);
        self.join_counter += 1;
        if viewer {
            player.status = PlayerStatus::Spectator;
            self.spectators.push(SpectatorRecord {
                player_id: player.id.clone(),
                username: player.username.clone(),
                was_player: false,
                since: Utc::now(),
            });
        }
        let username = player.username.clone();
        self.players.push(player);

        if !viewer {
            if phase == Phase::Playing {
                self.turns.append_player(actor);
            }
            self.recompute_layout();
            self.maybe_start();
        }

        tracing::info!(raid_id = %self.id, player_id = actor, viewer, "Player joined");
        Ok(vec![
            RaidEvent::success("joinRaid", format!("{username} joined the raid"), None),
            RaidEvent::PlayerJoined {
                player_id: actor.to_string(),
                username,
                as_spectator: viewer,
            },
        ])
    }

    fn leave(&mut self, actor: &str) -> RaidResult<Vec<RaidEvent>> {
        let idx = self.require_player(actor)?;
        let player = self.players.remove(idx);
        self.departed_kos += player.ko_count;
        self.spectators.retain(|s| s.player_id != actor);
        self.ai.forget_player(actor);
        if let Some(advance) = self.turns.remove_player(actor) {
            self.on_advance(advance);
        }
        self.recompute_layout();

        let phase = self.turns.phase();
        if matches!(phase, Phase::Playing | Phase::BossTurn)
            && !self.players.is_empty()
            && self.fighting_ids().is_empty()
        {
            self.conclude(Phase::Defeat, "No trainers left in the fight".to_string());
        }

        tracing::info!(raid_id = %self.id, player_id = actor, "Player left");
        Ok(vec![
            RaidEvent::success("leaveRaid", format!("{} left the raid", player.username), None),
            RaidEvent::PlayerLeft {
                player_id: actor.to_string(),
                username: player.username,
            },
        ])
    }

    fn switch_layout(&mut self, actor: &str, layout: Layout) -> RaidResult<Vec<RaidEvent>> {
        self.require_phase(&[Phase::Lobby])?;
        self.require_player(actor)?;
        self.config.layout = layout;
        self.recompute_layout();
        Ok(vec![RaidEvent::success(
            "switchLayout",
            format!("Layout switched to {layout}"),
            None,
        )])
    }

    // ── Turn actions ─────────────────────────────────────────────────

    /// Shared gate for actions that need the actor to hold the turn.
    fn require_turn(&self, actor: &str) -> RaidResult<usize> {
        self.require_phase(&[Phase::Playing])?;
        let idx = self.require_player(actor)?;
        if !self.turns.is_turn_of(actor) {
            return Err(RaidError::NotYourTurn);
        }
        Ok(idx)
    }

    fn player_attack(
        &mut self,
        actor: &str,
        attack_name: Option<&str>,
        damage: Option<u32>,
    ) -> RaidResult<Vec<RaidEvent>> {
        let idx = self.require_turn(actor)?;
        self.resolve_attack(idx, attack_name, damage)
    }

    fn player_retreat(&mut self, actor: &str) -> RaidResult<Vec<RaidEvent>> {
        let idx = self.require_turn(actor)?;
        self.resolve_retreat(idx)
    }

    fn play_cheer(
        &mut self,
        actor: &str,
        card_number: u8,
        target: Option<&str>,
    ) -> RaidResult<Vec<RaidEvent>> {
        self.require_phase(&[Phase::Playing])?;
        let idx = self.require_player(actor)?;
        self.apply_cheer(idx, card_number, target)
    }

    fn test_ko(&mut self, actor: &str, slot: CardSlot) -> RaidResult<Vec<RaidEvent>> {
        let phase = self.turns.phase();
        self.require_phase(&[Phase::Playing, Phase::BossTurn])?;
        let idx = self.require_player(actor)?;
        let player = &self.players[idx];
        if player.is_spectator() {
            return Err(RaidError::InvalidPhase(phase.to_string()));
        }
        if player.cards.get(slot).is_ko() {
            return Err(RaidError::CardKnockedOut);
        }
        let card = player.cards.get(slot).name.clone();
        self.resolve_knockout(idx, slot);
        Ok(vec![RaidEvent::success(
            "testKO",
            format!("{card} was knocked out"),
            None,
        )])
    }

    fn run_turn_timeout(&mut self, token: u64) -> Vec<RaidEvent> {
        let before = self.turns.phase();
        let Some(player_id) = self.turns.current_player().map(str::to_string) else {
            return Vec::new();
        };
        if !self.turns.claim_timeout(token) {
            return Vec::new();
        }
        tracing::info!(raid_id = %self.id, player_id = %player_id, "Turn timed out");
        let player = self
            .player(&player_id)
            .map(|p| p.username.clone())
            .unwrap_or(player_id);
        let advance = self.turns.advance();
        self.on_advance(advance);
        let mut events = vec![RaidEvent::success(
            "turnTimeout",
            format!("{player}'s turn timed out"),
            None,
        )];
        self.finish(before, &mut events);
        events
    }

    // ── Creator and debug controls ───────────────────────────────────

    fn toggle_debug(&mut self, actor: &str) -> RaidResult<Vec<RaidEvent>> {
        if actor != self.creator_id {
            return Err(RaidError::NotRaidCreator);
        }
        self.debug_mode = !self.debug_mode;
        let state = if self.debug_mode { "enabled" } else { "disabled" };
        Ok(vec![RaidEvent::success(
            "toggleDebugMode",
            format!("Debug mode {state}"),
            None,
        )])
    }

    fn end_raid(&mut self, actor: &str) -> RaidResult<Vec<RaidEvent>> {
        if actor != self.creator_id {
            return Err(RaidError::NotRaidCreator);
        }
        self.turns.cancel_pending();
        self.pending_boss = None;
        self.closed = true;
        crate::metrics::RAIDS_ENDED_TOTAL
            .with_label_values(&[outcome_label(RaidOutcome::Abandoned)])
            .inc();
        tracing::info!(raid_id = %self.id, "Raid closed by its creator");
        Ok(vec![
            RaidEvent::success("endRaid", "Raid closed", None),
            RaidEvent::RaidEnded {
                outcome: RaidOutcome::Abandoned,
                reason: "Closed by the raid creator".to_string(),
            },
        ])
    }

    fn apply_debug(&mut self, actor: &str, action: RaidAction) -> RaidResult<Vec<RaidEvent>> {
        if !self.debug_mode {
            return Err(RaidError::DebugDisabled);
        }
        let kind = action.kind();
        let message = match action {
            RaidAction::DebugSetHp {
                player_id,
                card_slot,
                hp,
            } => self.debug_set_hp(player_id.as_deref(), card_slot, hp)?,
            RaidAction::DebugKillPlayer { player_id } => {
                self.debug_kill(player_id.as_deref().unwrap_or(actor))?
            }
            RaidAction::DebugResurrectPlayer { player_id } => {
                self.debug_resurrect(player_id.as_deref().unwrap_or(actor))?
            }
            RaidAction::DebugSkipTurn => {
                self.require_phase(&[Phase::Playing])?;
                let advance = self.turns.advance();
                self.on_advance(advance);
                "Turn skipped".to_string()
            }
            RaidAction::DebugForceBossTurn => {
                self.require_phase(&[Phase::Playing])?;
                self.turns.enter_boss_turn();
                self.prepare_boss_turn();
                "Boss turn forced".to_string()
            }
            RaidAction::DebugResetRaid => {
                self.reset();
                "Raid reset".to_string()
            }
            other => return Err(RaidError::UnknownActionType(other.kind().to_string())),
        };
        tracing::info!(raid_id = %self.id, player_id = actor, action = kind, "Debug action applied");
        Ok(vec![RaidEvent::success(kind, message, None)])
    }

    fn debug_set_hp(
        &mut self,
        player_id: Option<&str>,
        slot: Option<CardSlot>,
        hp: u32,
    ) -> RaidResult<String> {
        let phase = self.turns.phase();
        if phase.is_terminal() {
            return Err(RaidError::InvalidPhase(phase.to_string()));
        }
        let Some(player_id) = player_id else {
            self.boss.set_hp(hp);
            if self.boss.is_defeated() && phase != Phase::Lobby {
                self.conclude(Phase::Victory, format!("{} was defeated", self.boss.name));
            }
            return Ok(format!("{} HP set to {}", self.boss.name, self.boss.current_hp));
        };

        let idx = self.require_player(player_id)?;
        let slot = slot.unwrap_or(CardSlot::Active);
        if self.players[idx].is_spectator() {
            return Err(RaidError::CardKnockedOut);
        }
        if hp == 0 {
            self.resolve_knockout(idx, slot);
        } else {
            let living = match slot {
                CardSlot::Active => CardStatus::Active,
                CardSlot::Bench => CardStatus::Benched,
            };
            self.players[idx].cards.get_mut(slot).set_hp(hp, living);
        }
        let card = self.players[idx].cards.get(slot);
        Ok(format!("{} HP set to {}", card.name, card.current_hp))
    }

    fn debug_kill(&mut self, player_id: &str) -> RaidResult<String> {
        self.require_phase(&[Phase::Playing, Phase::BossTurn])?;
        let idx = self.require_player(player_id)?;
        if self.players[idx].is_spectator() {
            return Err(RaidError::CardKnockedOut);
        }
        self.resolve_knockout(idx, CardSlot::Active);
        self.resolve_knockout(idx, CardSlot::Bench);
        Ok(format!("{} was knocked out", self.players[idx].username))
    }

    fn debug_resurrect(&mut self, player_id: &str) -> RaidResult<String> {
        let phase = self.turns.phase();
        if phase.is_terminal() {
            return Err(RaidError::InvalidPhase(phase.to_string()));
        }
        let idx = self.require_player(player_id)?;
        self.players[idx].resurrect();
        self.spectators.retain(|s| s.player_id != player_id);
        if phase == Phase::Playing {
            self.turns.append_player(player_id);
        }
        self.recompute_layout();
        self.maybe_start();
        Ok(format!("{} is back in the fight", self.players[idx].username))
    }

    /// Back to a fresh lobby with the same roster. Viewers stay viewers.
    fn reset(&mut self) {
        let template = self.config.boss.clone().unwrap_or_default();
        self.boss = Boss::from_template(&template);
        self.spectators.retain(|s| !s.was_player);
        for player in self.players.iter_mut() {
            if player.is_spectator() && self.spectators.iter().any(|s| s.player_id == player.id) {
                continue;
            }
            player.resurrect();
            player.ko_count = 0;
        }
        self.total_kos = 0;
        self.departed_kos = 0;
        self.cheer_cards_used = 0;
        self.cheer = CheerModifiers::default();
        self.ai.reset();
        self.pending_boss = None;
        self.end_reason = None;
        self.turns.reset();
        self.recompute_layout();
        self.maybe_start();
    }

    // ── Boss turn ────────────────────────────────────────────────────

    fn run_boss_turn(&mut self, token: u64) -> Vec<RaidEvent> {
        if !self.turns.claim_boss_turn(token) {
            return Vec::new();
        }
        let before = Phase::BossTurn;
        let mut events = Vec::new();
        let pending = self.pending_boss.take().filter(|p| p.token == token);
        if let Some(PendingBossTurn {
            decision: Some(decision),
            limited,
            ..
        }) = pending
        {
            events.push(self.execute_boss_attack(decision, limited));
        }
        crate::metrics::BOSS_TURNS_TOTAL.inc();

        if !self.turns.phase().is_terminal() {
            let advance = self.turns.finish_boss_turn(self.fighting_ids());
            self.on_advance(advance);
        }
        self.finish(before, &mut events);
        events
    }

    /// Snapshot re-derived from current state.
    pub fn snapshot(&self) -> RaidSnapshot {
        RaidSnapshot {
            id: self.id.clone(),
            kind: self.config.kind,
            creator_id: self.creator_id.clone(),
            created_at: self.created_at,
            phase: self.turns.phase(),
            round: self.turns.round(),
            debug_mode: self.debug_mode,
            config: self.config.clone(),
            players: self.players.clone(),
            boss: self.boss.clone(),
            boss_ai: self.ai.state(&self.boss),
            turn_order: self.turns.turn_order().to_vec(),
            current_turn_player_id: self.turns.current_player().map(str::to_string),
            turn_indicator: self.turn_indicator(),
            total_kos: self.total_kos,
            max_kos: self.config.max_kos,
            cheer_cards_used: self.cheer_cards_used,
            cheer: self.cheer.clone(),
            spectators: self.spectators.clone(),
            positions: self.positions.clone(),
        }
    }

    pub fn summary(&self) -> RaidSummary {
        RaidSummary {
            id: self.id.clone(),
            phase: self.turns.phase(),
            players: self.fighting_ids().len(),
            max_players: self.config.max_players,
            round: self.turns.round(),
            boss_name: self.boss.name.clone(),
            boss_hp: self.boss.current_hp,
            boss_max_hp: self.boss.max_hp,
            created_at: self.created_at,
        }
    }

    fn turn_indicator(&self) -> String {
        match self.turns.phase() {
            Phase::Lobby => "Waiting for trainers".to_string(),
            Phase::Playing => match self.turns.current_player().and_then(|id| self.player(id)) {
                Some(p) => format!("{}'s turn", p.username),
                None => "Waiting".to_string(),
            },
            Phase::BossTurn => format!("{} is attacking", self.boss.name),
            Phase::Victory => "Victory!".to_string(),
            Phase::Defeat => "Defeat".to_string(),
        }
    }
}

pub(crate) fn outcome_label(outcome: RaidOutcome) -> &'static str {
    match outcome {
        RaidOutcome::Victory => "victory",
        RaidOutcome::Defeat => "defeat",
        RaidOutcome::Abandoned => "abandoned",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RaidSettings {
        RaidSettings {
            boss_turn_delay: Duration::ZERO,
            turn_timeout: None,
            debug_default: true,
        }
    }

    fn config(min_players: usize) -> RaidConfig {
        RaidConfig {
            min_players,
            seed: Some(7),
            ..Default::default()
        }
    }

    fn named(name: &str) -> PlayerData {
        PlayerData {
            username: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_seats_creator_and_starts_solo_raid() {
        let (raid, events) =
            RaidSession::create("r1", "p1", config(1), named("Ash"), &settings()).unwrap();
        assert_eq!(events[0].kind(), "raidCreated");
        assert!(events.iter().any(|e| e.kind() == "playerJoined"));
        assert_eq!(events.last().unwrap().kind(), "gameStateUpdate");
        assert_eq!(raid.phase(), Phase::Playing);
        assert_eq!(raid.current_turn_player(), Some("p1"));
    }

    #[test]
    fn test_lobby_waits_for_min_players() {
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config(2), named("Ash"), &settings()).unwrap();
        assert_eq!(raid.phase(), Phase::Lobby);
        raid.apply("p2", RaidAction::JoinRaid { player_data: named("Misty") })
            .unwrap();
        assert_eq!(raid.phase(), Phase::Playing);
        assert_eq!(raid.turn_order(), &["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn test_duplicate_join_rejected() {
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config(2), named("Ash"), &settings()).unwrap();
        let err = raid
            .apply("p1", RaidAction::JoinRaid { player_data: named("Ash") })
            .unwrap_err();
        assert_eq!(err, RaidError::AlreadyJoined("p1".into()));
    }

    #[test]
    fn test_raid_full() {
        let cfg = RaidConfig {
            max_players: 2,
            ..config(2)
        };
        let (mut raid, _) = RaidSession::create("r1", "p1", cfg, named("Ash"), &settings()).unwrap();
        raid.apply("p2", RaidAction::JoinRaid { player_data: named("B") })
            .unwrap();
        let err = raid
            .apply("p3", RaidAction::JoinRaid { player_data: named("C") })
            .unwrap_err();
        assert_eq!(err, RaidError::RaidFull(2));
    }

    #[test]
    fn test_viewer_join_does_not_take_a_seat() {
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config(2), named("Ash"), &settings()).unwrap();
        raid.apply(
            "v1",
            RaidAction::JoinRaid {
                player_data: PlayerData {
                    username: "Watcher".into(),
                    as_spectator: true,
                    ..Default::default()
                },
            },
        )
        .unwrap();
        assert_eq!(raid.phase(), Phase::Lobby);
        assert_eq!(raid.spectators().len(), 1);
        assert!(!raid.spectators()[0].was_player);
        assert_eq!(raid.positions().players.len(), 1);
    }

    #[test]
    fn test_switch_layout_lobby_only() {
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config(2), named("Ash"), &settings()).unwrap();
        raid.apply("p1", RaidAction::SwitchLayout { layout: Layout::Circular })
            .unwrap();
        assert_eq!(raid.positions().layout, Layout::Circular);

        raid.apply("p2", RaidAction::JoinRaid { player_data: named("B") })
            .unwrap();
        let err = raid
            .apply("p1", RaidAction::SwitchLayout { layout: Layout::Versus })
            .unwrap_err();
        assert_eq!(err, RaidError::InvalidPhase("playing".into()));
    }

    #[test]
    fn test_rejection_leaves_session_untouched() {
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config(2), named("Ash"), &settings()).unwrap();
        raid.apply("p2", RaidAction::JoinRaid { player_data: named("B") })
            .unwrap();
        let before = serde_json::to_value(raid.snapshot()).unwrap();
        let events = raid.handle(
            "p2",
            RaidAction::PlayerAttack {
                attack_name: None,
                damage: None,
            },
        );
        assert_eq!(events.len(), 1);
        assert!(events[0].is_rejection());
        let after = serde_json::to_value(raid.snapshot()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_debug_actions_gated() {
        let cfg = RaidConfig {
            debug_mode: Some(false),
            ..config(1)
        };
        let (mut raid, _) = RaidSession::create("r1", "p1", cfg, named("Ash"), &settings()).unwrap();
        let err = raid.apply("p1", RaidAction::DebugSkipTurn).unwrap_err();
        assert_eq!(err, RaidError::DebugDisabled);

        raid.apply("p2", RaidAction::JoinRaid { player_data: named("B") })
            .unwrap();
        let err = raid.apply("p2", RaidAction::ToggleDebugMode).unwrap_err();
        assert_eq!(err, RaidError::NotRaidCreator);

        raid.apply("p1", RaidAction::ToggleDebugMode).unwrap();
        assert!(raid.is_debug());
        raid.apply("p1", RaidAction::DebugSkipTurn).unwrap();
        assert_eq!(raid.current_turn_player(), Some("p2"));
    }

    #[test]
    fn test_boss_turn_runs_once_per_token() {
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config(1), named("Ash"), &settings()).unwrap();
        raid.take_scheduled();
        raid.apply(
            "p1",
            RaidAction::PlayerAttack {
                attack_name: None,
                damage: Some(10),
            },
        )
        .unwrap();
        let tasks = raid.take_scheduled();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskKind::BossTurn);

        let events = raid.fire(tasks[0]);
        assert!(events.iter().any(|e| e.kind() == "bossActionCompleted"));
        assert_eq!(raid.phase(), Phase::Playing);
        assert_eq!(raid.snapshot().round, 2);

        // Same token again: nothing happens
        assert!(raid.fire(tasks[0]).is_empty());
    }

    #[test]
    fn test_turn_timeout_skips_player() {
        let cfg = RaidConfig {
            turn_timeout_secs: Some(30),
            ..config(2)
        };
        let (mut raid, _) = RaidSession::create("r1", "p1", cfg, named("Ash"), &settings()).unwrap();
        raid.apply("p2", RaidAction::JoinRaid { player_data: named("B") })
            .unwrap();
        let tasks = raid.take_scheduled();
        let timeout = tasks
            .iter()
            .find(|t| t.kind == TaskKind::TurnTimeout)
            .copied()
            .unwrap();
        let events = raid.fire(timeout);
        assert!(!events.is_empty());
        assert_eq!(raid.current_turn_player(), Some("p2"));
        assert!(raid.fire(timeout).is_empty());
    }

    #[test]
    fn test_end_raid_creator_only() {
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config(2), named("Ash"), &settings()).unwrap();
        raid.apply("p2", RaidAction::JoinRaid { player_data: named("B") })
            .unwrap();
        assert_eq!(
            raid.apply("p2", RaidAction::EndRaid).unwrap_err(),
            RaidError::NotRaidCreator
        );
        let events = raid.apply("p1", RaidAction::EndRaid).unwrap();
        assert!(raid.is_closed());
        assert!(matches!(
            events.last(),
            Some(RaidEvent::RaidEnded {
                outcome: RaidOutcome::Abandoned,
                ..
            })
        ));
    }

    #[test]
    fn test_reset_restores_fresh_lobby() {
        let (mut raid, _) =
            RaidSession::create("r1", "p1", config(1), named("Ash"), &settings()).unwrap();
        raid.apply(
            "p1",
            RaidAction::DebugSetHp {
                player_id: None,
                card_slot: None,
                hp: 100,
            },
        )
        .unwrap();
        raid.apply("p1", RaidAction::TestKo { card_slot: CardSlot::Active })
            .unwrap();
        raid.apply("p1", RaidAction::DebugResetRaid).unwrap();

        assert_eq!(raid.boss().current_hp, raid.boss().max_hp);
        assert_eq!(raid.total_kos(), 0);
        assert!(!raid.players()[0].cards.active.is_ko());
        // Solo raid restarts straight away
        assert_eq!(raid.phase(), Phase::Playing);
        assert_eq!(raid.snapshot().round, 1);
    }
}
