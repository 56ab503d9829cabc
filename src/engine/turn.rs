// Phase state machine, turn order and the deferred tasks that hang off it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Lobby,
    Playing,
    BossTurn,
    Victory,
    Defeat,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Victory | Phase::Defeat)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Lobby => write!(f, "lobby"),
            Phase::Playing => write!(f, "playing"),
            Phase::BossTurn => write!(f, "bossTurn"),
            Phase::Victory => write!(f, "victory"),
            Phase::Defeat => write!(f, "defeat"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    BossTurn,
    TurnTimeout,
}

/// A deferred callback the host must fire after `delay`. Firing it with a token
/// that is no longer current does nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub kind: TaskKind,
    pub token: u64,
    pub delay: Duration,
}

/// What `advance` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Next player's turn.
    NextPlayer(String),
    /// The round is over; the boss acts next.
    BossTurn,
    /// Phase is not `Playing`; nothing moved.
    Idle,
}

/// Owns the phase, the per-round turn order and the cancellable task tokens.
#[derive(Debug)]
pub struct TurnManager {
    phase: Phase,
    turn_order: Vec<String>,
    current: Option<usize>,
    round: u32,
    boss_delay: Duration,
    turn_timeout: Option<Duration>,
    next_token: u64,
    boss_token: Option<u64>,
    timeout_token: Option<u64>,
    outbox: Vec<ScheduledTask>,
}

impl TurnManager {
    pub fn new(boss_delay: Duration, turn_timeout: Option<Duration>) -> Self {
        TurnManager {
            phase: Phase::Lobby,
            turn_order: Vec::new(),
            current: None,
            round: 0,
            boss_delay,
            turn_timeout,
            next_token: 0,
            boss_token: None,
            timeout_token: None,
            outbox: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn turn_order(&self) -> &[String] {
        &self.turn_order
    }

    pub fn current_player(&self) -> Option<&str> {
        if self.phase != Phase::Playing {
            return None;
        }
        self.current
            .and_then(|i| self.turn_order.get(i))
            .map(String::as_str)
    }

    pub fn is_turn_of(&self, player_id: &str) -> bool {
        self.current_player() == Some(player_id)
    }

    /// Token of the boss turn waiting to fire, if any.
    pub fn pending_boss_token(&self) -> Option<u64> {
        self.boss_token
    }

    /// Drain tasks the host should schedule.
    pub fn take_scheduled(&mut self) -> Vec<ScheduledTask> {
        std::mem::take(&mut self.outbox)
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn begin_turn(&mut self) {
        self.timeout_token = None;
        if let Some(timeout) = self.turn_timeout {
            let token = self.issue_token();
            self.timeout_token = Some(token);
            self.outbox.push(ScheduledTask {
                kind: TaskKind::TurnTimeout,
                token,
                delay: timeout,
            });
        }
    }

    /// Leave the lobby with the given players (join order) and hand the first turn out.
    pub fn start(&mut self, players: Vec<String>) {
        self.turn_order = players;
        self.phase = Phase::Playing;
        self.round = 1;
        self.current = Some(0);
        self.begin_turn();
    }

    /// End the current player's turn.
    pub fn advance(&mut self) -> Advance {
        if self.phase != Phase::Playing {
            return Advance::Idle;
        }
        let next = self.current.map(|i| i + 1).unwrap_or(0);
        if next < self.turn_order.len() {
            self.current = Some(next);
            self.begin_turn();
            return Advance::NextPlayer(self.turn_order[next].clone());
        }
        self.enter_boss_turn();
        Advance::BossTurn
    }

    /// Switch to the boss turn and schedule it. Returns the task token.
    pub fn enter_boss_turn(&mut self) -> u64 {
        self.phase = Phase::BossTurn;
        self.current = None;
        self.timeout_token = None;
        let token = self.issue_token();
        self.boss_token = Some(token);
        self.outbox.push(ScheduledTask {
            kind: TaskKind::BossTurn,
            token,
            delay: self.boss_delay,
        });
        token
    }

    /// Claim the pending boss turn. Only the current token succeeds, and only once.
    pub fn claim_boss_turn(&mut self, token: u64) -> bool {
        if self.phase == Phase::BossTurn && self.boss_token == Some(token) {
            self.boss_token = None;
            return true;
        }
        false
    }

    /// Whether a turn timeout with this token still applies to the current turn.
    pub fn claim_timeout(&mut self, token: u64) -> bool {
        if self.phase == Phase::Playing && self.timeout_token == Some(token) {
            self.timeout_token = None;
            return true;
        }
        false
    }

    /// Boss turn resolved: next round with the players that are still fighting.
    pub fn finish_boss_turn(&mut self, players: Vec<String>) -> Advance {
        if self.phase != Phase::BossTurn {
            return Advance::Idle;
        }
        self.round += 1;
        self.turn_order = players;
        self.phase = Phase::Playing;
        self.current = Some(0);
        if self.turn_order.is_empty() {
            // Nobody left to act; go straight back to the boss.
            self.enter_boss_turn();
            return Advance::BossTurn;
        }
        self.begin_turn();
        Advance::NextPlayer(self.turn_order[0].clone())
    }

    /// Take a player out of the order. If they held the turn, the turn passes on.
    pub fn remove_player(&mut self, player_id: &str) -> Option<Advance> {
        let idx = self.turn_order.iter().position(|id| id == player_id)?;
        let held_turn = self.phase == Phase::Playing && self.current == Some(idx);
        self.turn_order.remove(idx);

        if self.phase != Phase::Playing {
            return None;
        }
        if let Some(cur) = self.current {
            if idx < cur {
                self.current = Some(cur - 1);
            }
        }
        if !held_turn {
            return None;
        }
        // The next player now occupies the removed slot.
        let cur = idx;
        if cur < self.turn_order.len() {
            self.current = Some(cur);
            self.begin_turn();
            Some(Advance::NextPlayer(self.turn_order[cur].clone()))
        } else {
            self.enter_boss_turn();
            Some(Advance::BossTurn)
        }
    }

    /// Append a player who (re)joined mid-round so they act this round.
    pub fn append_player(&mut self, player_id: &str) {
        if !self.turn_order.iter().any(|id| id == player_id) {
            self.turn_order.push(player_id.to_string());
        }
    }

    pub fn end(&mut self, outcome: Phase) {
        debug_assert!(outcome.is_terminal());
        self.phase = outcome;
        self.current = None;
        self.cancel_pending();
    }

    /// Invalidate every outstanding task token.
    pub fn cancel_pending(&mut self) {
        self.boss_token = None;
        self.timeout_token = None;
        self.outbox.clear();
    }

    /// Back to the lobby with a fresh round counter.
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.phase = Phase::Lobby;
        self.turn_order.clear();
        self.current = None;
        self.round = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn manager() -> TurnManager {
        TurnManager::new(Duration::from_millis(1500), None)
    }

    #[test]
    fn test_start_hands_first_turn() {
        let mut tm = manager();
        assert_eq!(tm.phase(), Phase::Lobby);
        assert_eq!(tm.current_player(), None);

        tm.start(ids(&["a", "b"]));
        assert_eq!(tm.phase(), Phase::Playing);
        assert_eq!(tm.round(), 1);
        assert_eq!(tm.current_player(), Some("a"));
        assert!(tm.take_scheduled().is_empty());
    }

    #[test]
    fn test_advance_through_round_to_boss() {
        let mut tm = manager();
        tm.start(ids(&["a", "b"]));
        assert_eq!(tm.advance(), Advance::NextPlayer("b".into()));
        assert_eq!(tm.advance(), Advance::BossTurn);
        assert_eq!(tm.phase(), Phase::BossTurn);
        assert_eq!(tm.current_player(), None);

        let tasks = tm.take_scheduled();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskKind::BossTurn);
        assert_eq!(tasks[0].delay, Duration::from_millis(1500));

        // Advancing during the boss turn does nothing
        assert_eq!(tm.advance(), Advance::Idle);
    }

    #[test]
    fn test_boss_token_claimed_once() {
        let mut tm = manager();
        tm.start(ids(&["a"]));
        tm.advance();
        let token = tm.pending_boss_token().unwrap();
        assert!(!tm.claim_boss_turn(token + 1));
        assert!(tm.claim_boss_turn(token));
        assert!(!tm.claim_boss_turn(token));
    }

    #[test]
    fn test_finish_boss_turn_rebuilds_order() {
        let mut tm = manager();
        tm.start(ids(&["a", "b", "c"]));
        tm.advance();
        tm.advance();
        tm.advance();
        let token = tm.pending_boss_token().unwrap();
        assert!(tm.claim_boss_turn(token));

        assert_eq!(
            tm.finish_boss_turn(ids(&["a", "c"])),
            Advance::NextPlayer("a".into())
        );
        assert_eq!(tm.phase(), Phase::Playing);
        assert_eq!(tm.round(), 2);
        assert_eq!(tm.turn_order(), &["a".to_string(), "c".to_string()]);
        assert_eq!(tm.current_player(), Some("a"));
    }

    #[test]
    fn test_remove_current_player_advances() {
        let mut tm = manager();
        tm.start(ids(&["a", "b", "c"]));
        tm.advance(); // b's turn
        assert_eq!(tm.remove_player("b"), Some(Advance::NextPlayer("c".into())));
        assert_eq!(tm.current_player(), Some("c"));
        assert_eq!(tm.turn_order().len(), 2);
    }

    #[test]
    fn test_remove_earlier_player_keeps_current() {
        let mut tm = manager();
        tm.start(ids(&["a", "b", "c"]));
        tm.advance();
        tm.advance(); // c's turn
        assert_eq!(tm.remove_player("a"), None);
        assert_eq!(tm.current_player(), Some("c"));
    }

    #[test]
    fn test_remove_last_player_triggers_boss() {
        let mut tm = manager();
        tm.start(ids(&["a", "b"]));
        tm.advance(); // b's turn
        assert_eq!(tm.remove_player("b"), Some(Advance::BossTurn));
        assert_eq!(tm.phase(), Phase::BossTurn);
    }

    #[test]
    fn test_turn_timeout_tokens() {
        let mut tm = TurnManager::new(Duration::ZERO, Some(Duration::from_secs(30)));
        tm.start(ids(&["a", "b"]));
        let first = tm.take_scheduled();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, TaskKind::TurnTimeout);

        // Advancing supersedes the first timeout
        tm.advance();
        assert!(!tm.claim_timeout(first[0].token));
        let second = tm.take_scheduled();
        assert!(tm.claim_timeout(second[0].token));
    }

    #[test]
    fn test_end_and_reset_cancel_tasks() {
        let mut tm = manager();
        tm.start(ids(&["a"]));
        tm.advance();
        let token = tm.pending_boss_token().unwrap();
        tm.end(Phase::Victory);
        assert!(!tm.claim_boss_turn(token));
        assert!(tm.phase().is_terminal());

        tm.reset();
        assert_eq!(tm.phase(), Phase::Lobby);
        assert_eq!(tm.round(), 0);
        assert!(tm.turn_order().is_empty());
    }
}
