// Inbound actions and outbound events. The transport maps these to and from
// JSON; the engine never sees raw payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{RaidError, RaidResult};
use super::geometry::Layout;
use super::player::{CardSlot, PlayerData};
use super::raid::{RaidConfig, RaidSnapshot};

/// Every action a client can send. Validated once, when parsed.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RaidAction {
    /// The creator joins as the first player.
    CreateRaid {
        #[serde(default)]
        config: RaidConfig,
        #[serde(default)]
        player_data: PlayerData,
    },
    JoinRaid {
        #[serde(default)]
        player_data: PlayerData,
    },
    LeaveRaid,
    PlayerAttack {
        #[serde(default)]
        attack_name: Option<String>,
        #[serde(default)]
        damage: Option<u32>,
    },
    PlayerRetreat,
    CheerCard {
        card_number: u8,
        #[serde(default)]
        target_player_id: Option<String>,
    },
    #[serde(rename = "testKO")]
    TestKo {
        card_slot: CardSlot,
    },
    SwitchLayout {
        layout: Layout,
    },
    /// Without `player_id` the boss is targeted.
    #[serde(rename = "debugSetHP")]
    DebugSetHp {
        #[serde(default)]
        player_id: Option<String>,
        #[serde(default)]
        card_slot: Option<CardSlot>,
        hp: u32,
    },
    DebugKillPlayer {
        #[serde(default)]
        player_id: Option<String>,
    },
    DebugResurrectPlayer {
        #[serde(default)]
        player_id: Option<String>,
    },
    DebugSkipTurn,
    DebugForceBossTurn,
    DebugResetRaid,
    ToggleDebugMode,
    /// Creator tears the raid down.
    EndRaid,
}

const ACTION_TYPES: &[&str] = &[
    "createRaid",
    "joinRaid",
    "leaveRaid",
    "playerAttack",
    "playerRetreat",
    "cheerCard",
    "testKO",
    "switchLayout",
    "debugSetHP",
    "debugKillPlayer",
    "debugResurrectPlayer",
    "debugSkipTurn",
    "debugForceBossTurn",
    "debugResetRaid",
    "toggleDebugMode",
    "endRaid",
];

impl RaidAction {
    /// Parse a JSON action, distinguishing unknown types from bad payloads.
    pub fn from_value(value: Value) -> RaidResult<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| RaidError::UnknownActionType("<missing>".to_string()))?;
        if !ACTION_TYPES.contains(&kind) {
            return Err(RaidError::UnknownActionType(kind.to_string()));
        }
        let kind = kind.to_string();
        serde_json::from_value(value)
            .map_err(|e| RaidError::MalformedAction(format!("{kind}: {e}")))
    }

    /// Wire name, used for logging and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RaidAction::CreateRaid { .. } => "createRaid",
            RaidAction::JoinRaid { .. } => "joinRaid",
            RaidAction::LeaveRaid => "leaveRaid",
            RaidAction::PlayerAttack { .. } => "playerAttack",
            RaidAction::PlayerRetreat => "playerRetreat",
            RaidAction::CheerCard { .. } => "cheerCard",
            RaidAction::TestKo { .. } => "testKO",
            RaidAction::SwitchLayout { .. } => "switchLayout",
            RaidAction::DebugSetHp { .. } => "debugSetHP",
            RaidAction::DebugKillPlayer { .. } => "debugKillPlayer",
            RaidAction::DebugResurrectPlayer { .. } => "debugResurrectPlayer",
            RaidAction::DebugSkipTurn => "debugSkipTurn",
            RaidAction::DebugForceBossTurn => "debugForceBossTurn",
            RaidAction::DebugResetRaid => "debugResetRaid",
            RaidAction::ToggleDebugMode => "toggleDebugMode",
            RaidAction::EndRaid => "endRaid",
        }
    }

    pub fn is_debug(&self) -> bool {
        matches!(
            self,
            RaidAction::DebugSetHp { .. }
                | RaidAction::DebugKillPlayer { .. }
                | RaidAction::DebugResurrectPlayer { .. }
                | RaidAction::DebugSkipTurn
                | RaidAction::DebugForceBossTurn
                | RaidAction::DebugResetRaid
        )
    }
}

/// An action addressed to a raid on behalf of a player.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionEnvelope {
    pub raid_id: Option<String>,
    pub player_id: String,
    pub action: RaidAction,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default)]
    raid_id: Option<String>,
    #[serde(default)]
    player_id: Option<String>,
    action: Value,
}

impl ActionEnvelope {
    /// Parse `{ raidId?, playerId?, action }`. A missing `playerId` falls back to
    /// `default_player` (the connection id on the socket path).
    pub fn parse(json: &str, default_player: Option<&str>) -> RaidResult<Self> {
        let raw: RawEnvelope = serde_json::from_str(json)
            .map_err(|e| RaidError::MalformedAction(e.to_string()))?;
        let player_id = raw
            .player_id
            .or_else(|| default_player.map(str::to_string))
            .ok_or_else(|| RaidError::MalformedAction("playerId is required".to_string()))?;
        Ok(ActionEnvelope {
            raid_id: raw.raid_id,
            player_id,
            action: RaidAction::from_value(raw.action)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RaidOutcome {
    Victory,
    Defeat,
    /// Ended by the creator before a result.
    Abandoned,
}

/// Outcome of a single action, success or rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action: String,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One boss hit on one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BossHit {
    pub player_id: String,
    pub username: String,
    pub card: String,
    pub damage: u32,
    pub knocked_out: bool,
}

/// Everything the engine tells the outside world.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RaidEvent {
    RaidCreated {
        raid_id: String,
        creator_id: String,
        config: RaidConfig,
    },
    PlayerJoined {
        player_id: String,
        username: String,
        as_spectator: bool,
    },
    PlayerLeft {
        player_id: String,
        username: String,
    },
    ActionResult(ActionResult),
    GameStateUpdate {
        snapshot: Box<RaidSnapshot>,
    },
    BossActionCompleted {
        attack: String,
        targets: Vec<BossHit>,
        /// HP the boss restored (heal attacks only).
        healed: u32,
        limited: bool,
    },
    RaidEnded {
        outcome: RaidOutcome,
        reason: String,
    },
}

impl RaidEvent {
    pub fn success(action: &str, message: impl Into<String>, damage: Option<u32>) -> Self {
        RaidEvent::ActionResult(ActionResult {
            action: action.to_string(),
            success: true,
            message: message.into(),
            damage,
            error: None,
        })
    }

    pub fn rejected(action: &str, err: &RaidError) -> Self {
        RaidEvent::ActionResult(ActionResult {
            action: action.to_string(),
            success: false,
            message: err.to_string(),
            damage: None,
            error: Some(err.code().to_string()),
        })
    }

    /// Rejections go back to the sender only; everything else is broadcast.
    pub fn is_rejection(&self) -> bool {
        matches!(self, RaidEvent::ActionResult(r) if !r.success)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RaidEvent::RaidCreated { .. } => "raidCreated",
            RaidEvent::PlayerJoined { .. } => "playerJoined",
            RaidEvent::PlayerLeft { .. } => "playerLeft",
            RaidEvent::ActionResult(_) => "actionResult",
            RaidEvent::GameStateUpdate { .. } => "gameStateUpdate",
            RaidEvent::BossActionCompleted { .. } => "bossActionCompleted",
            RaidEvent::RaidEnded { .. } => "raidEnded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_attack() {
        let action = RaidAction::from_value(json!({
            "type": "playerAttack",
            "attackName": "Thunderbolt"
        }))
        .unwrap();
        assert_eq!(
            action,
            RaidAction::PlayerAttack {
                attack_name: Some("Thunderbolt".into()),
                damage: None
            }
        );
    }

    #[test]
    fn test_parse_renamed_variants() {
        let action = RaidAction::from_value(json!({"type": "testKO", "cardSlot": "active"})).unwrap();
        assert_eq!(action, RaidAction::TestKo { card_slot: CardSlot::Active });

        let action = RaidAction::from_value(json!({"type": "debugSetHP", "hp": 10})).unwrap();
        assert_eq!(
            action,
            RaidAction::DebugSetHp {
                player_id: None,
                card_slot: None,
                hp: 10
            }
        );
        assert_eq!(action.kind(), "debugSetHP");
    }

    #[test]
    fn test_parse_unknown_type() {
        let err = RaidAction::from_value(json!({"type": "castSpell"})).unwrap_err();
        assert_eq!(err, RaidError::UnknownActionType("castSpell".into()));
        let err = RaidAction::from_value(json!({"damage": 3})).unwrap_err();
        assert_eq!(err.code(), "UnknownActionType");
    }

    #[test]
    fn test_parse_malformed_payload() {
        let err = RaidAction::from_value(json!({"type": "cheerCard"})).unwrap_err();
        assert_eq!(err.code(), "MalformedAction");
    }

    #[test]
    fn test_parse_envelope_default_player() {
        let env = ActionEnvelope::parse(
            r#"{"raidId":"r1","action":{"type":"leaveRaid"}}"#,
            Some("conn-1"),
        )
        .unwrap();
        assert_eq!(env.player_id, "conn-1");
        assert_eq!(env.raid_id.as_deref(), Some("r1"));
        assert_eq!(env.action, RaidAction::LeaveRaid);

        let err = ActionEnvelope::parse(r#"{"action":{"type":"leaveRaid"}}"#, None).unwrap_err();
        assert_eq!(err.code(), "MalformedAction");
    }

    #[test]
    fn test_event_serialization() {
        let event = RaidEvent::rejected("playerAttack", &RaidError::NotYourTurn);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "actionResult");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "NotYourTurn");
        assert!(event.is_rejection());

        let event = RaidEvent::RaidEnded {
            outcome: RaidOutcome::Victory,
            reason: "Boss defeated".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "raidEnded");
        assert_eq!(json["outcome"], "victory");
    }
}
