use serde::{Deserialize, Serialize};

/// Who a boss attack hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackTargets {
    Single,
    All,
}

// Wire form is `1` or `"all"`.
impl Serialize for AttackTargets {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            AttackTargets::Single => s.serialize_u8(1),
            AttackTargets::All => s.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for AttackTargets {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u8),
            Word(String),
        }
        match Raw::deserialize(d)? {
            Raw::Count(1) => Ok(AttackTargets::Single),
            Raw::Word(w) if w.eq_ignore_ascii_case("all") => Ok(AttackTargets::All),
            Raw::Word(w) if w == "1" => Ok(AttackTargets::Single),
            _ => Err(serde::de::Error::custom("targets must be 1 or \"all\"")),
        }
    }
}

/// Damage attacks hit players; heal attacks restore the boss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BossAttackKind {
    #[default]
    Damage,
    Heal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossAttack {
    pub name: String,
    /// Damage per target, or HP restored for heal attacks.
    pub damage: u32,
    pub targets: AttackTargets,
    #[serde(default)]
    pub kind: BossAttackKind,
    /// Boss turns the attack is unavailable after use.
    #[serde(default)]
    pub cooldown: u32,
}

impl BossAttack {
    pub fn is_heal(&self) -> bool {
        self.kind == BossAttackKind::Heal
    }

    pub fn is_aoe(&self) -> bool {
        self.targets == AttackTargets::All
    }
}

/// Boss definition a raid creator may supply in place of the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BossTemplate {
    pub name: String,
    #[serde(rename = "maxHP")]
    pub max_hp: u32,
    pub attacks: Vec<BossAttack>,
    #[serde(default = "default_level")]
    pub level: u8,
}

fn default_level() -> u8 {
    3
}

impl Default for BossTemplate {
    fn default() -> Self {
        BossTemplate {
            name: "Mewtwo".to_string(),
            max_hp: 1000,
            level: default_level(),
            attacks: vec![
                BossAttack {
                    name: "Psystrike".to_string(),
                    damage: 60,
                    targets: AttackTargets::Single,
                    kind: BossAttackKind::Damage,
                    cooldown: 0,
                },
                BossAttack {
                    name: "Psychic Storm".to_string(),
                    damage: 40,
                    targets: AttackTargets::All,
                    kind: BossAttackKind::Damage,
                    cooldown: 1,
                },
                BossAttack {
                    name: "Mind Crush".to_string(),
                    damage: 120,
                    targets: AttackTargets::Single,
                    kind: BossAttackKind::Damage,
                    cooldown: 2,
                },
                BossAttack {
                    name: "Recover".to_string(),
                    damage: 100,
                    targets: AttackTargets::Single,
                    kind: BossAttackKind::Heal,
                    cooldown: 3,
                },
            ],
        }
    }
}

/// The shared raid boss.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Boss {
    pub name: String,
    #[serde(rename = "maxHP")]
    pub max_hp: u32,
    #[serde(rename = "currentHP")]
    pub current_hp: u32,
    pub attacks: Vec<BossAttack>,
    pub level: u8,
}

impl Boss {
    pub fn from_template(template: &BossTemplate) -> Self {
        let max_hp = template.max_hp.max(1);
        Boss {
            name: template.name.clone(),
            max_hp,
            current_hp: max_hp,
            attacks: template.attacks.clone(),
            level: template.level.max(1),
        }
    }

    pub fn is_defeated(&self) -> bool {
        self.current_hp == 0
    }

    pub fn health_fraction(&self) -> f64 {
        self.current_hp as f64 / self.max_hp as f64
    }

    /// Apply damage, clamped at zero. Returns the damage actually dealt.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let dealt = amount.min(self.current_hp);
        self.current_hp -= dealt;
        dealt
    }

    /// Restore HP, clamped to max. Returns the HP actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let before = self.current_hp;
        self.current_hp = self.current_hp.saturating_add(amount).min(self.max_hp);
        self.current_hp - before
    }

    pub fn set_hp(&mut self, hp: u32) {
        self.current_hp = hp.min(self.max_hp);
    }
}
