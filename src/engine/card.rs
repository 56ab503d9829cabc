use serde::{Deserialize, Serialize};

/// Where a card currently sits for its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardStatus {
    Active,
    Benched,
    Ko,
}

/// A player card's attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attack {
    pub name: String,
    pub damage: u32,
}

impl Attack {
    pub fn new(name: &str, damage: u32) -> Self {
        Attack {
            name: name.to_string(),
            damage,
        }
    }
}

/// One of the two cards a player controls.
///
/// `current_hp` stays within `0..=max_hp` and the card is `Ko` exactly when it
/// reaches zero; all mutation goes through the methods below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub name: String,
    #[serde(rename = "type")]
    pub card_type: String,
    #[serde(rename = "maxHP")]
    pub max_hp: u32,
    #[serde(rename = "currentHP")]
    pub current_hp: u32,
    pub attacks: Vec<Attack>,
    pub status: CardStatus,
}

impl Card {
    pub fn new(name: &str, card_type: &str, max_hp: u32, attacks: Vec<Attack>) -> Self {
        let max_hp = max_hp.max(1);
        Card {
            name: name.to_string(),
            card_type: card_type.to_string(),
            max_hp,
            current_hp: max_hp,
            attacks,
            status: CardStatus::Benched,
        }
    }

    pub fn is_ko(&self) -> bool {
        self.status == CardStatus::Ko
    }

    pub fn hp_fraction(&self) -> f64 {
        self.current_hp as f64 / self.max_hp as f64
    }

    /// Look up an attack by name (case-insensitive). `None` picks the first attack.
    pub fn find_attack(&self, name: Option<&str>) -> Option<&Attack> {
        match name {
            Some(n) => self
                .attacks
                .iter()
                .find(|a| a.name.eq_ignore_ascii_case(n)),
            None => self.attacks.first(),
        }
    }

    /// Subtract damage. Returns true if this hit knocked the card out.
    pub fn take_damage(&mut self, amount: u32) -> bool {
        if self.is_ko() {
            return false;
        }
        self.current_hp = self.current_hp.saturating_sub(amount);
        if self.current_hp == 0 {
            self.status = CardStatus::Ko;
            return true;
        }
        false
    }

    /// Force the card to zero HP. Returns false if it was already knocked out.
    pub fn knock_out(&mut self) -> bool {
        if self.is_ko() {
            return false;
        }
        self.current_hp = 0;
        self.status = CardStatus::Ko;
        true
    }

    /// Heal a living card, clamped to max HP. Returns the HP actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        if self.is_ko() {
            return 0;
        }
        let before = self.current_hp;
        self.current_hp = self.current_hp.saturating_add(amount).min(self.max_hp);
        self.current_hp - before
    }

    /// Set HP directly (debug path), keeping the status consistent with it.
    /// `living_status` is used when the card ends up above zero.
    pub fn set_hp(&mut self, hp: u32, living_status: CardStatus) {
        self.current_hp = hp.min(self.max_hp);
        self.status = if self.current_hp == 0 {
            CardStatus::Ko
        } else {
            living_status
        };
    }

    /// Restore to full HP with the given status.
    pub fn restore(&mut self, status: CardStatus) {
        self.current_hp = self.max_hp;
        self.status = status;
    }
}

/// Card description supplied by a joining client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardData {
    pub name: String,
    #[serde(rename = "type", default = "default_card_type")]
    pub card_type: String,
    pub hp: u32,
    #[serde(default)]
    pub attacks: Vec<Attack>,
}

fn default_card_type() -> String {
    "Colorless".to_string()
}

impl CardData {
    pub fn into_card(self) -> Card {
        let attacks = if self.attacks.is_empty() {
            vec![Attack::new("Tackle", 30)]
        } else {
            self.attacks
        };
        Card::new(&self.name, &self.card_type, self.hp, attacks)
    }
}

/// Starter pairs handed to players who join without their own cards.
/// Picked round-robin by join order.
pub fn starter_pair(index: usize) -> (Card, Card) {
    let pairs: [fn() -> (Card, Card); 3] = [
        || {
            (
                Card::new(
                    "Pikachu",
                    "Lightning",
                    120,
                    vec![Attack::new("Thunderbolt", 60), Attack::new("Quick Attack", 20)],
                ),
                Card::new(
                    "Eevee",
                    "Colorless",
                    100,
                    vec![Attack::new("Tackle", 30), Attack::new("Swift", 50)],
                ),
            )
        },
        || {
            (
                Card::new(
                    "Charizard",
                    "Fire",
                    180,
                    vec![Attack::new("Flamethrower", 90), Attack::new("Slash", 40)],
                ),
                Card::new(
                    "Charmander",
                    "Fire",
                    70,
                    vec![Attack::new("Ember", 30)],
                ),
            )
        },
        || {
            (
                Card::new(
                    "Blastoise",
                    "Water",
                    170,
                    vec![Attack::new("Hydro Pump", 80), Attack::new("Bite", 30)],
                ),
                Card::new(
                    "Squirtle",
                    "Water",
                    70,
                    vec![Attack::new("Water Gun", 20)],
                ),
            )
        },
    ];
    pairs[index % pairs.len()]()
}
