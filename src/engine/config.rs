// Raid tuning constants.

// Roster limits
pub const DEFAULT_MAX_PLAYERS: usize = 4;
pub const DEFAULT_MIN_PLAYERS: usize = 1;
pub const DEFAULT_MAX_KOS: u32 = 4;

// Boss turn pacing (ms)
pub const DEFAULT_BOSS_TURN_DELAY_MS: u64 = 1500;

// Cheer cards
pub const MAX_CHEER_CARDS: u32 = 3;
pub const CHEER_CARD_COUNT: u8 = 5;
pub const CHEER_HEAL_ALL_AMOUNT: u32 = 80;
pub const CHEER_FLAT_BONUS: u32 = 50;
pub const CHEER_BOSS_HIT_CAP: u32 = 30;

// Boss AI thresholds (fraction of max HP)
pub const ENRAGE_THRESHOLD: f64 = 0.25;
pub const HEAL_THRESHOLD: f64 = 0.5;
pub const LOW_HP_THRESHOLD: f64 = 0.3;

/// Number of recorded player turns considered when picking the aggro target.
pub const AGGRO_WINDOW: usize = 3;

// Attack weighting bonuses
pub const AOE_BONUS: f64 = 30.0;
pub const SINGLE_TARGET_BONUS: f64 = 25.0;
pub const HIGH_DAMAGE_BONUS: f64 = 40.0;
pub const HIGH_DAMAGE_MIN: u32 = 80;
pub const HEAL_BONUS: f64 = 60.0;
pub const HEAL_IDLE_FACTOR: f64 = 0.1;
pub const ENRAGE_FACTOR: f64 = 0.5;
pub const REPEAT_PENALTY: f64 = 20.0;
pub const MIN_WEIGHT: f64 = 1.0;

// Target scoring
pub const AGGRO_SCORE: f64 = 30.0;
pub const LETHAL_SCORE: f64 = 40.0;
pub const LOW_HP_SCORE: f64 = 20.0;
pub const TARGET_JITTER: f64 = 5.0;

// Layout (percent of a 0-100 square)
pub const LAYOUT_CENTER: f64 = 50.0;
pub const LAYOUT_RADIUS: f64 = 40.0;
pub const LAYOUT_MIN: f64 = 5.0;
pub const LAYOUT_MAX: f64 = 95.0;
pub const VERSUS_ARC_START: f64 = 15.0;
pub const VERSUS_ARC_END: f64 = 75.0;
pub const VERSUS_BOSS_ANGLE: f64 = 270.0;
pub const CIRCULAR_START_ANGLE: f64 = 45.0;

