// Raid engine: session state machine, combat, boss AI and layout.

pub mod action;
pub mod boss;
pub mod boss_ai;
pub mod card;
pub mod cheer;
mod combat;
pub mod config;
pub mod error;
pub mod geometry;
pub mod player;
pub mod raid;
pub mod registry;
pub mod turn;

pub use action::{ActionEnvelope, RaidAction, RaidEvent, RaidOutcome};
pub use error::{RaidError, RaidResult};
pub use raid::{RaidConfig, RaidSession, RaidSettings, RaidSnapshot};
pub use registry::{RegistrySettings, SessionRegistry};
