// Battlefield layout: where each player and the boss sit on screen.
//
// Everything here is a pure function of the roster size and the layout mode.
// Coordinates are percentages of a notional 0-100 square, with angle 0 pointing
// right and angles growing counter-clockwise.

use serde::{Deserialize, Serialize};

use super::config::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Layout {
    /// Players on one arc, boss on the opposite side.
    #[default]
    Versus,
    /// Players around a full circle, boss in the middle.
    Circular,
}

impl std::fmt::Display for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::Versus => write!(f, "versus"),
            Layout::Circular => write!(f, "circular"),
        }
    }
}

/// Position of one player (or the boss when `owner_id` is `None`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub owner_id: Option<String>,
    pub angle: f64,
    pub x: f64,
    pub y: f64,
}

/// Full layout for a raid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutPositions {
    pub layout: Layout,
    pub players: Vec<Position>,
    pub boss: Position,
}

fn clamp(v: f64) -> f64 {
    v.clamp(LAYOUT_MIN, LAYOUT_MAX)
}

/// Point on the layout circle. Screen y grows downward, so sin is subtracted.
fn polar(angle_deg: f64) -> (f64, f64) {
    let rad = angle_deg.to_radians();
    let x = LAYOUT_CENTER + LAYOUT_RADIUS * rad.cos();
    let y = LAYOUT_CENTER - LAYOUT_RADIUS * rad.sin();
    // Round away float noise so 45 degrees lands on the same value every time.
    ((x * 1000.0).round() / 1000.0, (y * 1000.0).round() / 1000.0)
}

/// Player angles (degrees) for `count` players.
pub fn player_angles(count: usize, layout: Layout) -> Vec<f64> {
    match (layout, count) {
        (_, 0) => Vec::new(),
        (Layout::Versus, 1) => vec![(VERSUS_ARC_START + VERSUS_ARC_END) / 2.0],
        (Layout::Versus, n) => {
            let step = (VERSUS_ARC_END - VERSUS_ARC_START) / (n - 1) as f64;
            (0..n).map(|i| VERSUS_ARC_START + step * i as f64).collect()
        }
        (Layout::Circular, n) => {
            let step = 360.0 / n as f64;
            (0..n)
                .map(|i| (CIRCULAR_START_ANGLE + step * i as f64) % 360.0)
                .collect()
        }
    }
}

fn boss_position(layout: Layout) -> Position {
    match layout {
        Layout::Versus => {
            let (x, y) = polar(VERSUS_BOSS_ANGLE);
            Position {
                owner_id: None,
                angle: VERSUS_BOSS_ANGLE,
                x: clamp(x),
                y: clamp(y),
            }
        }
        Layout::Circular => Position {
            owner_id: None,
            angle: 0.0,
            x: LAYOUT_CENTER,
            y: LAYOUT_CENTER,
        },
    }
}

/// Compute positions for the given players (in seat order) and the boss.
pub fn compute_layout(player_ids: &[String], layout: Layout) -> LayoutPositions {
    let players = player_angles(player_ids.len(), layout)
        .into_iter()
        .zip(player_ids)
        .map(|(angle, id)| {
            let (x, y) = polar(angle);
            Position {
                owner_id: Some(id.clone()),
                angle,
                x: clamp(x),
                y: clamp(y),
            }
        })
        .collect();

    LayoutPositions {
        layout,
        players,
        boss: boss_position(layout),
    }
}
