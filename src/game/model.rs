//! Canonical game data: players, shots, explosions, rules

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

use crate::util::time::millis;

/// Player identifier, assigned per connection by the gateway
pub type PlayerId = Uuid;

/// Grid position
pub type Position = (i32, i32);

/// Facing / travel direction on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    None,
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Unit step for this direction (y grows downwards)
    pub fn step(self) -> (i32, i32) {
        match self {
            Direction::None => (0, 0),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::None => Direction::None,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }
}

/// Player state (authoritative)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
    pub alive: bool,
    pub is_moving: bool,
    pub weapon_loaded: bool,
    pub name: String,
}

impl Player {
    /// A freshly joined player waits at the origin, not alive, until its first spawn
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            x: 0,
            y: 0,
            direction: Direction::None,
            alive: false,
            is_moving: false,
            weapon_loaded: true,
            name: name.into(),
        }
    }

    pub fn position(&self) -> Position {
        (self.x, self.y)
    }
}

/// A round that is still "hot"; at most one per player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shot {
    pub player_id: PlayerId,
    pub direction: Direction,
    pub x: i32,
    pub y: i32,
}

/// Splash area spawned at every hit player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explosion {
    pub id: Uuid,
    pub x: i32,
    pub y: i32,
    /// Blast diameter
    pub size: i32,
    pub caused_by: PlayerId,
}

impl Explosion {
    /// Inclusive circle test, radius = size / 2. A zero-sized blast catches nobody.
    pub fn catches(&self, x: i32, y: i32) -> bool {
        if self.size <= 0 {
            return false;
        }
        let dx = i64::from(x) - i64::from(self.x);
        let dy = i64::from(y) - i64::from(self.y);
        let size = i64::from(self.size);
        // (2d)^2 <= size^2 keeps the half radius exact
        4 * (dx * dx + dy * dy) <= size * size
    }
}

/// Session rules, fixed for the lifetime of a game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rules {
    pub world_width: i32,
    pub world_height: i32,
    /// Grid units travelled per `move_time`
    pub move_distance: i32,
    #[serde(rename = "moveTime")]
    pub move_time_ms: u64,
    #[serde(rename = "reloadTime")]
    pub reload_time_ms: u64,
    #[serde(rename = "respawnTime")]
    pub respawn_time_ms: u64,
    #[serde(rename = "syncTime")]
    pub sync_time_ms: u64,
    pub explosion_size: i32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            world_width: 800,
            world_height: 600,
            move_distance: 10,
            move_time_ms: 100,
            reload_time_ms: 300,
            respawn_time_ms: 3000,
            sync_time_ms: 200,
            explosion_size: 40,
        }
    }
}

impl Rules {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (0..self.world_width).contains(&x) && (0..self.world_height).contains(&y)
    }

    /// Nearest in-bounds position
    pub fn clamp(&self, x: i32, y: i32) -> Position {
        (
            x.clamp(0, (self.world_width - 1).max(0)),
            y.clamp(0, (self.world_height - 1).max(0)),
        )
    }

    pub fn reload_time(&self) -> Duration {
        millis(self.reload_time_ms)
    }

    pub fn respawn_time(&self) -> Duration {
        millis(self.respawn_time_ms)
    }

    pub fn sync_time(&self) -> Duration {
        millis(self.sync_time_ms)
    }

    /// Displacement after `elapsed` on a running trajectory
    pub fn displacement(&self, elapsed: Duration) -> i32 {
        let distance = i128::from(self.move_distance.max(0));
        let num = elapsed.as_micros() as i128 * distance;
        let den = i128::from(self.move_time_ms.max(1)) * 1000;
        // round half up
        let steps = (2 * num + den) / (2 * den);
        steps.min(i128::from(i32::MAX)) as i32
    }
}

/// The canonical state value held by the store
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub players: BTreeMap<PlayerId, Player>,
    pub shots: BTreeMap<PlayerId, Shot>,
    pub rules: Rules,
}

impl GameState {
    pub fn new(rules: Rules) -> Self {
        Self {
            players: BTreeMap::new(),
            shots: BTreeMap::new(),
            rules,
        }
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    /// Player lookup that skips dead players
    pub fn alive_player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id).filter(|p| p.alive)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.alive)
    }
}
