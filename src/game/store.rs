//! Canonical state store
//!
//! The store is the only place game state changes. `transition` is total and
//! pure: unknown players and unmapped actions leave the state untouched, so any
//! conflicting derived actions collapse into no-ops here.

use parking_lot::RwLock;
use std::sync::Arc;

use super::action::{Action, ActionKind};
use super::model::{Direction, GameState, Player, PlayerId, Rules, Shot};

/// Apply one action to a state value
pub fn transition(prev: &GameState, action: &Action) -> GameState {
    let mut next = prev.clone();

    match &action.kind {
        ActionKind::Join { player_id, name } => {
            next.players
                .entry(*player_id)
                .or_insert_with(|| Player::new(*player_id, name.clone()));
        }

        ActionKind::PlayerJoined { player } => {
            next.players.entry(player.id).or_insert_with(|| player.clone());
        }

        ActionKind::Leave { player_id } | ActionKind::PlayerLeft { player_id } => {
            next.players.remove(player_id);
            next.shots.remove(player_id);
        }

        ActionKind::MoveStarted {
            player_id,
            direction,
            ..
        } => {
            if let Some(player) = alive_mut(&mut next, player_id) {
                player.direction = *direction;
                player.is_moving = true;
            }
        }

        ActionKind::MoveTo {
            player_id,
            direction,
            x,
            y,
        } => {
            let in_bounds = next.rules.contains(*x, *y);
            if let Some(player) = alive_mut(&mut next, player_id).filter(|_| in_bounds) {
                player.direction = *direction;
                player.is_moving = true;
                player.x = *x;
                player.y = *y;
            }
        }

        ActionKind::MoveStopped {
            player_id,
            direction,
            x,
            y,
        } => {
            let in_bounds = next.rules.contains(*x, *y);
            if let Some(player) = alive_mut(&mut next, player_id) {
                player.direction = *direction;
                player.is_moving = false;
                if in_bounds {
                    player.x = *x;
                    player.y = *y;
                }
            }
        }

        ActionKind::ShotFired { player_id } => {
            if let Some(player) = next.players.get_mut(player_id) {
                player.weapon_loaded = false;
                let shot = Shot {
                    player_id: *player_id,
                    direction: player.direction,
                    x: player.x,
                    y: player.y,
                };
                next.shots.insert(*player_id, shot);
            }
        }

        ActionKind::ShotCooled { player_id } => {
            next.shots.remove(player_id);
            if let Some(player) = next.players.get_mut(player_id) {
                player.weapon_loaded = true;
            }
        }

        ActionKind::Hit { hits, .. } => {
            for id in hits {
                if let Some(player) = alive_mut(&mut next, id) {
                    player.alive = false;
                    player.is_moving = false;
                }
            }
        }

        ActionKind::Spawn { player_id, x, y } => {
            let in_bounds = next.rules.contains(*x, *y);
            if let Some(player) = next.players.get_mut(player_id).filter(|_| in_bounds) {
                player.x = *x;
                player.y = *y;
                player.alive = true;
                player.is_moving = false;
                player.direction = Direction::None;
            }
        }

        // Intents and replication-only facts
        ActionKind::MoveStartRequested { .. }
        | ActionKind::MoveStopRequested { .. }
        | ActionKind::ShotRequested { .. }
        | ActionKind::DisconnectionRequested { .. }
        | ActionKind::GameStateChanged { .. }
        | ActionKind::MoveSync { .. }
        | ActionKind::ExplosionAdded { .. } => {}
    }

    next
}

fn alive_mut<'a>(state: &'a mut GameState, id: &PlayerId) -> Option<&'a mut Player> {
    state.players.get_mut(id).filter(|p| p.alive)
}

/// Owner of the canonical state. Only the action bus holds one.
pub struct Store {
    state: Arc<RwLock<Arc<GameState>>>,
}

impl Store {
    pub fn new(rules: Rules) -> Self {
        Self {
            state: Arc::new(RwLock::new(Arc::new(GameState::new(rules)))),
        }
    }

    pub fn snapshot(&self) -> Arc<GameState> {
        self.state.read().clone()
    }

    /// Apply an action and return the resulting snapshot
    pub fn dispatch(&mut self, action: &Action) -> Arc<GameState> {
        let prev = self.snapshot();
        let next = Arc::new(transition(&prev, action));
        *self.state.write() = next.clone();
        next
    }

    pub fn reader(&self) -> StoreReader {
        StoreReader {
            state: self.state.clone(),
        }
    }
}

/// Read-only view of the store for collaborators outside the bus
#[derive(Clone)]
pub struct StoreReader {
    state: Arc<RwLock<Arc<GameState>>>,
}

impl StoreReader {
    pub fn snapshot(&self) -> Arc<GameState> {
        self.state.read().clone()
    }

    pub fn player_count(&self) -> usize {
        self.state.read().players.len()
    }
}
