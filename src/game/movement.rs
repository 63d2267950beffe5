//! Movement engine - server-authoritative trajectories
//!
//! One process per (player, direction). A process starts on MOVE_STARTED and
//! ticks on its own timer; every tick recomputes the position from the start
//! time so a late tick never accumulates drift. Positions are broadcast through
//! a per-player trailing throttle as MOVE_SYNC.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::action::{Action, ActionKind, Replication};
use super::bus::{Effects, Reaction, Scheduler, Timer, TimerHandle};
use super::model::{Direction, GameState, PlayerId, Position};
use super::throttle::TrailingThrottle;
use crate::util::time::SharedClock;

/// A running trajectory
struct Trajectory {
    id: u64,
    started_at: Instant,
    start: Position,
    ticker: TimerHandle,
}

/// Latest position waiting for its sync window to close
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSync {
    direction: Direction,
    x: i32,
    y: i32,
}

pub struct MovementEngine {
    clock: SharedClock,
    scheduler: Scheduler,
    tick_interval: Duration,
    processes: HashMap<(PlayerId, Direction), Trajectory>,
    next_process: u64,
    sync: TrailingThrottle<PlayerId, PendingSync>,
}

impl MovementEngine {
    pub fn new(clock: SharedClock, scheduler: Scheduler, tick_interval: Duration) -> Self {
        Self {
            clock,
            scheduler,
            tick_interval,
            processes: HashMap::new(),
            next_process: 0,
            sync: TrailingThrottle::new(),
        }
    }

    /// Number of running trajectories
    pub fn active(&self) -> usize {
        self.processes.len()
    }

    pub fn is_moving(&self, player_id: PlayerId, direction: Direction) -> bool {
        self.processes.contains_key(&(player_id, direction))
    }

    /// Another direction of this player that is still running, if any
    fn remaining(&self, player_id: PlayerId) -> Option<Direction> {
        self.processes
            .keys()
            .find(|(id, _)| *id == player_id)
            .map(|(_, direction)| *direction)
    }

    /// Emit MOVE_STOPPED at (x, y). If the player still moves on the other
    /// axis, a local MOVE_TO in that direction follows so the store keeps
    /// the player marked as moving.
    fn emit_stopped(
        &self,
        player_id: PlayerId,
        direction: Direction,
        (x, y): Position,
        fx: &mut Effects,
    ) {
        fx.emit(Action::server(
            ActionKind::MoveStopped {
                player_id,
                direction,
                x,
                y,
            },
            Replication::All,
        ));
        if let Some(direction) = self.remaining(player_id) {
            fx.emit(Action::local(ActionKind::MoveTo {
                player_id,
                direction,
                x,
                y,
            }));
        }
    }

    fn request_start(
        &mut self,
        player_id: PlayerId,
        direction: Direction,
        state: &GameState,
        fx: &mut Effects,
    ) {
        if direction == Direction::None {
            debug!(player_id = %player_id, "Move start without direction dropped");
            return;
        }
        let Some(player) = state.alive_player(&player_id) else {
            debug!(player_id = %player_id, "Move start from absent or dead player dropped");
            return;
        };
        if self.is_moving(player_id, direction) {
            debug!(player_id = %player_id, ?direction, "Already moving");
            return;
        }

        // One process per axis: a reversal stops the running one first
        let reversed = direction.opposite();
        if self.cancel(player_id, reversed) {
            debug!(player_id = %player_id, from = ?reversed, to = ?direction, "Movement reversed");
            fx.emit(Action::server(
                ActionKind::MoveStopped {
                    player_id,
                    direction: reversed,
                    x: player.x,
                    y: player.y,
                },
                Replication::All,
            ));
        }

        fx.emit(Action::server(
            ActionKind::MoveStarted {
                player_id,
                direction,
                x: player.x,
                y: player.y,
            },
            Replication::All,
        ));
    }

    fn start(&mut self, player_id: PlayerId, direction: Direction, start: Position) {
        self.cancel(player_id, direction);

        self.next_process += 1;
        let id = self.next_process;
        let ticker = self.scheduler.every(
            self.tick_interval,
            Timer::MoveTick {
                player_id,
                direction,
                process: id,
            },
        );
        self.processes.insert(
            (player_id, direction),
            Trajectory {
                id,
                started_at: self.clock.now(),
                start,
                ticker,
            },
        );
    }

    fn request_stop(
        &mut self,
        player_id: PlayerId,
        direction: Direction,
        state: &GameState,
        fx: &mut Effects,
    ) {
        if !self.cancel(player_id, direction) {
            return;
        }
        let Some(player) = state.player(&player_id) else {
            return;
        };

        self.emit_stopped(player_id, direction, player.position(), fx);
    }

    fn tick(
        &mut self,
        player_id: PlayerId,
        direction: Direction,
        process: u64,
        state: &GameState,
        fx: &mut Effects,
    ) {
        let key = (player_id, direction);
        let Some(trajectory) = self.processes.get(&key).filter(|t| t.id == process) else {
            return;
        };
        let Some(player) = state.alive_player(&player_id) else {
            self.cancel(player_id, direction);
            return;
        };

        let rules = &state.rules;
        let elapsed = self.clock.now().saturating_duration_since(trajectory.started_at);
        let distance = rules.displacement(elapsed);
        let (dx, dy) = direction.step();
        let (x, y) = if direction.is_horizontal() {
            (trajectory.start.0.saturating_add(dx * distance), player.y)
        } else {
            (player.x, trajectory.start.1.saturating_add(dy * distance))
        };

        if !rules.contains(x, y) {
            let (x, y) = rules.clamp(x, y);
            self.cancel(player_id, direction);
            debug!(player_id = %player_id, ?direction, x, y, "Trajectory blocked at boundary");
            self.emit_stopped(player_id, direction, (x, y), fx);
            return;
        }

        if (x, y) != player.position() {
            fx.emit(Action::local(ActionKind::MoveTo {
                player_id,
                direction,
                x,
                y,
            }));
        }
    }

    /// Returns true if a process was running
    fn cancel(&mut self, player_id: PlayerId, direction: Direction) -> bool {
        match self.processes.remove(&(player_id, direction)) {
            Some(trajectory) => {
                trajectory.ticker.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&mut self, player_id: PlayerId) {
        let keys: Vec<_> = self
            .processes
            .keys()
            .filter(|(id, _)| *id == player_id)
            .copied()
            .collect();
        if !keys.is_empty() {
            debug!(player_id = %player_id, processes = keys.len(), "Movement cancelled");
        }
        for (id, direction) in keys {
            self.cancel(id, direction);
        }
    }

    fn offer_sync(&mut self, player_id: PlayerId, pending: PendingSync, state: &GameState) {
        if let Some(window) = self.sync.offer(player_id, pending) {
            // The handle is not kept: a stale close is rejected by window id
            let _ = self.scheduler.after(
                state.rules.sync_time(),
                Timer::SyncWindowClosed { player_id, window },
            );
        }
    }
}

impl Reaction for MovementEngine {
    fn name(&self) -> &'static str {
        "movement"
    }

    fn react(&mut self, action: &Action, state: &GameState, fx: &mut Effects) {
        match &action.kind {
            ActionKind::MoveStartRequested {
                player_id,
                direction,
            } => self.request_start(*player_id, *direction, state, fx),

            ActionKind::MoveStarted {
                player_id,
                direction,
                x,
                y,
            } => {
                if state.alive_player(player_id).is_some() {
                    self.start(*player_id, *direction, (*x, *y));
                }
            }

            ActionKind::MoveStopRequested {
                player_id,
                direction,
            } => self.request_stop(*player_id, *direction, state, fx),

            ActionKind::MoveTo {
                player_id,
                direction,
                x,
                y,
            } => self.offer_sync(
                *player_id,
                PendingSync {
                    direction: *direction,
                    x: *x,
                    y: *y,
                },
                state,
            ),

            ActionKind::MoveStopped { player_id, .. } => self.sync.discard(player_id),

            ActionKind::DisconnectionRequested { player_id }
            | ActionKind::Leave { player_id }
            | ActionKind::PlayerLeft { player_id } => {
                self.cancel_all(*player_id);
                self.sync.forget(player_id);
            }

            ActionKind::Hit { hits, .. } => {
                for id in hits {
                    self.cancel_all(*id);
                    self.sync.discard(id);
                }
            }

            ActionKind::Spawn { player_id, .. } => {
                self.cancel_all(*player_id);
                self.sync.discard(player_id);
            }

            _ => {}
        }
    }

    fn on_timer(&mut self, timer: &Timer, state: &GameState, fx: &mut Effects) {
        match timer {
            Timer::MoveTick {
                player_id,
                direction,
                process,
            } => self.tick(*player_id, *direction, *process, state, fx),

            Timer::SyncWindowClosed { player_id, window } => {
                let Some(pending) = self.sync.close(player_id, *window) else {
                    return;
                };
                if state.alive_player(player_id).is_none() {
                    return;
                }
                fx.emit(Action::server(
                    ActionKind::MoveSync {
                        player_id: *player_id,
                        direction: pending.direction,
                        x: pending.x,
                        y: pending.y,
                    },
                    Replication::All,
                ));
            }

            _ => {}
        }
    }
}
