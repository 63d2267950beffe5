//! Combat engine - fire throttling, hit-scan, splash, cooldown and respawn

use std::collections::HashSet;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};
use uuid::Uuid;

use super::action::{Action, ActionKind, Replication};
use super::bus::{Effects, Reaction, Scheduler, Timer};
use super::model::{Direction, Explosion, GameState, PlayerId, Position, Rules};
use super::throttle::LeadingThrottle;
use crate::util::time::{millis, SharedClock};

/// Delay between an explosion appearing and its splash being resolved
pub const EXPLOSION_PROPAGATION_DELAY: Duration = millis(100);

/// Attempts at finding a free cell before accepting an occupied one
const PLACEMENT_ATTEMPTS: usize = 16;

/// Chooses where a player (re)appears
pub trait SpawnPlacement: Send {
    fn place(&mut self, rules: &Rules, state: &GameState) -> Position;
}

/// Random cell on the movement grid, avoiding alive players when it can
pub struct RandomPlacement {
    rng: ChaCha8Rng,
}

impl RandomPlacement {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self { rng }
    }

    fn cell(&mut self, rules: &Rules) -> Position {
        let step = rules.move_distance.max(1);
        let max_x = (rules.world_width - 1).max(0) / step;
        let max_y = (rules.world_height - 1).max(0) / step;
        (
            self.rng.gen_range(0..=max_x) * step,
            self.rng.gen_range(0..=max_y) * step,
        )
    }
}

impl SpawnPlacement for RandomPlacement {
    fn place(&mut self, rules: &Rules, state: &GameState) -> Position {
        let mut cell = self.cell(rules);
        for _ in 0..PLACEMENT_ATTEMPTS {
            if !state.alive_players().any(|p| p.position() == cell) {
                break;
            }
            cell = self.cell(rules);
        }
        cell
    }
}

/// Whether a shot fired from `shooter` towards `direction` hits `target`.
///
/// The target must share the perpendicular coordinate and lie strictly past
/// the shooter along the firing axis. A target on the shooter's own cell is
/// never hit, and a shooter without a facing hits nothing.
pub fn is_hit(shooter: Position, direction: Direction, target: Position) -> bool {
    let (sx, sy) = shooter;
    let (tx, ty) = target;
    match direction {
        Direction::Left => ty == sy && tx < sx,
        Direction::Right => ty == sy && tx > sx,
        Direction::Up => tx == sx && ty < sy,
        Direction::Down => tx == sx && ty > sy,
        Direction::None => false,
    }
}

/// Alive players hit by `shooter_id` firing from its current position, in id order
pub fn scan(state: &GameState, shooter_id: &PlayerId) -> Vec<PlayerId> {
    let Some(shooter) = state.player(shooter_id) else {
        return Vec::new();
    };
    state
        .alive_players()
        .filter(|p| p.id != *shooter_id)
        .filter(|p| is_hit(shooter.position(), shooter.direction, p.position()))
        .map(|p| p.id)
        .collect()
}

pub struct CombatEngine {
    scheduler: Scheduler,
    fire: LeadingThrottle<PlayerId>,
    placement: Box<dyn SpawnPlacement>,
    pending_respawns: HashSet<PlayerId>,
}

impl CombatEngine {
    pub fn new(clock: SharedClock, scheduler: Scheduler, placement: Box<dyn SpawnPlacement>) -> Self {
        Self {
            scheduler,
            fire: LeadingThrottle::new(clock),
            placement,
            pending_respawns: HashSet::new(),
        }
    }

    fn spawn(&mut self, player_id: PlayerId, state: &GameState, replication: Replication) -> Action {
        let (x, y) = self.placement.place(&state.rules, state);
        Action::server(ActionKind::Spawn { player_id, x, y }, replication)
    }

    fn request_shot(&mut self, player_id: PlayerId, state: &GameState, fx: &mut Effects) {
        if state.alive_player(&player_id).is_none() {
            debug!(player_id = %player_id, "Shot from absent or dead player dropped");
            return;
        }
        if !self.fire.admit(player_id, state.rules.reload_time()) {
            debug!(player_id = %player_id, "Shot throttled");
            return;
        }
        fx.emit(Action::server(
            ActionKind::ShotFired { player_id },
            Replication::All,
        ));
    }

    fn shot_fired(&mut self, player_id: PlayerId, state: &GameState, fx: &mut Effects) {
        let _ = self
            .scheduler
            .after(state.rules.reload_time(), Timer::ShotCooldown { player_id });

        let hits = scan(state, &player_id);
        if !hits.is_empty() {
            info!(shooter = %player_id, hits = hits.len(), "Shot hit");
            fx.emit(Action::server(
                ActionKind::Hit {
                    hits,
                    shooter: player_id,
                },
                Replication::All,
            ));
        }
    }

    fn hit(&mut self, hits: &[PlayerId], shooter: PlayerId, state: &GameState, fx: &mut Effects) {
        for id in hits {
            let Some(player) = state.player(id) else {
                continue;
            };

            fx.emit(Action::server(
                ActionKind::ExplosionAdded {
                    explosion: Explosion {
                        id: Uuid::new_v4(),
                        x: player.x,
                        y: player.y,
                        size: state.rules.explosion_size,
                        caused_by: shooter,
                    },
                },
                Replication::All,
            ));

            if self.pending_respawns.insert(*id) {
                let _ = self
                    .scheduler
                    .after(state.rules.respawn_time(), Timer::Respawn { player_id: *id });
            }
        }
    }

    fn resolve_explosion(&self, explosion: &Explosion, state: &GameState, fx: &mut Effects) {
        let caught: Vec<PlayerId> = state
            .alive_players()
            .filter(|p| explosion.catches(p.x, p.y))
            .map(|p| p.id)
            .collect();
        if caught.is_empty() {
            return;
        }

        debug!(explosion = %explosion.id, caught = caught.len(), "Splash caught players");
        fx.emit(Action::server(
            ActionKind::Hit {
                hits: caught,
                shooter: explosion.caused_by,
            },
            Replication::All,
        ));
    }

    fn respawn(&mut self, player_id: PlayerId, state: &GameState, fx: &mut Effects) {
        self.pending_respawns.remove(&player_id);
        match state.player(&player_id) {
            Some(player) if !player.alive => {
                let spawn = self.spawn(player_id, state, Replication::All);
                fx.emit(spawn);
            }
            Some(_) => {}
            None => debug!(player_id = %player_id, "Respawn skipped, player left"),
        }
    }
}

impl Reaction for CombatEngine {
    fn name(&self) -> &'static str {
        "combat"
    }

    fn react(&mut self, action: &Action, state: &GameState, fx: &mut Effects) {
        match &action.kind {
            ActionKind::Join { player_id, .. } => {
                let waiting = state.player(player_id).is_some_and(|p| !p.alive);
                if waiting && !self.pending_respawns.contains(player_id) {
                    let spawn = self.spawn(*player_id, state, Replication::None);
                    fx.emit(spawn);
                }
            }

            ActionKind::ShotRequested { player_id } => self.request_shot(*player_id, state, fx),

            ActionKind::ShotFired { player_id } => self.shot_fired(*player_id, state, fx),

            ActionKind::Hit { hits, shooter } => self.hit(hits, *shooter, state, fx),

            ActionKind::ExplosionAdded { explosion } => {
                let _ = self.scheduler.after(
                    EXPLOSION_PROPAGATION_DELAY,
                    Timer::ExplosionResolve {
                        explosion: explosion.clone(),
                    },
                );
            }

            ActionKind::Leave { player_id }
            | ActionKind::DisconnectionRequested { player_id }
            | ActionKind::PlayerLeft { player_id } => {
                self.fire.forget(player_id);
                self.pending_respawns.remove(player_id);
            }

            _ => {}
        }
    }

    fn on_timer(&mut self, timer: &Timer, state: &GameState, fx: &mut Effects) {
        match timer {
            Timer::ShotCooldown { player_id } => {
                if state.player(player_id).is_some() {
                    fx.emit(Action::server(
                        ActionKind::ShotCooled {
                            player_id: *player_id,
                        },
                        Replication::Originator,
                    ));
                }
            }
            Timer::ExplosionResolve { explosion } => self.resolve_explosion(explosion, state, fx),
            Timer::Respawn { player_id } => self.respawn(*player_id, state, fx),
            _ => {}
        }
    }
}
