//! Pipeline scenarios driven through the public bus handle
//!
//! Every test runs on a paused tokio clock so reload, sync and respawn windows
//! elapse exactly and instantly.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_test::assert_ok;
use uuid::Uuid;

use arena_server::game::combat::SpawnPlacement;
use arena_server::game::{
    assemble, Action, ActionKind, BusHandle, Direction, GameState, PipelineSettings, PlayerId,
    Replication, Rules, StoreReader,
};
use arena_server::util::time::{millis, TokioClock};

/// Places players at scripted cells, in join/respawn order
struct Scripted(VecDeque<(i32, i32)>);

impl SpawnPlacement for Scripted {
    fn place(&mut self, _rules: &Rules, _state: &GameState) -> (i32, i32) {
        self.0.pop_front().unwrap_or((400, 300))
    }
}

struct Arena {
    handle: BusHandle,
    applied: broadcast::Receiver<Action>,
    replicated: broadcast::Receiver<Action>,
    store: StoreReader,
}

impl Arena {
    fn start(rules: Rules, cells: &[(i32, i32)]) -> Self {
        let settings = PipelineSettings {
            rules,
            tick_interval: millis(16),
            spawn_seed: Some(1),
        };
        let placement: Box<dyn SpawnPlacement> = Box::new(Scripted(cells.iter().copied().collect()));
        let (bus, handle) = assemble(settings, Arc::new(TokioClock), Some(placement));

        let applied = bus.subscribe_applied();
        let replicated = bus.replication().subscribe();
        let store = bus.store_reader();
        tokio::spawn(bus.run());

        Self {
            handle,
            applied,
            replicated,
            store,
        }
    }

    async fn send(&self, kind: ActionKind) {
        assert_ok!(self.handle.dispatch(Action::client(kind)).await);
    }

    /// Join and wait until the player is announced
    async fn join(&mut self) -> PlayerId {
        let id = Uuid::new_v4();
        self.send(ActionKind::Join {
            player_id: id,
            name: "scenario".into(),
        })
        .await;
        self.expect(|a| matches!(&a.kind, ActionKind::PlayerJoined { player } if player.id == id))
            .await;
        id
    }

    /// Face a direction without moving: start then stop on a frozen trajectory
    async fn face(&mut self, id: PlayerId, direction: Direction) {
        self.send(ActionKind::MoveStartRequested {
            player_id: id,
            direction,
        })
        .await;
        self.send(ActionKind::MoveStopRequested {
            player_id: id,
            direction,
        })
        .await;
        self.expect(|a| matches!(a.kind, ActionKind::MoveStopped { player_id, .. } if player_id == id))
            .await;
    }

    async fn expect(&mut self, pred: impl Fn(&Action) -> bool) -> Action {
        match next_matching(&mut self.applied, Duration::from_secs(10), pred).await {
            Some(action) => action,
            None => panic!("expected action never applied"),
        }
    }

    /// Everything applied so far without waiting
    fn drain(&mut self) -> Vec<Action> {
        let mut seen = Vec::new();
        loop {
            match self.applied.try_recv() {
                Ok(action) => seen.push(action),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return seen,
            }
        }
    }

    fn snapshot(&self) -> Arc<GameState> {
        self.store.snapshot()
    }
}

async fn next_matching(
    rx: &mut broadcast::Receiver<Action>,
    within: Duration,
    pred: impl Fn(&Action) -> bool,
) -> Option<Action> {
    timeout(within, async {
        loop {
            match rx.recv().await {
                Ok(action) if pred(&action) => return Some(action),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Rules where a started trajectory never advances
fn frozen_rules() -> Rules {
    Rules {
        move_time_ms: 3_600_000,
        ..Rules::default()
    }
}

fn hits_of(action: &Action) -> Option<(Vec<PlayerId>, PlayerId)> {
    match &action.kind {
        ActionKind::Hit { hits, shooter } => Some((hits.clone(), *shooter)),
        _ => None,
    }
}

mod combat_scenarios {
    use super::*;

    /// A faces right and shoots B on the same row; B dies and respawns later
    #[tokio::test(start_paused = true)]
    async fn shot_hits_and_target_respawns_after_respawn_time() {
        let rules = Rules {
            explosion_size: 0,
            respawn_time_ms: 3000,
            ..frozen_rules()
        };
        let mut arena = Arena::start(rules, &[(0, 5), (10, 5), (50, 50)]);
        let a = arena.join().await;
        let b = arena.join().await;
        arena.face(a, Direction::Right).await;

        arena.send(ActionKind::ShotRequested { player_id: a }).await;
        arena
            .expect(|x| matches!(x.kind, ActionKind::ShotFired { player_id } if player_id == a))
            .await;
        let hit = arena.expect(|x| hits_of(x).is_some()).await;
        assert_eq!(hits_of(&hit), Some((vec![b], a)));
        assert_eq!(hit.replication, Replication::All);

        let hit_at = Instant::now();
        assert!(!arena.snapshot().players[&b].alive);
        assert!(arena.snapshot().players[&a].alive);

        let spawn = arena
            .expect(|x| matches!(x.kind, ActionKind::Spawn { player_id, .. } if player_id == b))
            .await;
        assert!(Instant::now() - hit_at >= millis(3000));
        assert_eq!(spawn.replication, Replication::All);

        let b_now = arena.snapshot().players[&b].clone();
        assert!(b_now.alive);
        assert_eq!(b_now.position(), (50, 50));
    }

    /// T is hit directly, N is caught by T's splash, F is out of reach
    #[tokio::test(start_paused = true)]
    async fn splash_chain_catches_neighbours_only() {
        let rules = Rules {
            explosion_size: 10,
            respawn_time_ms: 60_000,
            ..frozen_rules()
        };
        let mut arena = Arena::start(rules, &[(0, 20), (20, 20), (20, 24), (20, 30)]);
        let shooter = arena.join().await;
        let t = arena.join().await;
        let n = arena.join().await;
        let f = arena.join().await;
        arena.face(shooter, Direction::Right).await;

        arena.send(ActionKind::ShotRequested { player_id: shooter }).await;

        let primary = arena.expect(|x| hits_of(x).is_some()).await;
        assert_eq!(hits_of(&primary), Some((vec![t], shooter)));

        let explosion = arena
            .expect(|x| matches!(x.kind, ActionKind::ExplosionAdded { .. }))
            .await;
        match explosion.kind {
            ActionKind::ExplosionAdded { explosion } => {
                assert_eq!((explosion.x, explosion.y), (20, 20));
                assert_eq!(explosion.caused_by, shooter);
            }
            _ => unreachable!(),
        }

        let secondary = arena.expect(|x| hits_of(x).is_some()).await;
        assert_eq!(hits_of(&secondary), Some((vec![n], shooter)));

        // let N's own explosion resolve too
        sleep(millis(500)).await;
        for action in arena.drain() {
            if let Some((hits, _)) = hits_of(&action) {
                assert!(!hits.contains(&f), "far player was caught");
            }
        }

        let state = arena.snapshot();
        assert!(!state.players[&t].alive);
        assert!(!state.players[&n].alive);
        assert!(state.players[&f].alive);
        assert!(state.players[&shooter].alive);
    }

    /// Ten requests inside one reload window fire once
    #[tokio::test(start_paused = true)]
    async fn fire_requests_are_throttled_by_reload_time() {
        let rules = Rules {
            reload_time_ms: 300,
            ..frozen_rules()
        };
        let mut arena = Arena::start(rules, &[(0, 0)]);
        let a = arena.join().await;
        arena.drain();

        let started = Instant::now();
        for _ in 0..10 {
            arena.send(ActionKind::ShotRequested { player_id: a }).await;
            sleep(millis(5)).await;
        }
        sleep(millis(10)).await;

        let fired = arena
            .drain()
            .iter()
            .filter(|x| matches!(x.kind, ActionKind::ShotFired { .. }))
            .count();
        assert_eq!(fired, 1);

        sleep_until(started + millis(300)).await;
        arena.send(ActionKind::ShotRequested { player_id: a }).await;
        arena
            .expect(|x| matches!(x.kind, ActionKind::ShotFired { .. }))
            .await;
    }

    /// The weapon reloads for the shooter only
    #[tokio::test(start_paused = true)]
    async fn cooldown_reaches_only_the_shooter() {
        let mut arena = Arena::start(frozen_rules(), &[(0, 0), (40, 40)]);
        let a = arena.join().await;
        let b = arena.join().await;

        arena.send(ActionKind::ShotRequested { player_id: a }).await;
        let cooled = arena
            .expect(|x| matches!(x.kind, ActionKind::ShotCooled { .. }))
            .await;
        assert_eq!(cooled.replication, Replication::Originator);
        assert!(cooled.delivers_to(a));
        assert!(!cooled.delivers_to(b));
        assert!(arena.snapshot().players[&a].weapon_loaded);
    }
}

mod movement_scenarios {
    use super::*;

    /// Moving left from the edge pins at x = 0 without any MOVE_TO beyond it
    #[tokio::test(start_paused = true)]
    async fn walking_into_the_wall_pins_at_the_boundary() {
        let mut arena = Arena::start(Rules::default(), &[(0, 0)]);
        let a = arena.join().await;
        arena.drain();

        arena
            .send(ActionKind::MoveStartRequested {
                player_id: a,
                direction: Direction::Left,
            })
            .await;
        let stopped = arena
            .expect(|x| matches!(x.kind, ActionKind::MoveStopped { .. }))
            .await;
        assert!(matches!(stopped.kind, ActionKind::MoveStopped { x: 0, y: 0, .. }));
        assert_eq!(stopped.replication, Replication::All);

        sleep(millis(200)).await;
        for action in arena.drain() {
            if let ActionKind::MoveTo { x, .. } = action.kind {
                assert!(x >= 0);
            }
        }
        let player = arena.snapshot().players[&a].clone();
        assert_eq!(player.position(), (0, 0));
        assert!(!player.is_moving);
    }

    /// Once MOVE_STOPPED is applied, the player never moves again
    #[tokio::test(start_paused = true)]
    async fn no_move_to_after_a_matched_stop() {
        let mut arena = Arena::start(Rules::default(), &[(100, 100)]);
        let a = arena.join().await;

        arena
            .send(ActionKind::MoveStartRequested {
                player_id: a,
                direction: Direction::Right,
            })
            .await;
        sleep(millis(100)).await;
        arena
            .send(ActionKind::MoveStopRequested {
                player_id: a,
                direction: Direction::Right,
            })
            .await;
        arena
            .expect(|x| matches!(x.kind, ActionKind::MoveStopped { .. }))
            .await;
        let pinned = arena.snapshot().players[&a].position();
        assert!(pinned.0 > 100);

        sleep(millis(300)).await;
        let after = arena.drain();
        assert!(after
            .iter()
            .all(|x| !matches!(x.kind, ActionKind::MoveTo { .. })));
        assert_eq!(arena.snapshot().players[&a].position(), pinned);
    }

    /// Positions reach clients only as throttled MOVE_SYNC carrying the latest value
    #[tokio::test(start_paused = true)]
    async fn move_sync_coalesces_and_move_to_stays_local() {
        let mut arena = Arena::start(Rules::default(), &[(100, 100)]);
        let a = arena.join().await;

        arena
            .send(ActionKind::MoveStartRequested {
                player_id: a,
                direction: Direction::Down,
            })
            .await;

        let mut moves = 0;
        let mut last = None;
        let sync = loop {
            let action = arena
                .expect(|x| {
                    matches!(x.kind, ActionKind::MoveTo { .. } | ActionKind::MoveSync { .. })
                })
                .await;
            match action.kind {
                ActionKind::MoveTo { x, y, .. } => {
                    assert_eq!(action.replication, Replication::None);
                    moves += 1;
                    last = Some((x, y));
                }
                ActionKind::MoveSync { x, y, .. } => break (x, y),
                _ => unreachable!(),
            }
        };
        assert!(moves > 1);
        assert_eq!(Some(sync), last);

        let mut replicated = Vec::new();
        while let Ok(action) = arena.replicated.try_recv() {
            replicated.push(action);
        }
        assert!(replicated
            .iter()
            .all(|x| !matches!(x.kind, ActionKind::MoveTo { .. } | ActionKind::Spawn { .. })));
        assert!(replicated
            .iter()
            .any(|x| matches!(x.kind, ActionKind::MoveSync { .. })));
    }

    /// Disconnecting stops every trajectory and removes the player
    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_movement_and_announces_departure() {
        let mut arena = Arena::start(Rules::default(), &[(100, 100), (300, 300)]);
        let a = arena.join().await;
        let b = arena.join().await;

        for direction in [Direction::Right, Direction::Down] {
            arena
                .send(ActionKind::MoveStartRequested {
                    player_id: a,
                    direction,
                })
                .await;
        }
        sleep(millis(50)).await;
        arena
            .send(ActionKind::DisconnectionRequested { player_id: a })
            .await;
        let left = arena
            .expect(|x| matches!(x.kind, ActionKind::PlayerLeft { player_id } if player_id == a))
            .await;
        assert_eq!(left.replication, Replication::AllExceptOriginator);
        assert!(left.delivers_to(b));
        assert!(!left.delivers_to(a));

        sleep(millis(300)).await;
        let after = arena.drain();
        assert!(after.iter().all(|x| x.originator() != Some(a)));
        assert!(arena.snapshot().player(&a).is_none());
        assert_eq!(arena.store.player_count(), 1);
    }

    /// Turning around without a stop replaces the running trajectory
    #[tokio::test(start_paused = true)]
    async fn reversing_direction_moves_monotonically() {
        let mut arena = Arena::start(Rules::default(), &[(400, 300)]);
        let a = arena.join().await;

        arena
            .send(ActionKind::MoveStartRequested {
                player_id: a,
                direction: Direction::Left,
            })
            .await;
        sleep(millis(200)).await;
        arena
            .send(ActionKind::MoveStartRequested {
                player_id: a,
                direction: Direction::Right,
            })
            .await;

        let stopped = arena
            .expect(|x| {
                matches!(x.kind, ActionKind::MoveStopped { player_id, direction: Direction::Left, .. } if player_id == a)
            })
            .await;
        let turned_at = match stopped.kind {
            ActionKind::MoveStopped { x, .. } => x,
            _ => unreachable!(),
        };
        assert!(turned_at < 400);
        arena
            .expect(|x| {
                matches!(x.kind, ActionKind::MoveStarted { player_id, direction: Direction::Right, .. } if player_id == a)
            })
            .await;

        sleep(millis(500)).await;
        let xs: Vec<i32> = arena
            .drain()
            .into_iter()
            .filter_map(|action| match action.kind {
                ActionKind::MoveTo { player_id, direction, x, .. } if player_id == a => {
                    assert_eq!(direction, Direction::Right);
                    Some(x)
                }
                _ => None,
            })
            .collect();
        assert!(!xs.is_empty());
        assert!(xs.windows(2).all(|w| w[0] < w[1]));
        assert!(xs[0] > turned_at);
        assert_eq!(arena.snapshot().players[&a].x, xs[xs.len() - 1]);
    }
}

mod session_scenarios {
    use super::*;

    /// A player whose placement failed is never announced but still leaves the store
    #[tokio::test(start_paused = true)]
    async fn unplaced_player_is_removed_on_disconnect() {
        let mut arena = Arena::start(Rules::default(), &[(-5, -5)]);
        let id = Uuid::new_v4();
        arena
            .send(ActionKind::Join {
                player_id: id,
                name: "lost".into(),
            })
            .await;
        arena
            .expect(|x| matches!(x.kind, ActionKind::Spawn { player_id, .. } if player_id == id))
            .await;
        assert!(!arena.snapshot().players[&id].alive);

        arena
            .send(ActionKind::DisconnectionRequested { player_id: id })
            .await;
        arena
            .expect(|x| matches!(x.kind, ActionKind::PlayerLeft { player_id } if player_id == id))
            .await;
        assert!(arena.snapshot().player(&id).is_none());
        assert_eq!(arena.store.player_count(), 0);
    }

    /// Joining announces the placed player and hands the newcomer the full state
    #[tokio::test(start_paused = true)]
    async fn join_announces_and_sends_state_to_newcomer() {
        let mut arena = Arena::start(Rules::default(), &[(30, 40)]);
        let id = Uuid::new_v4();
        arena
            .send(ActionKind::Join {
                player_id: id,
                name: "neo".into(),
            })
            .await;

        let joined = next_matching(&mut arena.replicated, Duration::from_secs(1), |x| {
            matches!(x.kind, ActionKind::PlayerJoined { .. })
        })
        .await;
        match joined.map(|x| x.kind) {
            Some(ActionKind::PlayerJoined { player }) => {
                assert_eq!(player.id, id);
                assert_eq!(player.position(), (30, 40));
                assert_eq!(player.name, "neo");
            }
            other => panic!("unexpected {other:?}"),
        }

        let state = next_matching(&mut arena.replicated, Duration::from_secs(1), |x| {
            matches!(x.kind, ActionKind::GameStateChanged { .. })
        })
        .await;
        let state = state.map(|x| (x.replication, x.delivers_to(id)));
        assert_eq!(state, Some((Replication::Originator, true)));
    }

    /// Actions from clients never come back out of the replication stream
    #[tokio::test(start_paused = true)]
    async fn client_intents_are_never_replicated() {
        let mut arena = Arena::start(Rules::default(), &[(0, 0)]);
        let a = arena.join().await;
        arena.send(ActionKind::ShotRequested { player_id: a }).await;
        arena
            .expect(|x| matches!(x.kind, ActionKind::ShotFired { .. }))
            .await;

        while let Ok(action) = arena.replicated.try_recv() {
            assert!(!action.kind.is_intent());
        }
    }
}
