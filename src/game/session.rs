//! Join and leave announcements

use std::collections::HashSet;

use tracing::info;

use super::action::{Action, ActionKind, Replication};
use super::bus::{Effects, Reaction};
use super::model::{GameState, PlayerId};

/// Announces players to everyone once they are placed, and their departure
#[derive(Default)]
pub struct SessionReaction {
    announced: HashSet<PlayerId>,
}

impl SessionReaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// `present` is whether the store still holds the player after the
    /// departing action; unannounced players still need removing then.
    fn depart(&mut self, player_id: PlayerId, present: bool, fx: &mut Effects) {
        let announced = self.announced.remove(&player_id);
        if announced || present {
            info!(player_id = %player_id, "Player left");
            fx.emit(Action::server(
                ActionKind::PlayerLeft { player_id },
                Replication::AllExceptOriginator,
            ));
        }
    }
}

impl Reaction for SessionReaction {
    fn name(&self) -> &'static str {
        "session"
    }

    fn react(&mut self, action: &Action, state: &GameState, fx: &mut Effects) {
        match &action.kind {
            ActionKind::Spawn { player_id, .. } => {
                if self.announced.contains(player_id) {
                    return;
                }
                let Some(player) = state.alive_player(player_id) else {
                    return;
                };

                self.announced.insert(*player_id);
                info!(player_id = %player_id, name = %player.name, x = player.x, y = player.y, "Player joined");
                fx.emit(Action::server(
                    ActionKind::PlayerJoined {
                        player: player.clone(),
                    },
                    Replication::All,
                ));
                fx.emit(Action::server(
                    ActionKind::GameStateChanged {
                        player_id: *player_id,
                        state: state.clone(),
                    },
                    Replication::Originator,
                ));
            }

            ActionKind::Leave { player_id } | ActionKind::DisconnectionRequested { player_id } => {
                let present = state.player(player_id).is_some();
                self.depart(*player_id, present, fx)
            }

            _ => {}
        }
    }
}
