//! Actions flowing through the bus
//!
//! An action is either a client intent (normalized by the gateway) or a fact
//! derived by the server. Each carries two explicit tags:
//!
//! - [`Origin`]: where it was produced. Only server-produced actions are ever
//!   replicated, so client intents can never bounce back to clients.
//! - [`Replication`]: which clients receive it once applied.

use serde::{Deserialize, Serialize};

use super::model::{Direction, Explosion, GameState, Player, PlayerId};

/// Provenance of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Server,
    #[default]
    Client,
    All,
}

/// Replication directive attached by the emitting reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Replication {
    /// Server-local, never sent
    #[default]
    None,
    /// Only the player the action is about
    Originator,
    /// Every connected client
    All,
    /// Every client except the player the action is about
    AllExceptOriginator,
}

impl Replication {
    pub fn delivers_to(self, originator: Option<PlayerId>, recipient: PlayerId) -> bool {
        match self {
            Replication::None => false,
            Replication::Originator => originator == Some(recipient),
            Replication::All => true,
            Replication::AllExceptOriginator => originator != Some(recipient),
        }
    }
}

/// Typed payloads. Serialized as `{"type": "MOVE_TO", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ActionKind {
    // Intents
    Join {
        player_id: PlayerId,
        name: String,
    },
    Leave {
        player_id: PlayerId,
    },
    MoveStartRequested {
        player_id: PlayerId,
        direction: Direction,
    },
    MoveStopRequested {
        player_id: PlayerId,
        direction: Direction,
    },
    ShotRequested {
        player_id: PlayerId,
    },
    DisconnectionRequested {
        player_id: PlayerId,
    },

    // Facts
    PlayerJoined {
        player: Player,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    GameStateChanged {
        player_id: PlayerId,
        state: GameState,
    },
    MoveStarted {
        player_id: PlayerId,
        direction: Direction,
        x: i32,
        y: i32,
    },
    MoveTo {
        player_id: PlayerId,
        direction: Direction,
        x: i32,
        y: i32,
    },
    MoveSync {
        player_id: PlayerId,
        direction: Direction,
        x: i32,
        y: i32,
    },
    MoveStopped {
        player_id: PlayerId,
        direction: Direction,
        x: i32,
        y: i32,
    },
    ShotFired {
        player_id: PlayerId,
    },
    ShotCooled {
        player_id: PlayerId,
    },
    Hit {
        hits: Vec<PlayerId>,
        shooter: PlayerId,
    },
    Spawn {
        player_id: PlayerId,
        x: i32,
        y: i32,
    },
    ExplosionAdded {
        explosion: Explosion,
    },
}

impl ActionKind {
    /// Wire name of the action type
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Join { .. } => "JOIN",
            ActionKind::Leave { .. } => "LEAVE",
            ActionKind::MoveStartRequested { .. } => "MOVE_START_REQUESTED",
            ActionKind::MoveStopRequested { .. } => "MOVE_STOP_REQUESTED",
            ActionKind::ShotRequested { .. } => "SHOT_REQUESTED",
            ActionKind::DisconnectionRequested { .. } => "DISCONNECTION_REQUESTED",
            ActionKind::PlayerJoined { .. } => "PLAYER_JOINED",
            ActionKind::PlayerLeft { .. } => "PLAYER_LEFT",
            ActionKind::GameStateChanged { .. } => "GAME_STATE_CHANGED",
            ActionKind::MoveStarted { .. } => "MOVE_STARTED",
            ActionKind::MoveTo { .. } => "MOVE_TO",
            ActionKind::MoveSync { .. } => "MOVE_SYNC",
            ActionKind::MoveStopped { .. } => "MOVE_STOPPED",
            ActionKind::ShotFired { .. } => "SHOT_FIRED",
            ActionKind::ShotCooled { .. } => "SHOT_COOLED",
            ActionKind::Hit { .. } => "HIT",
            ActionKind::Spawn { .. } => "SPAWN",
            ActionKind::ExplosionAdded { .. } => "EXPLOSION_ADDED",
        }
    }

    /// The player this action is about; the shooter for hits and blasts
    pub fn originator(&self) -> Option<PlayerId> {
        match self {
            ActionKind::Join { player_id, .. }
            | ActionKind::Leave { player_id }
            | ActionKind::MoveStartRequested { player_id, .. }
            | ActionKind::MoveStopRequested { player_id, .. }
            | ActionKind::ShotRequested { player_id }
            | ActionKind::DisconnectionRequested { player_id }
            | ActionKind::PlayerLeft { player_id }
            | ActionKind::GameStateChanged { player_id, .. }
            | ActionKind::MoveStarted { player_id, .. }
            | ActionKind::MoveTo { player_id, .. }
            | ActionKind::MoveSync { player_id, .. }
            | ActionKind::MoveStopped { player_id, .. }
            | ActionKind::ShotFired { player_id }
            | ActionKind::ShotCooled { player_id }
            | ActionKind::Spawn { player_id, .. } => Some(*player_id),
            ActionKind::PlayerJoined { player } => Some(player.id),
            ActionKind::Hit { shooter, .. } => Some(*shooter),
            ActionKind::ExplosionAdded { explosion } => Some(explosion.caused_by),
        }
    }

    pub fn is_intent(&self) -> bool {
        matches!(
            self,
            ActionKind::Join { .. }
                | ActionKind::Leave { .. }
                | ActionKind::MoveStartRequested { .. }
                | ActionKind::MoveStopRequested { .. }
                | ActionKind::ShotRequested { .. }
                | ActionKind::DisconnectionRequested { .. }
        )
    }
}

/// An action with its provenance and replication tags
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub origin: Origin,
    pub replication: Replication,
}

impl Action {
    /// Intent received from a client connection
    pub fn client(kind: ActionKind) -> Self {
        Self {
            kind,
            origin: Origin::Client,
            replication: Replication::None,
        }
    }

    /// Fact produced by a server reaction
    pub fn server(kind: ActionKind, replication: Replication) -> Self {
        Self {
            kind,
            origin: Origin::Server,
            replication,
        }
    }

    /// Server fact that stays on the server
    pub fn local(kind: ActionKind) -> Self {
        Self::server(kind, Replication::None)
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn originator(&self) -> Option<PlayerId> {
        self.kind.originator()
    }

    /// Whether the gateway should send this action anywhere at all
    pub fn is_replicated(&self) -> bool {
        self.origin != Origin::Client && self.replication != Replication::None
    }

    pub fn delivers_to(&self, recipient: PlayerId) -> bool {
        self.is_replicated() && self.replication.delivers_to(self.originator(), recipient)
    }
}
