//! Game core: action bus, state store and the reactions driving the arena

pub mod action;
pub mod bus;
pub mod combat;
pub mod model;
pub mod movement;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod throttle;

pub use action::{Action, ActionKind, Origin, Replication};
pub use bus::{ActionBus, BusError, BusHandle};
pub use model::{Direction, Explosion, GameState, Player, PlayerId, Rules};
pub use pipeline::{assemble, PipelineSettings};
pub use store::StoreReader;
