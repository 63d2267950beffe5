//! Wiring of the bus, store and reactions

use std::time::Duration;

use super::bus::{ActionBus, BusHandle};
use super::combat::{CombatEngine, RandomPlacement, SpawnPlacement};
use super::model::Rules;
use super::movement::MovementEngine;
use super::session::SessionReaction;
use crate::util::time::SharedClock;

/// Tunables for one game pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub rules: Rules,
    /// Period of every movement ticker
    pub tick_interval: Duration,
    /// Seed for the default spawn placement; entropy when unset
    pub spawn_seed: Option<u64>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            rules: Rules::default(),
            tick_interval: Duration::from_millis(16),
            spawn_seed: None,
        }
    }
}

/// Build a ready-to-run bus with every reaction registered.
///
/// `placement` overrides the seeded random placement.
pub fn assemble(
    settings: PipelineSettings,
    clock: SharedClock,
    placement: Option<Box<dyn SpawnPlacement>>,
) -> (ActionBus, BusHandle) {
    let (mut bus, handle) = ActionBus::new(settings.rules);
    let scheduler = bus.scheduler();
    let placement =
        placement.unwrap_or_else(|| Box::new(RandomPlacement::new(settings.spawn_seed)));

    bus.register(Box::new(SessionReaction::new()));
    bus.register(Box::new(CombatEngine::new(
        clock.clone(),
        scheduler.clone(),
        placement,
    )));
    bus.register(Box::new(MovementEngine::new(
        clock,
        scheduler,
        settings.tick_interval,
    )));

    (bus, handle)
}
