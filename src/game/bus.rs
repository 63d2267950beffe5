//! Action bus: the single writer of the pipeline
//!
//! All inputs (client intents from the gateway, timer expirations from
//! scheduled processes) arrive on one channel as [`Envelope`]s. For each one the
//! bus drains a FIFO of actions: apply to the store, hand the post-mutation
//! snapshot to every reaction, append whatever they emit. A derived action is
//! therefore always applied after its cause, and a reaction never observes an
//! action before the store has.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::action::Action;
use super::model::{Direction, Explosion, GameState, PlayerId, Rules};
use super::store::{Store, StoreReader};

/// Inbound channel depth
const INBOX_CAPACITY: usize = 1024;
/// Broadcast depth for applied and replicated actions
const OUTBOX_CAPACITY: usize = 4096;

/// Timer expirations routed back to the reactions that scheduled them
#[derive(Debug, Clone, PartialEq)]
pub enum Timer {
    MoveTick {
        player_id: PlayerId,
        direction: Direction,
        process: u64,
    },
    SyncWindowClosed {
        player_id: PlayerId,
        window: u64,
    },
    ShotCooldown {
        player_id: PlayerId,
    },
    ExplosionResolve {
        explosion: Explosion,
    },
    Respawn {
        player_id: PlayerId,
    },
}

/// One unit of work for the bus
#[derive(Debug, Clone)]
pub enum Envelope {
    Action(Action),
    Timer(Timer),
}

/// Actions emitted by a reaction while handling one input
#[derive(Debug, Default)]
pub struct Effects {
    emitted: Vec<Action>,
}

impl Effects {
    pub fn emit(&mut self, action: Action) {
        self.emitted.push(action);
    }

    pub fn into_actions(self) -> Vec<Action> {
        self.emitted
    }

    fn drain(&mut self) -> std::vec::Drain<'_, Action> {
        self.emitted.drain(..)
    }
}

/// A process observing the action stream with a read-only snapshot
pub trait Reaction: Send {
    fn name(&self) -> &'static str;

    fn react(&mut self, action: &Action, state: &GameState, fx: &mut Effects);

    fn on_timer(&mut self, _timer: &Timer, _state: &GameState, _fx: &mut Effects) {}
}

/// Handle to a scheduled timer task
#[derive(Debug)]
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    /// Stop the task now; no further expirations are delivered
    pub fn cancel(self) {
        self.0.abort();
    }
}

/// Spawns timer tasks that post expirations back onto the bus
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::Sender<Envelope>,
}

impl Scheduler {
    /// Deliver `timer` once after `delay`
    pub fn after(&self, delay: Duration, timer: Timer) -> TimerHandle {
        let tx = self.tx.clone();
        TimerHandle(tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(Envelope::Timer(timer)).await;
        }))
    }

    /// Deliver `timer` every `period`, first delivery one period from now
    pub fn every(&self, period: Duration, timer: Timer) -> TimerHandle {
        let tx = self.tx.clone();
        let period = period.max(Duration::from_millis(1));
        TimerHandle(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                if tx.send(Envelope::Timer(timer.clone())).await.is_err() {
                    break;
                }
            }
        }))
    }
}

/// Bus errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("action bus is closed")]
    Closed,
}

/// Cloneable sender side used by the gateway
#[derive(Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BusHandle {
    pub async fn dispatch(&self, action: Action) -> Result<(), BusError> {
        self.tx
            .send(Envelope::Action(action))
            .await
            .map_err(|_| BusError::Closed)
    }
}

/// The single-writer loop owning the store and every reaction
pub struct ActionBus {
    store: Store,
    reactions: Vec<Box<dyn Reaction>>,
    tx: mpsc::Sender<Envelope>,
    rx: mpsc::Receiver<Envelope>,
    applied_tx: broadcast::Sender<Action>,
    replicated_tx: broadcast::Sender<Action>,
}

impl ActionBus {
    pub fn new(rules: Rules) -> (Self, BusHandle) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let (applied_tx, _) = broadcast::channel(OUTBOX_CAPACITY);
        let (replicated_tx, _) = broadcast::channel(OUTBOX_CAPACITY);

        let bus = Self {
            store: Store::new(rules),
            reactions: Vec::new(),
            tx: tx.clone(),
            rx,
            applied_tx,
            replicated_tx,
        };
        (bus, BusHandle { tx })
    }

    /// Register a reaction; reactions observe each action in registration order
    pub fn register(&mut self, reaction: Box<dyn Reaction>) {
        debug!(reaction = reaction.name(), "Reaction registered");
        self.reactions.push(reaction);
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler {
            tx: self.tx.clone(),
        }
    }

    pub fn store_reader(&self) -> StoreReader {
        self.store.reader()
    }

    /// Every action, in the order the store applied it
    pub fn subscribe_applied(&self) -> broadcast::Receiver<Action> {
        self.applied_tx.subscribe()
    }

    /// Sender side of the replicated stream, for the gateway to subscribe from
    pub fn replication(&self) -> broadcast::Sender<Action> {
        self.replicated_tx.clone()
    }

    /// Drive the pipeline. The bus holds a sender for its own scheduler, so
    /// this only returns if the inbox is closed from outside.
    pub async fn run(mut self) {
        info!(reactions = self.reactions.len(), "Action bus started");
        while let Some(envelope) = self.rx.recv().await {
            self.handle(envelope);
        }
        info!("Action bus stopped");
    }

    /// Process one envelope and everything it causes
    pub fn handle(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Action(action) => self.drain(VecDeque::from([action])),
            Envelope::Timer(timer) => {
                let state = self.store.snapshot();
                let mut fx = Effects::default();
                for reaction in &mut self.reactions {
                    reaction.on_timer(&timer, &state, &mut fx);
                }
                let queue: VecDeque<Action> = fx.drain().collect();
                self.drain(queue);
            }
        }
    }

    fn drain(&mut self, mut queue: VecDeque<Action>) {
        let mut fx = Effects::default();

        while let Some(action) = queue.pop_front() {
            let state = self.store.dispatch(&action);
            trace!(action = action.type_name(), "Applied");

            for reaction in &mut self.reactions {
                reaction.react(&action, &state, &mut fx);
            }
            queue.extend(fx.drain());

            self.publish(action);
        }
    }

    fn publish(&self, action: Action) {
        if action.is_replicated() {
            let _ = self.replicated_tx.send(action.clone());
        }
        let _ = self.applied_tx.send(action);
    }
}
