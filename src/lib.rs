//! Arena Server - authoritative action pipeline for a top-down arena shooter
//!
//! Client intents enter a single-writer action bus, are applied to the
//! canonical state store, and drive the movement and combat engines. Derived
//! facts are tagged with a replication directive and fanned out over
//! WebSockets by the gateway.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
