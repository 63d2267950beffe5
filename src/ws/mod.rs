//! WebSocket replication gateway

pub mod handler;
pub mod protocol;
