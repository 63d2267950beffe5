//! HTTP surface: health check and the WebSocket upgrade route

pub mod routes;

pub use routes::build_router;
