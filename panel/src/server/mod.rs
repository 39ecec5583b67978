//! HTTP and WebSocket surface

pub mod handlers;
pub mod observer;
pub mod serve;
pub mod state;
