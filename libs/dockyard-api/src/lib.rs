//! HTTP API models for the dockyard panel

pub mod models;
