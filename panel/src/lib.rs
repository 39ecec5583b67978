//! Dockyard
//!
//! Builds git repositories into images with Cloud Native Buildpacks, runs
//! them behind Traefik and streams build output to live observers.

pub mod app;
pub mod broadcast;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod server;
pub mod storage;
pub mod utils;
