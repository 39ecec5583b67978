//! Deployment pipeline and lifecycle

pub mod command;
pub mod engine;
pub mod executor;
pub mod fsm;
pub mod record;
pub mod registry;
pub mod relay;
pub mod service;
pub mod toolchain;
