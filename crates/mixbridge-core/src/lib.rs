//! Mixbridge Core - control/real-time bridge for effect chains and vinyl control

pub mod config;
pub mod control;
pub mod types;
pub mod engine;
pub mod effects;
pub mod vinyl;
pub mod violation;

pub use types::*;
