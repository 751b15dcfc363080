// src/lib.rs

pub mod apps;
pub mod bridge;
pub mod cleaner;
pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod orchestrator;
pub mod router;
pub mod scheduler;
pub mod telemetry;
pub mod tweaks;
pub mod utils;
