//! Headless PBFT simulation node
//!
//! Loads a TOML configuration, drives a [`pbftviz_consensus::SimulationEngine`]
//! from a wall-clock frame ticker and accepts line-oriented control commands.

pub mod commands;
pub mod config;
pub mod ticker;

pub use commands::{execute, status_line, ControlCommand};
pub use config::NodeConfig;
pub use ticker::{shared, SharedSimulation, SimulationTicker, TickerSummary};
