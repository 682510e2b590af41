//! Liquidity pricing sidecar
//!
//! Wires the in-memory registries, repricer and scheduler together and drives
//! them from a recorded sequence of blocks.

pub mod replay;
pub mod settings;
pub mod telemetry;

pub use replay::{Replay, ReplayReport, Scenario, ScenarioBlock};
pub use settings::SidecarConfig;
