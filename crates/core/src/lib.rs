//! Core types and utilities for the liquidity pricing pipeline
//!
//! This crate provides shared types used across all components:
//! - Coins, denoms and fixed-point decimals
//! - Token valuation records and pool liquidity snapshots
//! - Per-block liquidity metadata produced by ingestion
//! - Collaborator traits (price source, pool registry, scaling factors, listeners)
//! - Configuration and error types

pub mod types;
pub mod decimal;
pub mod tokens;
pub mod pools;
pub mod ingest;
pub mod pricing;
pub mod collaborators;
pub mod config;
pub mod errors;

pub use types::*;
pub use decimal::*;
pub use tokens::*;
pub use pools::*;
pub use ingest::*;
pub use pricing::*;
pub use collaborators::*;
pub use config::*;
pub use errors::*;

pub use ruint::aliases::U256;
