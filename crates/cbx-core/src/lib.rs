//! # cbx-core
//!
//! Core crate for the CBX trading engine, providing:
//!
//! - **Types** (`types`) — fixed-point book events, orders, symbol packing
//! - **Ring buffer** (`ring`) — lock-free SPSC queue connecting the stages
//! - **Fixed point** (`fixed`) — 1e-8 scale parsing and formatting
//! - **Configuration** (`config`) — JSON config deserialization
//! - **Error types** (`error`) — domain-specific `CbxError` via thiserror
//! - **CPU pinning** (`pin`) — thread-to-core binding for the hot stages
//! - **Latency** (`latency`) — histogram-based latency statistics
//! - **Time utilities** (`time_util`) — high-precision timestamps
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod fixed;
pub mod latency;
pub mod logging;
pub mod pin;
pub mod ring;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
