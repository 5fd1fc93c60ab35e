//! # cbx-strategy
//!
//! The strategy stage of the CBX engine:
//!
//! - **Order book** (`book`) — dense bitmap-indexed L2 book with O(1)
//!   best-price maintenance and the OFI signal
//! - **Signal** (`signal`) — integer EWMA smoothing of raw OFI
//! - **Quoting** (`quote`) — fixed-point quote arithmetic with inventory skew
//! - **Engine** (`engine`) — the pinned consumer thread: applies events,
//!   runs the market-making state machine, emits orders
//!
//! The stage consumes [`cbx_core::BookEvent`]s from the feed ring and
//! produces [`cbx_core::Order`]s into the execution ring.

pub mod book;
pub mod engine;
pub mod quote;
pub mod signal;

pub use book::DenseBook;
pub use engine::{MakerState, StrategyCore, StrategyEngine};
