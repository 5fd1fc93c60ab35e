//! # cbx-feed
//!
//! The feed stage of the CBX engine: everything between the exchange
//! WebSocket and the book-event ring.
//!
//! - **Decoding** (`decode`) — raw JSON frames into typed channel messages,
//!   with ASCII-decimal → fixed-point conversion
//! - **Session** (`session`) — sequence-gap detection and the
//!   snapshot-before-delta synchronization state machine; publishes
//!   [`cbx_core::BookEvent`]s with spin-on-full
//! - **Live transport** (`ws`) — pinned WebSocket thread with auto-reconnect
//! - **Capture/replay** (`capture`) — raw-frame recording and offline replay
//!   through the same session path
//!
//! The session is transport-agnostic: the live WebSocket, the replay reader,
//! and the tests all drive the same `on_message` / `on_close` surface.

pub mod capture;
pub mod decode;
pub mod session;
pub mod ws;

pub use session::{FeedAction, FeedSession, FeedStats};
