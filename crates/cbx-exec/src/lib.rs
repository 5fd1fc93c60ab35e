//! # cbx-exec
//!
//! The execution side of the CBX engine:
//!
//! - **Credentials** (`credentials`) — CDP key name + EC private key from
//!   env vars or a JSON key file
//! - **Risk** (`risk`) — pre-trade checks and shadow balances
//! - **Rate limiting** (`rate_limit`) — token bucket for order submission
//! - **Signer** (`signer`) — ECDSA P-256 with precomputed ephemerals
//! - **JWT** (`jwt`) — per-request ES256 bearer tokens
//! - **Gateway** (`gateway`) — the pinned order-submission thread
//! - **Reconciler** (`reconcile`) — periodic shadow-balance overwrite from
//!   the exchange accounts endpoint

pub mod credentials;
pub mod gateway;
pub mod jwt;
pub mod rate_limit;
pub mod reconcile;
pub mod risk;
pub mod signer;

pub use credentials::ApiCredentials;
pub use gateway::{ExecutionGateway, GatewayConfig};
pub use rate_limit::TokenBucket;
pub use reconcile::Reconciler;
pub use risk::{RiskLimits, RiskManager, RiskRejection};
pub use signer::Signer;
