//! Typed error definitions for the CBX engine.
//!
//! Provides [`CbxError`] for domain-specific errors that are more informative
//! than plain `anyhow::Error` strings. All variants implement
//! `std::error::Error` via `thiserror`, so they integrate seamlessly with
//! `anyhow::Result`.

use thiserror::Error;

/// Domain-specific errors for the CBX engine.
#[derive(Debug, Error)]
pub enum CbxError {
    /// Credential loading or key parsing error. Fatal at boot.
    #[error("credential error: {0}")]
    Credentials(String),

    /// Market data or exchange response parsing error.
    #[error("parse error: {0}")]
    Parse(String),

    /// ECDSA signing or JWT assembly error.
    #[error("signing error: {0}")]
    Signing(String),

    /// Order submission or reconciliation HTTP error.
    #[error("http error: {0}")]
    Http(String),
}
