//! Per-request ES256 JWT assembly.
//!
//! Every order and reconciliation request carries a fresh bearer token:
//!
//! - header: `{"alg":"ES256","typ":"JWT","kid":"<key>","nonce":"<32-hex>"}`
//! - payload: `{"iss":"cdp","nbf":now−10,"exp":now+120,"sub":"<key>",
//!   "uri":"<METHOD> <host><path>"}`
//! - signature: raw 64-byte `r ‖ s` from the precomputed-ephemeral signer
//!
//! All three segments are base64url without padding. The generator reuses
//! its scratch buffers so steady-state token builds do not allocate.

use std::fmt::Write;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use cbx_core::error::CbxError;
use cbx_core::time_util;

use crate::signer::Signer;

/// Token lifetime in seconds (`exp − iat`).
const JWT_TTL_SECS: u64 = 120;

/// Backdating applied to `nbf` to absorb clock skew.
const JWT_NBF_BACKDATE_SECS: u64 = 10;

/// Reusable JWT builder for one API key.
pub struct JwtGenerator {
    key_name: String,
    scratch: String,
    token: String,
}

impl JwtGenerator {
    pub fn new(key_name: String) -> Self {
        Self {
            key_name,
            scratch: String::with_capacity(256),
            token: String::with_capacity(512),
        }
    }

    /// Build a token for `METHOD host path`, valid from `now − 10` to
    /// `now + 120`. The returned slice borrows the generator's buffer and
    /// is valid until the next call.
    pub fn generate(
        &mut self,
        signer: &mut Signer,
        method: &str,
        host: &str,
        path: &str,
    ) -> Result<&str, CbxError> {
        self.generate_at(signer, method, host, path, time_util::now_secs())
    }

    fn generate_at(
        &mut self,
        signer: &mut Signer,
        method: &str,
        host: &str,
        path: &str,
        now_secs: u64,
    ) -> Result<&str, CbxError> {
        let nonce: [u8; 16] = rand::random();

        // Header.
        self.scratch.clear();
        write!(
            self.scratch,
            r#"{{"alg":"ES256","typ":"JWT","kid":"{}","nonce":"{}"}}"#,
            self.key_name,
            hex::encode(nonce),
        )
        .map_err(|e| CbxError::Signing(e.to_string()))?;

        self.token.clear();
        URL_SAFE_NO_PAD.encode_string(self.scratch.as_bytes(), &mut self.token);
        self.token.push('.');

        // Payload.
        self.scratch.clear();
        write!(
            self.scratch,
            r#"{{"iss":"cdp","nbf":{},"exp":{},"sub":"{}","uri":"{} {}{}"}}"#,
            now_secs - JWT_NBF_BACKDATE_SECS,
            now_secs + JWT_TTL_SECS,
            self.key_name,
            method,
            host,
            path,
        )
        .map_err(|e| CbxError::Signing(e.to_string()))?;
        URL_SAFE_NO_PAD.encode_string(self.scratch.as_bytes(), &mut self.token);

        // Signature over `header_b64 . payload_b64`.
        let digest: [u8; 32] = Sha256::digest(self.token.as_bytes()).into();
        let signature = signer.sign_prehash(&digest);

        self.token.push('.');
        URL_SAFE_NO_PAD.encode_string(signature, &mut self.token);

        Ok(&self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::SecretKey;
    use p256::ecdsa::Signature;
    use p256::ecdsa::signature::Verifier;

    const KEY_NAME: &str = "organizations/test/apiKeys/unit";

    fn setup() -> (Signer, JwtGenerator) {
        let signer = Signer::from_secret_key(SecretKey::random(&mut rand::rngs::OsRng)).unwrap();
        (signer, JwtGenerator::new(KEY_NAME.to_string()))
    }

    fn decode_segment(segment: &str) -> serde_json::Value {
        let bytes = URL_SAFE_NO_PAD.decode(segment).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn token_has_three_nonempty_segments() {
        let (mut signer, mut jwt) = setup();
        let token = jwt
            .generate(&mut signer, "POST", "api.coinbase.com", "/api/v3/brokerage/orders")
            .unwrap();

        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| !s.is_empty()));
        // base64url alphabet only, no padding.
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
    }

    #[test]
    fn header_claims() {
        let (mut signer, mut jwt) = setup();
        let token = jwt
            .generate(&mut signer, "GET", "api.coinbase.com", "/api/v3/brokerage/accounts")
            .unwrap()
            .to_string();

        let header = decode_segment(token.split('.').next().unwrap());
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["kid"], KEY_NAME);

        let nonce = header["nonce"].as_str().unwrap();
        assert_eq!(nonce.len(), 32);
        assert!(nonce.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn payload_claims_and_window() {
        let (mut signer, mut jwt) = setup();
        let now = 1_700_000_000u64;
        let token = jwt
            .generate_at(&mut signer, "GET", "api.coinbase.com", "/api/v3/brokerage/accounts", now)
            .unwrap()
            .to_string();

        let payload = decode_segment(token.split('.').nth(1).unwrap());
        assert_eq!(payload["iss"], "cdp");
        assert_eq!(payload["sub"], KEY_NAME);
        assert_eq!(payload["nbf"], now - 10);
        assert_eq!(payload["exp"], now + 120);
        assert_eq!(payload["uri"], "GET api.coinbase.com/api/v3/brokerage/accounts");
    }

    #[test]
    fn signature_verifies_externally() {
        let (mut signer, mut jwt) = setup();
        let token = jwt
            .generate(&mut signer, "GET", "api.coinbase.com", "/api/v3/brokerage/accounts")
            .unwrap()
            .to_string();

        let (signing_input, sig_b64) = token.rsplit_once('.').unwrap();
        let sig_bytes = URL_SAFE_NO_PAD.decode(sig_b64).unwrap();
        assert_eq!(sig_bytes.len(), 64);

        let signature = Signature::from_slice(&sig_bytes).unwrap();
        signer.verifying_key().verify(signing_input.as_bytes(), &signature).unwrap();
    }

    #[test]
    fn nonces_differ_between_tokens() {
        let (mut signer, mut jwt) = setup();
        let t1 = jwt.generate(&mut signer, "GET", "h", "/p").unwrap().to_string();
        let t2 = jwt.generate(&mut signer, "GET", "h", "/p").unwrap().to_string();
        assert_ne!(t1.split('.').next(), t2.split('.').next());
    }
}
