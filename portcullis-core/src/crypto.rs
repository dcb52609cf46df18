//! Token generation and hashing
//!
//! Session and remember-me tokens are high-entropy random values. Only their
//! SHA-256 digest is persisted, and lookups compare digests in constant time
//! through the `subtle` crate.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a 256-bit random token encoded as URL-safe base64 (43 characters).
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Hex-encoded SHA-256 digest of `token`, used as the storage key.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify `token` against a stored digest in constant time.
pub fn verify_token_hash(token: &str, stored_hash: &str) -> bool {
    constant_time_compare(hash_token(token).as_bytes(), stored_hash.as_bytes())
}

/// Constant-time equality of two byte slices. Length mismatch returns early.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
