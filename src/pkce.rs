use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// PKCE code verifier: 48 random bytes as 64 base64url characters
/// (RFC 7636 allows 43 to 128).
#[must_use]
pub fn generate_code_verifier() -> String {
    let random_bytes: [u8; 48] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// S256 challenge sent in the authorization request:
/// `BASE64URL(SHA256(verifier))`, always 43 characters.
#[must_use]
pub fn code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Returns `true` when `challenge` is the S256 challenge of `verifier`.
///
/// This is the check the provider performs when the verifier is presented
/// at the token endpoint.
#[must_use]
pub fn verify_challenge(verifier: &str, challenge: &str) -> bool {
    code_challenge(verifier) == challenge
}

/// Anti-forgery `state`: 16 random bytes as 22 base64url characters.
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}
