// src/utils/crypto.rs
//! Hashing and randomness helpers shared by the signers and the key store.
//!
//! Uses SHA-256 throughout (via the `sha2` crate) and the operating system RNG.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Hex characters kept from the SHA-256 digest when fingerprinting a key.
pub const FINGERPRINT_HEX_CHARS: usize = 16;

/// Random bytes in a standard credential nonce.
pub const NONCE_BYTES: usize = 8;

/// Computes a SHA-256 digest of the input data.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Derives the short key identifier bound into credentials.
///
/// # Arguments
/// * `public_key_der` - DER-encoded SubjectPublicKeyInfo of the key
///
/// # Returns
/// The first 16 lowercase hex characters of SHA-256 over the DER bytes.
pub fn fingerprint(public_key_der: &[u8]) -> String {
    let mut digest = hex::encode(hash_data(public_key_der));
    digest.truncate(FINGERPRINT_HEX_CHARS);
    digest
}

/// 8 fresh random bytes, hex encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Largest RSA-PSS salt for a SHA-256 digest and a modulus of `modulus_bytes` bytes.
///
/// `emLen - hLen - 2`, which is 222 for a 2048-bit key.
pub fn max_pss_salt_len(modulus_bytes: usize) -> usize {
    modulus_bytes.saturating_sub(Sha256::output_size() + 2)
}
