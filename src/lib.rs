// src/lib.rs

//! # Member Credentials
//!
//! Issues and verifies tamper-evident membership credentials for two carriers:
//!
//! 1. **Standard credentials** (QR codes): the full member record, signed with
//!    RSA-PSS/SHA-256 and wrapped as `base64(payload)|base64(signature)|base64(metadata)`.
//! 2. **Compact credentials** (540-byte NFC tags): a trimmed record signed with
//!    ECDSA P-256/SHA-256, wrapped in a reversible obfuscation envelope.
//!
//! Compact credentials can also be checked offline against a public key
//! compiled into the crate.
//!
//! ## Layout
//! - `wallet`: key lifecycle (load or generate, persist, fingerprint)
//! - `storage`: PEM files on disk
//! - `models`: member records and credential shapes
//! - `utils`: canonical encoding, hashing, obfuscation
//! - `services`: issuers, verifiers and the [`CredentialService`] facade
//!
//! The membership store, HTTP routing and user authentication live elsewhere;
//! callers hand in a [`MemberRecord`] and get strings back.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use config::Settings;
pub use error::{IssueError, KeyStoreError, VerifyError};
pub use models::credential::{CompactCredential, PublicKeyInfo, StandardCredential};
pub use models::member::{MemberRecord, MemberStatus};
pub use services::credential_service::CredentialService;
pub use wallet::key_management::{KeyAlgorithm, KeyStore};

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the unit tests. RSA-2048 generation takes a while,
    //! so one key store is generated per test binary and reused.

    use crate::config::Settings;
    use crate::models::member::MemberRecord;
    use crate::wallet::key_management::{EcKeyPair, FallbackPublicKey, KeyStore};
    use once_cell::sync::Lazy;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Private half of `EMBEDDED_FALLBACK_PUBLIC_KEY_PEM`. Test use only.
    pub const FALLBACK_TEST_PRIVATE_KEY_PEM: &str =
        include_str!("wallet/testdata/fallback_ec_private.pem");

    static SHARED: Lazy<(TempDir, Arc<KeyStore>)> = Lazy::new(|| {
        let dir = tempfile::tempdir().expect("create key dir");
        let settings = Settings {
            key_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let store = KeyStore::open(&settings).expect("open key store");
        (dir, Arc::new(store))
    });

    pub fn shared_key_store() -> &'static KeyStore {
        SHARED.1.as_ref()
    }

    pub fn shared_keys() -> Arc<KeyStore> {
        Arc::clone(&SHARED.1)
    }

    pub fn shared_key_dir() -> &'static Path {
        SHARED.0.path()
    }

    pub fn fallback_signing_pair() -> EcKeyPair {
        EcKeyPair::from_pkcs8_pem(FALLBACK_TEST_PRIVATE_KEY_PEM).expect("parse test key")
    }

    /// A key store whose live EC key is the one behind the embedded fallback key.
    pub fn key_store_signing_with_fallback_key() -> KeyStore {
        KeyStore::from_parts(
            shared_key_store().rsa().clone(),
            fallback_signing_pair(),
            FallbackPublicKey::embedded().expect("embedded key"),
        )
    }

    pub fn ada() -> MemberRecord {
        MemberRecord::new(42, "CC-2024-000042", "Ada Lovelace", "active")
    }
}
