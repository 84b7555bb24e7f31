// src/services/credential_service.rs
//! Credential service facade.
//!
//! The single entry point collaborators (HTTP handlers, reader apps, the CLI)
//! use. It owns one shared [`KeyStore`] and wires the issuer, the online
//! verifier and the offline verifier to it:
//! - `issue_standard_credential` / `verify_standard_credential`
//! - `issue_compact_credential` / `verify_compact_credential`
//! - `verify_compact_credential_offline`
//! - `public_key_pem` / `public_key_info` for third-party verifiers
//! - `decoy_qr_payload` for printing next to the signed code

use crate::config::Settings;
use crate::error::{IssueError, KeyStoreError, VerifyError};
use crate::models::credential::{CompactCredential, PublicKeyInfo, StandardCredential};
use crate::models::member::MemberRecord;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::offline_verifier::OfflineVerifier;
use crate::services::verifier::Verifier;
use crate::wallet::key_management::{KeyAlgorithm, KeyStore};
use serde_json::json;
use std::sync::Arc;

/// Public site printed in the decoy QR payload.
pub const ORGANIZATION_URL: &str = "https://community-connect.org";

/// Issues and verifies membership credentials with one set of keys.
#[derive(Clone)]
pub struct CredentialService {
    keys: Arc<KeyStore>,
    issuer: CredentialIssuer,
    verifier: Verifier,
    offline: OfflineVerifier,
    organization: String,
}

impl CredentialService {
    /// Loads (or on first run creates) the keys named by `settings` and builds the service.
    ///
    /// # Errors
    /// Any key store failure. These are fatal: do not fall back to fresh keys.
    pub fn open(settings: &Settings) -> Result<Self, KeyStoreError> {
        Ok(Self::new(Arc::new(KeyStore::open(settings)?), settings))
    }

    /// Builds the service around an already loaded key store.
    pub fn new(keys: Arc<KeyStore>, settings: &Settings) -> Self {
        Self {
            issuer: CredentialIssuer::new(keys.clone(), settings),
            verifier: Verifier::new(keys.clone()),
            offline: OfflineVerifier::new(keys.fallback().clone()),
            organization: settings.organization.clone(),
            keys,
        }
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    pub fn issue_standard_credential(&self, subject: &MemberRecord) -> Result<String, IssueError> {
        self.issuer.issue_standard_credential(subject)
    }

    pub fn verify_standard_credential(
        &self,
        envelope: &str,
    ) -> Result<StandardCredential, VerifyError> {
        self.verifier.verify_standard_credential(envelope)
    }

    pub fn issue_compact_credential(&self, subject: &MemberRecord) -> Result<String, IssueError> {
        self.issuer.issue_compact_credential(subject)
    }

    /// Online check against the live EC key.
    pub fn verify_compact_credential(&self, blob: &str) -> Result<CompactCredential, VerifyError> {
        self.verifier.verify_compact_credential(blob)
    }

    /// Offline check against the fallback public key.
    pub fn verify_compact_credential_offline(
        &self,
        blob: &str,
    ) -> Result<CompactCredential, VerifyError> {
        self.offline.verify_compact_credential_offline(blob)
    }

    /// SPKI PEM of the live public key, for third parties verifying on their own.
    pub fn public_key_pem(&self, algorithm: KeyAlgorithm) -> Result<String, KeyStoreError> {
        self.keys.public_key_pem(algorithm)
    }

    /// The public key together with what it is for.
    pub fn public_key_info(&self, algorithm: KeyAlgorithm) -> Result<PublicKeyInfo, KeyStoreError> {
        let usage = match algorithm {
            KeyAlgorithm::Rsa2048 => "Verify QR membership credentials",
            KeyAlgorithm::EcdsaP256 => "Verify NFC membership credentials",
        };
        Ok(PublicKeyInfo {
            public_key: self.public_key_pem(algorithm)?,
            algorithm: algorithm.signature_algorithm().to_string(),
            key_format: "PEM".to_string(),
            key_id: self.keys.fingerprint(algorithm).to_string(),
            usage: usage.to_string(),
            organization: self.organization.clone(),
        })
    }
}

/// Harmless JSON for generic QR readers; the signed credential is printed separately.
pub fn decoy_qr_payload() -> String {
    json!({
        "type": "membership_card",
        "data": "Visit our website for more info",
        "url": ORGANIZATION_URL,
        "note": "This QR code requires special scanner",
    })
    .to_string()
}
