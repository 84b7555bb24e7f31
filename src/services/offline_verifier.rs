// src/services/offline_verifier.rs
//! Offline verification of compact (NFC) credentials.
//!
//! Runs the same decoding, schema and expiry checks as the online verifier but
//! checks the signature against a [`FallbackPublicKey`] instead of the live
//! key store, so a reader can work without reaching the issuer. The fallback
//! key is always P-256: an RSA key cannot be loaded as one, and there is no
//! cross-algorithm path.

use crate::error::{KeyStoreResult, VerifyError};
use crate::models::credential::CompactCredential;
use crate::services::verifier::verify_compact_with;
use crate::wallet::key_management::FallbackPublicKey;
use chrono::{DateTime, Utc};
use log::{debug, warn};

/// Compact credential verifier that needs nothing but a public key.
#[derive(Clone, Debug)]
pub struct OfflineVerifier {
    fallback: FallbackPublicKey,
}

impl OfflineVerifier {
    pub fn new(fallback: FallbackPublicKey) -> Self {
        Self { fallback }
    }

    /// Uses the public key compiled into this crate.
    pub fn embedded() -> KeyStoreResult<Self> {
        Ok(Self::new(FallbackPublicKey::embedded()?))
    }

    pub fn key_fingerprint(&self) -> &str {
        self.fallback.fingerprint()
    }

    /// Verifies a compact credential against today's date.
    pub fn verify_compact_credential_offline(
        &self,
        blob: &str,
    ) -> Result<CompactCredential, VerifyError> {
        self.verify_compact_credential_offline_at(blob, Utc::now())
    }

    /// Verifies a compact credential as if the clock read `now`.
    ///
    /// # Errors
    /// `MalformedEnvelope`, `MissingField`, `UnsupportedVersion`,
    /// `InvalidSignature` or `Expired`, exactly as the online check.
    pub fn verify_compact_credential_offline_at(
        &self,
        blob: &str,
        now: DateTime<Utc>,
    ) -> Result<CompactCredential, VerifyError> {
        let result = verify_compact_with(self.fallback.verifying_key(), blob, now);
        match &result {
            Ok(credential) => debug!(
                "Compact credential {} verified offline with key {}",
                credential.mid,
                self.fallback.fingerprint()
            ),
            Err(e) => warn!("Compact credential rejected offline: {}", e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::credential_issuer::CredentialIssuer;
    use crate::test_support::{ada, key_store_signing_with_fallback_key, shared_keys};
    use crate::utils::obfuscation::{deobfuscate, obfuscate};
    use chrono::{Duration, TimeZone};
    use serde_json::{Map, Value};
    use std::sync::Arc;

    fn fallback_issuer() -> CredentialIssuer {
        CredentialIssuer::new(Arc::new(key_store_signing_with_fallback_key()), &Settings::default())
    }

    #[test]
    fn test_accepts_credentials_from_fallback_key() {
        let blob = fallback_issuer().issue_compact_credential(&ada()).unwrap();
        let decoded = OfflineVerifier::embedded()
            .unwrap()
            .verify_compact_credential_offline(&blob)
            .unwrap();
        assert_eq!(decoded.mid, "CC-2024-0000");
        assert_eq!(decoded.name, "Ada Lovelace");
        assert_eq!(decoded.v, 1);
    }

    #[test]
    fn test_rejects_other_ec_key() {
        // shared_keys() holds a freshly generated P-256 key, not the fallback one
        let issuer = CredentialIssuer::new(shared_keys(), &Settings::default());
        let blob = issuer.issue_compact_credential(&ada()).unwrap();
        assert_eq!(
            OfflineVerifier::embedded()
                .unwrap()
                .verify_compact_credential_offline(&blob)
                .unwrap_err(),
            VerifyError::InvalidSignature
        );
    }

    #[test]
    fn test_same_failure_modes_as_online() {
        let offline = OfflineVerifier::embedded().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let blob = fallback_issuer().issue_compact_credential_at(&ada(), now).unwrap();

        assert_eq!(
            offline
                .verify_compact_credential_offline_at(&blob, now + Duration::days(367))
                .unwrap_err(),
            VerifyError::Expired
        );

        let mut fields: Map<String, Value> =
            serde_json::from_str(&deobfuscate(&blob).unwrap()).unwrap();
        fields.remove("exp");
        assert_eq!(
            offline
                .verify_compact_credential_offline(&obfuscate(&Value::Object(fields).to_string()))
                .unwrap_err(),
            VerifyError::MissingField("exp")
        );
    }

    #[test]
    fn test_online_verifier_with_fallback_pair_agrees() {
        let keys = Arc::new(key_store_signing_with_fallback_key());
        let blob = CredentialIssuer::new(keys.clone(), &Settings::default())
            .issue_compact_credential(&ada())
            .unwrap();
        let online = crate::services::verifier::Verifier::new(keys)
            .verify_compact_credential(&blob)
            .unwrap();
        let offline = OfflineVerifier::embedded()
            .unwrap()
            .verify_compact_credential_offline(&blob)
            .unwrap();
        assert_eq!(online, offline);
    }
}
